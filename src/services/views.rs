//! Read-side DTOs and the projection of stored rows into them relative to the
//! requesting identity.

use serde::{Deserialize, Serialize};

use crate::{
    error::Error,
    jwt::Identity,
    schema::{Id, Recipe, RecipePart, RelationKind, Tag, User},
    storage::ObjectStorage,
    store::RecipeStore,
};

use super::recipes::RecipeAggregate;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecipeFlags {
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub email: String,
    pub id: Id,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
    pub avatar: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IngredientAmountView {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

impl From<RecipePart> for IngredientAmountView {
    fn from(value: RecipePart) -> Self {
        Self {
            id: value.ingredient_id,
            name: value.name,
            measurement_unit: value.measurement_unit,
            amount: value.amount,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecipeView {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserView,
    pub ingredients: Vec<IngredientAmountView>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RecipeShortView {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub user: UserView,
    pub recipes: Vec<RecipeShortView>,
    pub recipes_count: i64,
}

/// Anonymous identities short-circuit to `false` without a store call.
pub async fn recipe_flags(
    store: &dyn RecipeStore,
    identity: &Identity,
    recipe_id: Id,
) -> Result<RecipeFlags, Error> {
    let Some(user_id) = identity.user_id() else {
        return Ok(RecipeFlags::default());
    };

    Ok(RecipeFlags {
        is_favorited: store
            .relation_exists(RelationKind::Favorite, user_id, recipe_id)
            .await?,
        is_in_shopping_cart: store
            .relation_exists(RelationKind::ShoppingCart, user_id, recipe_id)
            .await?,
    })
}

/// `false` for anonymous viewers and for the viewer's own profile.
pub async fn is_subscribed(
    store: &dyn RecipeStore,
    identity: &Identity,
    target_id: Id,
) -> Result<bool, Error> {
    match identity.user_id() {
        None => Ok(false),
        Some(viewer_id) if viewer_id == target_id => Ok(false),
        Some(viewer_id) => store.subscription_exists(viewer_id, target_id).await,
    }
}

pub async fn user_view(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    identity: &Identity,
    user: &User,
) -> Result<UserView, Error> {
    Ok(UserView {
        email: user.email.clone(),
        id: user.id,
        username: user.username.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        is_subscribed: is_subscribed(store, identity, user.id).await?,
        avatar: user.avatar.as_deref().map(|avatar| storage.url(avatar)),
    })
}

pub fn recipe_short_view(storage: &dyn ObjectStorage, recipe: &Recipe) -> RecipeShortView {
    RecipeShortView {
        id: recipe.id,
        name: recipe.name.clone(),
        image: storage.url(&recipe.image),
        cooking_time: recipe.cooking_time,
    }
}

pub async fn recipe_view(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    identity: &Identity,
    aggregate: RecipeAggregate,
) -> Result<RecipeView, Error> {
    let flags = recipe_flags(store, identity, aggregate.recipe.id).await?;
    let author = user_view(store, storage, identity, &aggregate.author).await?;
    let recipe = aggregate.recipe;

    Ok(RecipeView {
        id: recipe.id,
        tags: aggregate.tags,
        author,
        ingredients: aggregate.parts.into_iter().map(Into::into).collect(),
        is_favorited: flags.is_favorited,
        is_in_shopping_cart: flags.is_in_shopping_cart,
        image: storage.url(&recipe.image),
        name: recipe.name,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn subscription_view(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    identity: &Identity,
    user: &User,
    recipes_limit: Option<usize>,
) -> Result<SubscriptionView, Error> {
    let recipes = store.list_author_recipes(user.id, recipes_limit).await?;

    Ok(SubscriptionView {
        user: user_view(store, storage, identity, user).await?,
        recipes: recipes
            .iter()
            .map(|recipe| recipe_short_view(storage, recipe))
            .collect(),
        recipes_count: store.count_author_recipes(user.id).await?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::SessionData;
    use crate::memory::MemoryStore;
    use crate::schema::{RecipeDraft, UserRole};

    fn session(user: &User) -> Identity {
        Identity::User(SessionData {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            is_admin: false,
        })
    }

    async fn seeded() -> (MemoryStore, User, User, Id) {
        let store = MemoryStore::new();
        let author = store.add_user("alice", UserRole::User).await;
        let reader = store.add_user("bob", UserRole::User).await;
        let flour = store.add_ingredient("flour", "g").await.unwrap();
        let tag = store.add_tag("Breakfast", "breakfast").await.unwrap();
        let recipe = store
            .insert_recipe(
                author.id,
                &RecipeDraft {
                    name: "Bread".into(),
                    text: "Bake".into(),
                    cooking_time: 60,
                    image: Some("recipes/bread.png".into()),
                    tags: vec![tag.id],
                    ingredients: vec![(flour.id, 500)],
                },
            )
            .await
            .unwrap();
        (store, author, reader, recipe)
    }

    #[tokio::test]
    async fn anonymous_flags_skip_the_store() {
        let (store, _, reader, recipe) = seeded().await;
        store
            .insert_relation(RelationKind::Favorite, reader.id, recipe)
            .await
            .unwrap();

        let flags = recipe_flags(&store, &Identity::Anonymous, recipe)
            .await
            .unwrap();
        assert_eq!(flags, RecipeFlags::default());
        assert_eq!(store.relation_lookups(), 0);
    }

    #[tokio::test]
    async fn authenticated_flags_reflect_relations() {
        let (store, _, reader, recipe) = seeded().await;
        store
            .insert_relation(RelationKind::ShoppingCart, reader.id, recipe)
            .await
            .unwrap();

        let flags = recipe_flags(&store, &session(&reader), recipe)
            .await
            .unwrap();
        assert!(!flags.is_favorited);
        assert!(flags.is_in_shopping_cart);
        assert_eq!(store.relation_lookups(), 2);
    }

    #[tokio::test]
    async fn own_profile_is_never_subscribed() {
        let (store, author, reader, _) = seeded().await;
        store.insert_subscription(reader.id, author.id).await.unwrap();

        assert!(is_subscribed(&store, &session(&reader), author.id)
            .await
            .unwrap());
        assert!(!is_subscribed(&store, &session(&author), author.id)
            .await
            .unwrap());
        assert!(!is_subscribed(&store, &Identity::Anonymous, author.id)
            .await
            .unwrap());
    }
}
