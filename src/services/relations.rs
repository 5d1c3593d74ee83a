use crate::{
    error::Error,
    form::SubscriptionQuery,
    jwt::{Identity, SessionData},
    pagination::{PageContext, PageQuery},
    permissions::ActionType,
    schema::{Id, RelationKind},
    storage::ObjectStorage,
    store::RecipeStore,
};

use super::views::{recipe_short_view, subscription_view, RecipeShortView, SubscriptionView};

/// Adds a favorite or cart entry. The store's unique pair is the final word
/// on duplicates; the lookup before it only short-circuits the common case.
pub async fn add(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
    kind: RelationKind,
    recipe_id: Id,
) -> Result<RecipeShortView, Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    let recipe = store
        .get_recipe(recipe_id)
        .await?
        .ok_or_else(|| Error::not_found("Recipe"))?;

    if store.relation_exists(kind, session.user_id, recipe_id).await?
        || !store.insert_relation(kind, session.user_id, recipe_id).await?
    {
        return Err(Error::DuplicateRelation(
            kind.already_exists_message().to_owned(),
        ));
    }

    log::trace!("> User {} added {kind:?} {recipe_id}", session.user_id);
    Ok(recipe_short_view(storage, &recipe))
}

pub async fn remove(
    store: &dyn RecipeStore,
    session: &SessionData,
    kind: RelationKind,
    recipe_id: Id,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnRelations)?;

    if store.get_recipe(recipe_id).await?.is_none() {
        return Err(Error::not_found("Recipe"));
    }
    if !store.delete_relation(kind, session.user_id, recipe_id).await? {
        return Err(Error::RelationNotFound(kind.missing_message().to_owned()));
    }

    log::trace!("> User {} removed {kind:?} {recipe_id}", session.user_id);
    Ok(())
}

pub async fn subscribe(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
    target_id: Id,
    recipes_limit: Option<usize>,
) -> Result<SubscriptionView, Error> {
    if session.user_id == target_id {
        return Err(Error::SelfReference);
    }
    session.authenticate(ActionType::ManageOwnRelations)?;

    let target = store
        .get_user(target_id)
        .await?
        .ok_or_else(|| Error::not_found("User"))?;

    if store.subscription_exists(session.user_id, target_id).await?
        || !store.insert_subscription(session.user_id, target_id).await?
    {
        return Err(Error::DuplicateRelation(
            "You are already subscribed to this user".to_owned(),
        ));
    }

    log::trace!("> User {} subscribed to {target_id}", session.user_id);
    let identity = Identity::User(session.clone());
    subscription_view(store, storage, &identity, &target, recipes_limit).await
}

pub async fn unsubscribe(
    store: &dyn RecipeStore,
    session: &SessionData,
    target_id: Id,
) -> Result<(), Error> {
    if session.user_id == target_id {
        return Err(Error::SelfReference);
    }
    session.authenticate(ActionType::ManageOwnRelations)?;

    if store.get_user(target_id).await?.is_none() {
        return Err(Error::not_found("User"));
    }
    if !store.delete_subscription(session.user_id, target_id).await? {
        return Err(Error::RelationNotFound(
            "You are not subscribed to this user".to_owned(),
        ));
    }

    log::trace!("> User {} unsubscribed from {target_id}", session.user_id);
    Ok(())
}

/// Authors the session follows, ordered by username.
pub async fn subscriptions(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
    query: &SubscriptionQuery,
) -> Result<PageContext<SubscriptionView>, Error> {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let (users, total) = store
        .list_subscriptions(session.user_id, page.limit(), page.offset())
        .await?;

    let identity = Identity::User(session.clone());
    let mut results = Vec::with_capacity(users.len());
    for user in &users {
        results.push(subscription_view(store, storage, &identity, user, query.recipes_limit).await?);
    }

    Ok(PageContext::from_rows(results, total, &page))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::schema::{RecipeDraft, User, UserRole};
    use crate::storage::MemoryStorage;

    fn session(user: &User) -> SessionData {
        SessionData {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            is_admin: false,
        }
    }

    async fn recipe(store: &MemoryStore, author: Id, name: &str) -> Id {
        let flour = match store.add_ingredient("flour", "g").await {
            Ok(ingredient) => ingredient.id,
            Err(_) => store.list_ingredients(Some("flour")).await.unwrap()[0].id,
        };
        let tag = match store.add_tag("Breakfast", "breakfast").await {
            Ok(tag) => tag.id,
            Err(_) => store.list_tags().await.unwrap()[0].id,
        };
        store
            .insert_recipe(
                author,
                &RecipeDraft {
                    name: name.into(),
                    text: "text".into(),
                    cooking_time: 10,
                    image: Some(format!("recipes/{name}.png")),
                    tags: vec![tag],
                    ingredients: vec![(flour, 100)],
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn favorite_twice_then_remove_then_again() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let user = store.add_user("alice", UserRole::User).await;
        let id = recipe(&store, user.id, "bread").await;
        let session = session(&user);

        let view = add(&store, &storage, &session, RelationKind::Favorite, id)
            .await
            .unwrap();
        assert_eq!(view.id, id);
        assert_eq!(view.image, "/media/recipes/bread.png");

        assert!(matches!(
            add(&store, &storage, &session, RelationKind::Favorite, id).await,
            Err(Error::DuplicateRelation(_))
        ));
        remove(&store, &session, RelationKind::Favorite, id)
            .await
            .unwrap();
        assert!(matches!(
            remove(&store, &session, RelationKind::Favorite, id).await,
            Err(Error::RelationNotFound(_))
        ));
        assert!(add(&store, &storage, &session, RelationKind::Favorite, id)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn relation_kinds_are_independent() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let user = store.add_user("alice", UserRole::User).await;
        let id = recipe(&store, user.id, "bread").await;
        let session = session(&user);

        add(&store, &storage, &session, RelationKind::Favorite, id)
            .await
            .unwrap();
        add(&store, &storage, &session, RelationKind::ShoppingCart, id)
            .await
            .unwrap();
        assert!(matches!(
            add(&store, &storage, &session, RelationKind::ShoppingCart, 999).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn self_subscription_is_rejected_before_lookups() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let user = store.add_user("alice", UserRole::User).await;
        let session = session(&user);

        assert!(matches!(
            subscribe(&store, &storage, &session, user.id, None).await,
            Err(Error::SelfReference)
        ));
        assert!(matches!(
            unsubscribe(&store, &session, user.id).await,
            Err(Error::SelfReference)
        ));

        store.delete_user(user.id).await;
        assert!(matches!(
            subscribe(&store, &storage, &session, user.id, None).await,
            Err(Error::SelfReference)
        ));
    }

    #[tokio::test]
    async fn subscription_view_limits_recipes_but_counts_all() {
        let store = MemoryStore::new();
        let storage = MemoryStorage::new();
        let reader = store.add_user("bob", UserRole::User).await;
        let author = store.add_user("alice", UserRole::User).await;
        for name in ["a", "b", "c"] {
            recipe(&store, author.id, name).await;
        }
        let session = session(&reader);

        let view = subscribe(&store, &storage, &session, author.id, Some(2))
            .await
            .unwrap();
        assert_eq!(view.recipes.len(), 2);
        assert_eq!(view.recipes_count, 3);
        assert!(view.user.is_subscribed);

        assert!(matches!(
            subscribe(&store, &storage, &session, author.id, None).await,
            Err(Error::DuplicateRelation(_))
        ));
        assert!(matches!(
            subscribe(&store, &storage, &session, 999, None).await,
            Err(Error::NotFound(_))
        ));

        let page = subscriptions(&store, &storage, &session, &SubscriptionQuery::default())
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].user.username, "alice");

        unsubscribe(&store, &session, author.id).await.unwrap();
        assert!(matches!(
            unsubscribe(&store, &session, author.id).await,
            Err(Error::RelationNotFound(_))
        ));
    }
}
