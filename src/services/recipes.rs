use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        MAX_AMOUNT, MAX_COOKING_TIME, MIN_AMOUNT, MIN_COOKING_TIME, RECIPE_IMAGE_FOLDER,
        RECIPE_NAME_MAX_LENGTH,
    },
    error::{Error, ValidationErrors},
    form::{ImagePayload, RecipeForm, RecipeListQuery},
    jwt::{Identity, SessionData},
    pagination::{PageContext, PageQuery},
    permissions::ActionType,
    schema::{Id, Recipe, RecipeDraft, RecipeFilter, RecipePart, Tag, User},
    storage::ObjectStorage,
    store::RecipeStore,
};

use super::views::{recipe_view, RecipeView};

const REQUIRED: &str = "This field is required.";

/// Viewer-independent part of a recipe detail. This is what gets cached.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecipeAggregate {
    pub recipe: Recipe,
    pub author: User,
    pub tags: Vec<Tag>,
    pub parts: Vec<RecipePart>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecipe {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<ImagePayload>,
    pub tags: Vec<Id>,
    pub ingredients: Vec<(Id, i32)>,
}

impl ValidatedRecipe {
    fn into_draft(self, image: Option<String>) -> RecipeDraft {
        RecipeDraft {
            name: self.name,
            text: self.text,
            cooking_time: self.cooking_time,
            image,
            tags: self.tags,
            ingredients: self.ingredients,
        }
    }
}

fn required_text(errors: &mut ValidationErrors, field: &str, value: Option<String>) -> String {
    match value.map(|v| v.trim().to_owned()) {
        Some(value) if !value.is_empty() => value,
        _ => {
            errors.add(field, REQUIRED);
            String::new()
        }
    }
}

fn in_range(value: i64, min: i32, max: i32) -> Option<i32> {
    (i64::from(min)..=i64::from(max))
        .contains(&value)
        .then_some(value as i32)
}

/// Collects every problem of the form before touching storage. Missing tag
/// and ingredient ids are looked up in one query each.
pub async fn validate(
    store: &dyn RecipeStore,
    form: RecipeForm,
    require_image: bool,
) -> Result<ValidatedRecipe, Error> {
    let mut errors = ValidationErrors::new();

    let name = required_text(&mut errors, "name", form.name);
    if name.chars().count() > RECIPE_NAME_MAX_LENGTH {
        errors.add(
            "name",
            format!("Ensure this field has no more than {RECIPE_NAME_MAX_LENGTH} characters."),
        );
    }
    let text = required_text(&mut errors, "text", form.text);

    let cooking_time = match form.cooking_time {
        None => {
            errors.add("cooking_time", REQUIRED);
            0
        }
        Some(value) => in_range(value, MIN_COOKING_TIME, MAX_COOKING_TIME).unwrap_or_else(|| {
            errors.add(
                "cooking_time",
                format!("Cooking time must be between {MIN_COOKING_TIME} and {MAX_COOKING_TIME}."),
            );
            0
        }),
    };

    let image = match form.image.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => match ImagePayload::parse(value) {
            Ok(image) => Some(image),
            Err(message) => {
                errors.add("image", message);
                None
            }
        },
        _ => {
            if require_image {
                errors.add("image", REQUIRED);
            }
            None
        }
    };

    let tags = form.tags.unwrap_or_default();
    if tags.is_empty() {
        errors.add("tags", "Add at least one tag.");
    } else {
        let unique: HashSet<Id> = tags.iter().copied().collect();
        if unique.len() != tags.len() {
            errors.add("tags", "Tags must not repeat.");
        }
        let existing = store.existing_tag_ids(&tags).await?;
        for id in tags.iter().filter(|id| !existing.contains(id)) {
            errors.add("tags", format!("Tag {id} does not exist."));
        }
    }

    let lines = form.ingredients.unwrap_or_default();
    let mut ingredients = Vec::with_capacity(lines.len());
    if lines.is_empty() {
        errors.add("ingredients", "Add at least one ingredient.");
    } else {
        let ids: Vec<Id> = lines.iter().map(|line| line.id).collect();
        let unique: HashSet<Id> = ids.iter().copied().collect();
        if unique.len() != ids.len() {
            errors.add("ingredients", "Ingredients must not repeat.");
        }
        let existing = store.existing_ingredient_ids(&ids).await?;

        for line in &lines {
            if !existing.contains(&line.id) {
                errors.add("ingredients", format!("Ingredient {} does not exist.", line.id));
            }
            match in_range(line.amount, MIN_AMOUNT, MAX_AMOUNT) {
                Some(amount) => ingredients.push((line.id, amount)),
                None => errors.add(
                    "ingredients",
                    format!(
                        "Amount of ingredient {} must be between {MIN_AMOUNT} and {MAX_AMOUNT}.",
                        line.id
                    ),
                ),
            }
        }
    }

    errors.into_result()?;

    Ok(ValidatedRecipe {
        name,
        text,
        cooking_time,
        image,
        tags,
        ingredients,
    })
}

pub(crate) async fn discard_image(storage: &dyn ObjectStorage, reference: &str) {
    if let Err(e) = storage.delete(reference).await {
        log::error!("> Failed to delete image {reference}: {e}");
    }
}

pub async fn create(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
    form: RecipeForm,
) -> Result<Id, Error> {
    session.authenticate(ActionType::CreateRecipes)?;

    let mut validated = validate(store, form, true).await?;
    let image = validated
        .image
        .take()
        .ok_or_else(|| Error::Validation(ValidationErrors::single("image", REQUIRED)))?;
    let image = storage.put(RECIPE_IMAGE_FOLDER, image).await?;

    match store
        .insert_recipe(session.user_id, &validated.into_draft(Some(image.clone())))
        .await
    {
        Ok(id) => {
            log::info!("> User {} created recipe {id}", session.user_id);
            Ok(id)
        }
        Err(e) => {
            discard_image(storage, &image).await;
            Err(e)
        }
    }
}

/// Loads a recipe for mutation. Only its author or an admin may change it.
pub async fn get_recipe_mut(
    store: &dyn RecipeStore,
    session: &SessionData,
    recipe_id: Id,
) -> Result<Recipe, Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;

    match store.get_recipe(recipe_id).await? {
        Some(recipe) => match session.authenticate(ActionType::ManageAllRecipes) {
            Ok(_) => Ok(recipe),
            Err(_) if recipe.author_id == session.user_id => Ok(recipe),
            Err(e) => Err(e),
        },
        None => Err(Error::not_found("Recipe")),
    }
}

/// Full replace: columns are updated and the ingredient and tag sets are
/// swapped for the submitted ones. The stored image is kept when none is sent.
pub async fn replace(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
    recipe_id: Id,
    form: RecipeForm,
) -> Result<(), Error> {
    let recipe = get_recipe_mut(store, session, recipe_id).await?;

    let mut validated = validate(store, form, false).await?;
    let image = match validated.image.take() {
        Some(image) => Some(storage.put(RECIPE_IMAGE_FOLDER, image).await?),
        None => None,
    };

    if let Err(e) = store
        .replace_recipe(recipe_id, &validated.into_draft(image.clone()))
        .await
    {
        if let Some(image) = &image {
            discard_image(storage, image).await;
        }
        return Err(e);
    }

    if image.is_some() && !recipe.image.is_empty() {
        discard_image(storage, &recipe.image).await;
    }
    log::info!("> User {} replaced recipe {recipe_id}", session.user_id);
    Ok(())
}

pub async fn delete(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    session: &SessionData,
    recipe_id: Id,
) -> Result<(), Error> {
    let recipe = get_recipe_mut(store, session, recipe_id).await?;

    if !store.delete_recipe(recipe_id).await? {
        return Err(Error::not_found("Recipe"));
    }
    if !recipe.image.is_empty() {
        discard_image(storage, &recipe.image).await;
    }
    log::info!("> User {} deleted recipe {recipe_id}", session.user_id);
    Ok(())
}

pub async fn load_aggregate(
    store: &dyn RecipeStore,
    recipe_id: Id,
) -> Result<Option<RecipeAggregate>, Error> {
    let Some(recipe) = store.get_recipe(recipe_id).await? else {
        return Ok(None);
    };
    let author = store
        .get_user(recipe.author_id)
        .await?
        .ok_or_else(|| Error::not_found("Author"))?;

    Ok(Some(RecipeAggregate {
        tags: store.list_recipe_tags(recipe_id).await?,
        parts: store.list_recipe_parts(recipe_id).await?,
        recipe,
        author,
    }))
}

/// Relation filters only apply to authenticated viewers; anonymous viewers
/// asking for them get the unfiltered list.
pub fn recipe_filter(identity: &Identity, query: &RecipeListQuery) -> RecipeFilter {
    let page = PageQuery {
        page: query.page,
        limit: query.limit,
    };
    let viewer = identity.user_id();

    RecipeFilter {
        author: query.author,
        tags: query.tag_slugs(),
        favorited_by: viewer.filter(|_| query.is_favorited == Some(1)),
        in_cart_of: viewer.filter(|_| query.is_in_shopping_cart == Some(1)),
        limit: page.limit(),
        offset: page.offset(),
    }
}

pub async fn list(
    store: &dyn RecipeStore,
    storage: &dyn ObjectStorage,
    identity: &Identity,
    query: &RecipeListQuery,
) -> Result<PageContext<RecipeView>, Error> {
    let filter = recipe_filter(identity, query);
    let (recipes, total) = store.fetch_recipes(&filter).await?;

    let mut results = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        if let Some(aggregate) = load_aggregate(store, recipe.id).await? {
            results.push(recipe_view(store, storage, identity, aggregate).await?);
        }
    }

    Ok(PageContext::from_rows(
        results,
        total,
        &PageQuery {
            page: query.page,
            limit: query.limit,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::IngredientAmountForm;
    use crate::memory::MemoryStore;
    use crate::schema::{RelationKind, UserRole};
    use crate::storage::MemoryStorage;

    const IMAGE: &str = "data:image/png;base64,aGVsbG8=";

    struct Fixture {
        store: MemoryStore,
        storage: MemoryStorage,
        author: SessionData,
        other: SessionData,
        admin: SessionData,
        flour: Id,
        milk: Id,
        eggs: Id,
        breakfast: Id,
        dinner: Id,
    }

    fn session(user: &User) -> SessionData {
        SessionData {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role.clone(),
            is_admin: user.role == UserRole::Admin,
        }
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let author = store.add_user("alice", UserRole::User).await;
        let other = store.add_user("bob", UserRole::User).await;
        let admin = store.add_user("root", UserRole::Admin).await;
        let flour = store.add_ingredient("flour", "g").await.unwrap().id;
        let milk = store.add_ingredient("milk", "ml").await.unwrap().id;
        let eggs = store.add_ingredient("eggs", "pcs").await.unwrap().id;
        let breakfast = store.add_tag("Breakfast", "breakfast").await.unwrap().id;
        let dinner = store.add_tag("Dinner", "dinner").await.unwrap().id;

        Fixture {
            store,
            storage: MemoryStorage::new(),
            author: session(&author),
            other: session(&other),
            admin: session(&admin),
            flour,
            milk,
            eggs,
            breakfast,
            dinner,
        }
    }

    fn form(tags: Vec<Id>, ingredients: Vec<(Id, i64)>) -> RecipeForm {
        RecipeForm {
            name: Some("Pancakes".into()),
            text: Some("Mix and fry".into()),
            cooking_time: Some(20),
            image: Some(IMAGE.into()),
            tags: Some(tags),
            ingredients: Some(
                ingredients
                    .into_iter()
                    .map(|(id, amount)| IngredientAmountForm { id, amount })
                    .collect(),
            ),
        }
    }

    fn field_errors(result: Result<Id, Error>) -> ValidationErrors {
        match result {
            Err(Error::Validation(errors)) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn amount_bounds_are_inclusive() {
        let f = fixture().await;
        for amount in [MIN_AMOUNT as i64, MAX_AMOUNT as i64] {
            let result = create(
                &f.store,
                &f.storage,
                &f.author,
                form(vec![f.breakfast], vec![(f.flour, amount)]),
            )
            .await;
            assert!(result.is_ok(), "amount {amount} should be accepted");
        }
        for amount in [0, MAX_AMOUNT as i64 + 1] {
            let errors = field_errors(
                create(
                    &f.store,
                    &f.storage,
                    &f.author,
                    form(vec![f.breakfast], vec![(f.flour, amount)]),
                )
                .await,
            );
            assert!(errors.contains("ingredients"), "amount {amount} should fail");
        }
    }

    #[tokio::test]
    async fn duplicate_ingredients_are_rejected_without_writes() {
        let f = fixture().await;
        let errors = field_errors(
            create(
                &f.store,
                &f.storage,
                &f.author,
                form(vec![f.breakfast], vec![(f.flour, 100), (f.flour, 200)]),
            )
            .await,
        );
        assert!(errors.contains("ingredients"));

        let (rows, total) = f
            .store
            .fetch_recipes(&RecipeFilter {
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(rows.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn every_problem_is_reported_at_once() {
        let f = fixture().await;
        let errors = field_errors(
            create(
                &f.store,
                &f.storage,
                &f.author,
                RecipeForm {
                    name: Some("  ".into()),
                    cooking_time: Some(0),
                    tags: Some(vec![f.breakfast, f.breakfast, 999]),
                    ingredients: Some(vec![]),
                    ..Default::default()
                },
            )
            .await,
        );
        for field in ["name", "text", "cooking_time", "image", "tags", "ingredients"] {
            assert!(errors.contains(field), "missing error for {field}");
        }
        assert_eq!(errors.messages("tags").len(), 2);
    }

    #[tokio::test]
    async fn replace_swaps_the_full_association_sets() {
        let f = fixture().await;
        let id = create(
            &f.store,
            &f.storage,
            &f.author,
            form(vec![f.breakfast], vec![(f.flour, 100), (f.milk, 200)]),
        )
        .await
        .unwrap();
        let before = f.store.get_recipe(id).await.unwrap().unwrap();

        let mut update = form(vec![f.dinner], vec![(f.eggs, 3)]);
        update.image = None;
        update.name = Some("Omelette".into());
        replace(&f.store, &f.storage, &f.author, id, update)
            .await
            .unwrap();

        let aggregate = load_aggregate(&f.store, id).await.unwrap().unwrap();
        assert_eq!(aggregate.recipe.name, "Omelette");
        assert_eq!(aggregate.recipe.image, before.image);
        assert_eq!(aggregate.recipe.pub_date, before.pub_date);
        let tags: Vec<Id> = aggregate.tags.iter().map(|t| t.id).collect();
        assert_eq!(tags, vec![f.dinner]);
        let parts: Vec<(Id, i32)> = aggregate
            .parts
            .iter()
            .map(|p| (p.ingredient_id, p.amount))
            .collect();
        assert_eq!(parts, vec![(f.eggs, 3)]);
    }

    #[tokio::test]
    async fn replace_with_new_image_drops_the_old_file() {
        let f = fixture().await;
        let id = create(
            &f.store,
            &f.storage,
            &f.author,
            form(vec![f.breakfast], vec![(f.flour, 100)]),
        )
        .await
        .unwrap();
        let old = f.store.get_recipe(id).await.unwrap().unwrap().image;
        assert!(f.storage.contains(&old).await);

        replace(
            &f.store,
            &f.storage,
            &f.author,
            id,
            form(vec![f.breakfast], vec![(f.flour, 100)]),
        )
        .await
        .unwrap();

        let new = f.store.get_recipe(id).await.unwrap().unwrap().image;
        assert_ne!(old, new);
        assert!(!f.storage.contains(&old).await);
        assert!(f.storage.contains(&new).await);
    }

    #[tokio::test]
    async fn only_the_author_or_an_admin_may_mutate() {
        let f = fixture().await;
        let id = create(
            &f.store,
            &f.storage,
            &f.author,
            form(vec![f.breakfast], vec![(f.flour, 100)]),
        )
        .await
        .unwrap();

        assert!(matches!(
            get_recipe_mut(&f.store, &f.other, id).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            delete(&f.store, &f.storage, &f.other, id).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            get_recipe_mut(&f.store, &f.author, 999).await,
            Err(Error::NotFound(_))
        ));

        delete(&f.store, &f.storage, &f.admin, id).await.unwrap();
        assert!(f.store.get_recipe(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_tags_and_relations() {
        let f = fixture().await;
        let first = create(
            &f.store,
            &f.storage,
            &f.author,
            form(vec![f.breakfast], vec![(f.flour, 100)]),
        )
        .await
        .unwrap();
        let second = create(
            &f.store,
            &f.storage,
            &f.other,
            form(vec![f.dinner], vec![(f.milk, 100)]),
        )
        .await
        .unwrap();
        f.store
            .insert_relation(RelationKind::Favorite, f.author.user_id, second)
            .await
            .unwrap();

        let viewer = Identity::User(f.author.clone());
        let page = list(&f.store, &f.storage, &viewer, &RecipeListQuery::default())
            .await
            .unwrap();
        let ids: Vec<Id> = page.results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(page.results[0].is_favorited);

        let by_tag = RecipeListQuery {
            tags: Some("breakfast".into()),
            ..Default::default()
        };
        let page = list(&f.store, &f.storage, &viewer, &by_tag).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].id, first);

        let favorites = RecipeListQuery {
            is_favorited: Some(1),
            ..Default::default()
        };
        let page = list(&f.store, &f.storage, &viewer, &favorites)
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.results[0].id, second);

        let page = list(&f.store, &f.storage, &Identity::Anonymous, &favorites)
            .await
            .unwrap();
        assert_eq!(page.count, 2);
    }
}
