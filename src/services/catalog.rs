use crate::{
    error::Error,
    form::IngredientQuery,
    schema::{Id, Ingredient, Tag},
    store::RecipeStore,
};

/// Case-insensitive name prefix search.
pub async fn list_ingredients(
    store: &dyn RecipeStore,
    query: &IngredientQuery,
) -> Result<Vec<Ingredient>, Error> {
    let prefix = query.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
    store.list_ingredients(prefix).await
}

pub async fn get_ingredient(store: &dyn RecipeStore, id: Id) -> Result<Ingredient, Error> {
    store
        .get_ingredient(id)
        .await?
        .ok_or_else(|| Error::not_found("Ingredient"))
}

pub async fn list_tags(store: &dyn RecipeStore) -> Result<Vec<Tag>, Error> {
    store.list_tags().await
}

pub async fn get_tag(store: &dyn RecipeStore, id: Id) -> Result<Tag, Error> {
    store
        .get_tag(id)
        .await?
        .ok_or_else(|| Error::not_found("Tag"))
}
