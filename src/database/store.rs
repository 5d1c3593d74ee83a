use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Error;

use super::schema::{
    CartPart, Id, Ingredient, Recipe, RecipeDraft, RecipeFilter, RecipePart, RelationKind,
    ShortLink, Tag, User,
};

/// Persistence seam of the core.
///
/// Implementations must enforce the same unique constraints as the Postgres
/// schema: `(recipe, ingredient)` lines, `(user, recipe)` per relation kind,
/// `(user, following)` subscriptions, short codes and one short link per
/// recipe. Inserts that hit one of these constraints report `false` instead of
/// failing, so callers can map them to a domain error.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn list_ingredients(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>, Error>;
    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, Error>;
    async fn existing_ingredient_ids(&self, ids: &[Id]) -> Result<HashSet<Id>, Error>;

    async fn list_tags(&self) -> Result<Vec<Tag>, Error>;
    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, Error>;
    async fn existing_tag_ids(&self, ids: &[Id]) -> Result<HashSet<Id>, Error>;

    async fn get_user(&self, id: Id) -> Result<Option<User>, Error>;
    async fn set_user_avatar(&self, id: Id, avatar: Option<&str>) -> Result<(), Error>;

    /// Inserts the recipe row, its ingredient lines and tag links atomically.
    async fn insert_recipe(&self, author_id: Id, draft: &RecipeDraft) -> Result<Id, Error>;
    /// Updates the recipe columns and replaces the full ingredient and tag
    /// sets atomically.
    async fn replace_recipe(&self, id: Id, draft: &RecipeDraft) -> Result<(), Error>;
    async fn delete_recipe(&self, id: Id) -> Result<bool, Error>;
    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, Error>;
    async fn list_recipe_parts(&self, recipe_id: Id) -> Result<Vec<RecipePart>, Error>;
    async fn list_recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error>;
    /// Newest first. Returns the page and the total row count.
    async fn fetch_recipes(&self, filter: &RecipeFilter) -> Result<(Vec<Recipe>, i64), Error>;
    async fn list_author_recipes(
        &self,
        author_id: Id,
        limit: Option<usize>,
    ) -> Result<Vec<Recipe>, Error>;
    async fn count_author_recipes(&self, author_id: Id) -> Result<i64, Error>;

    async fn relation_exists(&self, kind: RelationKind, user_id: Id, recipe_id: Id)
        -> Result<bool, Error>;
    async fn insert_relation(&self, kind: RelationKind, user_id: Id, recipe_id: Id)
        -> Result<bool, Error>;
    async fn delete_relation(&self, kind: RelationKind, user_id: Id, recipe_id: Id)
        -> Result<bool, Error>;
    async fn list_cart_parts(&self, user_id: Id) -> Result<Vec<CartPart>, Error>;

    async fn subscription_exists(&self, user_id: Id, following_id: Id) -> Result<bool, Error>;
    async fn insert_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error>;
    async fn delete_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error>;
    /// Followed users ordered by username. Returns the page and the total.
    async fn list_subscriptions(
        &self,
        user_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error>;

    async fn find_short_link(&self, short_code: &str) -> Result<Option<ShortLink>, Error>;
    async fn find_recipe_short_link(&self, recipe_id: Id) -> Result<Option<ShortLink>, Error>;
    async fn insert_short_link(&self, short_code: &str, recipe_id: Id) -> Result<bool, Error>;
}
