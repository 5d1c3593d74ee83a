use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::error::Error;

use super::{
    schema::{
        CartPart, Id, Ingredient, Recipe, RecipeDraft, RecipeFilter, RecipePart, RelationKind,
        ShortLink, Tag, User,
    },
    store::RecipeStore,
};

pub mod ingredients;
pub mod recipes;
pub mod relations;
pub mod short_links;
pub mod tags;
pub mod users;

pub use ingredients::*;
pub use recipes::*;
pub use relations::*;
pub use short_links::*;
pub use tags::*;
pub use users::*;

/// `RecipeStore` over a Postgres pool. Unique and check constraints live in
/// `migrations/0001_initial.sql`.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecipeStore for PgStore {
    async fn list_ingredients(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>, Error> {
        list_ingredients(name_prefix, &self.pool).await
    }

    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, Error> {
        get_ingredient(id, &self.pool).await
    }

    async fn existing_ingredient_ids(&self, ids: &[Id]) -> Result<HashSet<Id>, Error> {
        existing_ingredient_ids(ids, &self.pool).await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, Error> {
        list_tags(&self.pool).await
    }

    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, Error> {
        get_tag(id, &self.pool).await
    }

    async fn existing_tag_ids(&self, ids: &[Id]) -> Result<HashSet<Id>, Error> {
        existing_tag_ids(ids, &self.pool).await
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>, Error> {
        get_user_by_id(id, &self.pool).await
    }

    async fn set_user_avatar(&self, id: Id, avatar: Option<&str>) -> Result<(), Error> {
        set_user_avatar(id, avatar, &self.pool).await
    }

    async fn insert_recipe(&self, author_id: Id, draft: &RecipeDraft) -> Result<Id, Error> {
        create_recipe(author_id, draft, &self.pool).await
    }

    async fn replace_recipe(&self, id: Id, draft: &RecipeDraft) -> Result<(), Error> {
        replace_recipe(id, draft, &self.pool).await
    }

    async fn delete_recipe(&self, id: Id) -> Result<bool, Error> {
        delete_recipe(id, &self.pool).await
    }

    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, Error> {
        get_recipe(id, &self.pool).await
    }

    async fn list_recipe_parts(&self, recipe_id: Id) -> Result<Vec<RecipePart>, Error> {
        list_recipe_parts(recipe_id, &self.pool).await
    }

    async fn list_recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error> {
        list_recipe_tags(recipe_id, &self.pool).await
    }

    async fn fetch_recipes(&self, filter: &RecipeFilter) -> Result<(Vec<Recipe>, i64), Error> {
        fetch_recipes(filter, &self.pool).await
    }

    async fn list_author_recipes(
        &self,
        author_id: Id,
        limit: Option<usize>,
    ) -> Result<Vec<Recipe>, Error> {
        list_author_recipes(author_id, limit, &self.pool).await
    }

    async fn count_author_recipes(&self, author_id: Id) -> Result<i64, Error> {
        count_author_recipes(author_id, &self.pool).await
    }

    async fn relation_exists(
        &self,
        kind: RelationKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        relation_exists(kind, user_id, recipe_id, &self.pool).await
    }

    async fn insert_relation(
        &self,
        kind: RelationKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        insert_relation(kind, user_id, recipe_id, &self.pool).await
    }

    async fn delete_relation(
        &self,
        kind: RelationKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, Error> {
        delete_relation(kind, user_id, recipe_id, &self.pool).await
    }

    async fn list_cart_parts(&self, user_id: Id) -> Result<Vec<CartPart>, Error> {
        list_cart_parts(user_id, &self.pool).await
    }

    async fn subscription_exists(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        subscription_exists(user_id, following_id, &self.pool).await
    }

    async fn insert_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        insert_subscription(user_id, following_id, &self.pool).await
    }

    async fn delete_subscription(&self, user_id: Id, following_id: Id) -> Result<bool, Error> {
        delete_subscription(user_id, following_id, &self.pool).await
    }

    async fn list_subscriptions(
        &self,
        user_id: Id,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<User>, i64), Error> {
        list_subscriptions(user_id, limit, offset, &self.pool).await
    }

    async fn find_short_link(&self, short_code: &str) -> Result<Option<ShortLink>, Error> {
        find_short_link(short_code, &self.pool).await
    }

    async fn find_recipe_short_link(&self, recipe_id: Id) -> Result<Option<ShortLink>, Error> {
        find_recipe_short_link(recipe_id, &self.pool).await
    }

    async fn insert_short_link(&self, short_code: &str, recipe_id: Id) -> Result<bool, Error> {
        insert_short_link(short_code, recipe_id, &self.pool).await
    }
}
