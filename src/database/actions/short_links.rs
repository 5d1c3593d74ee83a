use sqlx::{Pool, Postgres};

use crate::{
    error::{Error, QueryError},
    schema::{Id, ShortLink},
};

pub async fn find_short_link(
    short_code: &str,
    pool: &Pool<Postgres>,
) -> Result<Option<ShortLink>, Error> {
    let link: Option<ShortLink> =
        sqlx::query_as("SELECT short_code, recipe_id FROM short_links WHERE short_code = $1")
            .bind(short_code)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(link)
}

pub async fn find_recipe_short_link(
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<Option<ShortLink>, Error> {
    let link: Option<ShortLink> =
        sqlx::query_as("SELECT short_code, recipe_id FROM short_links WHERE recipe_id = $1")
            .bind(recipe_id)
            .fetch_optional(pool)
            .await
            .map_err(QueryError::from)?;

    Ok(link)
}

/// `false` when either the code or the recipe already has a link.
pub async fn insert_short_link(
    short_code: &str,
    recipe_id: Id,
    pool: &Pool<Postgres>,
) -> Result<bool, Error> {
    let result = sqlx::query(
        "INSERT INTO short_links (short_code, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
    )
    .bind(short_code)
    .bind(recipe_id)
    .execute(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(result.rows_affected() > 0)
}
