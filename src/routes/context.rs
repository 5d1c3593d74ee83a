use std::convert::Infallible;
use std::sync::Arc;

use redis::aio::MultiplexedConnection;
use warp::Filter;

use crate::{
    cache::cache::{invalidate_recipe_cache, CacheKeyType, RedisValue},
    error::Error,
    schema::Id,
    services::{links, recipes, recipes::RecipeAggregate},
    storage::ObjectStorage,
    store::RecipeStore,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn RecipeStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub cache: Option<MultiplexedConnection>,
    pub public_url: Arc<str>,
    pub jwt_secret: Arc<Vec<u8>>,
}

impl AppContext {
    pub fn new(
        store: Arc<dyn RecipeStore>,
        storage: Arc<dyn ObjectStorage>,
        cache: Option<MultiplexedConnection>,
        public_url: &str,
        jwt_secret: &[u8],
    ) -> Self {
        Self {
            store,
            storage,
            cache,
            public_url: public_url.trim_end_matches('/').into(),
            jwt_secret: Arc::new(jwt_secret.to_vec()),
        }
    }

    /// Recipe aggregate through the cache when one is configured.
    pub async fn recipe_aggregate(&self, recipe_id: Id) -> Result<Option<RecipeAggregate>, Error> {
        let Some(mut cache) = self.cache.clone() else {
            return recipes::load_aggregate(self.store.as_ref(), recipe_id).await;
        };

        let store = self.store.clone();
        let value = RedisValue::get_or_optional(
            CacheKeyType::Recipe.new(recipe_id),
            &mut cache,
            move || async move { recipes::load_aggregate(store.as_ref(), recipe_id).await },
        )
        .await?;

        Ok(value.map(|value| value.value))
    }

    /// Canonical URL behind a short code. Cached resolutions expire with the
    /// recipe cache.
    pub async fn resolve_short_link(&self, short_code: &str) -> Result<String, Error> {
        let url = match self.cache.clone() {
            Some(mut cache) => {
                let store = self.store.clone();
                let public_url = self.public_url.clone();
                let code = short_code.to_owned();

                RedisValue::get_or_optional(
                    CacheKeyType::ShortLink.new(short_code.to_owned()),
                    &mut cache,
                    move || async move { links::lookup(store.as_ref(), &public_url, &code).await },
                )
                .await?
                .map(|value| value.value)
            }
            None => links::lookup(self.store.as_ref(), &self.public_url, short_code).await?,
        };

        url.ok_or_else(|| Error::not_found("Short link"))
    }

    /// Drops every cached recipe aggregate after a write that can change one.
    pub async fn recipes_changed(&self) {
        if let Some(mut cache) = self.cache.clone() {
            if let Err(e) = invalidate_recipe_cache(&mut cache).await {
                log::error!("> Failed to invalidate recipe cache: {e}");
            }
        }
    }
}

pub fn with_context(
    context: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}
