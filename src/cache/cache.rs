use std::future::Future;

use redis::{aio::MultiplexedConnection, AsyncCommands, FromRedisValue, ToRedisArgs};
use redis_macros::{FromRedisValue, ToRedisArgs};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Error};

const RECIPE_BIND_KEY: &str = "recipe-cache-key";

// Caching - keys

#[derive(Serialize, Clone, Debug)]
pub struct CacheKey<T: ToString + Serialize> {
    _value: T,
    _type: CacheKeyType,
}

impl<T: ToString + Serialize> CacheKey<T> {
    pub fn from(r#type: CacheKeyType, key: T) -> Self {
        Self {
            _value: key,
            _type: r#type,
        }
    }

    pub fn name(&self) -> String {
        match &self._type {
            CacheKeyType::Recipe => format!("recipe-{}", self._value.to_string()),
            CacheKeyType::ShortLink => format!("short-link-{}", self._value.to_string()),
        }
    }

    fn lifetime(&self) -> CacheLifetime {
        match &self._type {
            CacheKeyType::Recipe | CacheKeyType::ShortLink => CacheLifetime::BindRecipeCache,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum CacheKeyType {
    /// Recipe aggregates, dropped whenever any recipe changes.
    Recipe,
    /// Short code resolutions. Deleted along with their recipe.
    ShortLink,
}

impl CacheKeyType {
    pub fn new<T: ToString + Serialize>(self, key: T) -> CacheKey<T> {
        CacheKey::from(self, key)
    }
}

// Cache - wrappers

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CacheLifetime {
    BindRecipeCache,
}

impl CacheLifetime {
    pub async fn get_cache_bind(
        &self,
        cache: &mut MultiplexedConnection,
    ) -> Result<Option<String>, Error> {
        match self {
            CacheLifetime::BindRecipeCache => {
                get_cache_value::<&str, String>(RECIPE_BIND_KEY, cache).await
            }
        }
    }

    pub async fn validate_cache_bind(
        &self,
        bind: &Option<String>,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, Error> {
        Ok(bind == &self.get_cache_bind(cache).await?)
    }
}

#[derive(Serialize, Deserialize, FromRedisValue, ToRedisArgs, Clone, Debug)]
pub struct RedisValue<T: Serialize + Send + Sync + Clone> {
    pub value: T,
    _lifetime: CacheLifetime,
    _bind: Option<String>,
}

impl<T: Serialize + Send + Sync + Clone + for<'a> Deserialize<'a>> RedisValue<T> {
    async fn new(
        value: T,
        lifetime: CacheLifetime,
        cache: &mut MultiplexedConnection,
    ) -> Result<Self, Error> {
        let bind = lifetime.get_cache_bind(cache).await?;

        Ok(Self {
            value,
            _lifetime: lifetime,
            _bind: bind,
        })
    }

    async fn validate<K: ToString + Serialize>(
        &self,
        key: &CacheKey<K>,
        cache: &mut MultiplexedConnection,
    ) -> Result<bool, Error> {
        if self._lifetime != key.lifetime() {
            return Ok(false);
        }
        self._lifetime.validate_cache_bind(&self._bind, cache).await
    }

    /// Cache-aside read: a valid cached value wins, otherwise `callback` is
    /// awaited and a `Some` result is stored. `None` results are not cached.
    pub async fn get_or_optional<F, Fut, K>(
        key: CacheKey<K>,
        cache: &mut MultiplexedConnection,
        callback: F,
    ) -> Result<Option<RedisValue<T>>, Error>
    where
        K: ToString + Serialize + Clone + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Option<T>, Error>> + Send,
    {
        let name = key.name();
        let value = get_cache_value::<&str, RedisValue<T>>(&name, cache)
            .await
            .unwrap_or_else(|_| {
                let mut c = cache.clone();
                let k = name.clone();
                tokio::spawn(async move {
                    log::error!("> Failed to deserialize cached value. Deleting {}", &k);
                    if let Err(e) = delete_cache_value(k, &mut c).await {
                        log::error!("> Failed to delete cached value! {e}");
                    }
                });
                None
            });

        let value = match value {
            Some(value) => {
                log::trace!("> Found {name:?}");
                match value.validate(&key, cache).await? {
                    true => Some(value),
                    false => {
                        log::trace!("> Invalidated {name}");
                        None
                    }
                }
            }
            None => None,
        };

        match value {
            Some(value) => Ok(Some(value)),
            None => {
                log::trace!("> Fetching {name:?}");
                match callback().await? {
                    Some(value) => {
                        let value = RedisValue::new(value, key.lifetime(), cache).await?;

                        if let Err(e) =
                            set_cache_value::<&str, RedisValue<T>>(&name, value.clone(), cache)
                                .await
                        {
                            log::error!("{e:?}");
                        }

                        Ok(Some(value))
                    }
                    None => Ok(None),
                }
            }
        }
    }
}

/// Rotates the recipe bind key, which invalidates every cached recipe
/// aggregate at once.
pub async fn invalidate_recipe_cache(cache: &mut MultiplexedConnection) -> Result<(), Error> {
    let bind = uuid::Uuid::new_v4().to_string();
    set_cache_value(RECIPE_BIND_KEY, bind, cache).await?;
    log::trace!("> Rotated {RECIPE_BIND_KEY}");
    Ok(())
}

// Cache - raw handlers

pub async fn set_cache_value<K: ToRedisArgs + Send + Sync, V: ToRedisArgs + Send + Sync>(
    key: K,
    value: V,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache.set(key, value).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn delete_cache_value<K: ToRedisArgs + Send + Sync>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<(), Error> {
    let _: () = cache.del(key).await.map_err(CacheError::from)?;

    Ok(())
}

pub async fn get_cache_value<K: ToRedisArgs + Send + Sync, V: FromRedisValue>(
    key: K,
    cache: &mut MultiplexedConnection,
) -> Result<Option<V>, Error> {
    let value: Option<V> = cache.get(key).await.map_err(CacheError::from)?;

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_names_and_lifetimes_follow_the_key_type() {
        let recipe = CacheKeyType::Recipe.new(12);
        assert_eq!(recipe.name(), "recipe-12");
        assert_eq!(recipe.lifetime(), CacheLifetime::BindRecipeCache);

        let link = CacheKeyType::ShortLink.new("abc123");
        assert_eq!(link.name(), "short-link-abc123");
        assert_eq!(link.lifetime(), CacheLifetime::BindRecipeCache);
    }

    #[test]
    fn short_links_are_dropped_with_recipe_writes() {
        // Rotating the recipe bind must also retire cached short code resolutions.
        let link = CacheKeyType::ShortLink.new("abc123".to_owned());
        let recipe = CacheKeyType::Recipe.new(7);
        assert_eq!(link.lifetime(), recipe.lifetime());
    }
}
