use std::{env, fmt::Display, str::FromStr};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: [u8; 4],
    pub port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    /// Caching is disabled when unset.
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub public_url: String,
    pub media_root: String,
    pub media_url: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Ok(Self {
            host: parse_host(&try_load::<String>("HOST", "0.0.0.0")?)?,
            port: try_load("PORT", "8000")?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: try_load("DATABASE_MAX_CONNECTIONS", "5")?,
            redis_url: var("REDIS_URL"),
            jwt_secret: required("JWT_SECRET")?,
            public_url: try_load::<String>("PUBLIC_URL", "http://localhost:8000")?
                .trim_end_matches('/')
                .to_owned(),
            media_root: try_load("MEDIA_ROOT", "media")?,
            media_url: try_load("MEDIA_URL", "/media")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    var(key).ok_or_else(|| {
        log::error!("Environment variable {key} not found");
        ConfigError::Missing(key)
    })
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            log::info!("{key} not set, using default: {default}");
            default.to_owned()
        })
        .parse()
        .map_err(|e: T::Err| {
            log::warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }
        })
}

fn parse_host(value: &str) -> Result<[u8; 4], ConfigError> {
    value
        .parse::<std::net::Ipv4Addr>()
        .map(|addr| addr.octets())
        .map_err(|e| ConfigError::Invalid {
            key: "HOST",
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_is_parsed_into_octets() {
        assert_eq!(parse_host("127.0.0.1").unwrap(), [127, 0, 0, 1]);
        assert!(parse_host("localhost").is_err());
    }
}
