use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub pagination: PaginationConfig,
    pub media: MediaConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub capacity: usize,
    pub index_ttl_secs: u64,
}

impl CacheConfig {
    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }
}

/// Page sizes for each listing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub index: usize,
    pub group: usize,
    pub profile: usize,
    pub follow: usize,
}

impl PaginationConfig {
    pub const DEFAULT_PAGE_SIZE: usize = 10;

    pub fn uniform(page_size: usize) -> Self {
        Self {
            index: page_size,
            group: page_size,
            profile: page_size,
            follow: page_size,
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        for (context, size) in [
            ("index", self.index),
            ("group", self.group),
            ("profile", self.profile),
            ("follow", self.follow),
        ] {
            if size == 0 {
                return Err(AppError::ConfigurationError(format!(
                    "page size for {} must be positive",
                    context
                )));
            }
        }
        Ok(())
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self::uniform(Self::DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Token accepted in `Authorization: System <token>`. Admin routes are
    /// unreachable when unset.
    pub admin_token: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let page_size = parse_var("POSTS_PER_PAGE", PaginationConfig::DEFAULT_PAGE_SIZE);
        let pagination = PaginationConfig {
            index: parse_var("INDEX_PAGE_SIZE", page_size),
            group: parse_var("GROUP_PAGE_SIZE", page_size),
            profile: parse_var("PROFILE_PAGE_SIZE", page_size),
            follow: parse_var("FOLLOW_PAGE_SIZE", page_size),
        };
        pagination.validate()?;

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite:data/yatube.db".to_string()),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000),
            },
            cache: CacheConfig {
                capacity: parse_var("CACHE_CAPACITY", 1000),
                index_ttl_secs: parse_var("INDEX_CACHE_TTL_SECS", 20),
            },
            pagination,
            media: MediaConfig {
                root: env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".to_string()),
            },
            auth: AuthConfig {
                admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            },
        })
    }

    /// Configuration for tests and local tooling: in-memory database,
    /// default page sizes, a fixed admin token.
    pub fn in_memory(media_root: &str) -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite::memory:".to_string(),
            },
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            cache: CacheConfig {
                capacity: 100,
                index_ttl_secs: 20,
            },
            pagination: PaginationConfig::default(),
            media: MediaConfig {
                root: media_root.to_string(),
            },
            auth: AuthConfig {
                admin_token: Some("test-admin".to_string()),
            },
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {} value {:?}: {}, using default {}", key, raw, e, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_page_size_rejected() {
        let mut pagination = PaginationConfig::default();
        pagination.follow = 0;
        assert!(matches!(
            pagination.validate(),
            Err(AppError::ConfigurationError(_))
        ));
        assert!(PaginationConfig::uniform(3).validate().is_ok());
    }

    #[test]
    fn test_server_address() {
        let config = Config::in_memory("media");
        assert_eq!(config.server_address(), "127.0.0.1:0");
        assert_eq!(config.cache.index_ttl(), Duration::from_secs(20));
    }
}
