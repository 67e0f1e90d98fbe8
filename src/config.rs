//! Process settings read from the environment (and `.env` through [`Settings::load`]).
//!
//! | variable           | default          |
//! |--------------------|------------------|
//! | `ARMOR_BIND_ADDR`  | `127.0.0.1:3000` |
//! | `DATABASE_URL`     | unset: in-memory collections |
//! | `ARMOR_SCHEMA`     | `armor`          |
//! | `ARMOR_PAGE_SIZE`  | `50`             |
//! | `ARMOR_BODY_LIMIT` | `1048576` bytes  |

use crate::error::ConfigError;
use crate::model::DEFAULT_PAGE_SIZE;
use crate::store::DEFAULT_SCHEMA;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub schema: String,
    pub default_page_size: u64,
    pub body_limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            schema: DEFAULT_SCHEMA.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

fn parsed<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw.filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e: T::Err| ConfigError::invalid(key, format!("{:?}: {}", v, e))),
    }
}

/// Unquoted PostgreSQL identifier: letter or underscore, then letters, digits, underscores.
fn valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= 63
}

impl Settings {
    /// Loads `.env` when present, then reads the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let schema = lookup("ARMOR_SCHEMA")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.schema);
        if !valid_identifier(&schema) {
            return Err(ConfigError::invalid("ARMOR_SCHEMA", format!("{:?} is not a valid identifier", schema)));
        }
        let default_page_size = parsed("ARMOR_PAGE_SIZE", lookup("ARMOR_PAGE_SIZE"), defaults.default_page_size)?;
        if default_page_size == 0 {
            return Err(ConfigError::invalid("ARMOR_PAGE_SIZE", "must be positive"));
        }
        Ok(Self {
            bind_addr: parsed("ARMOR_BIND_ADDR", lookup("ARMOR_BIND_ADDR"), defaults.bind_addr)?,
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            schema,
            default_page_size,
            body_limit: parsed("ARMOR_BODY_LIMIT", lookup("ARMOR_BODY_LIMIT"), defaults.body_limit)?,
        })
    }
}
