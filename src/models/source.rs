//! Source-related data models.
//!
//! This module defines the type tags used to select an extractor backend and
//! the connection descriptor handed to it.

use crate::config::PoolOptions;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use url::Url;

/// Supported extractor backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[value(name = "postgres", alias = "postgresql")]
    Postgres,
    Cockroach,
    /// Includes MariaDB
    #[value(name = "mysql", alias = "mariadb")]
    MySql,
    Sqlite,
    /// Canonical JSON dump on disk
    Json,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        Self::Postgres,
        Self::Cockroach,
        Self::MySql,
        Self::Sqlite,
        Self::Json,
    ];

    /// Guess the backend from a connection descriptor.
    ///
    /// CockroachDB speaks the PostgreSQL protocol and cannot be told apart by
    /// URL, so it must be requested explicitly.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::Postgres)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySql)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::Sqlite)
        } else if lower.ends_with(".json") {
            Some(Self::Json)
        } else {
            None
        }
    }

    /// The short type tag, e.g. `postgres`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Cockroach => "cockroach",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Json => "json",
        }
    }

    /// Get the display name for this backend.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Postgres => "PostgreSQL",
            Self::Cockroach => "CockroachDB",
            Self::MySql => "MySQL",
            Self::Sqlite => "SQLite",
            Self::Json => "JSON",
        }
    }

    /// Whether the descriptor is a database URL (as opposed to a file path).
    pub fn uses_url(&self) -> bool {
        !matches!(self, Self::Json)
    }

    fn accepts_scheme(&self, scheme: &str) -> bool {
        match self {
            Self::Postgres | Self::Cockroach => {
                matches!(scheme, "postgres" | "postgresql")
            }
            Self::MySql => matches!(scheme, "mysql" | "mariadb"),
            Self::Sqlite => scheme == "sqlite",
            Self::Json => true,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "cockroach" | "cockroachdb" => Ok(Self::Cockroach),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlite" => Ok(Self::Sqlite),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown source '{}'", s)),
        }
    }
}

/// A backend tag plus its connection descriptor.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Contains sensitive data - never log
    pub connection_string: String,
    /// Connection pool configuration options.
    pub pool_options: PoolOptions,
}

impl SourceConfig {
    /// Pool option keys that we extract from URL query parameters.
    const POOL_OPTION_KEYS: &'static [&'static str] = &["max_connections", "acquire_timeout"];

    /// Build a source configuration from a tag and a descriptor.
    ///
    /// For database backends the descriptor must be a URL whose scheme matches
    /// the backend. `max_connections` and `acquire_timeout` query parameters are
    /// removed from the URL and override `defaults`.
    pub fn new(
        kind: SourceKind,
        connection_string: impl Into<String>,
        defaults: PoolOptions,
    ) -> Result<Self, SourceConfigError> {
        let connection_string = connection_string.into();
        if connection_string.trim().is_empty() {
            return Err(SourceConfigError::EmptyDescriptor(kind));
        }

        if !kind.uses_url() {
            return Ok(Self {
                kind,
                connection_string,
                pool_options: defaults,
            });
        }

        let mut url = Url::parse(&connection_string)
            .map_err(|e| SourceConfigError::InvalidUrl(e.to_string()))?;

        let scheme = url.scheme().to_lowercase();
        if !kind.accepts_scheme(&scheme) {
            return Err(SourceConfigError::SchemeMismatch { kind, scheme });
        }

        let mut opts = Self::extract_options(&mut url, Self::POOL_OPTION_KEYS);
        let pool_options = PoolOptions {
            max_connections: opts
                .remove("max_connections")
                .and_then(|v| v.parse().ok())
                .or(defaults.max_connections),
            acquire_timeout_secs: opts
                .remove("acquire_timeout")
                .and_then(|v| v.parse().ok())
                .or(defaults.acquire_timeout_secs),
        };
        pool_options
            .validate()
            .map_err(SourceConfigError::InvalidPoolOptions)?;

        Ok(Self {
            kind,
            connection_string: url.to_string(),
            pool_options,
        })
    }

    /// Extract our own options from URL query params, keeping others for the driver.
    fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
        let mut opts = HashMap::new();
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                let key_lower = k.to_ascii_lowercase();
                if keys.contains(&key_lower.as_str()) {
                    opts.insert(key_lower, v.into_owned());
                    None
                } else {
                    Some((k.into_owned(), v.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        opts
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        if let Ok(mut url) = Url::parse(&self.connection_string) {
            if url.password().is_some() && url.set_password(Some("****")).is_ok() {
                return url.to_string();
            }
        }
        self.connection_string.clone()
    }
}

/// Errors that can occur when creating a source configuration.
#[derive(Debug, thiserror::Error)]
pub enum SourceConfigError {
    #[error("Connection descriptor for {0} source cannot be empty")]
    EmptyDescriptor(SourceKind),

    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("URL scheme '{scheme}' cannot be used with the {kind} source")]
    SchemeMismatch { kind: SourceKind, scheme: String },

    #[error("Invalid pool options: {0}")]
    InvalidPoolOptions(String),
}
