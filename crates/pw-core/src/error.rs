//! Error types shared by the Personal Weather crates.
//!
//! `pw-weather` and `pw-services` keep their own error enums and convert into
//! [`AppError`] for the CLI, which prints `user_message()`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Location not tracked (delete/update target absent).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Temperature or geocoding provider failed.
    #[error("Weather provider error: {0}")]
    Provider(String),

    /// Rejected user input (empty city, duplicate location, bad index).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// One line for the terminal, free of internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Database(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Io(_) => "A file could not be read or written.",
            AppError::NotFound(_) => "That location is not being tracked.",
            AppError::Provider(_) => "No weather data available right now. Try again later.",
            AppError::InvalidInput(_) => "Check the city name and options, then retry.",
            AppError::Other(_) => "Something went wrong. Run with RUST_LOG=debug for details.",
        }
    }
}

/// Failures talking to the weather service over HTTP.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Weather service unreachable: {0}")]
    Unreachable(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Unreadable response: {0}")]
    BadResponse(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::Unreachable(_) => "Could not reach the weather service. Are you online?",
            NetworkError::Timeout => "The weather service did not answer in time.",
            NetworkError::Upstream { status, .. } if *status >= 500 => {
                "The weather service is having trouble. Try again later."
            }
            NetworkError::Upstream { .. } => "The weather service rejected the request.",
            NetworkError::BadResponse(_) => "The weather service sent something unexpected.",
        }
    }
}

/// Location database failures.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Cannot open location database: {0}")]
    Unavailable(String),

    #[error("Location query failed: {0}")]
    Query(String),

    #[error("Location database is corrupt: {0}")]
    Corrupt(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::Unavailable(_) => {
                "Unable to open the location database. Check database.path."
            }
            DatabaseError::Query(_) => "Reading or writing saved locations failed.",
            DatabaseError::Corrupt(_) => {
                "The location database may be corrupted. Consider deleting it."
            }
        }
    }
}

/// Problems with the TOML config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Config file is not valid TOML: {0}")]
    Malformed(String),

    #[error("Cannot determine {0}")]
    Missing(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Some settings are invalid. Fix config.toml and retry.",
            ConfigError::Malformed(_) => "config.toml could not be parsed.",
            ConfigError::Missing(_) => "No config location available; pass --config.",
        }
    }
}

/// Classify a reqwest failure.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        let detail = self.to_string();
        match self.status() {
            _ if self.is_timeout() => NetworkError::Timeout,
            Some(status) => NetworkError::Upstream {
                status: status.as_u16(),
                message: detail,
            },
            None if self.is_decode() => NetworkError::BadResponse(detail),
            None => NetworkError::Unreachable(detail),
        }
    }
}

/// Classify a rusqlite failure.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                DatabaseError::Corrupt(self.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen =>
            {
                DatabaseError::Unavailable(self.to_string())
            }
            _ => DatabaseError::Query(self.to_string()),
        }
    }
}
