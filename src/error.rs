use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("name '{name}' is not allowed: {reason}")]
    NameNotAllowed { name: String, reason: String },

    #[error("owner has reached maximum limit of repositories [limit: {limit}]")]
    QuotaExceeded { limit: i64 },

    #[error("{step}: {message}")]
    Operation { step: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Wraps a failed git or filesystem step, keeping the name of the step.
    pub fn operation(step: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Operation {
            step: step.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Name of the failing step for wrapped operation errors.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Operation { step, .. } => Some(step),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
