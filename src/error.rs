use std::fmt;
use thiserror::Error;

/// Stable failure kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Persistence => "persistence_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store accepted the statement but did not report the expected write.
    #[error("write to {entity} was not acknowledged")]
    NotAcknowledged { entity: &'static str },

    #[error("stored {entity} {id} is unreadable: {reason}")]
    CorruptRecord {
        entity: &'static str,
        id: String,
        reason: String,
    },
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::Database(_) | Error::NotAcknowledged { .. } | Error::CorruptRecord { .. } => {
                ErrorKind::Persistence
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_a_stable_kind() {
        assert_eq!(Error::not_found("comparison table", "x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::invalid("empty variants").kind(), ErrorKind::InvalidArgument);
        assert_eq!(
            Error::NotAcknowledged { entity: "evaluation row" }.kind(),
            ErrorKind::Persistence
        );
        assert_eq!(Error::Database(sqlx::Error::PoolClosed).kind(), ErrorKind::Persistence);
        assert_eq!(ErrorKind::Persistence.as_str(), "persistence_error");
    }

    #[test]
    fn not_found_message_names_entity_and_id() {
        let err = Error::not_found("evaluation row", "abc");
        assert_eq!(err.to_string(), "evaluation row not found: abc");
    }
}
