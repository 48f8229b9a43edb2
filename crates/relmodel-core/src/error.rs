//! Error types for relmodel operations.

use std::fmt;

/// The primary error type for all relmodel operations.
#[derive(Debug)]
pub enum Error {
    /// Relation or model declaration errors (caller bugs, never retried)
    Config(ConfigError),
    /// Errors raised by the storage collaborator, passed through unchanged
    Query(QueryError),
    /// Type conversion errors
    Type(TypeError),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct ConfigError {
    pub kind: ConfigErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The link of a relation is missing, empty or malformed
    InvalidLink,
    /// A model has no relation with the requested name
    UnknownRelation,
    /// A model kind is not present in the registry
    UnknownModel,
    /// An eager-loading path could not be parsed
    InvalidRelationPath,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Target table or column not found
    NotFound,
    /// The storage backend is unavailable
    Unavailable,
    /// Statement timeout
    Timeout,
    /// Other storage error
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl ConfigError {
    /// Create a configuration error of the given kind.
    pub fn new(kind: ConfigErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }
}

impl QueryError {
    /// Create a storage error of the given kind.
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }
}

impl Error {
    /// Build an `InvalidLink` configuration error.
    pub fn invalid_link(message: impl Into<String>) -> Self {
        Error::Config(ConfigError::new(ConfigErrorKind::InvalidLink, message))
    }

    /// Build an `UnknownRelation` configuration error.
    pub fn unknown_relation(model: &str, relation: &str) -> Self {
        Error::Config(ConfigError::new(
            ConfigErrorKind::UnknownRelation,
            format!("{} has no relation named \"{}\"", model, relation),
        ))
    }

    /// Build an `UnknownModel` configuration error.
    pub fn unknown_model(model: &str) -> Self {
        Error::Config(ConfigError::new(
            ConfigErrorKind::UnknownModel,
            format!("model \"{}\" is not registered", model),
        ))
    }

    /// Is this a configuration (declaration) error?
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// The configuration error kind, if this is a configuration error.
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Error::Config(c) => Some(c.kind),
            _ => None,
        }
    }

    /// Is this a retryable storage error (timeouts, unavailable backend)?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Query(q) => matches!(q.kind, QueryErrorKind::Timeout | QueryErrorKind::Unavailable),
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e.message),
            Error::Type(e) => {
                if let Some(col) = &e.column {
                    write!(
                        f,
                        "Type error in column '{}': expected {}, found {}",
                        col, e.expected, e.actual
                    )
                } else {
                    write!(f, "Type error: expected {}, found {}", e.expected, e.actual)
                }
            }
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.actual)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

/// Result type alias for relmodel operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_relation_message() {
        let err = Error::unknown_relation("customer", "Orders");
        assert_eq!(
            err.to_string(),
            "Configuration error: customer has no relation named \"Orders\""
        );
        assert_eq!(err.config_kind(), Some(ConfigErrorKind::UnknownRelation));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_query_error_is_retryable() {
        let timeout = Error::from(QueryError::new(QueryErrorKind::Timeout, "slow"));
        assert!(timeout.is_retryable());
        let missing = Error::from(QueryError::new(QueryErrorKind::NotFound, "no table"));
        assert!(!missing.is_retryable());
        assert!(!Error::invalid_link("empty").is_retryable());
    }

    #[test]
    fn test_type_error_display_with_column() {
        let err = Error::Type(TypeError {
            expected: "BIGINT",
            actual: "TEXT".to_string(),
            column: Some("id".to_string()),
        });
        assert_eq!(
            err.to_string(),
            "Type error in column 'id': expected BIGINT, found TEXT"
        );
    }

    #[test]
    fn test_source_is_forwarded() {
        use std::error::Error as _;

        let mut inner = QueryError::new(QueryErrorKind::Database, "boom");
        inner.source = Some(Box::new(std::io::Error::other("disk")));
        let err = Error::Query(inner);
        assert_eq!(err.source().map(ToString::to_string), Some("disk".to_string()));
    }
}
