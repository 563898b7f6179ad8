//! Error types for hotswap-connections.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for hotswap-connections operations.
pub type Result<T> = std::result::Result<T, ReloadError>;

/// Errors that can occur while watching and reloading connection configuration.
///
/// Construction errors are returned to the caller. Everything raised on the
/// event path is logged by the orchestrator and never leaves it.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// Failed to load configuration from the configuration directory.
    #[error("Failed to load connection config: {0}")]
    LoadError(String),

    /// A configuration file could not be parsed.
    #[error("Failed to parse {path}: {reason}")]
    ParseError {
        /// The file that failed to parse
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// The same connection name was declared more than once.
    #[error("Duplicate connection '{name}' declared in {first} and {second}")]
    DuplicateConnection {
        /// The connection name
        name: String,
        /// File holding the first declaration
        first: PathBuf,
        /// File holding the second declaration
        second: PathBuf,
    },

    /// The loaded configuration failed validation.
    #[error("Connection config validation failed: {0}")]
    ValidationError(String),

    /// File watching failed to initialize or was used incorrectly.
    #[error("File watching error: {0}")]
    WatchError(String),

    /// IO error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The downstream client could not be created.
    #[error("Failed to create client: {0}")]
    ClientCreation(String),

    /// Refreshing connections and search paths failed.
    #[error("Failed to refresh connections: {0}")]
    Refresh(String),

    /// The connection listener panicked while handling a new config map.
    #[error("Connection listener panicked: {0}")]
    ListenerPanicked(String),

    /// A reload attempt did not finish in time.
    #[error("Reload timed out after {0:?}")]
    TimedOut(std::time::Duration),

    /// A required builder component was not supplied.
    #[error("Missing component: {0}")]
    MissingComponent(&'static str),

    /// Generic error for other cases.
    #[error("Reload error: {0}")]
    Other(String),
}

impl ReloadError {
    /// Short label for the pipeline stage this error belongs to.
    ///
    /// Used as a log field and as a metrics attribute.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::LoadError(_)
            | Self::ParseError { .. }
            | Self::DuplicateConnection { .. }
            | Self::IoError(_) => "load",
            Self::ValidationError(_) => "validate",
            Self::ClientCreation(_) => "client",
            Self::ListenerPanicked(_) => "listener",
            Self::Refresh(_) => "refresh",
            Self::TimedOut(_) => "timeout",
            Self::WatchError(_) => "watch",
            Self::MissingComponent(_) | Self::Other(_) => "other",
        }
    }
}

/// Validation error for connection configuration.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors into a single error, if there is any.
    pub fn from_list(mut errors: Vec<ValidationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ReloadError {
    fn from(err: ValidationError) -> Self {
        ReloadError::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(ReloadError::LoadError("x".into()).stage(), "load");
        assert_eq!(ReloadError::ClientCreation("x".into()).stage(), "client");
        assert_eq!(ReloadError::Refresh("x".into()).stage(), "refresh");
        assert_eq!(
            ReloadError::TimedOut(std::time::Duration::from_secs(1)).stage(),
            "timeout"
        );
    }

    #[test]
    fn test_from_list() {
        assert!(ValidationError::from_list(Vec::new()).is_none());

        let single = ValidationError::from_list(vec![ValidationError::custom("a")]).unwrap();
        assert!(matches!(single, ValidationError::Custom(_)));

        let many = ValidationError::from_list(vec![
            ValidationError::custom("a"),
            ValidationError::invalid_field("plugin", "must not be empty"),
        ])
        .unwrap();
        let rendered = many.to_string();
        assert!(rendered.contains("1. a"));
        assert!(rendered.contains("2. Field 'plugin' is invalid"));
    }

    #[test]
    fn test_validation_into_reload_error() {
        let err: ReloadError = ValidationError::invalid_field("name", "empty").into();
        assert!(matches!(err, ReloadError::ValidationError(_)));
        assert_eq!(err.stage(), "validate");
    }
}
