//! Connection configuration validation support.

use crate::core::snapshot::{ConfigSnapshot, Connection, ConnectionKind};
use crate::error::ValidationError;

/// Trait for configuration validation.
///
/// A loaded snapshot is validated before anything is published; a failure
/// aborts the reload attempt exactly like a load failure.
///
/// # Examples
///
/// ```rust
/// use hotswap_connections::core::{ConfigSnapshot, Connection, Validate};
///
/// let snapshot = ConfigSnapshot::new(vec![Connection::new("aws", "acme/aws")]);
/// assert!(snapshot.validate().is_ok());
///
/// let bad = ConfigSnapshot::new(vec![Connection::new("aws prod", "acme/aws")]);
/// assert!(bad.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Connection names must be usable as schema names.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

impl Validate for Connection {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if !valid_name(&self.name) {
            errors.push(ValidationError::invalid_field(
                format!("connection.{}", self.name),
                "name must be non-empty, start with a letter or '_' and contain only [A-Za-z0-9_]",
            ));
        }

        if self.plugin.trim().is_empty() {
            errors.push(ValidationError::invalid_field(
                format!("connection.{}.plugin", self.name),
                "must not be empty",
            ));
        }

        match self.kind {
            ConnectionKind::Aggregator if self.children.is_empty() => {
                errors.push(ValidationError::invalid_field(
                    format!("connection.{}.connections", self.name),
                    "aggregator must list at least one connection",
                ));
            }
            ConnectionKind::Plugin if !self.children.is_empty() => {
                errors.push(ValidationError::invalid_field(
                    format!("connection.{}.connections", self.name),
                    "only aggregators may list connections",
                ));
            }
            _ => {}
        }

        ValidationError::from_list(errors).map_or(Ok(()), Err)
    }
}

impl Validate for ConfigSnapshot {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        for connection in &self.connections {
            if let Err(e) = connection.validate() {
                errors.push(e);
            }

            // Wildcard children are resolved downstream.
            for child in &connection.children {
                if child.contains('*') {
                    continue;
                }
                if child == &connection.name {
                    errors.push(ValidationError::invalid_field(
                        format!("connection.{}.connections", connection.name),
                        "aggregator cannot contain itself",
                    ));
                } else if self.connection(child).is_none() {
                    errors.push(ValidationError::invalid_field(
                        format!("connection.{}.connections", connection.name),
                        format!("unknown connection '{}'", child),
                    ));
                }
            }
        }

        ValidationError::from_list(errors).map_or(Ok(()), Err)
    }
}
