//! Translation from the loaded snapshot into the shape listeners consume.
//!
//! Listeners only ever see [`ConnectionConfigMap`], so they never need to
//! depend on the configuration module's own types.

use crate::core::{ConfigSnapshot, Connection};
use config::Value;
use std::collections::{BTreeMap, HashMap};

/// Connection configuration as handed to listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Connection name
    pub connection: String,
    /// Full plugin reference
    pub plugin: String,
    /// Plugin name without registry path or version
    pub plugin_short_name: String,
    /// `"plugin"` or `"aggregator"`
    pub kind: String,
    /// Child connections of an aggregator
    pub child_connections: Vec<String>,
    /// `"enabled"` or `"disabled"`
    pub import_schema: String,
    /// Plugin specific options
    pub config: BTreeMap<String, Value>,
}

impl From<&Connection> for ConnectionConfig {
    fn from(connection: &Connection) -> Self {
        Self {
            connection: connection.name.clone(),
            plugin: connection.plugin.clone(),
            plugin_short_name: connection.plugin_short_name(),
            kind: connection.kind.as_str().to_string(),
            child_connections: connection.children.clone(),
            import_schema: connection.import_schema.as_str().to_string(),
            config: connection.options.clone(),
        }
    }
}

/// Connection name to connection configuration.
pub type ConnectionConfigMap = HashMap<String, ConnectionConfig>;

/// Build the listener map from a snapshot, one entry per connection.
///
/// Names are unique in a loaded snapshot; should a duplicate slip through,
/// the later declaration wins.
pub fn connection_config_map(snapshot: &ConfigSnapshot) -> ConnectionConfigMap {
    snapshot
        .connections
        .iter()
        .map(|c| (c.name.clone(), ConnectionConfig::from(c)))
        .collect()
}
