//! In-memory connection configuration produced by one load.

use config::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Whether a connection talks to a plugin directly or aggregates others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    /// A plain plugin connection.
    #[default]
    Plugin,
    /// An aggregator over child connections.
    Aggregator,
}

impl ConnectionKind {
    /// Parse the `type` field of a connection table.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "" | "plugin" => Some(Self::Plugin),
            "aggregator" => Some(Self::Aggregator),
            _ => None,
        }
    }

    /// The string used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plugin => "plugin",
            Self::Aggregator => "aggregator",
        }
    }
}

/// Whether the schema of a connection should be imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportSchema {
    /// Import the schema (default).
    #[default]
    Enabled,
    /// Do not import the schema.
    Disabled,
}

impl ImportSchema {
    /// The string used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

/// A single connection as declared in a configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    /// Unique connection name
    pub name: String,
    /// Plugin reference, e.g. `hub.example.com/plugins/acme/aws@latest`
    pub plugin: String,
    /// Plugin or aggregator
    pub kind: ConnectionKind,
    /// Child connection names for aggregators
    pub children: Vec<String>,
    /// Schema import mode
    pub import_schema: ImportSchema,
    /// Plugin specific options
    pub options: BTreeMap<String, Value>,
    /// File the connection was declared in
    pub source: PathBuf,
}

impl Connection {
    /// Create a plugin connection with no options.
    pub fn new(name: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin: plugin.into(),
            kind: ConnectionKind::Plugin,
            children: Vec::new(),
            import_schema: ImportSchema::Enabled,
            options: BTreeMap::new(),
            source: PathBuf::new(),
        }
    }

    /// Set an option value.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Turn this connection into an aggregator over the given children.
    pub fn with_children<I, S>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kind = ConnectionKind::Aggregator;
        self.children = children.into_iter().map(Into::into).collect();
        self
    }

    /// Short plugin name: last path segment with any `@version` removed.
    pub fn plugin_short_name(&self) -> String {
        let base = self.plugin.rsplit('/').next().unwrap_or(&self.plugin);
        base.split('@').next().unwrap_or(base).to_string()
    }
}

/// The fully parsed configuration produced by one load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    /// Connections in file order, then by name
    pub connections: Vec<Connection>,
    /// Flattened non-connection settings, keyed by dotted path
    pub settings: BTreeMap<String, Value>,
    /// Files that contributed to this snapshot
    pub files: Vec<PathBuf>,
}

impl ConfigSnapshot {
    /// Create a snapshot from a list of connections.
    pub fn new(connections: Vec<Connection>) -> Self {
        Self {
            connections,
            ..Self::default()
        }
    }

    /// Add a flattened setting.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Look up a connection by name.
    pub fn connection(&self, name: &str) -> Option<&Connection> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Connection names in load order.
    pub fn connection_names(&self) -> Vec<&str> {
        self.connections.iter().map(|c| c.name.as_str()).collect()
    }

    /// Key/value settings to install as process-wide defaults.
    pub fn config_map(&self) -> HashMap<String, Value> {
        self.settings
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Flatten a nested table into dotted keys, appending to `out`.
///
/// Arrays and scalars are leaves.
pub(crate) fn flatten_into(prefix: &str, value: Value, out: &mut BTreeMap<String, Value>) {
    match value.kind {
        ValueKind::Table(table) => {
            for (key, child) in table {
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(&path, child, out);
            }
        }
        _ => {
            out.insert(prefix.to_string(), value);
        }
    }
}
