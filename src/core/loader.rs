//! Loading connection configuration from a directory of files.

use crate::core::snapshot::{ConfigSnapshot, Connection, ConnectionKind, ImportSchema, flatten_into};
use crate::error::{ReloadError, Result};
use crate::paths::CONFIG_EXTENSION;
use config::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Top-level key holding connection tables.
const CONNECTION_KEY: &str = "connection";

/// Something that can produce a fresh configuration snapshot.
///
/// The orchestrator calls `load` with no arguments on every reload attempt,
/// so implementations always read the full configuration from scratch.
pub trait ConfigLoader: Send + Sync {
    /// Read and parse the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be read or parsed, or if the
    /// configuration is inconsistent (e.g. duplicate connection names).
    fn load(&self) -> Result<ConfigSnapshot>;

    /// Get a human-readable name for this loader (for logging/debugging).
    fn name(&self) -> String {
        "custom".to_string()
    }
}

impl<F> ConfigLoader for F
where
    F: Fn() -> Result<ConfigSnapshot> + Send + Sync,
{
    fn load(&self) -> Result<ConfigSnapshot> {
        self()
    }

    fn name(&self) -> String {
        "fn".to_string()
    }
}

/// Syntax of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    /// TOML
    Toml,
    /// YAML
    Yaml,
    /// JSON
    Json,
}

impl FileFormat {
    /// Parse file contents into top-level keys, preserving key case.
    fn parse(self, contents: &str) -> std::result::Result<HashMap<String, Value>, String> {
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        match self {
            Self::Toml => toml::from_str(contents).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_str(contents).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_str(contents).map_err(|e| e.to_string()),
        }
    }
}

/// Map a file extension to its format.
pub fn format_for_extension(extension: &str) -> Option<FileFormat> {
    match extension {
        "toml" => Some(FileFormat::Toml),
        "yaml" | "yml" => Some(FileFormat::Yaml),
        "json" => Some(FileFormat::Json),
        _ => None,
    }
}

/// Loads every configuration file below a directory.
///
/// Files are matched by extension and read in path order. Each file may
/// declare connections under a top-level `connection` table; every other
/// top-level key is flattened into dotted settings. Keys keep the case they
/// were written in; only environment overrides are lowercased.
///
/// # Examples
///
/// ```rust,no_run
/// use hotswap_connections::core::{ConfigLoader, DirectoryLoader};
///
/// let loader = DirectoryLoader::new("/etc/myapp/config")
///     .with_extensions(["toml", "yaml"])
///     .with_env_overrides("MYAPP", "__");
/// let snapshot = loader.load()?;
/// println!("{} connections", snapshot.connections.len());
/// # Ok::<(), hotswap_connections::error::ReloadError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
    extensions: Vec<String>,
    recursive: bool,
    env_prefix: Option<String>,
    env_separator: Option<String>,
}

impl DirectoryLoader {
    /// Create a loader for a directory using the default extension.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extensions: vec![CONFIG_EXTENSION.to_string()],
            recursive: true,
            env_prefix: None,
            env_separator: None,
        }
    }

    /// Replace the set of file extensions to read.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether to descend into subdirectories (default: true).
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Layer environment variables over the file settings.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "APP")
    /// * `separator` - Separator for nested keys (e.g., "__" for APP_OPTIONS__PORT)
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = Some(separator.to_string());
        self
    }

    /// Directory this loader reads from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files that would be read right now, in load order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be walked.
    pub fn config_files(&self) -> Result<Vec<PathBuf>> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        let mut files = Vec::new();

        for entry in WalkDir::new(&self.dir).max_depth(max_depth) {
            let entry = entry.map_err(|e| {
                ReloadError::LoadError(format!(
                    "Failed to read config directory {}: {}",
                    self.dir.display(),
                    e
                ))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| self.extensions.iter().any(|e| e == ext));
            if matches {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    fn parse_file(&self, path: &Path) -> Result<HashMap<String, Value>> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let format = format_for_extension(extension).ok_or_else(|| ReloadError::ParseError {
            path: path.to_path_buf(),
            reason: format!(
                "Unsupported file extension: {}. Supported: .toml, .yaml, .yml, .json",
                extension
            ),
        })?;

        // Not through `config::Config`: its builder lowercases every key.
        let contents =
            std::fs::read_to_string(path).map_err(|e| parse_error(path, e.to_string()))?;
        format.parse(&contents).map_err(|reason| parse_error(path, reason))
    }

    /// Settings from environment variables, or from `source` in place of
    /// the process environment.
    fn env_settings(
        &self,
        source: Option<config::Map<String, String>>,
    ) -> Result<BTreeMap<String, Value>> {
        let mut settings = BTreeMap::new();
        let (Some(prefix), Some(separator)) = (&self.env_prefix, &self.env_separator) else {
            return Ok(settings);
        };

        let env = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(prefix)
                    .separator(separator)
                    .try_parsing(true)
                    .source(source),
            )
            .build()
            .and_then(|c| c.try_deserialize::<HashMap<String, Value>>())
            .map_err(|e| {
                ReloadError::LoadError(format!("Failed to load environment variables: {}", e))
            })?;

        for (key, value) in env {
            flatten_into(&key, value, &mut settings);
        }
        Ok(settings)
    }
}

impl ConfigLoader for DirectoryLoader {
    fn load(&self) -> Result<ConfigSnapshot> {
        if !self.dir.is_dir() {
            return Err(ReloadError::LoadError(format!(
                "Config directory not found: {}",
                self.dir.display()
            )));
        }

        let files = self.config_files()?;
        let mut snapshot = ConfigSnapshot::default();
        let mut declared: HashMap<String, PathBuf> = HashMap::new();

        for path in &files {
            let values = self.parse_file(path)?;

            for (key, value) in values {
                if key != CONNECTION_KEY {
                    flatten_into(&key, value, &mut snapshot.settings);
                    continue;
                }

                let mut connections = parse_connections(path, value)?;
                connections.sort_by(|a, b| a.name.cmp(&b.name));
                for connection in connections {
                    if let Some(first) = declared.get(&connection.name) {
                        return Err(ReloadError::DuplicateConnection {
                            name: connection.name,
                            first: first.clone(),
                            second: path.clone(),
                        });
                    }
                    declared.insert(connection.name.clone(), path.clone());
                    snapshot.connections.push(connection);
                }
            }
        }

        snapshot.settings.extend(self.env_settings(None)?);
        snapshot.files = files;

        tracing::debug!(
            dir = %self.dir.display(),
            files = snapshot.files.len(),
            connections = snapshot.connections.len(),
            "loaded connection config"
        );
        Ok(snapshot)
    }

    fn name(&self) -> String {
        format!("dir:{}", self.dir.display())
    }
}

fn parse_error(path: &Path, reason: impl Into<String>) -> ReloadError {
    ReloadError::ParseError {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn parse_connections(path: &Path, value: Value) -> Result<Vec<Connection>> {
    let table = value
        .into_table()
        .map_err(|e| parse_error(path, format!("'{}' must be a table: {}", CONNECTION_KEY, e)))?;

    table
        .into_iter()
        .map(|(name, body)| parse_connection(path, name, body))
        .collect()
}

fn parse_connection(path: &Path, name: String, body: Value) -> Result<Connection> {
    let mut fields = body
        .into_table()
        .map_err(|e| parse_error(path, format!("connection '{}' must be a table: {}", name, e)))?;

    let plugin = fields
        .remove("plugin")
        .ok_or_else(|| parse_error(path, format!("connection '{}' has no plugin", name)))?
        .into_string()
        .map_err(|e| parse_error(path, format!("connection '{}' plugin: {}", name, e)))?;

    let kind = match fields.remove("type") {
        Some(v) => {
            let raw = v
                .into_string()
                .map_err(|e| parse_error(path, format!("connection '{}' type: {}", name, e)))?;
            ConnectionKind::parse(&raw).ok_or_else(|| {
                parse_error(path, format!("connection '{}' has unknown type '{}'", name, raw))
            })?
        }
        None => ConnectionKind::Plugin,
    };

    let children = match fields.remove("connections") {
        Some(v) => v
            .into_array()
            .map_err(|e| parse_error(path, format!("connection '{}' connections: {}", name, e)))?
            .into_iter()
            .map(|child| child.into_string())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| parse_error(path, format!("connection '{}' connections: {}", name, e)))?,
        None => Vec::new(),
    };

    let import_schema = match fields.remove("import_schema") {
        Some(v) => v.try_deserialize::<ImportSchema>().map_err(|e| {
            parse_error(path, format!("connection '{}' import_schema: {}", name, e))
        })?,
        None => ImportSchema::Enabled,
    };

    Ok(Connection {
        name,
        plugin,
        kind,
        children,
        import_schema,
        options: fields.into_iter().collect(),
        source: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_format_for_extension() {
        assert_eq!(format_for_extension("toml"), Some(FileFormat::Toml));
        assert_eq!(format_for_extension("yml"), Some(FileFormat::Yaml));
        assert_eq!(format_for_extension("json"), Some(FileFormat::Json));
        assert!(format_for_extension("spc").is_none());
    }

    #[test]
    fn test_load_connections_and_settings() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "aws.toml",
            r#"
[connection.aws_prod]
plugin = "acme/aws@latest"
regions = ["us-east-1"]

[connection.aws_all]
plugin = "acme/aws"
type = "aggregator"
connections = ["aws_prod"]
import_schema = "disabled"
"#,
        );
        write(
            temp_dir.path(),
            "default.toml",
            r#"
[options.database]
port = 9193
"#,
        );

        let snapshot = DirectoryLoader::new(temp_dir.path()).load().unwrap();

        assert_eq!(snapshot.files.len(), 2);
        assert_eq!(snapshot.connection_names(), vec!["aws_all", "aws_prod"]);

        let all = snapshot.connection("aws_all").unwrap();
        assert_eq!(all.kind, ConnectionKind::Aggregator);
        assert_eq!(all.children, vec!["aws_prod"]);
        assert_eq!(all.import_schema, ImportSchema::Disabled);

        let prod = snapshot.connection("aws_prod").unwrap();
        assert_eq!(prod.plugin_short_name(), "aws");
        assert!(prod.options.contains_key("regions"));
        assert!(!prod.options.contains_key("plugin"));

        assert_eq!(
            snapshot.settings["options.database.port"]
                .clone()
                .into_int()
                .unwrap(),
            9193
        );
    }

    #[test]
    fn test_keys_keep_their_case() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "aws.toml",
            r#"
[connection.AwsProd]
plugin = "acme/aws"
Region = "us-east-1"

[Options.Database]
Port = 9193
"#,
        );
        write(
            temp_dir.path(),
            "gcp.json",
            r#"{"connection": {"GcpDev": {"plugin": "acme/gcp", "ProjectId": "p1"}}}"#,
        );

        let snapshot = DirectoryLoader::new(temp_dir.path())
            .with_extensions(["toml", "json"])
            .load()
            .unwrap();

        assert_eq!(snapshot.connection_names(), vec!["AwsProd", "GcpDev"]);
        let aws = snapshot.connection("AwsProd").unwrap();
        assert!(aws.options.contains_key("Region"));
        assert!(snapshot.connection("GcpDev").unwrap().options.contains_key("ProjectId"));
        assert!(snapshot.settings.contains_key("Options.Database.Port"));
    }

    #[test]
    fn test_names_differing_in_case_are_distinct() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.toml", "[connection.aws]\nplugin = \"acme/aws\"\n");
        write(temp_dir.path(), "b.toml", "[connection.AWS]\nplugin = \"acme/aws\"\n");

        let snapshot = DirectoryLoader::new(temp_dir.path()).load().unwrap();
        assert_eq!(snapshot.connection_names(), vec!["aws", "AWS"]);
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "empty.yaml", "");
        let snapshot = DirectoryLoader::new(temp_dir.path())
            .with_extensions(["yaml"])
            .load()
            .unwrap();
        assert!(snapshot.connections.is_empty());
    }

    #[test]
    fn test_env_overrides() {
        let temp_dir = TempDir::new().unwrap();
        let loader = DirectoryLoader::new(temp_dir.path()).with_env_overrides("HOTSWAP_TEST", "__");

        let mut env = config::Map::new();
        env.insert("HOTSWAP_TEST__OPTIONS__DATABASE__PORT".to_string(), "9000".to_string());
        env.insert("UNRELATED".to_string(), "x".to_string());

        let settings = loader.env_settings(Some(env)).unwrap();
        assert_eq!(settings.len(), 1);
        assert_eq!(
            settings["options.database.port"].clone().into_int().unwrap(),
            9000
        );
    }

    #[test]
    fn test_no_env_overrides_by_default() {
        let loader = DirectoryLoader::new("/unused");
        let mut env = config::Map::new();
        env.insert("HOTSWAP_TEST__A".to_string(), "1".to_string());
        assert!(loader.env_settings(Some(env)).unwrap().is_empty());
    }

    #[test]
    fn test_ignores_other_extensions() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.toml", "[connection.a]\nplugin = \"a\"\n");
        write(temp_dir.path(), "notes.txt", "not config");

        let snapshot = DirectoryLoader::new(temp_dir.path()).load().unwrap();
        assert_eq!(snapshot.connection_names(), vec!["a"]);
    }

    #[test]
    fn test_recursive_flag() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.toml", "[connection.a]\nplugin = \"a\"\n");
        write(temp_dir.path(), "nested/b.toml", "[connection.b]\nplugin = \"b\"\n");

        let recursive = DirectoryLoader::new(temp_dir.path()).load().unwrap();
        assert_eq!(recursive.connections.len(), 2);

        let flat = DirectoryLoader::new(temp_dir.path())
            .with_recursive(false)
            .load()
            .unwrap();
        assert_eq!(flat.connection_names(), vec!["a"]);
    }

    #[test]
    fn test_yaml_files() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "conn.yaml",
            "connection:\n  gcp:\n    plugin: acme/gcp\n    project: demo\n",
        );

        let snapshot = DirectoryLoader::new(temp_dir.path())
            .with_extensions(["yaml"])
            .load()
            .unwrap();
        let gcp = snapshot.connection("gcp").unwrap();
        assert_eq!(gcp.plugin, "acme/gcp");
        assert!(gcp.options.contains_key("project"));
    }

    #[test]
    fn test_duplicate_connection_across_files() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.toml", "[connection.aws]\nplugin = \"aws\"\n");
        write(temp_dir.path(), "b.toml", "[connection.aws]\nplugin = \"aws\"\n");

        let err = DirectoryLoader::new(temp_dir.path()).load().unwrap_err();
        assert!(matches!(err, ReloadError::DuplicateConnection { ref name, .. } if name == "aws"));
    }

    #[test]
    fn test_missing_plugin() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.toml", "[connection.aws]\nregion = \"x\"\n");

        let err = DirectoryLoader::new(temp_dir.path()).load().unwrap_err();
        assert!(matches!(err, ReloadError::ParseError { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.toml", "[connection.aws\nplugin = ");

        let err = DirectoryLoader::new(temp_dir.path()).load().unwrap_err();
        assert!(matches!(err, ReloadError::ParseError { .. }));
    }

    #[test]
    fn test_unknown_type() {
        let temp_dir = TempDir::new().unwrap();
        write(
            temp_dir.path(),
            "a.toml",
            "[connection.aws]\nplugin = \"aws\"\ntype = \"mystery\"\n",
        );

        let err = DirectoryLoader::new(temp_dir.path()).load().unwrap_err();
        assert!(err.to_string().contains("unknown type"));
    }

    #[test]
    fn test_missing_directory() {
        let err = DirectoryLoader::new("/nonexistent/hotswap/config")
            .load()
            .unwrap_err();
        assert!(matches!(err, ReloadError::LoadError(_)));
    }

    #[test]
    fn test_closure_loader() {
        let loader = || -> Result<ConfigSnapshot> {
            Ok(ConfigSnapshot::new(vec![Connection::new("a", "a")]))
        };
        let snapshot = ConfigLoader::load(&loader).unwrap();
        assert_eq!(snapshot.connections.len(), 1);
        assert_eq!(ConfigLoader::name(&loader), "fn");
    }

    #[test]
    fn test_name() {
        let loader = DirectoryLoader::new("config");
        assert!(loader.name().contains("config"));
    }
}
