//! File-based ConfigSource implementation

use async_trait::async_trait;
use futures::stream;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use cqlroute_core::{
    ConfigChange, ConfigChangeStream, ConfigSource, Error, Result, RoutingConfig,
};

/// On-disk format of a configuration file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
    Json,
}

impl ConfigFormat {
    /// Format implied by the file extension; anything unknown is YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => Self::Toml,
            Some("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    /// Parse `contents` into a routing configuration
    pub fn parse(self, contents: &str) -> Result<RoutingConfig> {
        if contents.trim().is_empty() {
            return Err(Error::Config("Configuration document is empty".to_string()));
        }

        let value: serde_json::Value = match self {
            Self::Toml => {
                let toml_value: toml::Value = toml::from_str(contents).map_err(|e| {
                    error!("Failed to parse TOML config: {}", e);
                    Error::Config(format!("Invalid TOML: {}", e))
                })?;
                serde_json::to_value(toml_value).map_err(|e| {
                    error!("Failed to convert TOML to JSON: {}", e);
                    Error::Config(format!("TOML conversion error: {}", e))
                })?
            }
            Self::Json => serde_json::from_str(contents).map_err(|e| {
                error!("Failed to parse JSON config: {}", e);
                Error::Config(format!("Invalid JSON: {}", e))
            })?,
            Self::Yaml => serde_yaml::from_str(contents).map_err(|e| {
                error!("Failed to parse YAML config: {}", e);
                Error::Config(format!("Invalid YAML: {}", e))
            })?,
        };

        // Comment-only YAML parses as null
        if value.is_null() {
            return Err(Error::Config(
                "Configuration document is empty".to_string(),
            ));
        }

        serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("Invalid routing configuration: {}", e)))
    }

    /// Render `config` in this format
    pub fn render(self, config: &RoutingConfig) -> Result<String> {
        match self {
            Self::Toml => {
                let json = serde_json::to_value(config)?;
                let toml_value: toml::Value = serde_json::from_value(json).map_err(|e| {
                    error!("Failed to convert JSON to TOML: {}", e);
                    Error::Config(format!("JSON to TOML conversion error: {}", e))
                })?;
                toml::to_string_pretty(&toml_value).map_err(|e| {
                    error!("Failed to serialize TOML: {}", e);
                    Error::Config(format!("TOML serialization error: {}", e))
                })
            }
            Self::Json => Ok(serde_json::to_string_pretty(config)?),
            Self::Yaml => serde_yaml::to_string(config).map_err(|e| {
                error!("Failed to serialize YAML: {}", e);
                Error::Config(format!("YAML serialization error: {}", e))
            }),
        }
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: PathBuf) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => Ok(dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?
            .join(rest)),
        Err(_) => Ok(path),
    }
}

/// Routing configuration stored in a single file
///
/// Watches the file for changes using the `notify` crate.
#[derive(Debug)]
pub struct FileConfigSource {
    /// Path to the configuration file
    config_path: PathBuf,
    format: ConfigFormat,
    /// Configuration version counter (incremented on each write)
    version: Arc<AtomicU32>,
}

impl FileConfigSource {
    /// Open an existing configuration file
    ///
    /// # Errors
    /// - `Error::ConfigNotFound` if the file doesn't exist
    pub async fn new(config_path: impl Into<PathBuf>) -> Result<Self> {
        let config_path = expand_home(config_path.into())?;

        if !config_path.exists() {
            return Err(Error::ConfigNotFound);
        }

        info!("Initialized FileConfigSource for {:?}", config_path);

        Ok(Self::at(config_path))
    }

    /// Create the file with `config`, failing if it already exists
    pub async fn create(config_path: impl Into<PathBuf>, config: &RoutingConfig) -> Result<Self> {
        let config_path = expand_home(config_path.into())?;

        if config_path.exists() {
            return Err(Error::Config(format!(
                "Configuration file {:?} already exists",
                config_path
            )));
        }

        if let Some(parent) = config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let source = Self::at(config_path);
        source.write_config(config)?;
        Ok(source)
    }

    fn at(config_path: PathBuf) -> Self {
        let format = ConfigFormat::from_path(&config_path);
        Self {
            config_path,
            format,
            version: Arc::new(AtomicU32::new(1)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    /// Current configuration version
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Read and parse the config file
    fn read_config_file(&self) -> Result<RoutingConfig> {
        let contents = std::fs::read_to_string(&self.config_path).map_err(|e| {
            error!("Failed to read config file: {}", e);
            Error::Io(e)
        })?;

        let config = self.format.parse(&contents)?;
        debug!("Successfully read config file");
        Ok(config)
    }

    /// Validate `config` and write it to the file
    pub fn write_config(&self, config: &RoutingConfig) -> Result<()> {
        config.validate()?;
        let contents = self.format.render(config)?;

        std::fs::write(&self.config_path, contents).map_err(|e| {
            error!("Failed to write config file: {}", e);
            Error::Io(e)
        })?;

        self.version.fetch_add(1, Ordering::SeqCst);

        info!("Successfully wrote config file");
        Ok(())
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn load(&self) -> Result<RoutingConfig> {
        if !self.config_path.exists() {
            return Err(Error::ConfigNotFound);
        }
        self.read_config_file()
    }

    async fn watch_changes(&self) -> Result<ConfigChangeStream<'_>> {
        // Create a channel for file system events
        let (tx, rx) = mpsc::channel(100);

        let config_path = self.config_path.clone();
        let version = self.version.clone();

        // Spawn watcher in a blocking task
        tokio::task::spawn_blocking(move || {
            let (notify_tx, notify_rx) = std::sync::mpsc::channel();

            let mut watcher = match RecommendedWatcher::new(
                move |res: std::result::Result<Event, notify::Error>| {
                    if let Err(e) = notify_tx.send(res) {
                        error!("Failed to send file watch event: {}", e);
                    }
                },
                notify::Config::default(),
            ) {
                Ok(w) => w,
                Err(e) => {
                    error!("Failed to create file watcher: {}", e);
                    return;
                }
            };

            if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
                error!("Failed to watch config file: {}", e);
                return;
            }

            info!("Watching config file for changes: {:?}", config_path);

            while let Ok(event_result) = notify_rx.recv() {
                match event_result {
                    Ok(event) => {
                        // Only emit events for modify operations
                        if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                            let change = ConfigChange {
                                timestamp: chrono::Utc::now(),
                                version: version.fetch_add(1, Ordering::SeqCst) + 1,
                            };

                            if tx.blocking_send(Ok(change)).is_err() {
                                debug!("Config change stream closed, stopping watcher");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("File watch error: {}", e);
                        if tx
                            .blocking_send(Err(Error::Internal(format!("File watch error: {}", e))))
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        // Convert mpsc receiver to stream
        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[tokio::test]
    async fn test_file_not_found() {
        let result = FileConfigSource::new("/nonexistent/routes.yaml").await;
        assert!(matches!(result.unwrap_err(), Error::ConfigNotFound));
    }

    #[tokio::test]
    async fn test_read_yaml_config() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            r#"
lenient_fallback: false
default_target: primary
sessions:
  primary:
    contact_points: ["10.0.0.1:9042"]
    keyspace: main
  tenant_a:
    keyspace: tenant_a
    lazy: true
routes:
  tenant-a: tenant_a
"#,
        )
        .unwrap();

        let source = FileConfigSource::new(temp_file.path()).await.unwrap();
        assert_eq!(source.format(), ConfigFormat::Yaml);

        let config = source.load().await.unwrap();
        assert!(!config.lenient_fallback);
        assert_eq!(config.default_target, Some(serde_json::json!("primary")));
        assert_eq!(config.sessions["primary"].contact_points, vec!["10.0.0.1:9042"]);
        assert!(config.sessions["tenant_a"].lazy);
        assert_eq!(config.routes["tenant-a"], "tenant_a");
    }

    #[tokio::test]
    async fn test_read_toml_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.toml");
        std::fs::write(
            &path,
            r#"
default_target = "primary"

[sessions.primary]
keyspace = "main"

[routes]
tenant-a = "primary"
"#,
        )
        .unwrap();

        let source = FileConfigSource::new(&path).await.unwrap();
        let config = source.load().await.unwrap();

        assert!(config.lenient_fallback);
        assert_eq!(config.sessions["primary"].keyspace.as_deref(), Some("main"));
        assert_eq!(config.routes["tenant-a"], "primary");
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let temp_file = NamedTempFile::new().unwrap();
        let source = FileConfigSource::new(temp_file.path()).await.unwrap();

        for contents in ["", "\n", "# routes moved elsewhere\n"] {
            std::fs::write(temp_file.path(), contents).unwrap();
            let err = source.load().await.unwrap_err();
            assert!(matches!(err, Error::Config(ref message) if message.contains("empty")));
        }

        // An explicit empty mapping still means "all defaults"
        std::fs::write(temp_file.path(), "{}").unwrap();
        assert_eq!(source.load().await.unwrap(), RoutingConfig::default());
    }

    #[tokio::test]
    async fn test_truncated_file_keeps_previous_config_readable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.yaml");
        let source = FileConfigSource::create(&path, &RoutingConfig::sample())
            .await
            .unwrap();
        assert_eq!(source.load().await.unwrap(), RoutingConfig::sample());

        std::fs::write(&path, "").unwrap();
        assert!(source.load().await.is_err());
    }

    #[test]
    fn test_empty_document_rejected_in_every_format() {
        for format in [ConfigFormat::Yaml, ConfigFormat::Toml, ConfigFormat::Json] {
            assert!(matches!(format.parse("  \n"), Err(Error::Config(_))));
        }
    }

    #[tokio::test]
    async fn test_routes_must_be_a_mapping() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "routes:\n  - tenant_a\n").unwrap();

        let source = FileConfigSource::new(temp_file.path()).await.unwrap();
        let err = source.load().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_create_and_write_roundtrip_each_format() {
        let dir = TempDir::new().unwrap();

        for name in ["routes.yaml", "routes.toml", "routes.json"] {
            let path = dir.path().join("nested").join(name);
            let source = FileConfigSource::create(&path, &RoutingConfig::sample())
                .await
                .unwrap();
            assert_eq!(source.version(), 2);
            assert_eq!(source.load().await.unwrap(), RoutingConfig::sample());

            let mut updated = RoutingConfig::sample();
            updated.lenient_fallback = false;
            source.write_config(&updated).unwrap();
            assert!(!source.load().await.unwrap().lenient_fallback);

            assert!(FileConfigSource::create(&path, &updated).await.is_err());
        }
    }

    #[tokio::test]
    async fn test_write_rejects_invalid_config() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "{}").unwrap();
        let source = FileConfigSource::new(temp_file.path()).await.unwrap();

        let mut invalid = RoutingConfig::sample();
        invalid
            .sessions
            .get_mut("primary")
            .unwrap()
            .keyspace = Some("no-dashes".to_string());

        assert!(source.write_config(&invalid).is_err());
        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "{}");
        assert_eq!(source.version(), 1);
    }

    #[tokio::test]
    async fn test_load_after_file_removed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routes.yaml");
        std::fs::write(&path, "{}").unwrap();

        let source = FileConfigSource::new(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(source.load().await.unwrap_err(), Error::ConfigNotFound));
    }

    #[test]
    fn test_expand_home() {
        let plain = expand_home(PathBuf::from("/etc/cqlroute/routes.yaml")).unwrap();
        assert_eq!(plain, PathBuf::from("/etc/cqlroute/routes.yaml"));

        if let Some(home) = dirs::home_dir() {
            let expanded = expand_home(PathBuf::from("~/routes.yaml")).unwrap();
            assert_eq!(expanded, home.join("routes.yaml"));
        }
    }
}
