use config::{self, File};
use log::{debug, error};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::SourceError;

/// Configuration for an exec-based metric source
#[derive(Debug, Deserialize, Clone)]
pub struct ExecConfig {
    /// Program and arguments, as separate list entries
    pub command: Vec<String>,
    /// Environment overrides for the spawned process, as KEY=VALUE entries
    #[serde(default)]
    pub environment: Vec<String>,
    /// Read buffer size in bytes for the batch demultiplexer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Signal delivered to the process on stop ("none" kills outright)
    #[serde(default = "default_signal")]
    pub signal: String,
    /// Delay before the supervisor restarts an exited process
    #[serde(default = "default_restart_delay", with = "humantime_serde")]
    pub restart_delay: Duration,
    /// Whether the supervisor gives up after a non-zero exit
    #[serde(default)]
    pub stop_on_error: bool,
}

fn default_buffer_size() -> usize {
    64 * 1024
}

fn default_signal() -> String {
    "none".to_string()
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(10)
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            environment: Vec::new(),
            buffer_size: default_buffer_size(),
            signal: default_signal(),
            restart_delay: default_restart_delay(),
            stop_on_error: false,
        }
    }
}

impl ExecConfig {
    /// Create a configuration for the given command line
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Load a configuration from a file, with the format chosen by extension
pub fn load_config<T, P>(path: P) -> Result<T, SourceError>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    if !path.exists() {
        error!("Configuration file {} does not exist", path.display());
        return Err(SourceError::Config(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let extension = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_lowercase(),
        None => {
            return Err(SourceError::Config(format!(
                "Configuration file has no extension: {}",
                path.display()
            )));
        }
    };

    let format = match extension.as_str() {
        "toml" => config::FileFormat::Toml,
        "json" => config::FileFormat::Json,
        "yaml" | "yml" => config::FileFormat::Yaml,
        format => {
            return Err(SourceError::Config(format!(
                "Unsupported config format: {}",
                format
            )));
        }
    };

    let config = config::Config::builder()
        .add_source(File::with_name(&path.to_string_lossy()).format(format))
        .build()
        .map_err(|e| SourceError::Config(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| SourceError::Config(e.to_string()))
}

/// Load a configuration from a TOML string
pub fn load_toml_str<T>(toml: &str) -> Result<T, SourceError>
where
    T: for<'de> Deserialize<'de>,
{
    let config = config::Config::builder()
        .add_source(File::from_str(toml, config::FileFormat::Toml))
        .build()
        .map_err(|e| SourceError::Config(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| SourceError::Config(e.to_string()))
}
