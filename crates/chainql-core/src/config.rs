//! Run configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telemetry::LogConfig;
use crate::writers::HttpWriterConfig;

/// When buffered output is handed to its destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissionMode {
    /// Flush at every block-scope exit.
    #[default]
    Block,
    /// Keep everything buffered until the program ends.
    Program,
}

/// Configuration for one program execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Default output folder for file-based writers. A `SET OUTPUT FOLDER`
    /// directive in the query overrides it.
    #[serde(default)]
    pub output_folder: Option<PathBuf>,
    #[serde(default)]
    pub emission_mode: EmissionMode,
    /// Propagate every execution failure instead of skipping the element.
    #[serde(default)]
    pub abort_on_error: bool,
    /// Polling interval while a continuous scan waits for the next block.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub http: HttpWriterConfig,
    /// Logging setup, applied by [`RunConfig::init_tracing`].
    #[serde(default)]
    pub log: LogConfig,
}

fn default_poll_interval_ms() -> u64 { 2_000 }

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_folder: None,
            emission_mode: EmissionMode::default(),
            abort_on_error: false,
            poll_interval_ms: default_poll_interval_ms(),
            http: HttpWriterConfig::default(),
            log: LogConfig::default(),
        }
    }
}

/// Errors while loading a [`RunConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl RunConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_output_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.output_folder = Some(folder.into());
        self
    }

    /// Install the global tracing subscriber described by `log`.
    /// Call once at startup, before executing a program.
    pub fn init_tracing(&self) {
        crate::telemetry::init_tracing(&self.log);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_uses_defaults() {
        let config = RunConfig::from_json_str("{}").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.poll_interval_ms, 2_000);
        assert_eq!(config.emission_mode, EmissionMode::Block);
    }

    #[test]
    fn partial_json_overrides() {
        let config = RunConfig::from_json_str(
            r#"{
                "output_folder": "/tmp/out",
                "emission_mode": "program",
                "abort_on_error": true,
                "http": { "retry": { "max_retries": 5 } },
                "log": { "level": "debug", "json": true }
            }"#,
        )
        .unwrap();
        assert_eq!(config.output_folder, Some(PathBuf::from("/tmp/out")));
        assert_eq!(config.emission_mode, EmissionMode::Program);
        assert!(config.abort_on_error);
        assert_eq!(config.http.retry.max_retries, 5);
        assert_eq!(config.http.retry.initial_backoff_ms, 100);
        assert_eq!(config.log.level, "debug");
        assert!(config.log.json);
    }

    #[test]
    fn log_components_become_filter_directives() {
        let config = RunConfig::from_json_str(
            r#"{ "log": { "level": "warn", "components": { "chainql-evm": "trace" } } }"#,
        )
        .unwrap();
        assert_eq!(config.log.directives(), "warn,chainql_evm=trace");
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            RunConfig::from_json_str("{ \"poll_interval_ms\": \"soon\" }"),
            Err(ConfigError::Parse(_))
        ));
    }
}
