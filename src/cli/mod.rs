pub mod call;
pub mod serve;
pub mod status;

use std::path::{Path, PathBuf};

use crate::config::WorkerConfig;
use crate::error::Result;

/// Options every subcommand uses to locate the worker.
#[derive(Debug, Clone, Default)]
pub struct EndpointArgs {
    pub config: Option<PathBuf>,
    pub socket: Option<PathBuf>,
    pub status: Option<PathBuf>,
}

impl EndpointArgs {
    /// Load the config file (if any) and apply command-line overrides.
    pub fn resolve(&self) -> Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::load_from(path)?,
            None => WorkerConfig::default(),
        };
        if let Some(socket) = &self.socket {
            config.endpoint.path = socket.clone();
        }
        if let Some(status) = &self.status {
            config.status_path = Some(status.clone());
        }
        Ok(config)
    }
}

/// Parse a `key=value` argument. The value is read as JSON when it parses,
/// otherwise it is taken as a plain string.
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
