pub mod endpoint;

pub use endpoint::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SocketWorkerError};
use crate::ipc::transport::DEFAULT_MAX_MESSAGE_BYTES;
use crate::status::default_status_path;

/// Configuration shared by a worker and the dispatchers that call it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Status record location. Default: the socket path plus `.status`.
    #[serde(default)]
    pub status_path: Option<PathBuf>,

    /// Upper bound on a single request or response frame. Default: 1 MiB.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: u64,
}

fn default_max_message_bytes() -> u64 {
    DEFAULT_MAX_MESSAGE_BYTES
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            status_path: None,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl WorkerConfig {
    pub fn for_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            endpoint: EndpointConfig::new(path),
            ..Self::default()
        }
    }

    /// Load config from a YAML file. Returns default if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents).map_err(|e| SocketWorkerError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    pub fn with_status_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_path = Some(path.into());
        self
    }

    pub fn reuse_socket_file(mut self, reuse: bool) -> Self {
        self.endpoint.reuse_socket_file = reuse;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.endpoint.path
    }

    /// Resolved status record path.
    pub fn status_path(&self) -> PathBuf {
        self.status_path
            .clone()
            .unwrap_or_else(|| default_status_path(&self.endpoint.path))
    }

    pub fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;
        if self.max_message_bytes == 0 {
            return Err(SocketWorkerError::InvalidConfig {
                reason: "max_message_bytes must be greater than zero".into(),
            });
        }
        if self.status_path() == self.endpoint.path {
            return Err(SocketWorkerError::InvalidConfig {
                reason: "status path must differ from the socket path".into(),
            });
        }
        Ok(())
    }
}
