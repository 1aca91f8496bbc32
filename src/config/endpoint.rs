use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, SocketWorkerError};

/// Socket address family. Only Unix-domain sockets are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Unix,
}

/// Socket type. The transport needs a reliable byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketType {
    #[default]
    Stream,
}

/// Where the worker listens and dispatchers connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Filesystem path of the socket.
    #[serde(default = "default_socket_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub family: AddressFamily,

    #[serde(default)]
    pub socket_type: SocketType,

    /// Protocol number passed to socket(2). Unix streams only accept 0.
    #[serde(default)]
    pub protocol: i32,

    /// Keep an existing socket file on startup and leave it behind on
    /// shutdown. When false, a stale file is removed before binding.
    #[serde(default)]
    pub reuse_socket_file: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            path: default_socket_path(),
            family: AddressFamily::default(),
            socket_type: SocketType::default(),
            protocol: 0,
            reuse_socket_file: false,
        }
    }
}

impl EndpointConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn reuse_socket_file(mut self, reuse: bool) -> Self {
        self.reuse_socket_file = reuse;
        self
    }

    /// Reject selectors the transport cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(SocketWorkerError::InvalidConfig {
                reason: "socket path is empty".into(),
            });
        }
        if self.protocol != 0 {
            return Err(SocketWorkerError::InvalidConfig {
                reason: format!(
                    "protocol {} is not supported for unix stream sockets",
                    self.protocol
                ),
            });
        }
        Ok(())
    }
}

/// `$SOCKET_WORKER_SOCKET`, else `$XDG_RUNTIME_DIR/socket-worker/worker.sock`,
/// else `/tmp/socket-worker/worker.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var("SOCKET_WORKER_SOCKET") {
        return PathBuf::from(path);
    }
    runtime_dir().join("socket-worker").join("worker.sock")
}

fn runtime_dir() -> PathBuf {
    std::env::var("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
