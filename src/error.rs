use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SocketWorkerError {
    #[error("failed to bind socket at {path}: {reason}")]
    Bind { path: PathBuf, reason: String },

    #[error("status cell error at {path}: {reason}")]
    Status { path: PathBuf, reason: String },

    #[error("invalid endpoint config: {reason}")]
    InvalidConfig { reason: String },

    #[error("config parse error in {path}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("decode error: {reason}")]
    Decode { reason: String },

    #[error("encode error: {reason}")]
    Encode { reason: String },

    #[error("ipc error: {reason}")]
    Ipc { reason: String },

    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge { limit: u64 },

    #[error("handler error: {reason}")]
    Handler { reason: String },

    #[error("worker at {path} has shut down")]
    ShutDown { path: PathBuf },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SocketWorkerError>;
