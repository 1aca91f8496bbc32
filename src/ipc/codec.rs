use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, SocketWorkerError};

/// Byte-level serializer shared by worker and dispatcher.
///
/// Encoded output must not contain a raw `\n`: the transport uses it as the
/// request frame terminator.
pub trait Codec: Send + Sync {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>>;

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;
}

/// Compact single-line JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| SocketWorkerError::Encode {
            reason: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(trim_frame(bytes)).map_err(|e| SocketWorkerError::Decode {
            reason: format!("invalid JSON: {}", e),
        })
    }
}

/// Strip trailing frame terminators and whitespace.
fn trim_frame(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}
