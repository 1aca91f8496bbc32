use std::path::{Path, PathBuf};

use tokio::net::UnixStream;

use crate::config::WorkerConfig;
use crate::error::{Result, SocketWorkerError};
use crate::ipc::codec::{Codec, JsonCodec};
use crate::ipc::transport::{check_frame_len, read_response_frame, write_frame};
use crate::ipc::{SocketCommand, SocketResponse};
use crate::status::{SocketWorkerStatus, StatusCell};

/// Client side of the worker socket: one command, one response per call.
pub struct Dispatcher<C: Codec = JsonCodec> {
    socket_path: PathBuf,
    status: StatusCell,
    max_message_bytes: u64,
    codec: C,
}

impl Dispatcher<JsonCodec> {
    pub fn new(config: &WorkerConfig) -> Result<Self> {
        Self::with_codec(config, JsonCodec)
    }
}

impl<C: Codec> Dispatcher<C> {
    /// Fails with `InvalidConfig` for a config the worker would also reject.
    pub fn with_codec(config: &WorkerConfig, codec: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            socket_path: config.socket_path().to_path_buf(),
            status: StatusCell::open(config.status_path()),
            max_message_bytes: config.max_message_bytes,
            codec,
        })
    }

    /// Send `command` and wait for the response.
    ///
    /// With `blocking == false` the call returns `Ok(None)` straight away
    /// unless the worker currently reports `Waiting`. Connection failures,
    /// dropped connections and empty responses all yield `Ok(None)`. A
    /// response that fails to decode is an error, and so is a request or
    /// response larger than `max_message_bytes`.
    pub async fn execute(
        &self,
        command: &SocketCommand,
        blocking: bool,
    ) -> Result<Option<SocketResponse>> {
        if !blocking {
            let status = self.status.get()?;
            if status != Some(SocketWorkerStatus::Waiting) {
                tracing::debug!(
                    socket = %self.socket_path.display(),
                    status = ?status,
                    "worker not waiting, skipping"
                );
                return Ok(None);
            }
        }

        let payload = self.codec.encode(command)?;
        check_frame_len(&payload, self.max_message_bytes)?;

        let stream = match UnixStream::connect(&self.socket_path).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::debug!(
                    socket = %self.socket_path.display(),
                    error = %e,
                    "connect failed"
                );
                return Ok(None);
            }
        };

        let (reader, mut writer) = stream.into_split();

        if let Err(e) = write_frame(&mut writer, &payload).await {
            tracing::debug!(command = command.name(), error = %e, "request not delivered");
            return Ok(None);
        }

        let frame = match read_response_frame(reader, self.max_message_bytes).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(command = command.name(), "worker closed without a response");
                return Ok(None);
            }
            Err(e @ SocketWorkerError::FrameTooLarge { .. }) => return Err(e),
            Err(e) => {
                tracing::debug!(command = command.name(), error = %e, "response not received");
                return Ok(None);
            }
        };

        let response: SocketResponse = self.codec.decode(&frame)?;
        tracing::debug!(
            command = command.name(),
            status = response.status(),
            "response received"
        );
        Ok(Some(response))
    }

    /// Last status written by the worker; `None` when no worker is running.
    pub fn status(&self) -> Result<Option<SocketWorkerStatus>> {
        self.status.get()
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn status_path(&self) -> &Path {
        self.status.path()
    }
}
