use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tokio::net::{UnixListener, UnixStream};

use crate::config::{EndpointConfig, WorkerConfig};
use crate::error::{Result, SocketWorkerError};
use crate::ipc::codec::{Codec, JsonCodec};
use crate::ipc::transport::{check_frame_len, read_request_frame, write_frame};
use crate::ipc::{SocketCommand, SocketResponse};
use crate::status::{set_file_permissions_0600, SocketWorkerStatus, StatusCell};

/// Application logic run for each accepted command.
///
/// Plain closures `Fn(SocketCommand) -> SocketResponse` implement this too.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, command: SocketCommand) -> Result<SocketResponse>;
}

#[async_trait]
impl<F> CommandHandler for F
where
    F: Fn(SocketCommand) -> SocketResponse + Send + Sync,
{
    async fn handle(&self, command: SocketCommand) -> Result<SocketResponse> {
        Ok(self(command))
    }
}

/// Called after every response has been written, with a handle that can
/// shut the worker down. The worker never shuts itself down.
pub trait ShutdownHook: Send + Sync {
    fn after_command(
        &self,
        command: &SocketCommand,
        response: &SocketResponse,
        shutdown: &mut WorkerShutdown<'_>,
    ) -> Result<()>;
}

impl<F> ShutdownHook for F
where
    F: Fn(&SocketCommand, &SocketResponse, &mut WorkerShutdown<'_>) -> Result<()> + Send + Sync,
{
    fn after_command(
        &self,
        command: &SocketCommand,
        response: &SocketResponse,
        shutdown: &mut WorkerShutdown<'_>,
    ) -> Result<()> {
        self(command, response, shutdown)
    }
}

/// Shutdown capability lent to a [`ShutdownHook`] for one call.
pub struct WorkerShutdown<'a> {
    listener: &'a mut Option<UnixListener>,
    status: &'a StatusCell,
    endpoint: &'a EndpointConfig,
}

impl WorkerShutdown<'_> {
    /// Tear the worker down: remove the status record, close the listener
    /// and, unless the socket file is reused, remove it. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        shutdown_worker(self.listener, self.status, self.endpoint)
    }

    pub fn is_shut_down(&self) -> bool {
        self.listener.is_none()
    }
}

fn shutdown_worker(
    listener: &mut Option<UnixListener>,
    status: &StatusCell,
    endpoint: &EndpointConfig,
) -> Result<()> {
    if listener.is_none() {
        return Ok(());
    }
    status.remove()?;
    drop(listener.take());
    if !endpoint.reuse_socket_file {
        remove_socket_file(&endpoint.path)?;
    }
    tracing::info!(socket = %endpoint.path.display(), "worker shut down");
    Ok(())
}

/// Single-connection command worker bound to a Unix socket.
pub struct Worker<C: Codec = JsonCodec> {
    config: WorkerConfig,
    listener: Option<UnixListener>,
    status: StatusCell,
    handler: Box<dyn CommandHandler>,
    shutdown_hook: Option<Box<dyn ShutdownHook>>,
    codec: C,
}

impl Worker<JsonCodec> {
    /// Bind a worker speaking line-delimited JSON. Must be called from
    /// within a tokio runtime.
    pub fn bind<H>(config: WorkerConfig, handler: H) -> Result<Self>
    where
        H: CommandHandler + 'static,
    {
        Self::bind_with_codec(config, JsonCodec, handler)
    }
}

impl<C: Codec> Worker<C> {
    /// Create the status record as `Starting`, bind and listen, then mark
    /// the worker `Ready`. On failure nothing is left behind.
    pub fn bind_with_codec<H>(config: WorkerConfig, codec: C, handler: H) -> Result<Self>
    where
        H: CommandHandler + 'static,
    {
        Self::bind_using(config, codec, handler, bind_listener)
    }

    fn bind_using<H, B>(config: WorkerConfig, codec: C, handler: H, bind: B) -> Result<Self>
    where
        H: CommandHandler + 'static,
        B: FnOnce(&EndpointConfig) -> Result<UnixListener>,
    {
        config.validate()?;
        let status = StatusCell::create(config.status_path(), SocketWorkerStatus::Starting)?;

        let listener = match bind(&config.endpoint).and_then(|listener| {
            status.set(SocketWorkerStatus::Ready)?;
            Ok(listener)
        }) {
            Ok(listener) => listener,
            Err(e) => {
                if let Err(cleanup) = status.remove() {
                    tracing::warn!(error = %cleanup, "failed to remove status record");
                }
                return Err(e);
            }
        };

        tracing::info!(
            socket = %config.endpoint.path.display(),
            status_path = %status.path().display(),
            "worker listening"
        );

        Ok(Self {
            config,
            listener: Some(listener),
            status,
            handler: Box::new(handler),
            shutdown_hook: None,
            codec,
        })
    }

    /// Install a closure as the shutdown hook.
    pub fn with_shutdown_hook<F>(self, hook: F) -> Self
    where
        F: Fn(&SocketCommand, &SocketResponse, &mut WorkerShutdown<'_>) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.with_hook(hook)
    }

    /// Install any [`ShutdownHook`] implementation.
    pub fn with_hook<H>(mut self, hook: H) -> Self
    where
        H: ShutdownHook + 'static,
    {
        self.shutdown_hook = Some(Box::new(hook));
        self
    }

    /// Serve exactly one connection.
    ///
    /// Status moves `Waiting` -> `Busy` -> `Ready`. A malformed request or a
    /// failing handler aborts the cycle without a response; the status is
    /// still returned to `Ready` before the error propagates. Dropping the
    /// future mid-cycle (for instance under `tokio::time::timeout`) also
    /// leaves the status at `Ready`.
    pub async fn accept(&mut self) -> Result<()> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| SocketWorkerError::ShutDown {
                path: self.config.endpoint.path.clone(),
            })?;

        self.status.set(SocketWorkerStatus::Waiting)?;
        let guard = ReadyOnDrop::new(&self.status);

        let accepted = listener.accept().await;
        let result = match accepted {
            Ok((stream, _addr)) => self.run_cycle(stream).await,
            Err(e) => Err(SocketWorkerError::Ipc {
                reason: format!("accept failed: {}", e),
            }),
        };

        guard.disarm();
        // Runs even after a hook-triggered shutdown, where it is a no-op.
        let reset = self.status.set(SocketWorkerStatus::Ready);
        result?;
        reset
    }

    async fn run_cycle(&mut self, stream: UnixStream) -> Result<()> {
        self.status.set(SocketWorkerStatus::Busy)?;
        let (command, response) = self.handle_connection(stream).await?;
        self.run_shutdown_hook(&command, &response)
    }

    /// Call [`accept`](Self::accept) until the worker is shut down or a
    /// cycle fails.
    pub async fn serve(&mut self) -> Result<()> {
        while !self.is_shut_down() {
            self.accept().await?;
        }
        Ok(())
    }

    /// Read one request, run the handler, write the response. The stream is
    /// closed when this returns.
    async fn handle_connection(
        &self,
        stream: UnixStream,
    ) -> Result<(SocketCommand, SocketResponse)> {
        let (reader, mut writer) = stream.into_split();

        let frame = read_request_frame(reader, self.config.max_message_bytes).await?;
        let command: SocketCommand = self.codec.decode(&frame)?;
        tracing::debug!(command = command.name(), id = ?command.id(), "command received");

        let response = self.handler.handle(command.clone()).await?;

        let payload = self.codec.encode(&response)?;
        check_frame_len(&payload, self.config.max_message_bytes)?;
        write_frame(&mut writer, &payload).await?;
        tracing::debug!(
            command = command.name(),
            status = response.status(),
            "response sent"
        );

        Ok((command, response))
    }

    fn run_shutdown_hook(
        &mut self,
        command: &SocketCommand,
        response: &SocketResponse,
    ) -> Result<()> {
        let Some(hook) = self.shutdown_hook.as_ref() else {
            return Ok(());
        };
        let mut shutdown = WorkerShutdown {
            listener: &mut self.listener,
            status: &self.status,
            endpoint: &self.config.endpoint,
        };
        hook.after_command(command, response, &mut shutdown)
    }

    /// Shut the worker down from its owner, outside any hook call. Used when
    /// the owner stops serving for its own reasons (an error, a signal) so no
    /// stale record or socket file outlives the process. Idempotent, and a
    /// no-op after a hook-triggered shutdown.
    pub fn close(&mut self) -> Result<()> {
        shutdown_worker(&mut self.listener, &self.status, &self.config.endpoint)
    }

    /// Current status as seen by any reader; `None` once shut down.
    pub fn status(&self) -> Result<Option<SocketWorkerStatus>> {
        self.status.get()
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.endpoint.path
    }

    pub fn status_path(&self) -> &Path {
        self.status.path()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.listener.is_none()
    }
}

/// Resets the status to `Ready` if an accept cycle is abandoned before it
/// completes.
struct ReadyOnDrop {
    status: Option<StatusCell>,
}

impl ReadyOnDrop {
    fn new(status: &StatusCell) -> Self {
        Self {
            status: Some(status.clone()),
        }
    }

    fn disarm(mut self) {
        self.status = None;
    }
}

impl Drop for ReadyOnDrop {
    fn drop(&mut self) {
        let Some(status) = self.status.take() else {
            return;
        };
        tracing::debug!(path = %status.path().display(), "accept cycle abandoned");
        if let Err(e) = status.set(SocketWorkerStatus::Ready) {
            tracing::warn!(error = %e, "failed to reset status after abandoned cycle");
        }
    }
}

/// Remove a stale socket file unless reuse is requested, then bind and
/// listen.
fn bind_listener(endpoint: &EndpointConfig) -> Result<UnixListener> {
    let path = &endpoint.path;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SocketWorkerError::Bind {
            path: path.clone(),
            reason: format!("cannot create socket directory: {}", e),
        })?;
    }

    if !endpoint.reuse_socket_file && fs::symlink_metadata(path).is_ok() {
        tracing::debug!(socket = %path.display(), "removing stale socket file");
        remove_socket_file(path)?;
    }

    let listener = UnixListener::bind(path).map_err(|e| SocketWorkerError::Bind {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    set_file_permissions_0600(path);
    Ok(listener)
}

fn remove_socket_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SocketWorkerError::Bind {
            path: path.to_path_buf(),
            reason: format!("cannot remove socket file: {}", e),
        }),
    }
}
