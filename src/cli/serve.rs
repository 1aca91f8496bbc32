use serde_json::Value;

use crate::cli::{display, EndpointArgs};
use crate::error::{Result, SocketWorkerError};
use crate::ipc::worker::{Worker, WorkerShutdown};
use crate::ipc::{SocketCommand, SocketResponse};

/// Command name that makes the echo worker shut itself down.
pub const SHUTDOWN_COMMAND: &str = "shutdown";

/// Reply with the command's arguments under `echo`.
pub fn echo_handler(command: SocketCommand) -> SocketResponse {
    SocketResponse::ok()
        .with_data("echo", Value::Object(command.arguments().clone()))
        .reply_to(&command)
}

fn shutdown_on_request(
    command: &SocketCommand,
    _response: &SocketResponse,
    shutdown: &mut WorkerShutdown<'_>,
) -> Result<()> {
    if command.name() == SHUTDOWN_COMMAND {
        shutdown.shutdown()?;
    }
    Ok(())
}

/// Run the echo worker until a `shutdown` command arrives, or for a single
/// command with `once`. A failed command is logged and serving continues.
/// However the loop ends, the status record and socket file are removed.
pub async fn run_serve(endpoint: &EndpointArgs, reuse: bool, once: bool) -> Result<()> {
    let mut config = endpoint.resolve()?;
    if reuse {
        config.endpoint.reuse_socket_file = true;
    }

    let mut worker = Worker::bind(config, echo_handler)?.with_hook(shutdown_on_request);
    eprintln!("socket-worker: listening on {}", display(worker.socket_path()));

    let result = serve_until_stopped(&mut worker, once).await;
    if let Err(e) = worker.close() {
        tracing::warn!(error = %e, "failed to clean up worker");
    }
    result?;

    eprintln!("socket-worker: stopped");
    Ok(())
}

async fn serve_until_stopped(worker: &mut Worker, once: bool) -> Result<()> {
    loop {
        tokio::select! {
            result = worker.accept() => match result {
                Ok(()) => {}
                Err(e) if !once && is_command_failure(&e) => {
                    tracing::warn!(error = %e, "command failed, still serving");
                }
                Err(e) => return Err(e),
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("interrupted");
                return Ok(());
            }
        }
        if once || worker.is_shut_down() {
            return Ok(());
        }
    }
}

/// Errors confined to a single connection.
fn is_command_failure(error: &SocketWorkerError) -> bool {
    matches!(
        error,
        SocketWorkerError::Decode { .. }
            | SocketWorkerError::Encode { .. }
            | SocketWorkerError::Ipc { .. }
            | SocketWorkerError::Handler { .. }
            | SocketWorkerError::FrameTooLarge { .. }
    )
}
