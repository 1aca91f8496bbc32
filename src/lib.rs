//! Single-connection command execution over a Unix-domain socket.
//!
//! A [`Worker`] binds a socket and serves one command per
//! [`accept`](Worker::accept) call, publishing its lifecycle through a
//! [`StatusCell`] that other processes can read. A [`Dispatcher`] connects,
//! sends a [`SocketCommand`] and returns the [`SocketResponse`], or `None`
//! when no worker could be reached.

pub mod cli;
pub mod config;
pub mod error;
pub mod ipc;
pub mod status;

pub use config::{EndpointConfig, WorkerConfig};
pub use error::{Result, SocketWorkerError};
pub use ipc::codec::{Codec, JsonCodec};
pub use ipc::dispatcher::Dispatcher;
pub use ipc::worker::{CommandHandler, ShutdownHook, Worker, WorkerShutdown};
pub use ipc::{Payload, SocketCommand, SocketResponse};
pub use status::{SocketWorkerStatus, StatusCell, StatusRecord};
