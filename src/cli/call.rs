use serde_json::Value;

use crate::cli::EndpointArgs;
use crate::error::Result;
use crate::ipc::dispatcher::Dispatcher;
use crate::ipc::{Payload, SocketCommand};

/// Send one command and print the response as JSON on stdout.
///
/// Returns `false` when no response was obtained.
pub async fn run_call(
    endpoint: &EndpointArgs,
    name: &str,
    arguments: Vec<(String, Value)>,
    id: Option<&str>,
    blocking: bool,
) -> Result<bool> {
    let config = endpoint.resolve()?;
    let dispatcher = Dispatcher::new(&config)?;

    let mut command =
        SocketCommand::new(name).with_arguments(arguments.into_iter().collect::<Payload>());
    if let Some(id) = id {
        command = command.with_id(id);
    }

    match dispatcher.execute(&command, blocking).await? {
        Some(response) => {
            println!("{}", serde_json::to_string(&response)?);
            Ok(true)
        }
        None => {
            eprintln!("absent");
            Ok(false)
        }
    }
}
