pub mod codec;
pub mod dispatcher;
pub mod transport;
pub mod worker;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ordered string-keyed payload carried by commands and responses.
pub type Payload = Map<String, Value>;

/// A command sent from a dispatcher to the worker.
///
/// Built once by the caller and never mutated afterwards; the builder methods
/// consume `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketCommand {
    name: String,
    #[serde(default)]
    arguments: Payload,
    #[serde(default)]
    id: Option<String>,
}

impl SocketCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Payload::new(),
            id: None,
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Payload) -> Self {
        self.arguments = arguments;
        self
    }

    /// Attach a caller-chosen correlation token.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &Payload {
        &self.arguments
    }

    pub fn argument(&self, key: &str) -> Option<&Value> {
        self.arguments.get(key)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// The handler's answer to a [`SocketCommand`].
///
/// `status` is owned by the application; the worker never inspects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketResponse {
    status: bool,
    #[serde(default)]
    data: Payload,
    #[serde(default)]
    id: Option<String>,
}

impl SocketResponse {
    pub fn new(status: bool) -> Self {
        Self {
            status,
            data: Payload::new(),
            id: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(true)
    }

    pub fn failed() -> Self {
        Self::new(false)
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_data_map(mut self, data: Payload) -> Self {
        self.data = data;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Copy the correlation id of `command` onto this response.
    pub fn reply_to(mut self, command: &SocketCommand) -> Self {
        self.id = command.id.clone();
        self
    }

    pub fn status(&self) -> bool {
        self.status
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}
