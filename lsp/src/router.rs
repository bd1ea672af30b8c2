//! Request id allocation, reply correlation and inbound classification.

use std::collections::HashMap;

use serde_json::Value;

use crate::codec::JsonObject;
use crate::protocol::{RequestId, ResponseError};

/// One-shot reply callback. Runs at most once, on the client's task.
pub(crate) type ReplyHandler = Box<dyn FnOnce(Result<Value, ResponseError>) + Send>;

pub(crate) enum PendingReply {
    /// The `initialize` handshake; resolved by the client itself.
    Initialize,
    Callback(ReplyHandler),
}

impl std::fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialize => f.write_str("Initialize"),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Wrap a typed handler so it receives the parsed reply.
pub(crate) fn typed_handler<T, F>(handler: F, parse: fn(&Value) -> T) -> ReplyHandler
where
    T: 'static,
    F: FnOnce(Result<T, ResponseError>) + Send + 'static,
{
    Box::new(move |reply: Result<Value, ResponseError>| {
        handler(reply.map(|value| parse(&value)));
    })
}

/// Pending requests of one session.
#[derive(Debug)]
pub(crate) struct Router {
    next_id: u64,
    pending: HashMap<u64, PendingReply>,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }
}

impl Router {
    /// Next outbound id. Ids are never reused within a session.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Allocate an id and remember what to do with its reply.
    pub fn register(&mut self, reply: PendingReply) -> u64 {
        let id = self.allocate_id();
        self.pending.insert(id, reply);
        id
    }

    pub fn take(&mut self, id: u64) -> Option<PendingReply> {
        self.pending.remove(&id)
    }

    /// Forget a pending request. Returns whether it was still pending.
    pub fn cancel(&mut self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Drop every pending handler without invoking it.
    pub fn abandon_all(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!("Abandoning {} pending LSP requests", self.pending.len());
        }
        self.pending.clear();
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// An inbound JSON-RPC message.
#[derive(Debug)]
pub(crate) enum Inbound {
    Notification {
        method: String,
        params: Value,
    },
    Request {
        id: RequestId,
        method: String,
        params: Value,
    },
    /// A server request whose id is neither a number nor a string, so no
    /// reply can be addressed to it.
    UnanswerableRequest {
        method: String,
    },
    /// `id` is `None` when the reply cannot refer to any request we sent.
    Response {
        id: Option<u64>,
        outcome: Result<Value, ResponseError>,
    },
}

/// Classify a decoded object.
///
/// No `id` is a notification, `id` with `method` is a server request, and
/// anything else with an `id` is a reply. Returns `None` for notifications
/// without a method.
pub(crate) fn classify(mut object: JsonObject) -> Option<Inbound> {
    let params = object.remove("params").unwrap_or(Value::Null);
    let method = match object.remove("method") {
        Some(Value::String(method)) => Some(method),
        _ => None,
    };

    let Some(id) = object.remove("id") else {
        return method.map(|method| Inbound::Notification { method, params });
    };

    if let Some(method) = method {
        return Some(match RequestId::from_value(&id) {
            Some(id) => Inbound::Request { id, method, params },
            None => Inbound::UnanswerableRequest { method },
        });
    }

    let outcome = match object.remove("error") {
        Some(error) if !error.is_null() => Err(ResponseError::from_value(&error)),
        _ => Ok(object.remove("result").unwrap_or(Value::Null)),
    };
    Some(Inbound::Response {
        id: id.as_u64(),
        outcome,
    })
}
