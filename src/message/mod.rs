//! DDP wire messages.
//!
//! Every DDP message is a JSON object whose `msg` field names its kind.
//! [`DdpMessage`] models the kinds this client sends and understands;
//! [`Inbound::decode`] classifies an incoming text frame, keeping unknown
//! kinds and server heartbeats apart from decode failures so callers can log
//! and continue.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

pub mod ejson;

/// Protocol versions this client can speak, most preferred first.
pub const SUPPORTED_VERSIONS: &[&str] = &["1", "pre2", "pre1"];

/// A typed DDP message.
///
/// # Examples
///
/// ```
/// use ddpwire::message::DdpMessage;
///
/// let sub = DdpMessage::Sub {
///     id: "todos-1".into(),
///     name: "todos".into(),
///     params: Vec::new(),
/// };
/// assert_eq!(
///     sub.encode().expect("encode"),
///     r#"{"msg":"sub","id":"todos-1","name":"todos","params":[]}"#
/// );
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum DdpMessage {
    /// Client handshake request.
    Connect {
        /// Proposed protocol version.
        version: String,
        /// All versions the client supports.
        support: Vec<String>,
        /// Previous session id, when resuming.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },
    /// Handshake accepted.
    Connected {
        /// Server-assigned session id.
        session: String,
    },
    /// Handshake rejected; the server proposes `version`.
    Failed {
        /// Version the server wants to speak.
        version: String,
    },
    /// Heartbeat request.
    Ping {
        /// Optional correlation id echoed by the pong.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Heartbeat reply.
    Pong {
        /// Id copied from the ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Subscribe to a publication.
    Sub {
        /// Request id.
        id: String,
        /// Publication name.
        name: String,
        /// Publication arguments.
        #[serde(default)]
        params: Vec<Value>,
    },
    /// Stop a subscription.
    Unsub {
        /// Subscription request id.
        id: String,
    },
    /// Subscription ended or was refused.
    Nosub {
        /// Subscription request id.
        id: String,
        /// Present when the subscription failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<MethodError>,
    },
    /// A document entered the client's view.
    Added {
        /// Document id.
        id: String,
        /// Collection name.
        collection: String,
        /// Initial fields.
        #[serde(default)]
        fields: Map<String, Value>,
    },
    /// A document was inserted at a position.
    AddedBefore {
        /// Document id.
        id: String,
        /// Collection name.
        collection: String,
        /// Initial fields.
        #[serde(default)]
        fields: Map<String, Value>,
        /// Document to insert before; `None` appends.
        #[serde(default)]
        before: Option<String>,
    },
    /// Fields of a document changed.
    Changed {
        /// Document id.
        id: String,
        /// Collection name.
        collection: String,
        /// Fields set to new values.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Map<String, Value>>,
        /// Fields removed from the document.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cleared: Option<Vec<String>>,
    },
    /// A document moved within an ordered collection.
    MovedBefore {
        /// Document id.
        id: String,
        /// Collection name.
        collection: String,
        /// Document to move before; `None` moves to the end.
        #[serde(default)]
        before: Option<String>,
    },
    /// A document left the client's view.
    Removed {
        /// Document id.
        id: String,
        /// Collection name.
        collection: String,
    },
    /// Initial data for these subscriptions has been sent.
    Ready {
        /// Subscription request ids.
        subs: Vec<String>,
    },
    /// Writes caused by these method calls are now visible.
    Updated {
        /// Method request ids.
        methods: Vec<String>,
    },
    /// Remote procedure call.
    Method {
        /// Request id.
        id: String,
        /// Method name.
        method: String,
        /// Method arguments.
        #[serde(default)]
        params: Vec<Value>,
    },
    /// Outcome of a method call.
    #[serde(rename = "result")]
    MethodResult {
        /// Method request id.
        id: String,
        /// Present when the method threw.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<MethodError>,
        /// Return value, absent for methods returning nothing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    /// The server could not process a client message.
    #[serde(rename = "error")]
    ServerError {
        /// Human-readable explanation.
        reason: String,
        /// The message that caused the error, when echoed back.
        #[serde(
            default,
            rename = "offendingMessage",
            skip_serializing_if = "Option::is_none"
        )]
        offending_message: Option<Value>,
    },
}

/// Every `msg` value [`DdpMessage`] can decode.
pub const KNOWN_KINDS: &[&str] = &[
    "connect",
    "connected",
    "failed",
    "ping",
    "pong",
    "sub",
    "unsub",
    "nosub",
    "added",
    "addedBefore",
    "changed",
    "movedBefore",
    "removed",
    "ready",
    "updated",
    "method",
    "result",
    "error",
];

impl DdpMessage {
    /// The `msg` discriminator for this message.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Connected { .. } => "connected",
            Self::Failed { .. } => "failed",
            Self::Ping { .. } => "ping",
            Self::Pong { .. } => "pong",
            Self::Sub { .. } => "sub",
            Self::Unsub { .. } => "unsub",
            Self::Nosub { .. } => "nosub",
            Self::Added { .. } => "added",
            Self::AddedBefore { .. } => "addedBefore",
            Self::Changed { .. } => "changed",
            Self::MovedBefore { .. } => "movedBefore",
            Self::Removed { .. } => "removed",
            Self::Ready { .. } => "ready",
            Self::Updated { .. } => "updated",
            Self::Method { .. } => "method",
            Self::MethodResult { .. } => "result",
            Self::ServerError { .. } => "error",
        }
    }

    /// Build the handshake request for `versions`, proposing the first.
    #[must_use]
    pub fn connect(version: &str, versions: &[String]) -> Self {
        Self::Connect {
            version: version.to_owned(),
            support: versions.to_vec(),
            session: None,
        }
    }

    /// Serialise to JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Json`] if a parameter value cannot be serialised.
    pub fn encode(&self) -> Result<String, WireError> {
        serde_json::to_string(self).map_err(WireError::Json)
    }
}

/// Classification of one inbound text message.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A recognised DDP message.
    Message(DdpMessage),
    /// The `{server_id: ...}` greeting some servers send first.
    ServerId(String),
    /// A well-formed object with an unrecognised `msg`.
    Unknown {
        /// The unrecognised discriminator.
        kind: String,
        /// The full message.
        raw: Value,
    },
}

impl Inbound {
    /// Parse and classify `text`.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] for invalid JSON, non-object payloads, a
    /// missing or non-string `msg`, or fields that do not fit a known kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use ddpwire::message::{DdpMessage, Inbound};
    ///
    /// let inbound = Inbound::decode(r#"{"msg":"ready","subs":["todos-1"]}"#).expect("decode");
    /// assert_eq!(
    ///     inbound,
    ///     Inbound::Message(DdpMessage::Ready {
    ///         subs: vec!["todos-1".into()]
    ///     })
    /// );
    /// ```
    pub fn decode(text: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(text).map_err(WireError::Json)?;
        let Value::Object(object) = &value else {
            return Err(WireError::NotAnObject);
        };
        match object.get("msg") {
            Some(Value::String(kind)) if KNOWN_KINDS.contains(&kind.as_str()) => {
                let kind = kind.clone();
                serde_json::from_value(value)
                    .map(Self::Message)
                    .map_err(|source| WireError::InvalidFields { kind, source })
            }
            Some(Value::String(kind)) => Ok(Self::Unknown {
                kind: kind.clone(),
                raw: value,
            }),
            Some(_) => Err(WireError::InvalidDiscriminator),
            None => match object.get("server_id") {
                Some(id) => Ok(Self::ServerId(
                    id.as_str().map_or_else(|| id.to_string(), str::to_owned),
                )),
                None => Err(WireError::MissingDiscriminator),
            },
        }
    }
}

/// Errors raised while decoding or encoding wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The text is not valid JSON, or a value could not be serialised.
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),
    /// The JSON value is not an object.
    #[error("message is not a JSON object")]
    NotAnObject,
    /// The object has no `msg` field.
    #[error("message has no `msg` field")]
    MissingDiscriminator,
    /// The `msg` field is not a string.
    #[error("`msg` field is not a string")]
    InvalidDiscriminator,
    /// A known kind had missing or mistyped fields.
    #[error("invalid `{kind}` message: {source}")]
    InvalidFields {
        /// The message kind.
        kind: String,
        /// Field-level decode failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Error code of a [`MethodError`]; servers send numbers or strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    /// Numeric code such as `404`.
    Number(Number),
    /// Symbolic code such as `"not-authorized"`.
    Text(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(code) => code.fmt(f),
            Self::Text(code) => f.write_str(code),
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self { Self::Number(code.into()) }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self { Self::Text(code.to_owned()) }
}

/// Error object carried by `result` and `nosub` messages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Error)]
#[error("method error {}{}", .error, reason_suffix(.reason.as_deref()))]
pub struct MethodError {
    /// Error code.
    pub error: ErrorCode,
    /// Short explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Additional detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// Preformatted message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error class name, such as `Meteor.Error`.
    #[serde(
        default,
        rename = "errorType",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_type: Option<String>,
}

fn reason_suffix(reason: Option<&str>) -> String {
    reason.map(|r| format!(": {r}")).unwrap_or_default()
}

impl MethodError {
    /// Construct an error with a code and reason.
    #[must_use]
    pub fn new(error: impl Into<ErrorCode>, reason: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: Some(reason.into()),
            details: None,
            message: None,
            error_type: None,
        }
    }
}

#[cfg(test)]
mod tests;
