//! STP Wire Protocol
//!
//! Single responsibility: Encode and decode the JSON envelopes exchanged with
//! the STP service.
//!
//! # Wire Format
//!
//! Every frame is a JSON text frame holding one envelope:
//!
//! ```text
//! { "method": <string>, "params": <object> }
//! ```
//!
//! ## Correlated request
//! ```text
//! {
//!     "method": "Request",
//!     "params": {
//!         "jsonRequest": <inner envelope, serialized as a JSON string>,
//!         "cookie": <u64>,
//!         "timeout": <seconds>
//!     }
//! }
//! ```
//!
//! ## Reply
//! ```text
//! {
//!     "method": "RequestResponse",
//!     "params": { "cookie": <u64>, "success": <bool>, "result": <any> }
//! }
//! ```
//!
//! ## Registration (inner envelope of the first request on a socket)
//! ```text
//! {
//!     "method": "Register",
//!     "params": { "serviceName", "language", "solvables", "machineId", "sessionId" }
//! }
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::StpError;

pub const METHOD_REGISTER: &str = "Register";
pub const METHOD_REQUEST: &str = "Request";
pub const METHOD_REQUEST_RESPONSE: &str = "RequestResponse";

/// The `{method, params}` unit exchanged over the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Envelope {
    /// Build an envelope from an already-built params value.
    pub fn new(method: impl Into<String>, params: Value) -> Result<Self, StpError> {
        let method = method.into();
        if method.is_empty() {
            return Err(StpError::Protocol("Envelope method must not be empty".into()));
        }
        Ok(Self { method, params })
    }

    /// Build an envelope by serializing `params`.
    pub fn with_params<P: Serialize>(method: impl Into<String>, params: &P) -> Result<Self, StpError> {
        Self::new(method, serde_json::to_value(params)?)
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> Result<String, StpError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a text frame.
    pub fn decode(text: &str) -> Result<Self, StpError> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| StpError::Protocol(format!("Malformed envelope: {}", e)))?;
        if envelope.method.is_empty() {
            return Err(StpError::Protocol("Envelope has an empty method".into()));
        }
        Ok(envelope)
    }

    /// Deserialize params into a typed payload. `null` params read as `{}`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, StpError> {
        let params = match &self.params {
            Value::Null => Value::Object(Map::new()),
            other => other.clone(),
        };
        serde_json::from_value(params).map_err(|e| {
            StpError::Protocol(format!("Invalid params for {}: {}", self.method, e))
        })
    }
}

/// Params of the `Register` command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParams {
    pub service_name: String,
    pub language: String,
    pub solvables: Vec<String>,
    pub machine_id: String,
    pub session_id: String,
}

/// Params of the outer `Request` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestParams {
    pub json_request: String,
    pub cookie: u64,
    pub timeout: u64,
}

/// Params of an inbound `RequestResponse`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResponse {
    pub cookie: u64,
    pub success: bool,
    #[serde(default)]
    pub result: Value,
}

/// Wrap `inner` as a correlated request frame.
///
/// The timeout travels in whole seconds, rounded up so sub-second timeouts
/// are not sent as zero.
pub fn encode_request(cookie: u64, inner: &Envelope, timeout: Duration) -> Result<String, StpError> {
    let params = RequestParams {
        json_request: inner.encode()?,
        cookie,
        timeout: timeout_secs(timeout),
    };
    Envelope::with_params(METHOD_REQUEST, &params)?.encode()
}

/// Read the reply params of a `RequestResponse` envelope.
pub fn decode_reply(envelope: &Envelope) -> Result<RequestResponse, StpError> {
    if envelope.method != METHOD_REQUEST_RESPONSE {
        return Err(StpError::Protocol(format!(
            "Expected {}, got {}",
            METHOD_REQUEST_RESPONSE, envelope.method
        )));
    }
    envelope.params_as()
}

/// Pull the session id out of a Register reply.
///
/// The service answers either with the id itself or with `{ "sessionId": .. }`.
pub fn registered_session_id(result: &Value) -> Option<String> {
    match result {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Object(map) => map
            .get("sessionId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs();
    if timeout.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
