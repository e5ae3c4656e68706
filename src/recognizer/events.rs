//! Inbound notifications
//!
//! The service publishes `{method, params}` envelopes. Known methods decode
//! into a `Notification` variant; anything else becomes `Unrecognized` so a
//! newer service can add notification kinds without breaking older clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{Severity, Symbol, Task, TaskOrg};
use crate::connector::Envelope;
use crate::error::StpError;

/// The notification kinds this client knows how to handle.
///
/// The wire name of each kind is its variant name, except `C2SimSymbolReport`
/// which travels as `C2SIMSymbolReport`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    SymbolAdded,
    SymbolModified,
    SymbolDeleted,
    InkProcessed,
    SpeechRecognized,
    StpMessage,
    RoleSwitched,
    TaskOrgAdded,
    TaskOrgModified,
    TaskOrgDeleted,
    TaskOrgSwitched,
    TaskAdded,
    TaskModified,
    TaskDeleted,
    C2SimSymbolReport,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        EventKind::SymbolAdded,
        EventKind::SymbolModified,
        EventKind::SymbolDeleted,
        EventKind::InkProcessed,
        EventKind::SpeechRecognized,
        EventKind::StpMessage,
        EventKind::RoleSwitched,
        EventKind::TaskOrgAdded,
        EventKind::TaskOrgModified,
        EventKind::TaskOrgDeleted,
        EventKind::TaskOrgSwitched,
        EventKind::TaskAdded,
        EventKind::TaskModified,
        EventKind::TaskDeleted,
        EventKind::C2SimSymbolReport,
    ];

    /// Method name on the wire; also the solvable name sent in Register.
    pub fn method(self) -> &'static str {
        match self {
            EventKind::SymbolAdded => "SymbolAdded",
            EventKind::SymbolModified => "SymbolModified",
            EventKind::SymbolDeleted => "SymbolDeleted",
            EventKind::InkProcessed => "InkProcessed",
            EventKind::SpeechRecognized => "SpeechRecognized",
            EventKind::StpMessage => "StpMessage",
            EventKind::RoleSwitched => "RoleSwitched",
            EventKind::TaskOrgAdded => "TaskOrgAdded",
            EventKind::TaskOrgModified => "TaskOrgModified",
            EventKind::TaskOrgDeleted => "TaskOrgDeleted",
            EventKind::TaskOrgSwitched => "TaskOrgSwitched",
            EventKind::TaskAdded => "TaskAdded",
            EventKind::TaskModified => "TaskModified",
            EventKind::TaskDeleted => "TaskDeleted",
            EventKind::C2SimSymbolReport => "C2SIMSymbolReport",
        }
    }

    pub fn from_method(method: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.method() == method)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolAdded {
    /// Ranked recognition alternates; the first is the service's best guess
    pub alternates: Vec<Symbol>,
    #[serde(default)]
    pub is_undo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolModified {
    pub poid: String,
    pub symbol: Symbol,
    #[serde(default)]
    pub is_undo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolDeleted {
    pub poid: String,
    #[serde(default)]
    pub is_undo: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InkProcessed {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechRecognized {
    #[serde(default)]
    pub phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StpMessage {
    #[serde(rename = "msg")]
    pub message: String,
    pub level: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSwitched {
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOrgAdded {
    pub task_org: TaskOrg,
    #[serde(default)]
    pub is_undo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOrgModified {
    pub poid: String,
    pub task_org: TaskOrg,
    #[serde(default)]
    pub is_undo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOrgDeleted {
    pub poid: String,
    #[serde(default)]
    pub is_undo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOrgSwitched {
    pub task_org: TaskOrg,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAdded {
    pub poid: String,
    pub task: Task,
    #[serde(default)]
    pub is_undo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskModified {
    pub poid: String,
    pub task: Task,
    #[serde(default)]
    pub is_undo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDeleted {
    pub poid: String,
    #[serde(default)]
    pub is_undo: bool,
}

/// Symbols reported through a C2SIM exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct C2SimSymbolReport {
    pub symbols: Vec<Symbol>,
}

/// A decoded inbound notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    SymbolAdded(SymbolAdded),
    SymbolModified(SymbolModified),
    SymbolDeleted(SymbolDeleted),
    InkProcessed(InkProcessed),
    SpeechRecognized(SpeechRecognized),
    StpMessage(StpMessage),
    RoleSwitched(RoleSwitched),
    TaskOrgAdded(TaskOrgAdded),
    TaskOrgModified(TaskOrgModified),
    TaskOrgDeleted(TaskOrgDeleted),
    TaskOrgSwitched(TaskOrgSwitched),
    TaskAdded(TaskAdded),
    TaskModified(TaskModified),
    TaskDeleted(TaskDeleted),
    C2SimSymbolReport(C2SimSymbolReport),
    /// A method this client does not know
    Unrecognized { method: String, params: Value },
}

impl Notification {
    /// Decode an envelope.
    ///
    /// Unknown methods decode to `Unrecognized`; a known method with params
    /// that do not fit its payload is a Protocol error.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, StpError> {
        let Some(kind) = EventKind::from_method(&envelope.method) else {
            return Ok(Notification::Unrecognized {
                method: envelope.method,
                params: envelope.params,
            });
        };

        let notification = match kind {
            EventKind::SymbolAdded => Notification::SymbolAdded(envelope.params_as()?),
            EventKind::SymbolModified => Notification::SymbolModified(envelope.params_as()?),
            EventKind::SymbolDeleted => Notification::SymbolDeleted(envelope.params_as()?),
            EventKind::InkProcessed => Notification::InkProcessed(envelope.params_as()?),
            EventKind::SpeechRecognized => Notification::SpeechRecognized(envelope.params_as()?),
            EventKind::StpMessage => Notification::StpMessage(envelope.params_as()?),
            EventKind::RoleSwitched => Notification::RoleSwitched(envelope.params_as()?),
            EventKind::TaskOrgAdded => Notification::TaskOrgAdded(envelope.params_as()?),
            EventKind::TaskOrgModified => Notification::TaskOrgModified(envelope.params_as()?),
            EventKind::TaskOrgDeleted => Notification::TaskOrgDeleted(envelope.params_as()?),
            EventKind::TaskOrgSwitched => Notification::TaskOrgSwitched(envelope.params_as()?),
            EventKind::TaskAdded => Notification::TaskAdded(envelope.params_as()?),
            EventKind::TaskModified => Notification::TaskModified(envelope.params_as()?),
            EventKind::TaskDeleted => Notification::TaskDeleted(envelope.params_as()?),
            EventKind::C2SimSymbolReport => Notification::C2SimSymbolReport(envelope.params_as()?),
        };
        Ok(notification)
    }

    /// The kind, or None for `Unrecognized`.
    pub fn kind(&self) -> Option<EventKind> {
        let kind = match self {
            Notification::SymbolAdded(_) => EventKind::SymbolAdded,
            Notification::SymbolModified(_) => EventKind::SymbolModified,
            Notification::SymbolDeleted(_) => EventKind::SymbolDeleted,
            Notification::InkProcessed(_) => EventKind::InkProcessed,
            Notification::SpeechRecognized(_) => EventKind::SpeechRecognized,
            Notification::StpMessage(_) => EventKind::StpMessage,
            Notification::RoleSwitched(_) => EventKind::RoleSwitched,
            Notification::TaskOrgAdded(_) => EventKind::TaskOrgAdded,
            Notification::TaskOrgModified(_) => EventKind::TaskOrgModified,
            Notification::TaskOrgDeleted(_) => EventKind::TaskOrgDeleted,
            Notification::TaskOrgSwitched(_) => EventKind::TaskOrgSwitched,
            Notification::TaskAdded(_) => EventKind::TaskAdded,
            Notification::TaskModified(_) => EventKind::TaskModified,
            Notification::TaskDeleted(_) => EventKind::TaskDeleted,
            Notification::C2SimSymbolReport(_) => EventKind::C2SimSymbolReport,
            Notification::Unrecognized { .. } => return None,
        };
        Some(kind)
    }
}
