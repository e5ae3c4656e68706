//! Recognizer Façade
//!
//! Turns typed application calls into envelopes and inbound envelopes into
//! typed callbacks.
//!
//! | Module     | Responsibility                                   |
//! |------------|--------------------------------------------------|
//! | `types`    | Payloads exchanged with map, speech and renderer |
//! | `events`   | Notification kinds and their payloads            |
//! | `handlers` | Callback table and subscription set              |
//!
//! # Error Handling
//!
//! Fire-and-forget operations (pen-down, ink, speech, symbol edits) never
//! return an error: a failure is reported to the `StpMessage` handler at
//! `Error` severity, and logged. Correlated operations (scenario, task-org,
//! role, C2SIM) return their error to the caller, including the service's own
//! payload on `success: false`.
//!
//! # Usage
//!
//! ```ignore
//! let handlers = Handlers::new().on_symbol_added(|added| {
//!     println!("best guess: {}", added.alternates[0].poid);
//! });
//! let recognizer = Recognizer::new(&config, handlers);
//! recognizer.connect(None).await?;
//! recognizer.send_pen_down(LatLon::new(1.0, 2.0), Utc::now()).await;
//! ```

pub mod events;
pub mod handlers;
pub mod types;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::connector::{ConnectionObserver, Connector, ConnectorConfig, Envelope};
use crate::error::StpError;

pub use events::{EventKind, Notification, StpMessage};
pub use handlers::Handlers;
pub use types::{
    InkStroke, LatLon, PixelBounds, Severity, SpeechAlternate, SpeechRecognition, Symbol, Task,
    TaskOrg,
};

/// Shown to the user when the connection is lost.
const CONNECTION_LOST_GUIDANCE: &str =
    "Check that the STP service is available and reload the application.";

#[derive(Serialize)]
struct PenDownParams {
    location: LatLon,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct SymbolParams<'a> {
    symbol: &'a Symbol,
}

#[derive(Serialize)]
struct UpdateSymbolParams<'a> {
    poid: &'a str,
    symbol: &'a Symbol,
}

#[derive(Serialize)]
struct PoidParams<'a> {
    poid: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChooseAlternateParams<'a> {
    poid: &'a str,
    alternate_number: usize,
}

#[derive(Serialize)]
struct NameParams<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct ContentParams<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct RoleParams<'a> {
    role: &'a str,
}

#[derive(Serialize)]
struct InitializeParams {
    initialize: bool,
}

/// Routes connector output to the bound handlers.
struct Dispatcher {
    handlers: Handlers,
}

impl Dispatcher {
    /// Deliver a client-side message through the `StpMessage` handler.
    fn report(&self, message: StpMessage) {
        let (level, text) = (message.level, message.message.clone());
        if !self.handlers.dispatch(Notification::StpMessage(message)) {
            debug!(level = ?level, message = %text, "No StpMessage handler bound");
        }
    }

    fn report_failure(&self, method: &str, error: &StpError) {
        error!(method = %method, error = %error, "Failed to send to STP service");
        self.report(StpMessage {
            message: format!("Failed to send {}: {}", method, error),
            level: Severity::Error,
        });
    }
}

impl ConnectionObserver for Dispatcher {
    fn on_notification(&self, envelope: Envelope) {
        match Notification::from_envelope(envelope) {
            Ok(Notification::Unrecognized { method, .. }) => {
                warn!(method = %method, "Ignoring unknown notification");
            }
            Ok(notification) => {
                let kind = notification.kind();
                if !self.handlers.dispatch(notification) {
                    debug!(kind = ?kind, "No handler bound, notification dropped");
                }
            }
            Err(e) => warn!(error = %e, "Dropping malformed notification"),
        }
    }

    fn on_connection_error(&self, error: &StpError) {
        error!(error = %error, "Lost connection to STP service");
        self.report(StpMessage {
            message: format!(
                "Lost connection to the STP service ({}). {}",
                error, CONNECTION_LOST_GUIDANCE
            ),
            level: Severity::Error,
        });
    }
}

/// Client façade for the STP service. Cheap to clone.
#[derive(Clone)]
pub struct Recognizer {
    connector: Connector,
    dispatcher: Arc<Dispatcher>,
    service_name: String,
}

impl Recognizer {
    pub fn new(config: &Config, handlers: Handlers) -> Self {
        Self::with_connector_config(
            config.connector_config(),
            config.service_name.clone(),
            handlers,
        )
    }

    pub fn with_connector_config(
        connector_config: ConnectorConfig,
        service_name: impl Into<String>,
        handlers: Handlers,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher { handlers });
        let observer: Arc<dyn ConnectionObserver> = dispatcher.clone();
        Self {
            connector: Connector::new(connector_config, observer),
            dispatcher,
            service_name: service_name.into(),
        }
    }

    /// Connect and register, advertising the kinds that have a handler.
    pub async fn connect(&self, timeout: Option<Duration>) -> Result<String, StpError> {
        self.connector
            .connect(&self.service_name, self.solvables(), timeout)
            .await
    }

    pub async fn disconnect(&self, timeout: Option<Duration>) -> Result<(), StpError> {
        self.connector.disconnect(timeout).await
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn solvables(&self) -> Vec<String> {
        self.dispatcher.handlers.solvables()
    }

    // ----- fire-and-forget -----

    /// A stroke has started at `location`.
    pub async fn send_pen_down(&self, location: LatLon, timestamp: DateTime<Utc>) {
        self.inform("SendPenDown", &PenDownParams { location, timestamp })
            .await
    }

    pub async fn send_ink(&self, stroke: &InkStroke) {
        self.inform("SendInk", stroke).await
    }

    pub async fn send_speech_recognition(&self, recognition: &SpeechRecognition) {
        self.inform("SendSpeechRecognition", recognition).await
    }

    pub async fn add_symbol(&self, symbol: &Symbol) {
        self.inform("AddSymbol", &SymbolParams { symbol }).await
    }

    pub async fn update_symbol(&self, poid: &str, symbol: &Symbol) {
        self.inform("UpdateSymbol", &UpdateSymbolParams { poid, symbol })
            .await
    }

    pub async fn delete_symbol(&self, poid: &str) {
        self.inform("DeleteSymbol", &PoidParams { poid }).await
    }

    /// Replace a recognized symbol with one of its other alternates.
    pub async fn choose_alternate(&self, poid: &str, alternate_number: usize) {
        self.inform(
            "ChooseAlternate",
            &ChooseAlternateParams {
                poid,
                alternate_number,
            },
        )
        .await
    }

    pub async fn reset_command_context(&self) {
        self.inform("ResetCommandContext", &Map::new()).await
    }

    // ----- correlated -----

    pub async fn create_new_scenario(
        &self,
        name: &str,
        timeout: Option<Duration>,
    ) -> Result<(), StpError> {
        self.request("CreateNewScenario", &NameParams { name }, timeout)
            .await
            .map(drop)
    }

    pub async fn join_scenario_session(&self, timeout: Option<Duration>) -> Result<(), StpError> {
        self.request("JoinScenarioSession", &Map::new(), timeout)
            .await
            .map(drop)
    }

    pub async fn has_active_scenario(&self, timeout: Option<Duration>) -> Result<bool, StpError> {
        let result = self
            .request("HasActiveScenario", &Map::new(), timeout)
            .await?;
        result.as_bool().ok_or_else(|| {
            StpError::Protocol(format!("HasActiveScenario returned {}", result))
        })
    }

    /// Serialized content of the current scenario.
    pub async fn get_scenario_content(
        &self,
        timeout: Option<Duration>,
    ) -> Result<String, StpError> {
        let result = self
            .request("GetScenarioContent", &Map::new(), timeout)
            .await?;
        content_from("GetScenarioContent", result)
    }

    /// Replace the current scenario with `content`.
    pub async fn load_new_scenario(
        &self,
        content: &str,
        timeout: Option<Duration>,
    ) -> Result<(), StpError> {
        self.request("LoadNewScenario", &ContentParams { content }, timeout)
            .await
            .map(drop)
    }

    /// Merge `content` into the current scenario.
    pub async fn load_add_scenario(
        &self,
        content: &str,
        timeout: Option<Duration>,
    ) -> Result<(), StpError> {
        self.request("LoadAddScenario", &ContentParams { content }, timeout)
            .await
            .map(drop)
    }

    pub async fn sync_scenario(&self, timeout: Option<Duration>) -> Result<(), StpError> {
        self.request("SyncScenario", &Map::new(), timeout)
            .await
            .map(drop)
    }

    pub async fn import_task_org_content(
        &self,
        content: &str,
        timeout: Option<Duration>,
    ) -> Result<(), StpError> {
        self.request("ImportTaskOrgContent", &ContentParams { content }, timeout)
            .await
            .map(drop)
    }

    pub async fn set_current_task_org(
        &self,
        poid: &str,
        timeout: Option<Duration>,
    ) -> Result<(), StpError> {
        self.request("SetCurrentTaskOrg", &PoidParams { poid }, timeout)
            .await
            .map(drop)
    }

    pub async fn switch_role(&self, role: &str, timeout: Option<Duration>) -> Result<(), StpError> {
        self.request("SwitchRole", &RoleParams { role }, timeout)
            .await
            .map(drop)
    }

    /// Export the scenario as C2SIM. `initialize` requests an initialization
    /// document rather than an order.
    pub async fn export_c2sim_content(
        &self,
        initialize: bool,
        timeout: Option<Duration>,
    ) -> Result<String, StpError> {
        let result = self
            .request("ExportC2SIMContent", &InitializeParams { initialize }, timeout)
            .await?;
        content_from("ExportC2SIMContent", result)
    }

    pub async fn import_c2sim_content(
        &self,
        content: &str,
        timeout: Option<Duration>,
    ) -> Result<(), StpError> {
        self.request("ImportC2SIMContent", &ContentParams { content }, timeout)
            .await
            .map(drop)
    }

    async fn inform<P: Serialize>(&self, method: &str, params: &P) {
        let result = match Envelope::with_params(method, params) {
            Ok(envelope) => self.connector.inform(envelope, None).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.dispatcher.report_failure(method, &e);
        }
    }

    async fn request<P: Serialize>(
        &self,
        method: &str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<Value, StpError> {
        debug!(method = %method, "Sending request");
        let envelope = Envelope::with_params(method, params)?;
        self.connector.request(envelope, timeout).await
    }
}

/// Scenario and C2SIM content arrives as a string; anything else is
/// re-serialized so callers always get text.
fn content_from(method: &str, result: Value) -> Result<String, StpError> {
    match result {
        Value::String(content) => Ok(content),
        Value::Null => Err(StpError::Protocol(format!("{} returned no content", method))),
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recording_handlers() -> (Handlers, Arc<Mutex<Vec<StpMessage>>>) {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        let handlers = Handlers::new().on_stp_message(move |msg| sink.lock().unwrap().push(msg));
        (handlers, messages)
    }

    fn offline_recognizer(handlers: Handlers) -> Recognizer {
        let config = ConnectorConfig {
            url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        Recognizer::with_connector_config(config, "Sample", handlers)
    }

    #[test]
    fn test_pen_down_params_shape() {
        let params = PenDownParams {
            location: LatLon::new(1.0, 2.0),
            timestamp: "2024-01-01T00:00:00Z".parse().unwrap(),
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"location": {"lat": 1.0, "lon": 2.0}, "timestamp": "2024-01-01T00:00:00Z"})
        );
    }

    #[test]
    fn test_choose_alternate_params_shape() {
        let params = ChooseAlternateParams {
            poid: "p1",
            alternate_number: 2,
        };
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"poid": "p1", "alternateNumber": 2})
        );
    }

    #[test]
    fn test_content_from() {
        assert_eq!(content_from("X", json!("<xml/>")).unwrap(), "<xml/>");
        assert_eq!(content_from("X", json!({"a": 1})).unwrap(), r#"{"a":1}"#);
        assert!(matches!(
            content_from("X", Value::Null),
            Err(StpError::Protocol(_))
        ));
    }

    #[test]
    fn test_solvables_come_from_handlers() {
        let handlers = Handlers::new()
            .on_symbol_added(|_| {})
            .on_ink_processed(|_| {});
        let mut solvables = offline_recognizer(handlers).solvables();
        solvables.sort();
        assert_eq!(solvables, vec!["InkProcessed", "SymbolAdded"]);
    }

    #[tokio::test]
    async fn test_fire_and_forget_failure_goes_to_stp_message() {
        let (handlers, messages) = recording_handlers();
        let recognizer = offline_recognizer(handlers);

        recognizer.delete_symbol("p1").await;

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, Severity::Error);
        assert!(messages[0].message.contains("DeleteSymbol"));
    }

    #[tokio::test]
    async fn test_correlated_failure_is_returned() {
        let (handlers, messages) = recording_handlers();
        let recognizer = offline_recognizer(handlers);

        let result = recognizer.has_active_scenario(None).await;
        assert!(matches!(result, Err(StpError::NotConnected)));
        assert!(messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_connection_error_reports_guidance() {
        let (handlers, messages) = recording_handlers();
        let dispatcher = Dispatcher { handlers };

        dispatcher.on_connection_error(&StpError::ReconnectFailed("refused".into()));

        let messages = messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, Severity::Error);
        assert!(messages[0].message.contains("Check that the STP service is available"));
    }

    #[test]
    fn test_unknown_and_malformed_notifications_are_dropped() {
        let (handlers, messages) = recording_handlers();
        let dispatcher = Dispatcher { handlers };

        dispatcher.on_notification(Envelope::new("MapViewChanged", json!({})).unwrap());
        dispatcher.on_notification(Envelope::new("StpMessage", json!({"level": 3})).unwrap());

        assert!(messages.lock().unwrap().is_empty());
    }
}
