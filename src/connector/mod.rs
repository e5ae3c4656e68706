//! STP Service Connection Module
//!
//! # Architecture
//!
//! The module is organized by concern, with each submodule having a single responsibility:
//!
//! | Module       | Responsibility                                          |
//! |--------------|---------------------------------------------------------|
//! | `transport`  | WebSocket connect/send/receive                          |
//! | `protocol`   | JSON envelopes, Register/Request/RequestResponse shapes |
//! | `timeout`    | Timeout guard and timeout coercion                      |
//! | `correlator` | Cookie allocation and reply demultiplexing              |
//! | `connection` | The `Connector`: session lifecycle and reconnection     |
//!
//! # Usage
//!
//! ```ignore
//! use stp_client::connector::{Connector, ConnectorConfig};
//!
//! let connector = Connector::new(ConnectorConfig::default(), observer);
//!
//! // Blocks until the service has acknowledged Register
//! let session_id = connector
//!     .connect("Sample", vec!["SymbolAdded".into()], None)
//!     .await?;
//!
//! // Correlated request; the reply is matched by cookie
//! let active = connector
//!     .request(Envelope::new("HasActiveScenario", json!({}))?, None)
//!     .await?;
//! ```
//!
//! # Timeouts
//!
//! Every call takes an `Option<Duration>`. `None` and zero both select the
//! configured default (30 seconds unless configured). No call waits forever.

mod transport;

pub mod protocol;
pub mod timeout;

mod connection;
mod correlator;

// Re-export the public API
pub use connection::{ConnectionObserver, ConnectionState, Connector, ConnectorConfig};
pub use correlator::Correlator;
pub use protocol::Envelope;
pub use timeout::{effective_timeout, DEFAULT_TIMEOUT};
