//! STP Client - protocol layer for the STP sketch-recognition service
//!
//! Connects to the service over a WebSocket, relays pen, ink, speech and
//! symbol edits to it, and hands recognition results back to the application.
//!
//! ## Architecture
//!
//! ```text
//! application ──► Recognizer ──► Correlator ──► Connector ──► WebSocket
//!      ▲              │                              │
//!      └── handlers ◄─┴──── Dispatcher ◄── reader ───┘
//! ```
//!
//! | Layer         | Role |
//! |---------------|------|
//! | `connector`   | One WebSocket session: register, reconnect once, correlate replies |
//! | `recognizer`  | Typed operations out, typed notifications in |
//! | `identity`    | Client names and machine ids |
//! | `config`      | TOML configuration |

pub mod config;
pub mod connector;
pub mod error;
pub mod identity;
pub mod recognizer;

pub use config::Config;
pub use connector::{ConnectionState, Connector, ConnectorConfig, Envelope};
pub use error::{Result, StpError};
pub use recognizer::{EventKind, Handlers, Notification, Recognizer, Severity};
