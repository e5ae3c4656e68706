//! Payload types exchanged with the STP service
//!
//! These mirror what the map adapters, speech recognizer and renderer hand to
//! (or receive from) the client. Geometry and symbology details stay opaque in
//! `attributes`: the client relays them without interpreting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Pixel size of the map window a stroke was drawn in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub width: u32,
    pub height: u32,
}

/// A completed ink stroke, as reported by a map adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InkStroke {
    #[serde(rename = "pixelBoundsWindow")]
    pub pixel_bounds: PixelBounds,
    #[serde(rename = "topLeftGeoMap")]
    pub top_left: LatLon,
    #[serde(rename = "bottomRightGeoMap")]
    pub bottom_right: LatLon,
    #[serde(rename = "strokePoints")]
    pub points: Vec<LatLon>,
    #[serde(rename = "timeStrokeStart")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "timeStrokeEnd")]
    pub ended_at: DateTime<Utc>,
    /// Symbols the stroke passes over
    #[serde(default)]
    pub intersected_poids: Vec<String>,
}

/// One hypothesis from the speech recognizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechAlternate {
    pub text: String,
    pub confidence: f64,
}

/// A final speech recognition result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRecognition {
    pub results: Vec<SpeechAlternate>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// A recognized or user-placed symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Symbol {
    /// Persistent object id
    pub poid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Everything else (location, geometry, modifiers), relayed untouched
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Symbol {
    pub fn new(poid: impl Into<String>) -> Self {
        Self {
            poid: poid.into(),
            description: None,
            sidc: None,
            confidence: None,
            attributes: Map::new(),
        }
    }
}

/// A task organization (order of battle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOrg {
    pub poid: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// A task assigned within a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub poid: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Severity of an `StpMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}
