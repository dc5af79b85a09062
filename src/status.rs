// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Read-only engine state and the local status protocol.
//!
//! [`Snapshot`] is plain data taken after a tick. The daemon serves it over
//! a Unix domain socket as newline-delimited JSON: the client sends a
//! [`Request`] and the daemon replies with a [`Response`].

use serde::{Deserialize, Serialize};

/// Engine state after a tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of ticks run so far
    pub tick: u64,
    pub sensors: Vec<SensorStatus>,
    pub fans: Vec<FanStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorStatus {
    pub name: String,
    /// "hwmon", "max" or "file"
    pub kind: String,
    /// Last good reading in degrees Celsius
    pub value: Option<f64>,
    /// Whether the latest tick's read succeeded
    pub ok: bool,
    /// For composite sensors, the input that produced the maximum
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hottest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanStatus {
    pub name: String,
    pub sensor: String,
    pub curve: String,
    /// Smoothed temperature seen on the latest tick
    pub temperature: Option<f64>,
    /// Percentage from the last accepted temperature
    pub fan_percent: Option<f64>,
    /// Duty value last written
    pub pwm: Option<u8>,
    /// A temperature change is waiting out the curve's response time
    pub pending: bool,
}

// ---------------------------------------------------------------------------
// Requests (client -> daemon)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Request the latest snapshot.
    #[serde(rename = "get_status")]
    GetStatus,
}

// ---------------------------------------------------------------------------
// Responses (daemon -> client)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    #[serde(rename = "status")]
    Status(Snapshot),

    /// Request could not be served.
    #[serde(rename = "error")]
    Error { message: String },
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Encode a message as a newline-delimited JSON string.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, serde_json::Error> {
    let mut s = serde_json::to_string(msg)?;
    s.push('\n');
    Ok(s)
}

/// Decode a message from a JSON string (newline-trimmed).
pub fn decode<'a, T: Deserialize<'a>>(s: &'a str) -> Result<T, serde_json::Error> {
    serde_json::from_str(s.trim())
}
