//! Per-instance settings payloads exchanged with the host and the property
//! inspector: `{ "strip_number": <integer> }`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Settings key holding the strip index.
pub const STRIP_NUMBER_KEY: &str = "strip_number";

/// Inspector flag asking for the current settings instead of writing them.
pub const DATA_REQUEST_KEY: &str = "DATAREQUEST";

/// Strip used when an instance appears without (valid) settings.
pub const DEFAULT_STRIP: u32 = 0;

/// Persisted settings of one key instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripSettings {
    pub strip_number: u32,
}

impl StripSettings {
    pub fn to_value(self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// No `strip_number` key in the payload.
    MissingStrip,
    /// `strip_number` is present but not an integer.
    NotAnInteger(Value),
    /// `strip_number` is below zero.
    NegativeStrip(i64),
    /// `strip_number` does not fit a strip index.
    OutOfRange(u64),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::MissingStrip => write!(f, "settings have no {STRIP_NUMBER_KEY}"),
            SettingsError::NotAnInteger(v) => {
                write!(f, "{STRIP_NUMBER_KEY} must be an integer, got {v}")
            }
            SettingsError::NegativeStrip(n) => {
                write!(f, "{STRIP_NUMBER_KEY} must not be negative, got {n}")
            }
            SettingsError::OutOfRange(n) => write!(f, "{STRIP_NUMBER_KEY} {n} is out of range"),
        }
    }
}

impl std::error::Error for SettingsError {}

/// What the property inspector asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectorRequest {
    /// Reply with the instance's current settings.
    DataRequest,
    /// Store a new strip for the instance.
    Write(StripSettings),
}

/// Read and validate `strip_number` from a settings object.
pub fn parse_strip(settings: &Value) -> Result<u32, SettingsError> {
    let raw = settings
        .get(STRIP_NUMBER_KEY)
        .ok_or(SettingsError::MissingStrip)?;
    if let Some(n) = raw.as_u64() {
        return u32::try_from(n).map_err(|_| SettingsError::OutOfRange(n));
    }
    match raw.as_i64() {
        Some(n) => Err(SettingsError::NegativeStrip(n)),
        None => Err(SettingsError::NotAnInteger(raw.clone())),
    }
}

/// Strip for a newly appearing instance: its saved settings if valid,
/// otherwise [`DEFAULT_STRIP`].
pub fn strip_or_default(settings: Option<&Value>) -> u32 {
    let Some(settings) = settings else {
        return DEFAULT_STRIP;
    };
    match parse_strip(settings) {
        Ok(strip) => strip,
        Err(SettingsError::MissingStrip) => DEFAULT_STRIP,
        Err(e) => {
            log::warn!("ignoring saved settings ({e}), using strip {DEFAULT_STRIP}");
            DEFAULT_STRIP
        }
    }
}

/// Classify a payload sent from the property inspector.
///
/// `DATAREQUEST` only counts when it is literally `true`; anything else is
/// treated as a write and validated.
pub fn parse_inspector_payload(payload: &Value) -> Result<InspectorRequest, SettingsError> {
    if payload.get(DATA_REQUEST_KEY).and_then(Value::as_bool) == Some(true) {
        return Ok(InspectorRequest::DataRequest);
    }
    parse_strip(payload).map(|strip_number| InspectorRequest::Write(StripSettings { strip_number }))
}
