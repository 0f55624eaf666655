//! Unified error type for the stripmute-lib crate.
//!
//! [`StripmuteError`] wraps module-specific errors (`MixerError`, `SettingsError`)
//! and domain-specific error kinds (`Config`, `Icon`). `From` impls allow `?`
//! to propagate across module boundaries.

use std::fmt;

use crate::mixer::MixerError;
use crate::settings::SettingsError;

/// Unified error type for stripmute-lib operations.
#[derive(Debug)]
pub enum StripmuteError {
    /// Mixer remote binding, session, or parameter error.
    Mixer(MixerError),
    /// Malformed or out-of-range settings payload.
    Settings(SettingsError),
    /// Standard I/O error (config persistence, icon files).
    Io(std::io::Error),
    /// Configuration validation error.
    Config(String),
    /// Icon loading error.
    Icon(String),
}

impl fmt::Display for StripmuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripmuteError::Mixer(e) => write!(f, "{e}"),
            StripmuteError::Settings(e) => write!(f, "{e}"),
            StripmuteError::Io(e) => write!(f, "I/O error: {e}"),
            StripmuteError::Config(e) => write!(f, "Config error: {e}"),
            StripmuteError::Icon(e) => write!(f, "Icon error: {e}"),
        }
    }
}

impl std::error::Error for StripmuteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StripmuteError::Mixer(e) => Some(e),
            StripmuteError::Settings(e) => Some(e),
            StripmuteError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MixerError> for StripmuteError {
    fn from(e: MixerError) -> Self {
        StripmuteError::Mixer(e)
    }
}

impl From<SettingsError> for StripmuteError {
    fn from(e: SettingsError) -> Self {
        StripmuteError::Settings(e)
    }
}

impl From<std::io::Error> for StripmuteError {
    fn from(e: std::io::Error) -> Self {
        StripmuteError::Io(e)
    }
}

/// Crate-level Result alias using [`StripmuteError`].
pub type Result<T> = std::result::Result<T, StripmuteError>;
