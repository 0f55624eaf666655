//! StripMute — Stream Deck key that toggles and mirrors a Voicemeeter strip's mute.

pub mod config;
pub mod error;
pub mod host;
pub mod icons;
pub mod mixer;
pub mod plugin;
pub mod poller;
pub mod registry;
pub mod settings;

pub use error::StripmuteError;
