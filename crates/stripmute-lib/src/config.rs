//! Application configuration — TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Accepted range for `poll_interval_ms`.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;
pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Milliseconds between mixer polls. Default: 200.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Path to a custom PNG shown while muted. Empty = built-in.
    #[serde(default)]
    pub muted_icon_path: String,

    /// Path to a custom PNG shown while live. Empty = built-in.
    #[serde(default)]
    pub live_icon_path: String,
}

fn default_poll_interval_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Config {
            poll_interval_ms: default_poll_interval_ms(),
            muted_icon_path: String::new(),
            live_icon_path: String::new(),
        }
    }
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `poll_interval_ms` is outside the accepted range.
    PollInterval(u64),
    /// A custom icon path is invalid (`field` is `"muted_icon_path"` or `"live_icon_path"`).
    InvalidIconPath { field: &'static str, reason: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::PollInterval(ms) => write!(
                f,
                "Invalid poll_interval_ms: {ms} (must be {MIN_POLL_INTERVAL_MS}..={MAX_POLL_INTERVAL_MS})"
            ),
            ValidationError::InvalidIconPath { field, reason } => {
                write!(f, "Invalid {field}: {reason}")
            }
        }
    }
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        #[cfg(windows)]
        {
            dirs::config_dir().map(|p| p.join("StripMute"))
        }
        #[cfg(not(windows))]
        {
            dirs::config_dir().map(|p| p.join("stripmute"))
        }
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Read the config at the platform path. Problems are logged and the
    /// defaults used.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        let (config, warnings) = Self::load_from(&path);
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Read the config at `path`, falling back to defaults.
    ///
    /// A missing file is silent. An unreadable or unparsable file yields the
    /// defaults plus a warning describing why.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return (Self::default(), vec![]),
            Err(e) => {
                let warning = format!("cannot read {}, using defaults: {e}", path.display());
                return (Self::default(), vec![warning]);
            }
        };
        match toml::from_str(&text) {
            Ok(config) => (config, vec![]),
            Err(e) => {
                let warning = format!("config parse error ({}), using defaults: {e}", path.display());
                (Self::default(), vec![warning])
            }
        }
    }

    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !(MIN_POLL_INTERVAL_MS..=MAX_POLL_INTERVAL_MS).contains(&self.poll_interval_ms) {
            errors.push(ValidationError::PollInterval(self.poll_interval_ms));
        }

        for (field, path) in [
            ("muted_icon_path", &self.muted_icon_path),
            ("live_icon_path", &self.live_icon_path),
        ] {
            if let Err(e) = validate_icon_path(path) {
                errors.push(ValidationError::InvalidIconPath {
                    field,
                    reason: e.to_string(),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validate an icon path. Empty = built-in (always Ok).
/// Checks: `.png` extension, then the file itself (exists, size, signature).
pub fn validate_icon_path(path: &str) -> crate::error::Result<()> {
    let path = path.trim();
    if path.is_empty() {
        return Ok(());
    }
    let p = Path::new(path);
    match p.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => {}
        _ => {
            return Err(crate::StripmuteError::Config(format!(
                "Not a .png file: {path}"
            )));
        }
    }
    crate::icons::read_png(p).map(|_| ())
}
