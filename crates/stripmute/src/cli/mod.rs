//! CLI subcommands — configuration display and event replay.

mod config_cmd;
mod replay;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Serialize;

pub(super) use stripmute_lib::config::Config;
pub(super) use stripmute_lib::error::Result;

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w - 2);
}

/// Load the config from `custom_path` if given, else from the platform
/// default. Parse problems are logged and defaults used.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    match custom_path {
        Some(path) => {
            let (config, warnings) = Config::load_from(path);
            for w in &warnings {
                log::warn!("{w}");
            }
            config
        }
        None => Config::load(),
    }
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub validation_errors: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show current configuration and file paths
    Config,

    /// Replay newline-delimited host events against a simulated mixer,
    /// printing every message the plugin sends back
    Replay {
        /// File of JSON events, one per line (default: stdin)
        file: Option<PathBuf>,
        /// Number of strips the simulated mixer exposes
        #[arg(long, default_value_t = stripmute_lib::mixer::mock::DEFAULT_STRIPS)]
        strips: u32,
        /// Keep polling this long after the last event, in milliseconds
        #[arg(long, default_value_t = 500)]
        linger_ms: u64,
    },
}

/// Warn if `--json` was passed to a command that doesn't support it.
fn warn_json_unsupported(cmd_name: &str) {
    log::warn!("--json is not supported for `{cmd_name}` (ignored)");
}

pub fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Config => config_cmd::cmd_config(json, config_path),
        Command::Replay {
            file,
            strips,
            linger_ms,
        } => {
            if json {
                // Output is already JSON lines.
                warn_json_unsupported("replay");
            }
            replay::cmd_replay(file.as_deref(), strips, linger_ms, config_path)
        }
    }
}
