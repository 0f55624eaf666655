//! `config` subcommand — show current configuration and file paths.

use std::path::Path;

use stripmute_lib::StripmuteError;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width};

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let validation_errors: Vec<String> = match config.validate() {
        Ok(()) => vec![],
        Err(errors) => errors.iter().map(ToString::to_string).collect(),
    };

    if json {
        let output = ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            validation_errors,
        };
        let text = serde_json::to_string_pretty(&output)
            .map_err(|e| StripmuteError::Config(e.to_string()))?;
        println!("{text}");
        return Ok(());
    }

    // Human-readable output
    let w = kv_width(
        &["Config file:"],
        &["poll_interval_ms:", "muted_icon_path:", "live_icon_path:"],
    );

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    kv_indent(
        "poll_interval_ms:",
        format_args!("{} ms", config.poll_interval_ms),
        w,
    );
    let icon_label = |path: &str| {
        if path.trim().is_empty() {
            "(built-in)".to_string()
        } else {
            path.to_string()
        }
    };
    kv_indent("muted_icon_path:", icon_label(&config.muted_icon_path), w);
    kv_indent("live_icon_path:", icon_label(&config.live_icon_path), w);

    if !validation_errors.is_empty() {
        println!();
        println!("Problems:");
        for e in &validation_errors {
            println!("  {e}");
        }
    }
    Ok(())
}
