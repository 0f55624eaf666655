//! `replay` subcommand — drive the plugin with recorded host events.
//!
//! Input is one JSON object per line, in the host's event format. Blank lines
//! and lines starting with `#` are skipped. One extra line type is accepted
//! to script the simulated mixer:
//!
//! ```text
//! {"event":"simulateMute","strip":2,"muted":true}
//! ```
//!
//! Every message the plugin sends back is printed to stdout as one JSON line.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use stripmute_lib::host::{HostEvent, HostSink, OutboundMessage, Target};
use stripmute_lib::mixer::Mixer;
use stripmute_lib::mixer::mock::MockRemote;
use stripmute_lib::plugin::StripMutePlugin;
use stripmute_lib::registry::InstanceId;

use super::Result;

const SIMULATE_MUTE_EVENT: &str = "simulateMute";

/// [`HostSink`] that writes each outbound message as a JSON line.
pub(super) struct JsonLinesHost<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesHost<W> {
    pub(super) fn new(out: W) -> Self {
        JsonLinesHost {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, msg: &OutboundMessage) {
        let line = match serde_json::to_string(msg) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("could not encode {} message: {e}", msg.context());
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            log::warn!("could not write message: {e}");
        }
    }
}

impl<W: Write + Send> HostSink for JsonLinesHost<W> {
    fn set_image(&self, context: &InstanceId, image: &str, target: Target) {
        self.emit(&OutboundMessage::set_image(context, image, target));
    }

    fn send_to_inspector(&self, action: &str, context: &InstanceId, payload: &Value) {
        self.emit(&OutboundMessage::send_to_inspector(action, context, payload));
    }

    fn persist_settings(&self, context: &InstanceId, payload: &Value) {
        self.emit(&OutboundMessage::persist_settings(context, payload));
    }
}

/// One parsed input line.
#[derive(Debug, PartialEq)]
enum ReplayLine {
    Event(HostEvent),
    SimulateMute { strip: u32, muted: bool },
}

fn parse_line(line: &str) -> std::result::Result<ReplayLine, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    if value.get("event").and_then(Value::as_str) == Some(SIMULATE_MUTE_EVENT) {
        let strip = value
            .get("strip")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or("simulateMute needs a non-negative \"strip\"")?;
        let muted = value
            .get("muted")
            .and_then(Value::as_bool)
            .ok_or("simulateMute needs a boolean \"muted\"")?;
        return Ok(ReplayLine::SimulateMute { strip, muted });
    }
    serde_json::from_value(value)
        .map(ReplayLine::Event)
        .map_err(|e| e.to_string())
}

/// Feed every line of `input` to the plugin. Returns the number of lines
/// applied; malformed lines are logged and skipped.
fn replay_lines<H: HostSink + 'static>(
    input: impl BufRead,
    plugin: &StripMutePlugin<MockRemote, H>,
) -> Result<usize> {
    let mut applied = 0;
    for (n, line) in input.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Ok(ReplayLine::Event(event)) => {
                log::debug!("line {}: {}", n + 1, event.name());
                plugin.handle_event(&event);
            }
            Ok(ReplayLine::SimulateMute { strip, muted }) => {
                log::debug!("line {}: strip {strip} muted={muted} (simulated)", n + 1);
                plugin.mixer().remote().set_strip_muted(strip, muted);
            }
            Err(e) => {
                log::warn!("line {}: skipped: {e}", n + 1);
                continue;
            }
        }
        applied += 1;
    }
    Ok(applied)
}

pub(super) fn cmd_replay(
    file: Option<&Path>,
    strips: u32,
    linger_ms: u64,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = super::load_config(config_path);
    let input: Box<dyn BufRead> = match file {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(std::io::stdin().lock()),
    };

    let mixer = Arc::new(Mixer::connect(MockRemote::with_strips(strips))?);
    let host = Arc::new(JsonLinesHost::new(std::io::stdout()));
    let plugin = StripMutePlugin::new(mixer, host, &config)?;

    let applied = replay_lines(input, &plugin)?;
    log::info!("replayed {applied} lines, lingering {linger_ms} ms");
    std::thread::sleep(Duration::from_millis(linger_ms));
    plugin.shutdown();
    Ok(())
}
