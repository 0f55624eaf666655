//! Host application interface — inbound events and outbound commands.
//!
//! The transport (socket, registration handshake) lives outside this crate.
//! Inbound messages are parsed into [`HostEvent`]; everything the plugin
//! sends back goes through the [`HostSink`] capability, whose calls map
//! one-to-one onto [`OutboundMessage`] JSON objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::InstanceId;

/// Which surfaces an image update applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Target {
    #[default]
    HardwareAndSoftware,
    Hardware,
    Software,
}

impl From<Target> for u8 {
    fn from(t: Target) -> u8 {
        match t {
            Target::HardwareAndSoftware => 0,
            Target::Hardware => 1,
            Target::Software => 2,
        }
    }
}

impl TryFrom<u8> for Target {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Target::HardwareAndSoftware),
            1 => Ok(Target::Hardware),
            2 => Ok(Target::Software),
            other => Err(format!("unknown target {other}")),
        }
    }
}

/// Outbound capability provided by the host connection.
///
/// Calls are fire-and-forget; implementations log their own delivery errors.
pub trait HostSink: Send + Sync {
    /// Replace the image shown on a key.
    ///
    /// Called with the instance registry locked; must not block on the host.
    fn set_image(&self, context: &InstanceId, image: &str, target: Target);
    /// Send a payload to the instance's property inspector.
    fn send_to_inspector(&self, action: &str, context: &InstanceId, payload: &Value);
    /// Store the instance's settings in the host.
    fn persist_settings(&self, context: &InstanceId, payload: &Value);
}

/// Fields shared by every per-key event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEvent {
    pub action: String,
    pub context: String,
    #[serde(default)]
    pub device: String,
    #[serde(default)]
    pub payload: Value,
}

/// Event delivered by the host, tagged by its `event` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
    WillAppear(ActionEvent),
    WillDisappear(ActionEvent),
    KeyDown(ActionEvent),
    KeyUp(ActionEvent),
    SendToPlugin(ActionEvent),
    DeviceDidConnect {
        device: String,
        #[serde(default, rename = "deviceInfo")]
        device_info: Value,
    },
    DeviceDidDisconnect {
        device: String,
    },
    /// Any event this plugin does not handle.
    #[serde(other)]
    Other,
}

impl HostEvent {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// The `event` name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            HostEvent::WillAppear(_) => "willAppear",
            HostEvent::WillDisappear(_) => "willDisappear",
            HostEvent::KeyDown(_) => "keyDown",
            HostEvent::KeyUp(_) => "keyUp",
            HostEvent::SendToPlugin(_) => "sendToPlugin",
            HostEvent::DeviceDidConnect { .. } => "deviceDidConnect",
            HostEvent::DeviceDidDisconnect { .. } => "deviceDidDisconnect",
            HostEvent::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub image: String,
    pub target: Target,
}

/// JSON shape of each [`HostSink`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum OutboundMessage {
    #[serde(rename = "setImage")]
    SetImage {
        context: String,
        payload: ImagePayload,
    },
    #[serde(rename = "sendToPropertyInspector")]
    SendToInspector {
        action: String,
        context: String,
        payload: Value,
    },
    #[serde(rename = "setSettings")]
    SetSettings { context: String, payload: Value },
}

impl OutboundMessage {
    pub fn set_image(context: &InstanceId, image: &str, target: Target) -> Self {
        OutboundMessage::SetImage {
            context: context.to_string(),
            payload: ImagePayload {
                image: image.to_string(),
                target,
            },
        }
    }

    pub fn send_to_inspector(action: &str, context: &InstanceId, payload: &Value) -> Self {
        OutboundMessage::SendToInspector {
            action: action.to_string(),
            context: context.to_string(),
            payload: payload.clone(),
        }
    }

    pub fn persist_settings(context: &InstanceId, payload: &Value) -> Self {
        OutboundMessage::SetSettings {
            context: context.to_string(),
            payload: payload.clone(),
        }
    }

    pub fn context(&self) -> &str {
        match self {
            OutboundMessage::SetImage { context, .. }
            | OutboundMessage::SendToInspector { context, .. }
            | OutboundMessage::SetSettings { context, .. } => context,
        }
    }
}

/// [`HostSink`] that records every call, for tests and dry runs.
pub mod recording {
    use super::*;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    #[derive(Debug, Default)]
    pub struct RecordingHost {
        messages: Mutex<Vec<OutboundMessage>>,
    }

    impl RecordingHost {
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, Vec<OutboundMessage>> {
            self.messages.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Copy of everything recorded so far.
        pub fn messages(&self) -> Vec<OutboundMessage> {
            self.lock().clone()
        }

        /// Drain the recorded messages.
        pub fn take(&self) -> Vec<OutboundMessage> {
            std::mem::take(&mut *self.lock())
        }

        pub fn clear(&self) {
            self.lock().clear();
        }

        /// Images set on one instance, oldest first.
        pub fn images_for(&self, context: &str) -> Vec<String> {
            self.lock()
                .iter()
                .filter_map(|m| match m {
                    OutboundMessage::SetImage { context: c, payload } if c == context => {
                        Some(payload.image.clone())
                    }
                    _ => None,
                })
                .collect()
        }

        pub fn last_image(&self, context: &str) -> Option<String> {
            self.images_for(context).pop()
        }

        /// Payloads sent to one instance's property inspector.
        pub fn inspector_payloads(&self, context: &str) -> Vec<Value> {
            self.lock()
                .iter()
                .filter_map(|m| match m {
                    OutboundMessage::SendToInspector {
                        context: c,
                        payload,
                        ..
                    } if c == context => Some(payload.clone()),
                    _ => None,
                })
                .collect()
        }

        /// Settings persisted for one instance.
        pub fn persisted_settings(&self, context: &str) -> Vec<Value> {
            self.lock()
                .iter()
                .filter_map(|m| match m {
                    OutboundMessage::SetSettings { context: c, payload } if c == context => {
                        Some(payload.clone())
                    }
                    _ => None,
                })
                .collect()
        }
    }

    impl HostSink for RecordingHost {
        fn set_image(&self, context: &InstanceId, image: &str, target: Target) {
            self.lock()
                .push(OutboundMessage::set_image(context, image, target));
        }

        fn send_to_inspector(&self, action: &str, context: &InstanceId, payload: &Value) {
            self.lock()
                .push(OutboundMessage::send_to_inspector(action, context, payload));
        }

        fn persist_settings(&self, context: &InstanceId, payload: &Value) {
            self.lock()
                .push(OutboundMessage::persist_settings(context, payload));
        }
    }
}
