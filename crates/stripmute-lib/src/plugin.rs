//! Plugin facade — host lifecycle events in, key images out.
//!
//! Each key instance moves Unknown → Visible (`willAppear`) → Removed
//! (`willDisappear`). Visible instances live in the [`InstanceRegistry`].
//! A [`Poller`] re-checks the mixer on a fixed interval; instance changes
//! force an immediate pass through the same refresh routine.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::StripmuteError;
use crate::config::{Config, MIN_POLL_INTERVAL_MS};
use crate::error::Result;
use crate::host::{HostEvent, HostSink, Target};
use crate::icons::MuteIcons;
use crate::mixer::{Mixer, RemoteApi};
use crate::poller::Poller;
use crate::registry::{InstanceId, InstanceRegistry};
use crate::settings::{self, InspectorRequest, StripSettings};

/// State shared between the host event thread and the poll thread.
struct Shared<R: RemoteApi, H: HostSink> {
    mixer: Arc<Mixer<R>>,
    registry: InstanceRegistry,
    host: Arc<H>,
    icons: MuteIcons,
}

impl<R: RemoteApi, H: HostSink> Shared<R, H> {
    /// Push the current mute image to every visible instance.
    ///
    /// Unforced passes bail out unless the mixer reports a change. The
    /// registry lock is held for the whole pass, `set_image` calls included.
    fn refresh(&self, forced: bool) {
        if !self.mixer.is_logged_in() {
            return;
        }
        if !forced && !self.mixer.is_dirty() {
            return;
        }
        self.registry.for_each(|id, config| {
            match self.mixer.is_muted(config.strip) {
                Ok(muted) => {
                    self.host
                        .set_image(id, self.icons.for_state(muted), Target::HardwareAndSoftware)
                }
                // Left as-is until the next successful poll.
                Err(e) => log::debug!("[refresh] {id}: {e}"),
            }
        });
    }
}

/// Mute toggle action for one plugin process.
pub struct StripMutePlugin<R: RemoteApi + 'static, H: HostSink + 'static> {
    shared: Arc<Shared<R, H>>,
    poller: Poller,
}

impl<R: RemoteApi + 'static, H: HostSink + 'static> StripMutePlugin<R, H> {
    /// Bind and log in to the mixer, then start the plugin.
    ///
    /// Fails if the mixer is unavailable; the plugin cannot run without it.
    pub fn initialize(host: Arc<H>, config: &Config) -> Result<Self> {
        let mixer = Mixer::<R>::initialize()?;
        Self::new(Arc::new(mixer), host, config)
    }

    /// Start the plugin on an existing mixer session, using the configured
    /// icons and poll interval. Rejects a config that fails validation.
    pub fn new(mixer: Arc<Mixer<R>>, host: Arc<H>, config: &Config) -> Result<Self> {
        if let Err(errors) = config.validate() {
            let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(StripmuteError::Config(reasons.join("; ")));
        }
        let icons = MuteIcons::load(&config.muted_icon_path, &config.live_icon_path)?;
        Ok(Self::with_icons(mixer, host, icons, config.poll_interval()))
    }

    pub fn with_icons(
        mixer: Arc<Mixer<R>>,
        host: Arc<H>,
        icons: MuteIcons,
        poll_interval: Duration,
    ) -> Self {
        let shared = Arc::new(Shared {
            mixer,
            registry: InstanceRegistry::new(),
            host,
            icons,
        });
        let min = Duration::from_millis(MIN_POLL_INTERVAL_MS);
        let poll_interval = if poll_interval < min {
            log::warn!("poll interval {poll_interval:?} too short, using {min:?}");
            min
        } else {
            poll_interval
        };
        let poller = Poller::new();
        let tick = Arc::clone(&shared);
        poller.start(poll_interval, move |forced| tick.refresh(forced));
        log::info!("plugin started (poll every {poll_interval:?})");
        StripMutePlugin { shared, poller }
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.shared.registry
    }

    pub fn mixer(&self) -> &Mixer<R> {
        &self.shared.mixer
    }

    pub fn host(&self) -> &H {
        &self.shared.host
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    /// True once the mixer session is gone; events are then dropped.
    fn is_shut_down(&self, event: &str, context: &str) -> bool {
        if self.shared.mixer.is_logged_in() {
            return false;
        }
        log::debug!("[{event}] {context}: plugin shut down, ignoring");
        true
    }

    /// Run one refresh pass on the calling thread.
    pub fn refresh(&self, forced: bool) {
        self.shared.refresh(forced);
    }

    /// Dispatch a parsed host event to the matching handler.
    pub fn handle_event(&self, event: &HostEvent) {
        match event {
            HostEvent::WillAppear(e) => {
                self.on_will_appear(&e.action, &e.context, &e.payload, &e.device)
            }
            HostEvent::WillDisappear(e) => {
                self.on_will_disappear(&e.action, &e.context, &e.payload, &e.device)
            }
            HostEvent::KeyDown(e) => self.on_key_down(&e.action, &e.context, &e.payload, &e.device),
            HostEvent::KeyUp(e) => self.on_key_up(&e.action, &e.context, &e.payload, &e.device),
            HostEvent::SendToPlugin(e) => {
                self.on_send_to_plugin(&e.action, &e.context, &e.payload, &e.device)
            }
            HostEvent::DeviceDidConnect { device, .. } => self.on_device_did_connect(device),
            HostEvent::DeviceDidDisconnect { device } => self.on_device_did_disconnect(device),
            HostEvent::Other => log::debug!("ignoring unhandled host event"),
        }
    }

    pub fn on_will_appear(&self, action: &str, context: &str, payload: &Value, _device: &str) {
        if self.is_shut_down("instance", context) {
            return;
        }
        let id = InstanceId::from(context);
        let saved = payload.get("settings").filter(|s| s.is_object());
        if let Some(saved) = saved {
            self.shared.host.send_to_inspector(action, &id, saved);
        }
        let strip = settings::strip_or_default(saved);
        self.shared.registry.upsert(id, strip);
        log::info!("[instance] {context} visible, strip {strip}");
        self.poller.trigger_now();
    }

    pub fn on_will_disappear(&self, _action: &str, context: &str, _payload: &Value, _device: &str) {
        if self.shared.registry.remove(context).is_some() {
            log::info!("[instance] {context} removed");
        }
    }

    /// Toggling happens on release only.
    pub fn on_key_down(&self, _action: &str, _context: &str, _payload: &Value, _device: &str) {}

    pub fn on_key_up(&self, _action: &str, context: &str, _payload: &Value, _device: &str) {
        if self.is_shut_down("key", context) {
            return;
        }
        // The instance may have disappeared between press and release.
        let Some(config) = self.shared.registry.get(context) else {
            log::debug!("[key] {context} released but not visible, ignoring");
            return;
        };
        // The resulting parameter change marks the mixer dirty, so the next
        // tick repaints the key.
        if let Err(e) = self.shared.mixer.toggle_mute(config.strip) {
            log::warn!("[key] {context}: could not toggle strip {}: {e}", config.strip);
        }
    }

    pub fn on_send_to_plugin(&self, action: &str, context: &str, payload: &Value, _device: &str) {
        if self.is_shut_down("inspector", context) {
            return;
        }
        let id = InstanceId::from(context);
        match settings::parse_inspector_payload(payload) {
            Ok(InspectorRequest::DataRequest) => match self.shared.registry.get(context) {
                Some(config) => {
                    let reply = StripSettings {
                        strip_number: config.strip,
                    }
                    .to_value();
                    match reply {
                        Ok(reply) => self.shared.host.send_to_inspector(action, &id, &reply),
                        Err(e) => log::warn!("[inspector] {context}: could not encode reply: {e}"),
                    }
                }
                None => log::debug!("[inspector] data request for unknown {context}"),
            },
            Ok(InspectorRequest::Write(new)) => {
                self.shared.host.persist_settings(&id, payload);
                if self.shared.registry.update(context, new.strip_number) {
                    log::info!("[instance] {context} now on strip {}", new.strip_number);
                    self.poller.trigger_now();
                } else {
                    log::debug!("[inspector] settings for unknown {context} not applied");
                }
            }
            Err(e) => log::warn!("[inspector] {context}: rejected settings: {e}"),
        }
    }

    pub fn on_device_did_connect(&self, device: &str) {
        log::info!("[device] {device} connected");
    }

    pub fn on_device_did_disconnect(&self, device: &str) {
        log::info!("[device] {device} disconnected");
    }

    /// Stop polling (waiting for an in-flight tick) and log out.
    pub fn shutdown(&self) {
        self.poller.stop();
        self.shared.mixer.logout();
    }
}

impl<R: RemoteApi + 'static, H: HostSink + 'static> Drop for StripMutePlugin<R, H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::recording::RecordingHost;
    use crate::mixer::mock::MockRemote;
    use serde_json::json;

    const ACTION: &str = "com.example.stripmute.toggle";

    /// Plugin whose poll loop effectively never ticks, so only forced
    /// refreshes and explicit `refresh()` calls produce images.
    fn quiet_plugin() -> StripMutePlugin<MockRemote, RecordingHost> {
        let mixer = Arc::new(Mixer::connect(MockRemote::new()).unwrap());
        StripMutePlugin::with_icons(
            mixer,
            Arc::new(RecordingHost::new()),
            MuteIcons::default(),
            Duration::from_secs(3600),
        )
    }

    fn appear(plugin: &StripMutePlugin<MockRemote, RecordingHost>, ctx: &str, settings: Value) {
        plugin.on_will_appear(ACTION, ctx, &json!({ "settings": settings }), "dev");
    }

    #[test]
    fn appear_registers_and_forces_refresh() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 3}));
        assert_eq!(plugin.registry().get("ctx1").map(|c| c.strip), Some(3));
        let icons = MuteIcons::default();
        assert_eq!(plugin.host().last_image("ctx1").as_deref(), Some(icons.live()));
    }

    #[test]
    fn appear_forwards_settings_to_inspector() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 2}));
        assert_eq!(
            plugin.host().inspector_payloads("ctx1"),
            vec![json!({"strip_number": 2})]
        );
    }

    #[test]
    fn appear_without_settings_defaults_to_strip_zero() {
        let plugin = quiet_plugin();
        plugin.on_will_appear(ACTION, "ctx1", &json!({}), "dev");
        assert_eq!(plugin.registry().get("ctx1").map(|c| c.strip), Some(0));
        assert!(plugin.host().inspector_payloads("ctx1").is_empty());
    }

    #[test]
    fn appear_shows_muted_image_for_muted_strip() {
        let plugin = quiet_plugin();
        plugin.mixer().remote().set_strip_muted(1, true);
        appear(&plugin, "ctx1", json!({"strip_number": 1}));
        let icons = MuteIcons::default();
        assert_eq!(plugin.host().last_image("ctx1").as_deref(), Some(icons.muted()));
    }

    #[test]
    fn disappear_removes_without_refresh() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 1}));
        plugin.host().clear();
        plugin.on_will_disappear(ACTION, "ctx1", &json!({}), "dev");
        assert!(plugin.registry().get("ctx1").is_none());
        assert!(plugin.host().messages().is_empty());
    }

    #[test]
    fn key_up_toggles_strip() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 3}));
        plugin.on_key_up(ACTION, "ctx1", &json!({}), "dev");
        assert!(plugin.mixer().is_muted(3).unwrap());
        plugin.on_key_up(ACTION, "ctx1", &json!({}), "dev");
        assert!(!plugin.mixer().is_muted(3).unwrap());
    }

    #[test]
    fn key_down_does_nothing() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 3}));
        plugin.host().clear();
        plugin.on_key_down(ACTION, "ctx1", &json!({}), "dev");
        assert_eq!(plugin.mixer().remote().write_count(), 0);
        assert!(plugin.host().messages().is_empty());
    }

    #[test]
    fn key_up_unknown_instance_is_ignored() {
        let plugin = quiet_plugin();
        plugin.on_key_up(ACTION, "ghost", &json!({}), "dev");
        assert_eq!(plugin.mixer().remote().write_count(), 0);
    }

    #[test]
    fn key_up_write_failure_leaves_state() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 0}));
        plugin
            .mixer()
            .remote()
            .fail_set
            .store(true, std::sync::atomic::Ordering::SeqCst);
        plugin.on_key_up(ACTION, "ctx1", &json!({}), "dev");
        assert!(!plugin.mixer().is_muted(0).unwrap());
    }

    #[test]
    fn unforced_refresh_needs_dirty_mixer() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 0}));
        // Consume whatever the appear pass left behind.
        plugin.mixer().is_dirty();
        plugin.host().clear();

        plugin.refresh(false);
        assert!(plugin.host().messages().is_empty());

        plugin.mixer().remote().set_strip_muted(0, true);
        plugin.refresh(false);
        let icons = MuteIcons::default();
        assert_eq!(plugin.host().images_for("ctx1"), vec![icons.muted().to_string()]);
    }

    #[test]
    fn refresh_skips_unreadable_strip() {
        let plugin = quiet_plugin();
        appear(&plugin, "good", json!({"strip_number": 0}));
        appear(&plugin, "bad", json!({"strip_number": 50}));
        plugin.host().clear();
        plugin.refresh(true);
        assert_eq!(plugin.host().images_for("good").len(), 1);
        assert!(plugin.host().images_for("bad").is_empty());
    }

    #[test]
    fn data_request_replies_with_strip() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 4}));
        plugin.host().clear();
        plugin.on_send_to_plugin(ACTION, "ctx1", &json!({"DATAREQUEST": true}), "");
        assert_eq!(
            plugin.host().inspector_payloads("ctx1"),
            vec![json!({"strip_number": 4})]
        );
        assert_eq!(plugin.registry().get("ctx1").map(|c| c.strip), Some(4));
    }

    #[test]
    fn data_request_unknown_instance_is_silent() {
        let plugin = quiet_plugin();
        plugin.on_send_to_plugin(ACTION, "ghost", &json!({"DATAREQUEST": true}), "");
        assert!(plugin.host().messages().is_empty());
    }

    #[test]
    fn settings_write_persists_updates_and_refreshes() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 0}));
        plugin.mixer().remote().set_strip_muted(5, true);
        plugin.host().clear();

        let payload = json!({"strip_number": 5});
        plugin.on_send_to_plugin(ACTION, "ctx1", &payload, "");
        assert_eq!(plugin.host().persisted_settings("ctx1"), vec![payload]);
        assert_eq!(plugin.registry().get("ctx1").map(|c| c.strip), Some(5));
        let icons = MuteIcons::default();
        assert_eq!(plugin.host().last_image("ctx1").as_deref(), Some(icons.muted()));
    }

    #[test]
    fn settings_write_negative_rejected() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 2}));
        plugin.host().clear();
        plugin.on_send_to_plugin(ACTION, "ctx1", &json!({"strip_number": -1}), "");
        assert_eq!(plugin.registry().get("ctx1").map(|c| c.strip), Some(2));
        assert!(plugin.host().messages().is_empty());
    }

    #[test]
    fn settings_write_malformed_rejected() {
        let plugin = quiet_plugin();
        appear(&plugin, "ctx1", json!({"strip_number": 2}));
        plugin.host().clear();
        plugin.on_send_to_plugin(ACTION, "ctx1", &json!({"strip_number": "seven"}), "");
        plugin.on_send_to_plugin(ACTION, "ctx1", &json!({}), "");
        assert_eq!(plugin.registry().get("ctx1").map(|c| c.strip), Some(2));
        assert!(plugin.host().messages().is_empty());
    }

    #[test]
    fn settings_write_for_unknown_instance_does_not_register() {
        let plugin = quiet_plugin();
        plugin.on_send_to_plugin(ACTION, "ghost", &json!({"strip_number": 1}), "");
        assert!(plugin.registry().get("ghost").is_none());
        // Persisting is the host's business; it still receives the settings.
        assert_eq!(plugin.host().persisted_settings("ghost").len(), 1);
    }

    #[test]
    fn handle_event_dispatches() {
        let plugin = quiet_plugin();
        let ev = HostEvent::from_json(
            r#"{"event":"willAppear","action":"a","context":"c","device":"d",
                "payload":{"settings":{"strip_number":6}}}"#,
        )
        .unwrap();
        plugin.handle_event(&ev);
        assert_eq!(plugin.registry().get("c").map(|c| c.strip), Some(6));

        let ev = HostEvent::from_json(r#"{"event":"keyUp","action":"a","context":"c"}"#).unwrap();
        plugin.handle_event(&ev);
        assert!(plugin.mixer().is_muted(6).unwrap());

        plugin.handle_event(&HostEvent::Other);
        plugin.handle_event(&HostEvent::DeviceDidDisconnect { device: "d".into() });
    }

    #[test]
    fn shutdown_stops_polling_and_logs_out() {
        let plugin = quiet_plugin();
        assert!(plugin.is_polling());
        plugin.shutdown();
        assert!(!plugin.is_polling());
        assert!(!plugin.mixer().is_logged_in());
        assert_eq!(plugin.mixer().remote().logout_count(), 1);
    }

    #[test]
    fn events_after_shutdown_are_ignored() {
        let plugin = quiet_plugin();
        plugin.shutdown();
        plugin.host().clear();

        appear(&plugin, "ctx1", json!({"strip_number": 1}));
        plugin.on_key_up(ACTION, "ctx1", &json!({}), "dev");
        plugin.on_send_to_plugin(ACTION, "ctx1", &json!({"strip_number": 2}), "");
        plugin.refresh(true);

        assert!(plugin.host().messages().is_empty());
        assert!(plugin.registry().is_empty());
        assert_eq!(plugin.mixer().remote().write_count(), 0);
    }

    #[test]
    fn new_rejects_zero_poll_interval() {
        let mixer = Arc::new(Mixer::connect(MockRemote::new()).unwrap());
        let config = Config {
            poll_interval_ms: 0,
            ..Config::default()
        };
        let err = StripMutePlugin::new(mixer, Arc::new(RecordingHost::new()), &config)
            .err()
            .unwrap();
        assert!(err.to_string().contains("poll_interval_ms"), "got: {err}");
    }

    #[test]
    fn with_icons_clamps_zero_interval() {
        let mixer = Arc::new(Mixer::connect(MockRemote::new()).unwrap());
        let plugin = StripMutePlugin::with_icons(
            mixer,
            Arc::new(RecordingHost::new()),
            MuteIcons::default(),
            Duration::ZERO,
        );
        std::thread::sleep(Duration::from_millis(50));
        plugin.shutdown();
        let ticks = plugin.mixer().remote().dirty_check_count();
        assert!(ticks <= 20, "expected a throttled loop, saw {ticks} dirty checks");
    }

    #[test]
    fn new_rejects_bad_icon_path() {
        let mixer = Arc::new(Mixer::connect(MockRemote::new()).unwrap());
        let config = Config {
            muted_icon_path: "/nonexistent/muted.png".into(),
            ..Config::default()
        };
        let result = StripMutePlugin::new(mixer, Arc::new(RecordingHost::new()), &config);
        assert!(result.is_err());
    }

    #[test]
    fn initialize_with_mock_remote() {
        let plugin = StripMutePlugin::<MockRemote, RecordingHost>::initialize(
            Arc::new(RecordingHost::new()),
            &Config::default(),
        )
        .unwrap();
        assert!(plugin.mixer().is_logged_in());
        plugin.shutdown();
    }
}
