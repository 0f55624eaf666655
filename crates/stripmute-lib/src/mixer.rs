//! Mixer control — trait over the Voicemeeter remote API + session adapter.
//!
//! [`RemoteApi`] is the narrow capability the native binding provides (login,
//! dirty-check, float parameters by name). [`Mixer`] owns one bound remote for
//! the lifetime of the process: login on construction, logout on teardown.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Parameter values at or above this are reported as muted.
pub const MUTE_THRESHOLD: f32 = 0.5;

/// Vendor code for an unknown parameter name.
pub const ERR_UNKNOWN_PARAMETER: i32 = -3;

#[derive(Debug, Clone, PartialEq)]
pub enum MixerError {
    /// The mixer application is not installed (no remote library found).
    NotInstalled,
    /// The remote library is present but lacks an expected entry point.
    MissingCapability(String),
    /// Login succeeded but the mixer application is not running.
    NotRunning,
    /// Login returned a failure code.
    LoginFailed(i32),
    /// Reading or writing a parameter failed.
    Parameter { name: String, code: i32 },
}

impl fmt::Display for MixerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MixerError::NotInstalled => write!(f, "Voicemeeter is not installed"),
            MixerError::MissingCapability(name) => {
                write!(f, "Voicemeeter remote is missing entry point {name}")
            }
            MixerError::NotRunning => write!(f, "Voicemeeter is not running"),
            MixerError::LoginFailed(code) => write!(f, "Voicemeeter login failed (code {code})"),
            MixerError::Parameter { name, code } => {
                write!(f, "Voicemeeter parameter {name} failed (code {code})")
            }
        }
    }
}

impl std::error::Error for MixerError {}

pub type Result<T> = std::result::Result<T, MixerError>;

/// Raw remote-control surface of the mixer application.
///
/// Return codes follow the vendor API: `login` gives `0` (ok), `1` (ok, but
/// the application is not launched) or a negative failure code;
/// `is_parameters_dirty` gives `1` (changed), `0` (unchanged) or a negative
/// error code. Implementations must be shareable across the event thread and
/// the poll thread.
pub trait RemoteApi: Send + Sync {
    /// Locate and bind the remote library.
    fn open() -> Result<Self>
    where
        Self: Sized;
    fn login(&self) -> i32;
    fn logout(&self) -> i32;
    fn is_parameters_dirty(&self) -> i32;
    fn get_parameter_float(&self, name: &str) -> Result<f32>;
    fn set_parameter_float(&self, name: &str, value: f32) -> Result<()>;
}

/// Parameter key for a strip's mute switch, e.g. `Strip[3].Mute`.
pub fn strip_mute_param(strip: u32) -> String {
    format!("Strip[{strip}].Mute")
}

/// Whether a raw mute parameter value means "muted".
pub fn is_mute_value(value: f32) -> bool {
    value >= MUTE_THRESHOLD
}

/// Logged-in session with the mixer. Shared via `Arc` between the facade and
/// the poll callback; logs out when dropped.
pub struct Mixer<R: RemoteApi> {
    remote: R,
    logged_in: AtomicBool,
}

impl<R: RemoteApi> Mixer<R> {
    /// Bind the remote and log in.
    pub fn initialize() -> Result<Self> {
        Self::connect(R::open()?)
    }

    /// Log in with an already-bound remote.
    pub fn connect(remote: R) -> Result<Self> {
        let mixer = Mixer {
            remote,
            logged_in: AtomicBool::new(false),
        };
        mixer.login()?;
        Ok(mixer)
    }

    /// Establish the session. No-op if already logged in.
    pub fn login(&self) -> Result<()> {
        if self.logged_in.load(Ordering::SeqCst) {
            return Ok(());
        }
        match self.remote.login() {
            0 => {
                self.logged_in.store(true, Ordering::SeqCst);
                log::info!("logged in to Voicemeeter remote");
                Ok(())
            }
            1 => {
                // Session was opened but is useless without the application.
                self.remote.logout();
                Err(MixerError::NotRunning)
            }
            code => Err(MixerError::LoginFailed(code)),
        }
    }

    /// Release the session. Safe to call more than once.
    pub fn logout(&self) {
        if !self.logged_in.swap(false, Ordering::SeqCst) {
            return;
        }
        let code = self.remote.logout();
        if code < 0 {
            log::warn!("Voicemeeter logout returned {code}");
        } else {
            log::info!("logged out of Voicemeeter remote");
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    /// Consume the remote's dirty flag. Each call is a single vote: a `true`
    /// is not reported again until parameters change once more.
    pub fn is_dirty(&self) -> bool {
        match self.remote.is_parameters_dirty() {
            0 => false,
            code if code > 0 => true,
            code => {
                log::debug!("dirty check failed (code {code})");
                false
            }
        }
    }

    /// Raw mute value of a strip, nominally in `[0, 1]`.
    pub fn get_mute(&self, strip: u32) -> Result<f32> {
        self.remote.get_parameter_float(&strip_mute_param(strip))
    }

    pub fn is_muted(&self, strip: u32) -> Result<bool> {
        self.get_mute(strip).map(is_mute_value)
    }

    /// Flip a strip's mute and return the value written.
    ///
    /// Read and write are separate remote calls; a concurrent change from
    /// another controller in between is overwritten and shows up on the next
    /// poll.
    pub fn toggle_mute(&self, strip: u32) -> Result<f32> {
        let name = strip_mute_param(strip);
        let current = self.remote.get_parameter_float(&name)?;
        let next = 1.0 - current;
        self.remote.set_parameter_float(&name, next)?;
        log::debug!("{name}: {current} -> {next}");
        Ok(next)
    }

    /// The underlying remote.
    pub fn remote(&self) -> &R {
        &self.remote
    }
}

impl<R: RemoteApi> Drop for Mixer<R> {
    fn drop(&mut self) {
        self.logout();
    }
}

/// In-memory [`RemoteApi`] for unit and integration tests and for
/// simulated sessions.
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI32, AtomicU32};

    /// Number of strips on the largest Voicemeeter edition.
    pub const DEFAULT_STRIPS: u32 = 8;

    /// Thread-safe fake remote. Stores float parameters by name; any write
    /// raises the dirty flag the way the real remote does.
    pub struct MockRemote {
        params: Mutex<HashMap<String, f32>>,
        dirty: AtomicBool,
        /// Code returned by `login()`.
        pub login_code: AtomicI32,
        /// If non-zero, returned by `is_parameters_dirty()` instead of the flag.
        pub dirty_error: AtomicI32,
        /// If true, parameter reads fail.
        pub fail_get: AtomicBool,
        /// If true, parameter writes fail.
        pub fail_set: AtomicBool,
        logins: AtomicU32,
        logouts: AtomicU32,
        writes: AtomicU32,
        dirty_checks: AtomicU32,
    }

    impl Default for MockRemote {
        fn default() -> Self {
            Self::new()
        }
    }

    impl MockRemote {
        pub fn new() -> Self {
            Self::with_strips(DEFAULT_STRIPS)
        }

        /// A remote exposing `Strip[0..count].Mute`, all unmuted.
        pub fn with_strips(count: u32) -> Self {
            let params = (0..count).map(|n| (strip_mute_param(n), 0.0)).collect();
            MockRemote {
                params: Mutex::new(params),
                dirty: AtomicBool::new(false),
                login_code: AtomicI32::new(0),
                dirty_error: AtomicI32::new(0),
                fail_get: AtomicBool::new(false),
                fail_set: AtomicBool::new(false),
                logins: AtomicU32::new(0),
                logouts: AtomicU32::new(0),
                writes: AtomicU32::new(0),
                dirty_checks: AtomicU32::new(0),
            }
        }

        /// Simulate another controller changing a parameter.
        pub fn set_external(&self, name: &str, value: f32) {
            self.lock().insert(name.to_string(), value);
            self.dirty.store(true, Ordering::SeqCst);
        }

        /// Simulate another controller muting or unmuting a strip.
        pub fn set_strip_muted(&self, strip: u32, muted: bool) {
            self.set_external(&strip_mute_param(strip), if muted { 1.0 } else { 0.0 });
        }

        /// Current value of a parameter, if it exists.
        pub fn param(&self, name: &str) -> Option<f32> {
            self.lock().get(name).copied()
        }

        pub fn raise_dirty(&self) {
            self.dirty.store(true, Ordering::SeqCst);
        }

        pub fn login_count(&self) -> u32 {
            self.logins.load(Ordering::SeqCst)
        }

        pub fn logout_count(&self) -> u32 {
            self.logouts.load(Ordering::SeqCst)
        }

        /// Number of `is_parameters_dirty` calls.
        pub fn dirty_check_count(&self) -> u32 {
            self.dirty_checks.load(Ordering::SeqCst)
        }

        /// Number of successful parameter writes.
        pub fn write_count(&self) -> u32 {
            self.writes.load(Ordering::SeqCst)
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, f32>> {
            self.params
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }

    impl RemoteApi for MockRemote {
        fn open() -> Result<Self> {
            Ok(Self::new())
        }

        fn login(&self) -> i32 {
            self.logins.fetch_add(1, Ordering::SeqCst);
            self.login_code.load(Ordering::SeqCst)
        }

        fn logout(&self) -> i32 {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            0
        }

        fn is_parameters_dirty(&self) -> i32 {
            self.dirty_checks.fetch_add(1, Ordering::SeqCst);
            let err = self.dirty_error.load(Ordering::SeqCst);
            if err != 0 {
                return err;
            }
            i32::from(self.dirty.swap(false, Ordering::SeqCst))
        }

        fn get_parameter_float(&self, name: &str) -> Result<f32> {
            if self.fail_get.load(Ordering::SeqCst) {
                return Err(MixerError::Parameter {
                    name: name.to_string(),
                    code: -1,
                });
            }
            self.lock()
                .get(name)
                .copied()
                .ok_or_else(|| MixerError::Parameter {
                    name: name.to_string(),
                    code: ERR_UNKNOWN_PARAMETER,
                })
        }

        fn set_parameter_float(&self, name: &str, value: f32) -> Result<()> {
            if self.fail_set.load(Ordering::SeqCst) {
                return Err(MixerError::Parameter {
                    name: name.to_string(),
                    code: -1,
                });
            }
            let mut params = self.lock();
            match params.get_mut(name) {
                Some(slot) => *slot = value,
                None => {
                    return Err(MixerError::Parameter {
                        name: name.to_string(),
                        code: ERR_UNKNOWN_PARAMETER,
                    });
                }
            }
            drop(params);
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.dirty.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockRemote;
    use super::*;

    /// Remote whose `open()` fails, standing in for a missing install.
    struct UninstalledRemote;

    impl RemoteApi for UninstalledRemote {
        fn open() -> Result<Self> {
            Err(MixerError::NotInstalled)
        }
        fn login(&self) -> i32 {
            0
        }
        fn logout(&self) -> i32 {
            0
        }
        fn is_parameters_dirty(&self) -> i32 {
            0
        }
        fn get_parameter_float(&self, _name: &str) -> Result<f32> {
            Ok(0.0)
        }
        fn set_parameter_float(&self, _name: &str, _value: f32) -> Result<()> {
            Ok(())
        }
    }

    /// Remote library that loads but lacks the dirty-check entry point.
    struct PartialRemote;

    impl RemoteApi for PartialRemote {
        fn open() -> Result<Self> {
            Err(MixerError::MissingCapability("VBVMR_IsParametersDirty".into()))
        }
        fn login(&self) -> i32 {
            0
        }
        fn logout(&self) -> i32 {
            0
        }
        fn is_parameters_dirty(&self) -> i32 {
            0
        }
        fn get_parameter_float(&self, _name: &str) -> Result<f32> {
            Ok(0.0)
        }
        fn set_parameter_float(&self, _name: &str, _value: f32) -> Result<()> {
            Ok(())
        }
    }

    fn connected() -> Mixer<MockRemote> {
        Mixer::connect(MockRemote::new()).unwrap()
    }

    #[test]
    fn strip_mute_param_format() {
        assert_eq!(strip_mute_param(0), "Strip[0].Mute");
        assert_eq!(strip_mute_param(12), "Strip[12].Mute");
    }

    #[test]
    fn mute_threshold_boundaries() {
        assert!(!is_mute_value(0.0));
        assert!(!is_mute_value(0.49));
        assert!(is_mute_value(0.5));
        assert!(is_mute_value(1.0));
    }

    #[test]
    fn initialize_with_mock_logs_in() {
        let mixer = Mixer::<MockRemote>::initialize().unwrap();
        assert!(mixer.is_logged_in());
        assert_eq!(mixer.remote().login_count(), 1);
    }

    #[test]
    fn initialize_not_installed_is_fatal() {
        let err = Mixer::<UninstalledRemote>::initialize().err().unwrap();
        assert_eq!(err, MixerError::NotInstalled);
    }

    #[test]
    fn initialize_missing_capability_is_fatal() {
        let err = Mixer::<PartialRemote>::initialize().err().unwrap();
        assert_eq!(
            err,
            MixerError::MissingCapability("VBVMR_IsParametersDirty".into())
        );
        assert_eq!(
            err.to_string(),
            "Voicemeeter remote is missing entry point VBVMR_IsParametersDirty"
        );
    }

    #[test]
    fn connect_application_not_running() {
        let remote = MockRemote::new();
        remote.login_code.store(1, Ordering::SeqCst);
        let err = Mixer::connect(remote).err().unwrap();
        assert_eq!(err, MixerError::NotRunning);
    }

    #[test]
    fn connect_login_failure_code() {
        let remote = MockRemote::new();
        remote.login_code.store(-2, Ordering::SeqCst);
        let err = Mixer::connect(remote).err().unwrap();
        assert_eq!(err, MixerError::LoginFailed(-2));
    }

    #[test]
    fn logout_is_idempotent() {
        let mixer = connected();
        mixer.logout();
        mixer.logout();
        assert!(!mixer.is_logged_in());
        assert_eq!(mixer.remote().logout_count(), 1);
    }

    #[test]
    fn login_twice_is_noop() {
        let mixer = connected();
        mixer.login().unwrap();
        assert_eq!(mixer.remote().login_count(), 1);
    }

    #[test]
    fn dirty_flag_is_consumed() {
        let mixer = connected();
        assert!(!mixer.is_dirty());
        mixer.remote().raise_dirty();
        assert!(mixer.is_dirty());
        assert!(!mixer.is_dirty(), "second check should see a cleared flag");
    }

    #[test]
    fn dirty_error_code_reads_as_clean() {
        let mixer = connected();
        mixer.remote().raise_dirty();
        mixer.remote().dirty_error.store(-2, Ordering::SeqCst);
        assert!(!mixer.is_dirty());
    }

    #[test]
    fn get_mute_reads_strip_parameter() {
        let mixer = connected();
        mixer.remote().set_strip_muted(3, true);
        assert_eq!(mixer.get_mute(3).unwrap(), 1.0);
        assert!(mixer.is_muted(3).unwrap());
        assert!(!mixer.is_muted(2).unwrap());
    }

    #[test]
    fn get_mute_unknown_strip_fails() {
        let mixer = connected();
        let err = mixer.get_mute(99).unwrap_err();
        assert_eq!(
            err,
            MixerError::Parameter {
                name: "Strip[99].Mute".into(),
                code: ERR_UNKNOWN_PARAMETER
            }
        );
    }

    #[test]
    fn toggle_mute_writes_complement() {
        let mixer = connected();
        assert_eq!(mixer.toggle_mute(1).unwrap(), 1.0);
        assert!(mixer.is_muted(1).unwrap());
        assert_eq!(mixer.toggle_mute(1).unwrap(), 0.0);
        assert!(!mixer.is_muted(1).unwrap());
    }

    #[test]
    fn toggle_twice_restores_fractional_value() {
        let mixer = connected();
        mixer.remote().set_external("Strip[2].Mute", 0.3);
        mixer.toggle_mute(2).unwrap();
        mixer.toggle_mute(2).unwrap();
        let value = mixer.get_mute(2).unwrap();
        assert!((value - 0.3).abs() < 1e-6, "got {value}");
    }

    #[test]
    fn toggle_raises_dirty_flag() {
        let mixer = connected();
        mixer.toggle_mute(0).unwrap();
        assert!(mixer.is_dirty());
    }

    #[test]
    fn toggle_propagates_write_failure() {
        let mixer = connected();
        mixer.remote().fail_set.store(true, Ordering::SeqCst);
        assert!(mixer.toggle_mute(0).is_err());
        assert_eq!(mixer.remote().param("Strip[0].Mute"), Some(0.0));
    }

    /// Remote that reports logouts through a shared counter, so the count
    /// survives the mixer being dropped.
    struct SharedCountRemote(std::sync::Arc<std::sync::atomic::AtomicU32>);

    impl RemoteApi for SharedCountRemote {
        fn open() -> Result<Self> {
            Ok(Self(Default::default()))
        }
        fn login(&self) -> i32 {
            0
        }
        fn logout(&self) -> i32 {
            self.0.fetch_add(1, Ordering::SeqCst);
            0
        }
        fn is_parameters_dirty(&self) -> i32 {
            0
        }
        fn get_parameter_float(&self, _name: &str) -> Result<f32> {
            Ok(0.0)
        }
        fn set_parameter_float(&self, _name: &str, _value: f32) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn drop_logs_out_once() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mixer = Mixer::connect(SharedCountRemote(count.clone())).unwrap();
        drop(mixer);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_after_explicit_logout_does_not_repeat() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let mixer = Mixer::connect(SharedCountRemote(count.clone())).unwrap();
        mixer.logout();
        drop(mixer);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
