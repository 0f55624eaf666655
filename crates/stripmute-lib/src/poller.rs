//! Periodic poller — one background thread running a refresh callback.
//!
//! The callback receives a `forced` flag: `false` for scheduled ticks, `true`
//! for out-of-band [`Poller::trigger_now`] calls. Timer-driven and event-driven
//! refreshes therefore share a single update path.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Default interval between scheduled ticks.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

/// Refresh callback; the argument is the `forced` flag.
pub type PollCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Stop flag paired with a condvar so a sleeping loop wakes immediately.
#[derive(Default)]
struct StopSignal {
    stopped: Mutex<bool>,
    cvar: Condvar,
}

impl StopSignal {
    fn raise(&self) {
        *lock(&self.stopped) = true;
        self.cvar.notify_all();
    }

    fn is_raised(&self) -> bool {
        *lock(&self.stopped)
    }

    /// Sleep up to `timeout`. Returns `true` if the signal was raised.
    fn wait(&self, timeout: Duration) -> bool {
        let guard = lock(&self.stopped);
        match self.cvar.wait_timeout_while(guard, timeout, |stopped| !*stopped) {
            Ok((guard, _)) => *guard,
            Err(e) => *e.into_inner().0,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Run {
    signal: Arc<StopSignal>,
    handle: JoinHandle<()>,
}

/// Cancellable repeating timer.
///
/// All methods take `&self`, so one poller can be shared between the host
/// event thread (which calls [`trigger_now`](Self::trigger_now)) and whoever
/// owns startup and shutdown.
#[derive(Default)]
pub struct Poller {
    callback: Mutex<Option<PollCallback>>,
    run: Mutex<Option<Run>>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking every `interval`. The first tick runs immediately.
    ///
    /// A loop that is already running is stopped (and joined) first, so at
    /// most one loop exists at any time.
    pub fn start<F>(&self, interval: Duration, callback: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let callback: PollCallback = Arc::new(callback);
        // The previous loop's callback may itself touch `run`; never join
        // while holding the lock.
        let previous = lock(&self.run).take();
        if let Some(previous) = previous {
            log::debug!("poller restarted, stopping previous loop");
            finish(previous);
        }
        *lock(&self.callback) = Some(Arc::clone(&callback));

        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let handle = std::thread::spawn(move || {
            while !thread_signal.is_raised() {
                callback(false);
                if thread_signal.wait(interval) {
                    break;
                }
            }
        });
        let replaced = lock(&self.run).replace(Run { signal, handle });
        if let Some(replaced) = replaced {
            // Lost a race with a concurrent start.
            finish(replaced);
        }
        log::debug!("poller started ({interval:?})");
    }

    /// Stop the loop and wait for the in-flight tick, if any, to finish.
    /// No callback runs on the poll thread once this returns, and
    /// [`trigger_now`](Self::trigger_now) becomes a no-op until the next
    /// [`start`](Self::start).
    pub fn stop(&self) {
        lock(&self.callback).take();
        let previous = lock(&self.run).take();
        if let Some(previous) = previous {
            finish(previous);
            log::debug!("poller stopped");
        }
    }

    /// Run the callback now on the calling thread with `forced = true`.
    /// Does nothing unless the poller is started.
    pub fn trigger_now(&self) {
        let callback = lock(&self.callback).clone();
        if let Some(callback) = callback {
            callback(true);
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run)
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }
}

/// Signal a run to stop and join it, unless called from the poll thread
/// itself (a callback stopping its own poller), where joining would deadlock.
fn finish(run: Run) {
    run.signal.raise();
    if run.handle.thread().id() == std::thread::current().id() {
        return;
    }
    if run.handle.join().is_err() {
        log::warn!("poll thread panicked");
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}
