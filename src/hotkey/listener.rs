//! Global key event monitor
//!
//! Owns the capture thread on which the platform event tap runs. Every
//! key-down the tap sees is handed synchronously to a [`KeyHandler`], whose
//! answer decides whether the event is swallowed or passed through.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info, warn};

/// How long the tap pumps events before the capture thread re-checks `running`
const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// A non-repeat key-down event as delivered by the tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawKeyEvent {
    /// Virtual keycode
    pub keycode: u16,
    /// Raw modifier flag word
    pub flags: u64,
}

/// Receives key events on the capture thread
///
/// Runs inside the OS interception callback, so it must return quickly and
/// must not block.
pub trait KeyHandler: Send + 'static {
    /// Returns `true` to swallow the event, `false` to pass it through
    fn on_key_down(&mut self, event: RawKeyEvent) -> bool;

    /// Called between pump intervals when the tap is idle
    fn on_idle(&mut self) {}

    /// The OS disabled the tap and it has been re-enabled
    fn on_tap_reenabled(&mut self, _reason: &'static str) {}
}

/// Platform interception facility
///
/// All three methods are called on the capture thread, in order: `install`
/// once, `pump` until the monitor stops, then `uninstall` once.
pub trait KeyTap: Send + 'static {
    fn install(&mut self, handler: Box<dyn KeyHandler>) -> Result<(), MonitorError>;

    /// Deliver pending events to the handler for at most `timeout`
    fn pump(&mut self, timeout: Duration);

    fn uninstall(&mut self);
}

/// Errors that can occur while starting the monitor
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("event monitor is already running")]
    AlreadyRunning,

    #[error("accessibility permission not granted")]
    PermissionDenied,

    #[error("failed to create event tap: {0}")]
    TapCreation(String),

    #[error("failed to spawn capture thread: {0}")]
    ThreadSpawn(String),

    #[error("global key interception is not supported on this platform")]
    Unsupported,
}

/// Starts and stops the capture thread
pub struct EventMonitor {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EventMonitor {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Install `tap` on a new capture thread and feed it `handler`
    ///
    /// Returns once the tap is installed, or with the installation error.
    pub fn start<T, H>(&mut self, tap: T, handler: H) -> Result<(), MonitorError>
    where
        T: KeyTap,
        H: KeyHandler,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MonitorError::AlreadyRunning);
        }

        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), MonitorError>>(1);
        let running = Arc::clone(&self.running);

        let spawned = thread::Builder::new()
            .name("puck-capture".to_string())
            .spawn(move || {
                let mut tap = tap;
                if let Err(e) = tap.install(Box::new(Guarded(handler))) {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running.load(Ordering::SeqCst) {
                    tap.pump(PUMP_INTERVAL);
                }

                tap.uninstall();
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(MonitorError::ThreadSpawn(e.to_string()));
            }
        };

        let outcome = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(MonitorError::TapCreation("capture thread exited".to_string())));

        match outcome {
            Ok(()) => {
                info!("event tap installed");
                self.thread = Some(handle);
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Remove the tap and join the capture thread
    ///
    /// No handler call happens after this returns. Calling it again is a no-op.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("capture thread panicked");
            }
            info!("event tap stopped");
        }
    }

    /// Check if the tap is currently installed
    pub fn is_running(&self) -> bool {
        self.thread.is_some() && self.running.load(Ordering::SeqCst)
    }
}

impl Default for EventMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Keeps panics from unwinding into the OS callback; a faulting handler
/// passes the event through
struct Guarded<H>(H);

impl<H: KeyHandler> KeyHandler for Guarded<H> {
    fn on_key_down(&mut self, event: RawKeyEvent) -> bool {
        let inner = &mut self.0;
        match panic::catch_unwind(AssertUnwindSafe(|| inner.on_key_down(event))) {
            Ok(consumed) => consumed,
            Err(_) => {
                error!(keycode = event.keycode, "key handler panicked, passing event through");
                false
            }
        }
    }

    fn on_idle(&mut self) {
        let inner = &mut self.0;
        if panic::catch_unwind(AssertUnwindSafe(|| inner.on_idle())).is_err() {
            error!("key handler panicked while idle");
        }
    }

    fn on_tap_reenabled(&mut self, reason: &'static str) {
        warn!(reason, "event tap was disabled by the system, re-enabled");
        let inner = &mut self.0;
        if panic::catch_unwind(AssertUnwindSafe(|| inner.on_tap_reenabled(reason))).is_err() {
            error!("key handler panicked after tap re-enable");
        }
    }
}

/// Tap used where the OS offers no global key interception
pub struct UnsupportedTap;

impl KeyTap for UnsupportedTap {
    fn install(&mut self, _handler: Box<dyn KeyHandler>) -> Result<(), MonitorError> {
        Err(MonitorError::Unsupported)
    }

    fn pump(&mut self, timeout: Duration) {
        thread::sleep(timeout);
    }

    fn uninstall(&mut self) {}
}

/// The interception facility for the current platform
#[cfg(target_os = "macos")]
pub fn system_tap() -> super::macos::MacEventTap {
    super::macos::MacEventTap::new()
}

/// The interception facility for the current platform
#[cfg(not(target_os = "macos"))]
pub fn system_tap() -> UnsupportedTap {
    UnsupportedTap
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays a fixed list of events once, recording the handler's answers
    struct ScriptedTap {
        script: Vec<RawKeyEvent>,
        handler: Option<Box<dyn KeyHandler>>,
        decisions: Arc<Mutex<Vec<bool>>>,
        uninstalled: Arc<AtomicBool>,
        fail_with_permission: bool,
        /// Simulates the system disabling the tap once the script has played
        disabled_by: Option<&'static str>,
    }

    impl ScriptedTap {
        fn new(script: Vec<RawKeyEvent>) -> Self {
            Self {
                script,
                handler: None,
                decisions: Arc::new(Mutex::new(Vec::new())),
                uninstalled: Arc::new(AtomicBool::new(false)),
                fail_with_permission: false,
                disabled_by: None,
            }
        }
    }

    impl KeyTap for ScriptedTap {
        fn install(&mut self, handler: Box<dyn KeyHandler>) -> Result<(), MonitorError> {
            if self.fail_with_permission {
                return Err(MonitorError::PermissionDenied);
            }
            self.handler = Some(handler);
            Ok(())
        }

        fn pump(&mut self, _timeout: Duration) {
            let Some(handler) = self.handler.as_mut() else {
                return;
            };
            for event in self.script.drain(..) {
                let consumed = handler.on_key_down(event);
                self.decisions.lock().unwrap().push(consumed);
            }
            if let Some(reason) = self.disabled_by.take() {
                handler.on_tap_reenabled(reason);
            }
            handler.on_idle();
            thread::sleep(Duration::from_millis(5));
        }

        fn uninstall(&mut self) {
            self.handler = None;
            self.uninstalled.store(true, Ordering::SeqCst);
        }
    }

    /// Swallows even keycodes
    struct EvenSwallower {
        seen: Arc<Mutex<Vec<u16>>>,
    }

    impl KeyHandler for EvenSwallower {
        fn on_key_down(&mut self, event: RawKeyEvent) -> bool {
            self.seen.lock().unwrap().push(event.keycode);
            event.keycode % 2 == 0
        }
    }

    struct Panicking;

    impl KeyHandler for Panicking {
        fn on_key_down(&mut self, _event: RawKeyEvent) -> bool {
            panic!("boom");
        }

        fn on_tap_reenabled(&mut self, _reason: &'static str) {
            panic!("boom");
        }
    }

    /// Passes everything through and records re-enable reasons
    struct ReenableRecorder {
        reasons: Arc<Mutex<Vec<&'static str>>>,
    }

    impl KeyHandler for ReenableRecorder {
        fn on_key_down(&mut self, _event: RawKeyEvent) -> bool {
            false
        }

        fn on_tap_reenabled(&mut self, reason: &'static str) {
            self.reasons.lock().unwrap().push(reason);
        }
    }

    fn key(keycode: u16) -> RawKeyEvent {
        RawKeyEvent { keycode, flags: 0 }
    }

    fn wait_for(decisions: &Arc<Mutex<Vec<bool>>>, count: usize) {
        for _ in 0..200 {
            if decisions.lock().unwrap().len() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_monitor_applies_handler_decisions() {
        let tap = ScriptedTap::new(vec![key(2), key(3), key(4)]);
        let decisions = Arc::clone(&tap.decisions);
        let uninstalled = Arc::clone(&tap.uninstalled);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut monitor = EventMonitor::new();
        monitor
            .start(tap, EvenSwallower { seen: Arc::clone(&seen) })
            .unwrap();
        assert!(monitor.is_running());

        wait_for(&decisions, 3);
        monitor.stop();

        assert_eq!(*decisions.lock().unwrap(), vec![true, false, true]);
        assert_eq!(*seen.lock().unwrap(), vec![2, 3, 4]);
        assert!(uninstalled.load(Ordering::SeqCst));
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_permission_failure_is_reported() {
        let mut tap = ScriptedTap::new(vec![]);
        tap.fail_with_permission = true;

        let mut monitor = EventMonitor::new();
        let result = monitor.start(tap, EvenSwallower { seen: Arc::default() });
        assert!(matches!(result, Err(MonitorError::PermissionDenied)));
        assert!(!monitor.is_running());

        // a later start is allowed
        let tap = ScriptedTap::new(vec![]);
        assert!(monitor.start(tap, EvenSwallower { seen: Arc::default() }).is_ok());
        monitor.stop();
    }

    #[test]
    fn test_double_start_rejected() {
        let mut monitor = EventMonitor::new();
        monitor
            .start(ScriptedTap::new(vec![]), EvenSwallower { seen: Arc::default() })
            .unwrap();
        let second = monitor.start(ScriptedTap::new(vec![]), EvenSwallower { seen: Arc::default() });
        assert!(matches!(second, Err(MonitorError::AlreadyRunning)));
        monitor.stop();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut monitor = EventMonitor::new();
        monitor.stop();
        monitor
            .start(ScriptedTap::new(vec![]), EvenSwallower { seen: Arc::default() })
            .unwrap();
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_no_handler_calls_after_stop() {
        let tap = ScriptedTap::new(vec![key(8)]);
        let decisions = Arc::clone(&tap.decisions);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut monitor = EventMonitor::new();
        monitor
            .start(tap, EvenSwallower { seen: Arc::clone(&seen) })
            .unwrap();
        wait_for(&decisions, 1);
        monitor.stop();

        let count = seen.lock().unwrap().len();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(seen.lock().unwrap().len(), count);
    }

    #[test]
    fn test_panicking_handler_passes_through() {
        let mut tap = ScriptedTap::new(vec![key(0)]);
        tap.disabled_by = Some("timeout");
        let decisions = Arc::clone(&tap.decisions);

        let mut monitor = EventMonitor::new();
        monitor.start(tap, Panicking).unwrap();
        wait_for(&decisions, 1);
        thread::sleep(Duration::from_millis(20));

        // the capture thread survives both panics
        assert!(monitor.is_running());
        monitor.stop();

        assert_eq!(*decisions.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_tap_reenable_reaches_handler() {
        let mut tap = ScriptedTap::new(vec![key(1)]);
        tap.disabled_by = Some("user input");
        let decisions = Arc::clone(&tap.decisions);
        let reasons = Arc::new(Mutex::new(Vec::new()));

        let mut monitor = EventMonitor::new();
        monitor
            .start(tap, ReenableRecorder { reasons: Arc::clone(&reasons) })
            .unwrap();
        wait_for(&decisions, 1);
        for _ in 0..200 {
            if !reasons.lock().unwrap().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        monitor.stop();

        assert_eq!(*reasons.lock().unwrap(), vec!["user input"]);
        assert_eq!(*decisions.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_unsupported_tap() {
        let mut monitor = EventMonitor::new();
        let result = monitor.start(UnsupportedTap, EvenSwallower { seen: Arc::default() });
        assert!(matches!(result, Err(MonitorError::Unsupported)));
    }
}
