//! Switch dispatcher
//!
//! Performs the actual input source selection off the capture thread. A
//! failed switch is reported once and never retried; the cycle and debounce
//! state that selected it stays advanced.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::events::DaemonEvent;
use crate::hotkey::Hotkey;

use super::source::{InputSourceDirectory, SwitchError};

/// A resolved hotkey waiting to be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchRequest {
    pub hotkey: Hotkey,
    pub target: String,
}

/// Applies switch requests against an input source directory
pub struct SwitchDispatcher<D> {
    directory: D,
    events: broadcast::Sender<DaemonEvent>,
    failures: AtomicU64,
}

impl<D: InputSourceDirectory> SwitchDispatcher<D> {
    pub fn new(directory: D, events: broadcast::Sender<DaemonEvent>) -> Self {
        Self {
            directory,
            events,
            failures: AtomicU64::new(0),
        }
    }

    /// Drain requests until every sender is dropped
    pub async fn run(&self, mut requests: mpsc::UnboundedReceiver<SwitchRequest>) {
        info!("switch dispatcher started");

        while let Some(request) = requests.recv().await {
            let _ = self.dispatch(&request);
        }

        info!("switch dispatcher stopped");
    }

    /// Apply one request and report the outcome
    pub fn dispatch(&self, request: &SwitchRequest) -> Result<(), SwitchError> {
        match self.directory.select(&request.target) {
            Ok(()) => {
                info!(hotkey = %request.hotkey, target = %request.target, "switched input source");
                let _ = self.events.send(DaemonEvent::SwitchSucceeded {
                    hotkey: request.hotkey.to_string(),
                    target: request.target.clone(),
                });
                Ok(())
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(hotkey = %request.hotkey, target = %request.target, error = %e, "input source switch failed");
                let _ = self.events.send(DaemonEvent::SwitchFailed {
                    hotkey: request.hotkey.to_string(),
                    target: request.target.clone(),
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Number of failed switches so far
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::{Modifier, Modifiers};
    use crate::switcher::source::InputSource;
    use std::sync::Mutex;

    /// Directory that knows a fixed set of ids and records selections
    struct FakeDirectory {
        known: Vec<&'static str>,
        selected: Mutex<Vec<String>>,
    }

    impl FakeDirectory {
        fn new(known: Vec<&'static str>) -> Self {
            Self {
                known,
                selected: Mutex::new(Vec::new()),
            }
        }
    }

    impl InputSourceDirectory for FakeDirectory {
        fn list(&self) -> Result<Vec<InputSource>, SwitchError> {
            Ok(self
                .known
                .iter()
                .map(|id| InputSource {
                    id: id.to_string(),
                    name: id.to_string(),
                    selectable: true,
                })
                .collect())
        }

        fn current_id(&self) -> Option<String> {
            self.selected.lock().unwrap().last().cloned()
        }

        fn select(&self, id: &str) -> Result<(), SwitchError> {
            if !self.known.iter().any(|known| *known == id) {
                return Err(SwitchError::UnknownSource(id.to_string()));
            }
            self.selected.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    fn request(target: &str) -> SwitchRequest {
        SwitchRequest {
            hotkey: Hotkey::new([Modifier::Cmd].into_iter().collect::<Modifiers>(), "1"),
            target: target.to_string(),
        }
    }

    #[test]
    fn test_successful_switch_emits_event() {
        let (tx, mut rx) = broadcast::channel(8);
        let dispatcher = SwitchDispatcher::new(FakeDirectory::new(vec!["US"]), tx);

        assert!(dispatcher.dispatch(&request("US")).is_ok());
        assert_eq!(dispatcher.directory.current_id().as_deref(), Some("US"));
        assert_eq!(
            rx.try_recv().unwrap(),
            DaemonEvent::SwitchSucceeded {
                hotkey: "cmd-1".to_string(),
                target: "US".to_string()
            }
        );
    }

    #[test]
    fn test_failed_switch_is_reported_once() {
        let (tx, mut rx) = broadcast::channel(8);
        let dispatcher = SwitchDispatcher::new(FakeDirectory::new(vec!["US"]), tx);

        let result = dispatcher.dispatch(&request("Klingon"));
        assert!(matches!(result, Err(SwitchError::UnknownSource(_))));
        assert_eq!(dispatcher.failures(), 1);
        assert!(matches!(rx.try_recv().unwrap(), DaemonEvent::SwitchFailed { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_drains_until_senders_drop() {
        let (tx, _rx) = broadcast::channel(8);
        let dispatcher = SwitchDispatcher::new(FakeDirectory::new(vec!["US", "DE"]), tx);
        let (req_tx, req_rx) = mpsc::unbounded_channel();

        req_tx.send(request("US")).unwrap();
        req_tx.send(request("XX")).unwrap();
        req_tx.send(request("DE")).unwrap();
        drop(req_tx);

        dispatcher.run(req_rx).await;

        assert_eq!(*dispatcher.directory.selected.lock().unwrap(), vec!["US", "DE"]);
        assert_eq!(dispatcher.failures(), 1);
    }
}
