//! Key intake
//!
//! The handler that runs on the capture thread: canonicalize, match, and
//! hand resolved switches to the dispatcher without blocking. Reload and
//! clear requests from other threads arrive through [`EngineHandle`] and are
//! applied here, so the engine state has a single writer.

use std::sync::mpsc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc as async_mpsc};
use tracing::{info, warn};

use crate::events::DaemonEvent;
use crate::hotkey::{canonicalize, Hotkey, KeyHandler, RawKeyEvent};
use crate::switcher::SwitchRequest;

use super::matcher::{Decision, MatchEngine};
use super::table::HotkeyTable;

/// Requests applied on the capture thread
#[derive(Debug)]
pub enum EngineCommand {
    Reload(HotkeyTable),
    Clear,
}

/// The engine's owning thread has gone away
#[derive(Debug, thiserror::Error)]
#[error("key intake is not running")]
pub struct IntakeGone;

/// Sends commands to a running [`KeyIntake`]
#[derive(Debug, Clone)]
pub struct EngineHandle {
    commands: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Swap in a new table; cycle and debounce state start over
    pub fn reload(&self, table: HotkeyTable) -> Result<(), IntakeGone> {
        self.commands.send(EngineCommand::Reload(table)).map_err(|_| IntakeGone)
    }

    /// Reset cycle positions and debounce timestamps
    pub fn clear(&self) -> Result<(), IntakeGone> {
        self.commands.send(EngineCommand::Clear).map_err(|_| IntakeGone)
    }
}

/// [`KeyHandler`] wiring the match engine to the switch dispatcher
pub struct KeyIntake {
    engine: MatchEngine,
    switches: async_mpsc::UnboundedSender<SwitchRequest>,
    events: broadcast::Sender<DaemonEvent>,
    commands: mpsc::Receiver<EngineCommand>,
}

impl KeyIntake {
    pub fn new(
        engine: MatchEngine,
        switches: async_mpsc::UnboundedSender<SwitchRequest>,
        events: broadcast::Sender<DaemonEvent>,
    ) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::channel();
        let intake = Self {
            engine,
            switches,
            events,
            commands: rx,
        };
        (intake, EngineHandle { commands: tx })
    }

    /// Match one canonical hotkey and enqueue the resulting switch, if any
    pub fn process(&mut self, hotkey: &Hotkey, now: Instant) -> Decision {
        let decision = self.engine.handle(hotkey, now);

        if let Decision::Dispatch(resolved) = &decision {
            if resolved.action.in_cycle() {
                let _ = self.events.send(DaemonEvent::CycleAdvanced {
                    hotkey: resolved.hotkey.to_string(),
                    index: resolved.index,
                    len: resolved.group_len,
                    target: resolved.action.target().to_string(),
                });
            }

            let request = SwitchRequest {
                hotkey: resolved.hotkey.clone(),
                target: resolved.action.target().to_string(),
            };
            if self.switches.send(request).is_err() {
                warn!(%hotkey, "switch dispatcher is gone, switch dropped");
            }
        }

        decision
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::Reload(table) => {
                    let hotkeys = table.len();
                    self.engine.reload(table);
                    info!(hotkeys, "hotkey table reloaded");
                    let _ = self.events.send(DaemonEvent::ConfigReloaded { hotkeys });
                }
                EngineCommand::Clear => {
                    self.engine.clear();
                    info!("cycle and debounce state cleared");
                }
            }
        }
    }
}

impl KeyHandler for KeyIntake {
    fn on_key_down(&mut self, event: RawKeyEvent) -> bool {
        self.apply_commands();
        let hotkey = canonicalize(event.keycode, event.flags);
        self.process(&hotkey, Instant::now()).handled()
    }

    fn on_idle(&mut self) {
        self.apply_commands();
    }

    fn on_tap_reenabled(&mut self, reason: &'static str) {
        let _ = self.events.send(DaemonEvent::TapReenabled {
            reason: reason.to_string(),
        });
    }
}
