use crate::applier::MacroApplier;
use crate::error::Result;
use crate::expansion::MacroSource;
use crate::keyboard::Key;
use crate::session::{RendererEvent, SessionId, UiChannel};
use crate::state_machine::{Action, InputStateMachine};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything the engine thread reacts to, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Key { key: Key, at: Instant },
    Hotkey { at: Instant },
    Renderer(RendererEvent),
    Shutdown,
}

/// Single consumer of key, hotkey and renderer events. Owns the state
/// machine and the applier, so every mutation happens on one thread.
pub struct Engine {
    machine: InputStateMachine,
    applier: MacroApplier,
    source: Arc<dyn MacroSource + Send + Sync>,
    ui: UiChannel,
}

impl Engine {
    pub fn new(
        machine: InputStateMachine,
        applier: MacroApplier,
        source: Arc<dyn MacroSource + Send + Sync>,
        ui: UiChannel,
    ) -> Self {
        Self {
            machine,
            applier,
            source,
            ui,
        }
    }

    pub fn machine(&self) -> &InputStateMachine {
        &self.machine
    }

    /// Build the engine on its own thread and run it until `Shutdown` or
    /// until every sender is gone.
    pub fn spawn<F>(build: F, events: Receiver<EngineEvent>) -> JoinHandle<()>
    where
        F: FnOnce() -> Result<Engine> + Send + 'static,
    {
        thread::spawn(move || match build() {
            Ok(engine) => engine.run(events),
            Err(e) => error!(error = %e, "could not start expansion engine"),
        })
    }

    pub fn run(mut self, events: Receiver<EngineEvent>) {
        info!("expansion engine running");
        for event in events {
            match panic::catch_unwind(AssertUnwindSafe(|| self.handle(event))) {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    error!("event handler panicked, resetting input state");
                    if let Some(command) = self.machine.reset() {
                        self.ui.post(command);
                    }
                }
            }
        }
        info!("expansion engine stopped");
    }

    /// Process one event. Returns false on `Shutdown`.
    pub fn handle(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Key { key, at } => {
                let actions = self.machine.handle_key(&key, at, self.source.as_ref());
                self.dispatch(actions);
            }
            EngineEvent::Hotkey { at } => {
                let actions = self.machine.activate(at, self.source.as_ref());
                self.dispatch(actions);
            }
            EngineEvent::Renderer(RendererEvent::Selected { session, trigger }) => {
                self.on_selected(session, &trigger);
            }
            EngineEvent::Renderer(RendererEvent::Closed { session }) => {
                self.machine.on_popup_closed(session)
            }
            EngineEvent::Shutdown => return false,
        }
        true
    }

    fn on_selected(&mut self, session: SessionId, trigger: &str) {
        if !self.machine.session().is_current(session) {
            debug!(trigger, session, "selection arrived for a closed list, ignoring");
            return;
        }
        // Only what was typed is on screen, which may be shorter than the
        // chosen trigger.
        let delete_count = self.machine.buffer().chars().count();
        self.run_apply(trigger, delete_count);
    }

    fn dispatch(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Ui(command) => {
                    if !self.ui.post(command) {
                        warn!("renderer unavailable, treating suggestion list as closed");
                        self.machine.renderer_closed();
                    }
                }
                Action::Apply {
                    trigger,
                    delete_count,
                } => self.run_apply(&trigger, delete_count),
            }
        }
    }

    fn run_apply(&mut self, trigger: &str, delete_count: usize) {
        let applied = self.applier.apply(
            trigger,
            delete_count,
            self.source.as_ref(),
            &mut self.machine,
            &self.ui,
        );
        if !applied {
            self.machine.abandon_composition();
        }
    }
}
