use crate::applier::ApplyingFlag;
use crate::engine::EngineEvent;
use crate::keyboard::{Chord, HotkeyDetector, Key};
use rdev::{Event, EventType, Key as RdevKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const MAX_RETRIES: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// What to do with one hook event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Routed {
    /// Event for the engine queue, if any.
    pub event: Option<EngineEvent>,
    /// Keep the raw event from reaching the focused application. Only
    /// honoured where the hook can grab.
    pub suppress: bool,
}

impl Routed {
    fn pass(event: Option<EngineEvent>) -> Self {
        Self {
            event,
            suppress: false,
        }
    }
}

/// Turns raw hook events into engine events.
///
/// Presses seen while a macro is being applied are the applier's own
/// keystrokes and are dropped here, before they reach the engine queue.
/// The chord's final key is matched by physical position and swallowed
/// together with its release.
pub struct EventTranslator {
    detector: HotkeyDetector,
    applying: ApplyingFlag,
    suppressed: Option<RdevKey>,
}

impl EventTranslator {
    pub fn new(chord: Chord, applying: ApplyingFlag) -> Self {
        Self {
            detector: HotkeyDetector::new(chord),
            applying,
            suppressed: None,
        }
    }

    pub fn translate(&mut self, event: &Event, at: Instant) -> Routed {
        match event.event_type {
            EventType::KeyPress(raw) => {
                if let Some(physical) = Key::physical(&raw) {
                    if self.detector.press(&physical) {
                        self.suppressed = Some(raw);
                        if self.applying.is_set() {
                            debug!(chord = %self.detector.chord(), "hotkey ignored while applying");
                            return Routed {
                                event: None,
                                suppress: true,
                            };
                        }
                        debug!(chord = %self.detector.chord(), "hotkey pressed");
                        return Routed {
                            event: Some(EngineEvent::Hotkey { at }),
                            suppress: true,
                        };
                    }
                }
                if self.applying.is_set() {
                    return Routed::default();
                }
                Routed::pass(Key::from_rdev(&raw, event).map(|key| EngineEvent::Key { key, at }))
            }
            EventType::KeyRelease(raw) => {
                if let Some(physical) = Key::physical(&raw) {
                    self.detector.release(&physical);
                }
                if self.suppressed == Some(raw) {
                    self.suppressed = None;
                    return Routed {
                        event: None,
                        suppress: true,
                    };
                }
                Routed::default()
            }
            _ => Routed::default(),
        }
    }
}

/// Translate one hook event and queue the result. Returns whether the raw
/// event should be swallowed.
fn route(
    translator: &Mutex<EventTranslator>,
    events: &Sender<EngineEvent>,
    event: &Event,
) -> bool {
    let routed = translator
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .translate(event, Instant::now());
    if let Some(engine_event) = routed.event {
        if events.send(engine_event).is_err() {
            debug!("engine queue closed, dropping key event");
        }
    }
    routed.suppress
}

/// Starts the global keyboard hook on its own thread.
///
/// Where rdev can grab the keyboard the hotkey is swallowed before the
/// focused app sees it. Otherwise, and on Linux, `rdev::listen` observes
/// events without suppressing them; if it fails to start it is retried a
/// few times before giving up.
pub fn start_keyboard_listener(
    events: Sender<EngineEvent>,
    applying: ApplyingFlag,
    chord: Chord,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let translator = Arc::new(Mutex::new(EventTranslator::new(chord, applying)));

    thread::spawn(move || {
        #[cfg(not(target_os = "linux"))]
        {
            let grab_events = events.clone();
            let grab_translator = Arc::clone(&translator);
            let grab_running = Arc::clone(&running);
            let callback = move |event: Event| {
                if !grab_running.load(Ordering::SeqCst) {
                    return Some(event);
                }
                if route(&grab_translator, &grab_events, &event) {
                    None
                } else {
                    Some(event)
                }
            };
            match rdev::grab(callback) {
                Ok(()) => return,
                Err(e) => warn!(
                    error = ?e,
                    "could not grab the keyboard, the hotkey will also reach the focused app"
                ),
            }
        }

        let mut retry_count = 0;

        while running.load(Ordering::SeqCst) && retry_count < MAX_RETRIES {
            let events = events.clone();
            let translator = Arc::clone(&translator);
            let running_hook = Arc::clone(&running);

            let callback = move |event: Event| {
                if running_hook.load(Ordering::SeqCst) {
                    route(&translator, &events, &event);
                }
            };

            match rdev::listen(callback) {
                Ok(()) => break,
                Err(e) => {
                    retry_count += 1;
                    warn!(
                        error = ?e,
                        attempt = retry_count,
                        max = MAX_RETRIES,
                        "keyboard listener failed, retrying"
                    );
                    thread::sleep(RETRY_DELAY);
                }
            }
        }

        if retry_count >= MAX_RETRIES {
            error!(
                attempts = MAX_RETRIES,
                "could not start keyboard listener; check input monitoring permissions"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::SystemTime;

    fn event(event_type: EventType, name: Option<&str>) -> Event {
        Event {
            time: SystemTime::now(),
            name: name.map(str::to_string),
            event_type,
        }
    }

    fn press(raw: RdevKey, name: Option<&str>) -> Event {
        event(EventType::KeyPress(raw), name)
    }

    fn release(raw: RdevKey) -> Event {
        event(EventType::KeyRelease(raw), None)
    }

    fn translator_for(chord: &str) -> (EventTranslator, ApplyingFlag) {
        let flag = ApplyingFlag::default();
        let chord = chord.parse::<Chord>().unwrap();
        (EventTranslator::new(chord, flag.clone()), flag)
    }

    fn translator() -> (EventTranslator, ApplyingFlag) {
        translator_for("ctrl+space")
    }

    #[test]
    fn chord_becomes_hotkey_event() {
        let (mut t, _) = translator();
        let now = Instant::now();

        assert_eq!(t.translate(&press(RdevKey::ControlLeft, None), now).event, None);
        assert_eq!(
            t.translate(&press(RdevKey::Space, Some(" ")), now),
            Routed {
                event: Some(EngineEvent::Hotkey { at: now }),
                suppress: true
            }
        );

        t.translate(&release(RdevKey::ControlLeft), now);
        assert_eq!(
            t.translate(&press(RdevKey::Space, Some(" ")), now),
            Routed {
                event: Some(EngineEvent::Key {
                    key: Key::Space,
                    at: now
                }),
                suppress: false
            }
        );
    }

    #[test]
    fn chord_release_is_swallowed_once() {
        let (mut t, _) = translator();
        let now = Instant::now();

        t.translate(&press(RdevKey::ControlLeft, None), now);
        assert!(t.translate(&press(RdevKey::Space, Some(" ")), now).suppress);
        assert!(!t.translate(&release(RdevKey::ControlLeft), now).suppress);
        assert!(t.translate(&release(RdevKey::Space), now).suppress);
        assert!(!t.translate(&release(RdevKey::Space), now).suppress);
    }

    #[test]
    fn hotkey_while_applying_is_swallowed_without_an_event() {
        let (mut t, flag) = translator();
        let now = Instant::now();
        let guard = flag.hold();

        t.translate(&press(RdevKey::ControlLeft, None), now);
        assert_eq!(
            t.translate(&press(RdevKey::Space, Some(" ")), now),
            Routed {
                event: None,
                suppress: true
            }
        );
        t.translate(&release(RdevKey::Space), now);

        drop(guard);
        assert_eq!(
            t.translate(&press(RdevKey::Space, Some(" ")), now).event,
            Some(EngineEvent::Hotkey { at: now })
        );
    }

    #[test]
    fn letter_chord_matches_despite_control_text() {
        let (mut t, _) = translator_for("ctrl+e");
        let now = Instant::now();

        t.translate(&press(RdevKey::ControlLeft, None), now);
        assert_eq!(
            t.translate(&press(RdevKey::KeyE, Some("\u{5}")), now).event,
            Some(EngineEvent::Hotkey { at: now })
        );
    }

    #[test]
    fn presses_while_applying_are_dropped() {
        let (mut t, flag) = translator();
        let now = Instant::now();
        let _guard = flag.hold();

        assert_eq!(
            t.translate(&press(RdevKey::KeyA, Some("a")), now),
            Routed::default()
        );
    }

    #[test]
    fn printable_press_is_forwarded() {
        let (mut t, _) = translator();
        let now = Instant::now();

        assert_eq!(
            t.translate(&press(RdevKey::KeyA, Some("a")), now),
            Routed {
                event: Some(EngineEvent::Key {
                    key: Key::Char('a'),
                    at: now
                }),
                suppress: false
            }
        );
    }

    #[test]
    fn routed_events_reach_the_queue() {
        let (t, _) = translator();
        let translator = Mutex::new(t);
        let (tx, rx) = mpsc::channel();

        assert!(!route(&translator, &tx, &press(RdevKey::ControlLeft, None)));
        assert!(route(&translator, &tx, &press(RdevKey::Space, Some(" "))));
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Hotkey { .. })));
        assert!(rx.try_recv().is_err());
    }
}
