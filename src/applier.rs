use crate::clipboard::Clipboard;
use crate::error::Result;
use crate::expansion::MacroSource;
use crate::keyboard::SyntheticInput;
use crate::session::{UiChannel, UiCommand};
use crate::state_machine::InputStateMachine;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Set while a macro is being applied. Key events seen meanwhile are the
/// applier's own synthetic keystrokes and must be dropped.
#[derive(Debug, Clone, Default)]
pub struct ApplyingFlag(Arc<AtomicBool>);

impl ApplyingFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise the flag until the returned guard is dropped.
    pub fn hold(&self) -> ApplyingGuard {
        self.0.store(true, Ordering::SeqCst);
        ApplyingGuard(Arc::clone(&self.0))
    }
}

#[must_use = "the flag drops as soon as the guard does"]
pub struct ApplyingGuard(Arc<AtomicBool>);

impl Drop for ApplyingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Fixed pauses inside one apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyTiming {
    /// After hiding an open suggestion list, before any keystroke.
    pub settle_delay: Duration,
    /// Before a direct expansion.
    pub pre_apply_delay: Duration,
    /// Between backspaces, clipboard write, paste and restore.
    pub step_delay: Duration,
}

impl ApplyTiming {
    pub fn immediate() -> Self {
        Self {
            settle_delay: Duration::ZERO,
            pre_apply_delay: Duration::ZERO,
            step_delay: Duration::ZERO,
        }
    }
}

/// User-visible confirmation after an expansion.
pub trait Notifier {
    fn notify(&mut self, message: &str);
}

#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    enabled: bool,
}

impl LogNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notifier for LogNotifier {
    fn notify(&mut self, message: &str) {
        if self.enabled {
            info!(target: "expando::notify", "{}", message);
        }
    }
}

/// Shows a desktop notification for each message and logs it too. The
/// first failure to reach the notification service switches it to logging
/// only.
pub struct DesktopNotifier {
    enabled: bool,
    popups: bool,
    show: fn(&str) -> std::result::Result<(), String>,
    log: LogNotifier,
}

impl DesktopNotifier {
    pub fn new(enabled: bool) -> Self {
        Self::with_backend(enabled, show_desktop_notification)
    }

    fn with_backend(enabled: bool, show: fn(&str) -> std::result::Result<(), String>) -> Self {
        Self {
            enabled,
            popups: true,
            show,
            log: LogNotifier::new(enabled),
        }
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&mut self, message: &str) {
        if !self.enabled {
            return;
        }
        self.log.notify(message);
        if self.popups {
            if let Err(e) = (self.show)(message) {
                warn!(error = %e, "desktop notifications unavailable, logging only");
                self.popups = false;
            }
        }
    }
}

fn show_desktop_notification(message: &str) -> std::result::Result<(), String> {
    notify_rust::Notification::new()
        .appname("expando")
        .summary("expando")
        .body(message)
        .show()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Replaces typed trigger text with its body: backspaces, then a paste
/// bracketed by a clipboard save and restore.
pub struct MacroApplier {
    input: Box<dyn SyntheticInput>,
    clipboard: Box<dyn Clipboard>,
    notifier: Box<dyn Notifier>,
    timing: ApplyTiming,
}

impl MacroApplier {
    pub fn new(
        input: Box<dyn SyntheticInput>,
        clipboard: Box<dyn Clipboard>,
        notifier: Box<dyn Notifier>,
        timing: ApplyTiming,
    ) -> Self {
        Self {
            input,
            clipboard,
            notifier,
            timing,
        }
    }

    pub fn timing(&self) -> ApplyTiming {
        self.timing
    }

    /// Apply `trigger`, deleting `delete_count` characters first.
    ///
    /// Returns false when the trigger is unknown (nothing happens) or when a
    /// step failed. Either way the machine ends idle with the flag lowered.
    pub fn apply(
        &mut self,
        trigger: &str,
        delete_count: usize,
        source: &dyn MacroSource,
        machine: &mut InputStateMachine,
        ui: &UiChannel,
    ) -> bool {
        let Some(body) = source.expansion(trigger) else {
            warn!(trigger, "macro not found, nothing applied");
            return false;
        };

        info!(trigger, delete_count, "applying macro");
        let guard = machine.applying_flag().hold();

        if machine.session().is_active() {
            debug!("hiding suggestion list before sending keys");
            ui.post(UiCommand::Hide);
            thread::sleep(self.timing.settle_delay);
        } else {
            thread::sleep(self.timing.pre_apply_delay);
        }

        let result = self.replace(&body, delete_count);
        match &result {
            Ok(()) => self.notifier.notify(&format!("Macro '{}' applied", trigger)),
            Err(e) => error!(trigger, error = %e, "macro application failed"),
        }

        drop(guard);
        if let Some(command) = machine.finish_apply() {
            ui.post(command);
        }
        debug!(buffer = machine.buffer(), "apply cleanup done");

        result.is_ok()
    }

    fn replace(&mut self, body: &str, delete_count: usize) -> Result<()> {
        debug!(count = delete_count, "sending backspaces");
        self.input.backspace(delete_count)?;
        thread::sleep(self.timing.step_delay);

        let saved = self.clipboard.get()?;
        let pasted = self.paste(body);
        let restored = self.clipboard.set(&saved);
        if restored.is_ok() {
            debug!("clipboard restored");
        }

        pasted?;
        restored
    }

    fn paste(&mut self, body: &str) -> Result<()> {
        self.clipboard.set(body)?;
        thread::sleep(self.timing.step_delay);
        self.input.paste()?;
        thread::sleep(self.timing.step_delay);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExpandoError;
    use crate::keyboard::{Chord, Key};
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Backspace(usize),
        Paste,
        ClipboardGet,
        ClipboardSet(String),
        Notify(String),
    }

    type Log = Arc<Mutex<Vec<Op>>>;

    struct FakeInput {
        log: Log,
        fail_paste: bool,
        flag: ApplyingFlag,
        flag_seen: Arc<Mutex<Vec<bool>>>,
    }

    impl SyntheticInput for FakeInput {
        fn backspace(&mut self, count: usize) -> Result<()> {
            self.flag_seen.lock().unwrap().push(self.flag.is_set());
            self.log.lock().unwrap().push(Op::Backspace(count));
            Ok(())
        }

        fn paste(&mut self) -> Result<()> {
            if self.fail_paste {
                return Err(ExpandoError::Enigo("paste refused".to_string()));
            }
            self.log.lock().unwrap().push(Op::Paste);
            Ok(())
        }
    }

    struct FakeClipboard {
        log: Log,
        content: Arc<Mutex<String>>,
    }

    impl Clipboard for FakeClipboard {
        fn get(&mut self) -> Result<String> {
            self.log.lock().unwrap().push(Op::ClipboardGet);
            Ok(self.content.lock().unwrap().clone())
        }

        fn set(&mut self, text: &str) -> Result<()> {
            self.log.lock().unwrap().push(Op::ClipboardSet(text.to_string()));
            *self.content.lock().unwrap() = text.to_string();
            Ok(())
        }
    }

    struct FakeNotifier(Log);

    impl Notifier for FakeNotifier {
        fn notify(&mut self, message: &str) {
            self.0.lock().unwrap().push(Op::Notify(message.to_string()));
        }
    }

    struct Harness {
        applier: MacroApplier,
        machine: InputStateMachine,
        log: Log,
        clipboard: Arc<Mutex<String>>,
        flag_seen: Arc<Mutex<Vec<bool>>>,
    }

    fn harness(fail_paste: bool) -> Harness {
        let machine = InputStateMachine::new(
            '/',
            "ctrl+space".parse::<Chord>().unwrap(),
            Duration::from_millis(250),
        );
        let log: Log = Arc::default();
        let clipboard = Arc::new(Mutex::new("original".to_string()));
        let flag_seen = Arc::default();
        let applier = MacroApplier::new(
            Box::new(FakeInput {
                log: Arc::clone(&log),
                fail_paste,
                flag: machine.applying_flag(),
                flag_seen: Arc::clone(&flag_seen),
            }),
            Box::new(FakeClipboard {
                log: Arc::clone(&log),
                content: Arc::clone(&clipboard),
            }),
            Box::new(FakeNotifier(Arc::clone(&log))),
            ApplyTiming::immediate(),
        );
        Harness {
            applier,
            machine,
            log,
            clipboard,
            flag_seen,
        }
    }

    fn source() -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("/hi".to_string(), "Hello there".to_string());
        map
    }

    #[test]
    fn steps_run_in_order() {
        let mut h = harness(false);
        let ui = UiChannel::detached();

        assert!(h.applier.apply("/hi", 4, &source(), &mut h.machine, &ui));

        assert_eq!(
            *h.log.lock().unwrap(),
            vec![
                Op::Backspace(4),
                Op::ClipboardGet,
                Op::ClipboardSet("Hello there".to_string()),
                Op::Paste,
                Op::ClipboardSet("original".to_string()),
                Op::Notify("Macro '/hi' applied".to_string()),
            ]
        );
        assert_eq!(*h.flag_seen.lock().unwrap(), vec![true]);
        assert!(!h.machine.is_applying());
        assert_eq!(*h.clipboard.lock().unwrap(), "original");
    }

    #[test]
    fn unknown_trigger_has_no_side_effects() {
        let mut h = harness(false);
        let ui = UiChannel::detached();

        assert!(!h.applier.apply("/nope", 5, &source(), &mut h.machine, &ui));
        assert!(h.log.lock().unwrap().is_empty());
        assert!(!h.machine.is_applying());
    }

    #[test]
    fn failed_paste_still_restores_clipboard_and_resets() {
        let mut h = harness(true);
        let ui = UiChannel::detached();
        let store = source();
        let now = Instant::now();
        for key in ["/", "h", "i"] {
            h.machine.handle_key(&Key::parse(key).unwrap(), now, &store);
        }

        assert!(!h.applier.apply("/hi", 4, &store, &mut h.machine, &ui));

        let log = h.log.lock().unwrap();
        assert_eq!(log[0], Op::Backspace(4));
        assert!(!log.contains(&Op::Paste));
        assert_eq!(log.last(), Some(&Op::ClipboardSet("original".to_string())));
        assert_eq!(*h.clipboard.lock().unwrap(), "original");
        assert_eq!(h.machine.buffer(), "");
        assert!(!h.machine.is_applying());
    }

    #[test]
    fn open_session_is_hidden_first_and_closed_after() {
        let mut h = harness(false);
        let (tx, rx) = mpsc::channel();
        let ui = UiChannel::new(tx);
        let store = source();

        h.machine.activate(Instant::now(), &store);
        assert!(h.machine.session().is_active());

        assert!(h.applier.apply("/hi", 1, &store, &mut h.machine, &ui));

        let commands: Vec<UiCommand> = rx.try_iter().collect();
        assert_eq!(commands, vec![UiCommand::Hide, UiCommand::Hide]);
        assert!(!h.machine.session().is_active());
        assert_eq!(h.machine.buffer(), "");
    }

    #[test]
    fn guard_lowers_flag_on_drop() {
        let flag = ApplyingFlag::default();
        {
            let _guard = flag.hold();
            assert!(flag.is_set());
        }
        assert!(!flag.is_set());
    }

    static SHOWN: AtomicUsize = AtomicUsize::new(0);
    static REFUSED: AtomicUsize = AtomicUsize::new(0);

    fn count_shown(_message: &str) -> std::result::Result<(), String> {
        SHOWN.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn refuse(_message: &str) -> std::result::Result<(), String> {
        REFUSED.fetch_add(1, Ordering::SeqCst);
        Err("no notification daemon".to_string())
    }

    #[test]
    fn desktop_notifier_respects_the_setting() {
        let mut off = DesktopNotifier::with_backend(false, count_shown);
        off.notify("Macro '/hi' applied");
        assert_eq!(SHOWN.load(Ordering::SeqCst), 0);

        let mut on = DesktopNotifier::with_backend(true, count_shown);
        on.notify("Macro '/hi' applied");
        on.notify("Macro '/hi' applied");
        assert_eq!(SHOWN.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn desktop_notifier_falls_back_to_logging() {
        let mut notifier = DesktopNotifier::with_backend(true, refuse);
        notifier.notify("Macro '/a' applied");
        notifier.notify("Macro '/b' applied");

        assert_eq!(REFUSED.load(Ordering::SeqCst), 1);
        assert!(!notifier.popups);
    }
}
