use crate::applier::{DesktopNotifier, MacroApplier};
use crate::clipboard::SystemClipboard;
use crate::config::{
    ensure_config_dir, get_db_file_path, get_log_file_path, get_pid_file_path,
    get_settings_file_path, is_daemon_running, process_alive, Settings,
};
use crate::engine::{Engine, EngineEvent};
use crate::error::{ExpandoError, Result};
use crate::expansion::MacroSource;
use crate::keyboard::EnigoInput;
use crate::listener::start_keyboard_listener;
use crate::session::{HeadlessRenderer, UiChannel, UiCommand};
use crate::state_machine::InputStateMachine;
use crate::storage::ExpansionStore;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::process::{self, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RELOAD_INTERVAL: Duration = Duration::from_secs(1);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Start the daemon, in the background unless `foreground` is set.
pub fn start_daemon(foreground: bool) -> Result<()> {
    if let Some(pid) = is_daemon_running()? {
        return Err(ExpandoError::DaemonAlreadyRunning(pid));
    }

    let config_dir = ensure_config_dir()?;
    // Fail here rather than inside the detached process
    Settings::load_from(&get_settings_file_path())?;

    if foreground {
        println!("Running expando daemon in the foreground (Ctrl+C to stop)");
        return daemon_worker_entry();
    }

    #[cfg(unix)]
    {
        use daemonize::Daemonize;

        let log_path = get_log_file_path();
        let stdout = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let stderr = stdout.try_clone()?;

        println!(
            "Starting expando daemon in the background (log: {})",
            log_path.display()
        );

        let daemonize = Daemonize::new()
            .working_directory(&config_dir)
            .stdout(stdout)
            .stderr(stderr);

        match daemonize.start() {
            Ok(()) => daemon_worker_entry(),
            Err(e) => Err(ExpandoError::Other(format!("Error starting daemon: {}", e))),
        }
    }

    #[cfg(not(unix))]
    {
        let log_path = get_log_file_path();
        let log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let exe = std::env::current_exe()?;

        println!(
            "Starting expando daemon in the background (log: {})",
            log_path.display()
        );
        let child = worker_command(&exe, &config_dir, log)?.spawn()?;
        debug!(pid = child.id(), "spawned daemon worker");

        // The worker writes its PID file once it is up
        for _ in 0..20 {
            thread::sleep(POLL_INTERVAL);
            if let Some(pid) = is_daemon_running()? {
                println!("Daemon started with PID {}", pid);
                return Ok(());
            }
        }
        Err(ExpandoError::Other(format!(
            "daemon did not start, check {}",
            log_path.display()
        )))
    }
}

/// Command that runs the hidden `daemon-worker` subcommand detached from the
/// terminal, with output going to `log`.
#[cfg_attr(unix, allow(dead_code))]
fn worker_command(exe: &Path, config_dir: &Path, log: File) -> Result<Command> {
    let mut command = Command::new(exe);
    command
        .arg("daemon-worker")
        .current_dir(config_dir)
        .stdin(Stdio::null())
        .stdout(log.try_clone()?)
        .stderr(log);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const DETACHED_PROCESS: u32 = 0x0000_0008;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(DETACHED_PROCESS | CREATE_NO_WINDOW);
    }
    Ok(command)
}

/// Run the worker with a PID file around it.
pub fn daemon_worker_entry() -> Result<()> {
    let pid_file = get_pid_file_path();
    let mut file = File::create(&pid_file)?;
    write!(file, "{}", process::id())?;
    drop(file);

    let result = run_daemon_worker();

    if let Err(e) = fs::remove_file(&pid_file) {
        debug!(error = %e, "PID file already gone");
    }
    result
}

/// The daemon body: store, renderer, engine and keyboard hook, plus a
/// monitor loop that reloads the store when it changes on disk.
pub fn run_daemon_worker() -> Result<()> {
    let settings = Settings::load();
    let chord = settings.hotkey_chord()?;

    let store = Arc::new(ExpansionStore::open(get_db_file_path(), settings.prefix));
    let source: Arc<dyn MacroSource + Send + Sync> = store.clone();

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst)).map_err(|e| {
            ExpandoError::Other(format!("could not install signal handler: {}", e))
        })?;
    }

    let (event_tx, event_rx) = mpsc::channel::<EngineEvent>();
    let (ui_tx, ui_rx) = mpsc::channel::<UiCommand>();

    let renderer = HeadlessRenderer::new(event_tx.clone()).with_previews(Arc::clone(&source));
    let renderer_thread = thread::spawn(move || renderer.run(ui_rx));

    let machine = InputStateMachine::new(
        settings.prefix,
        chord.clone(),
        settings.hotkey_ignore_window(),
    );
    let applying = machine.applying_flag();
    let engine_settings = settings.clone();
    let engine_source = Arc::clone(&source);
    // Input and clipboard handles are created on the engine thread itself.
    let engine_thread = Engine::spawn(
        move || {
            let applier = MacroApplier::new(
                Box::new(EnigoInput::new(engine_settings.backspace_delay())),
                Box::new(SystemClipboard::new()),
                Box::new(DesktopNotifier::new(engine_settings.notifications)),
                engine_settings.timing(),
            );
            Ok(Engine::new(
                machine,
                applier,
                engine_source,
                UiChannel::new(ui_tx),
            ))
        },
        event_rx,
    );

    // rdev never returns from its hook, so this thread is not joined.
    let _listener = start_keyboard_listener(
        event_tx.clone(),
        applying,
        chord.clone(),
        Arc::clone(&running),
    );

    info!(
        pid = process::id(),
        prefix = %settings.prefix,
        hotkey = %chord,
        expansions = store.len(),
        "expando daemon started"
    );

    let mut last_check = Instant::now();
    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
        if last_check.elapsed() >= RELOAD_INTERVAL {
            last_check = Instant::now();
            if store.reload_if_modified() {
                info!(expansions = store.len(), "expansions reloaded from disk");
            }
        }
    }

    info!("shutting down expando daemon");
    if event_tx.send(EngineEvent::Shutdown).is_err() {
        warn!("engine already stopped");
    }
    if engine_thread.join().is_err() {
        error!("engine thread panicked");
    }
    if renderer_thread.join().is_err() {
        error!("renderer thread panicked");
    }
    Ok(())
}

/// Stop the daemon if it's running
pub fn stop_daemon() -> Result<()> {
    let pid_file = get_pid_file_path();

    if !pid_file.exists() {
        return Err(ExpandoError::DaemonNotRunning);
    }

    let pid_str = fs::read_to_string(&pid_file)?;
    let pid = match pid_str.trim().parse::<u32>() {
        Ok(pid) => pid,
        Err(_) => {
            let _ = fs::remove_file(&pid_file);
            return Err(ExpandoError::InvalidPid);
        }
    };

    if !process_alive(pid) {
        println!("Process with PID {} is not running, removing stale PID file", pid);
        let _ = fs::remove_file(&pid_file);
        return Ok(());
    }

    send_terminate(pid)?;

    // The worker removes its own PID file on a graceful exit.
    let deadline = Instant::now() + STOP_TIMEOUT;
    while process_alive(pid) && Instant::now() < deadline {
        thread::sleep(POLL_INTERVAL);
    }
    if process_alive(pid) {
        return Err(ExpandoError::Other(format!(
            "Daemon with PID {} did not exit within {:?}",
            pid, STOP_TIMEOUT
        )));
    }

    let _ = fs::remove_file(&pid_file);
    println!("Stopped expando daemon with PID {}", pid);
    Ok(())
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> Result<()> {
    let status = process::Command::new("kill").arg(pid.to_string()).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(ExpandoError::Other(format!(
            "Failed to stop daemon with PID {}",
            pid
        )))
    }
}

#[cfg(windows)]
fn send_terminate(pid: u32) -> Result<()> {
    let status = process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(ExpandoError::Other(format!(
            "Failed to stop daemon with PID {}",
            pid
        )))
    }
}

#[cfg(not(any(unix, windows)))]
fn send_terminate(_pid: u32) -> Result<()> {
    Err(ExpandoError::Other(
        "Stopping daemon not supported on this platform".to_string(),
    ))
}

/// Check daemon status
pub fn daemon_status() -> Result<()> {
    match is_daemon_running()? {
        Some(pid) => println!("expando daemon is running with PID {}", pid),
        None => println!("expando daemon is not running"),
    }
    Ok(())
}
