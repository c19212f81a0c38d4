//! External control surface.
//!
//! Two files drive the loop from outside the process:
//! - the command file, polled at a low rate; a one-character command is read and
//!   the file truncated (`q` quits, `t` and `s` are acknowledged but unsupported);
//! - the stop file, whose mere existence asks the monitor loop to stop. It is
//!   removed at startup and on every shutdown path.
//!
//! Ctrl-C feeds the same stop signal.

use std::fs::OpenOptions;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};

pub const DEFAULT_COMMAND_FILE: &str = "control_commands.txt";
pub const DEFAULT_STOP_FILE: &str = "stop_signal.txt";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Shared stop request: an in-process flag mirrored by a stop file on disk.
#[derive(Clone, Debug)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
    stop_file: PathBuf,
}

impl StopSignal {
    pub fn new(stop_file: impl Into<PathBuf>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            stop_file: stop_file.into(),
        }
    }

    pub fn stop_file(&self) -> &Path {
        &self.stop_file
    }

    /// Ask the loop to stop: raise the flag and drop the stop file.
    pub fn request(&self) -> Result<()> {
        self.flag.store(true, Ordering::SeqCst);
        std::fs::write(&self.stop_file, "stop")
            .with_context(|| format!("write stop file {}", self.stop_file.display()))
    }

    /// True when the flag is raised or the stop file exists.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst) || self.stop_file.exists()
    }

    /// Remove the stop file if present. The flag is left alone.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.stop_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("remove stop file {}", self.stop_file.display())),
        }
    }

    /// Clear now and again when the returned guard drops.
    pub fn guard(&self) -> Result<StopFileGuard> {
        self.clear()?;
        Ok(StopFileGuard {
            signal: self.clone(),
        })
    }
}

/// Removes the stop file on drop, whatever path the process leaves by.
pub struct StopFileGuard {
    signal: StopSignal,
}

impl Drop for StopFileGuard {
    fn drop(&mut self) {
        if let Err(e) = self.signal.clear() {
            log::error!("{:#}", e);
        }
    }
}

/// Route Ctrl-C into the stop signal. May be installed once per process.
pub fn install_interrupt_handler(stop: &StopSignal) -> Result<()> {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
        log::warn!("interrupt received, stopping");
        if let Err(e) = stop.request() {
            log::error!("{:#}", e);
        }
    })
    .context("install Ctrl-C handler")
}

/// A command read from the command file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    TrainFace,
    SaveAlert,
    Unknown(String),
}

impl Command {
    /// Parse trimmed, case-insensitive text. Empty text is no command.
    pub fn parse(raw: &str) -> Option<Self> {
        let cmd = raw.trim().to_lowercase();
        match cmd.as_str() {
            "" => None,
            "q" => Some(Self::Quit),
            "t" => Some(Self::TrainFace),
            "s" => Some(Self::SaveAlert),
            _ => Some(Self::Unknown(cmd)),
        }
    }

    /// The single character written by `watch_ctl`.
    pub fn as_char(&self) -> Option<char> {
        match self {
            Self::Quit => Some('q'),
            Self::TrainFace => Some('t'),
            Self::SaveAlert => Some('s'),
            Self::Unknown(_) => None,
        }
    }
}

/// Polls the command file and feeds `q` into the stop signal.
pub struct ControlChannel {
    command_file: PathBuf,
    poll_interval: Duration,
    stop: StopSignal,
    last_modified: Option<SystemTime>,
}

impl ControlChannel {
    pub fn new(command_file: impl Into<PathBuf>, poll_interval: Duration, stop: StopSignal) -> Self {
        Self {
            command_file: command_file.into(),
            poll_interval,
            stop,
            last_modified: None,
        }
    }

    pub fn command_file(&self) -> &Path {
        &self.command_file
    }

    /// Create the command file if missing and remember its modification time.
    pub fn prepare(&mut self) -> Result<()> {
        if !self.command_file.exists() {
            std::fs::write(&self.command_file, "").with_context(|| {
                format!("create command file {}", self.command_file.display())
            })?;
        }
        self.last_modified = Some(self.modified()?);
        Ok(())
    }

    fn modified(&self) -> Result<SystemTime> {
        std::fs::metadata(&self.command_file)
            .and_then(|m| m.modified())
            .with_context(|| format!("stat command file {}", self.command_file.display()))
    }

    /// Check the command file once. Reads and truncates it when it changed or holds
    /// unread text.
    pub fn poll_once(&mut self) -> Result<Option<Command>> {
        let metadata = std::fs::metadata(&self.command_file)
            .with_context(|| format!("stat command file {}", self.command_file.display()))?;
        let modified = metadata.modified()?;
        let changed = self.last_modified.map_or(true, |last| modified != last);
        if !changed && metadata.len() == 0 {
            return Ok(None);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.command_file)
            .with_context(|| format!("open command file {}", self.command_file.display()))?;
        let mut raw = String::new();
        file.read_to_string(&mut raw)
            .with_context(|| format!("read command file {}", self.command_file.display()))?;
        file.set_len(0)
            .with_context(|| format!("truncate command file {}", self.command_file.display()))?;
        drop(file);
        self.last_modified = Some(self.modified()?);

        Ok(Command::parse(&raw))
    }

    /// Act on a command. Returns true when polling should end.
    pub fn handle(&self, command: &Command) -> Result<bool> {
        match command {
            Command::Quit => {
                self.stop.request()?;
                log::warn!("stop signal sent");
                Ok(true)
            }
            Command::TrainFace => {
                log::info!("face training mode is not supported in this version");
                Ok(false)
            }
            Command::SaveAlert => {
                log::info!("save alert image requested");
                Ok(false)
            }
            Command::Unknown(cmd) => {
                log::debug!("ignoring unknown control command '{}'", cmd);
                Ok(false)
            }
        }
    }

    /// Poll on a background thread until `q` arrives, a stop is requested elsewhere,
    /// or the returned handle is dropped.
    pub fn spawn(mut self) -> Result<ControlHandle> {
        self.prepare()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        log::info!(
            "control: write q (quit), t (train face) or s (save alert) into {}",
            self.command_file.display()
        );

        let join = std::thread::Builder::new()
            .name("control".to_string())
            .spawn(move || self.run(&thread_shutdown))
            .context("spawn control thread")?;
        Ok(ControlHandle {
            shutdown,
            join: Some(join),
        })
    }

    fn run(&mut self, shutdown: &AtomicBool) {
        loop {
            sleep_unless(shutdown, self.poll_interval);
            if shutdown.load(Ordering::SeqCst) || self.stop.is_requested() {
                break;
            }
            let command = match self.poll_once() {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!("control poll failed: {:#}", e);
                    continue;
                }
            };
            match self.handle(&command) {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => log::error!("control command {:?} failed: {:#}", command, e),
            }
        }
        log::debug!("control thread exiting");
    }
}

/// Sleep up to `total`, waking early once `shutdown` is raised.
fn sleep_unless(shutdown: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(50).min(total);
    let mut slept = Duration::ZERO;
    while slept < total && !shutdown.load(Ordering::SeqCst) {
        std::thread::sleep(step);
        slept += step;
    }
}

/// Owns the control thread; stops and joins it on drop.
pub struct ControlHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ControlHandle {
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    pub fn shutdown(mut self) {
        self.stop_thread();
    }

    fn stop_thread(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("control thread panicked");
            }
        }
    }
}

impl Drop for ControlHandle {
    fn drop(&mut self) {
        self.stop_thread();
    }
}
