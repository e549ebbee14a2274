//! Speech subprocess supervision.
//!
//! [`SpeechManager`] owns at most one live utterance. An utterance is one
//! process, or an engine and audio player pair (see
//! [`SpeakStrategy`](crate::SpeakStrategy)). It runs under a monitor task
//! that races the processes against one watchdog deadline and a kill signal;
//! whichever finishes first decides the [`SpeechOutcome`]. Watchdog expiry
//! and cancellation are reported as soon as the processes are killed.
//! The outcome is reported on the completion channel handed to
//! [`SpeechManager::new`], tagged with the [`SessionId`] that
//! [`speak`](SpeechManager::speak) returned.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout, timeout_at};
use tracing::{debug, info, instrument, warn};
use voxwatch_core::{SpeechConfig, VoxError};

use crate::backend::{SpeechPlan, TtsBackend};

/// Upper bound on collecting stderr after a normal exit.
const STDERR_COLLECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Identifies one `speak` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How an utterance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Exit status 0.
    Finished,
    /// Nonzero exit, or killed by a signal (`code` is `None`).
    Failed { code: Option<i32> },
    /// Waiting on the process failed.
    Error { message: String },
    /// The watchdog fired and the process was killed.
    WatchdogExpired,
    /// Superseded by a newer utterance or by shutdown.
    Cancelled,
    /// The process could not be started.
    SpawnFailed { message: String },
    /// No backend; the utterance was only logged.
    LogOnly,
}

impl SpeechOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished | Self::LogOnly)
    }
}

/// Completion report for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechCompletion {
    pub session: SessionId,
    pub outcome: SpeechOutcome,
    /// Captured error output, possibly empty
    pub stderr: String,
}

/// Timing knobs for the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechSettings {
    /// Kill the process if it runs longer than this.
    pub watchdog_timeout: Duration,
    /// How long to wait for a killed process to be reaped.
    pub shutdown_grace: Duration,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self::from(&SpeechConfig::default())
    }
}

impl From<&SpeechConfig> for SpeechSettings {
    fn from(config: &SpeechConfig) -> Self {
        Self {
            watchdog_timeout: config.watchdog_timeout(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

struct SpeechSession {
    id: SessionId,
    kill_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

enum SpeechState {
    Idle,
    Speaking(SpeechSession),
}

/// Owns the single TTS process slot.
pub struct SpeechManager {
    backend: Option<TtsBackend>,
    settings: SpeechSettings,
    completion_tx: mpsc::UnboundedSender<SpeechCompletion>,
    next_session: u64,
    state: SpeechState,
}

impl SpeechManager {
    /// Create a manager. `None` as the backend selects log-only mode.
    pub fn new(
        backend: Option<TtsBackend>,
        settings: SpeechSettings,
        completion_tx: mpsc::UnboundedSender<SpeechCompletion>,
    ) -> Self {
        match &backend {
            Some(b) => info!(backend = %b, "speech manager ready"),
            None => warn!("no TTS backend available, alerts will only be logged"),
        }
        Self {
            backend,
            settings,
            completion_tx,
            next_session: 0,
            state: SpeechState::Idle,
        }
    }

    /// Whether a real backend is in use.
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&TtsBackend> {
        self.backend.as_ref()
    }

    pub fn settings(&self) -> SpeechSettings {
        self.settings
    }

    /// Whether a process is currently tracked.
    pub fn is_speaking(&self) -> bool {
        matches!(self.state, SpeechState::Speaking(_))
    }

    /// Session of the live process, if any.
    pub fn current_session(&self) -> Option<SessionId> {
        match &self.state {
            SpeechState::Speaking(session) => Some(session.id),
            SpeechState::Idle => None,
        }
    }

    /// Swap the backend, typically after a manual rescan.
    ///
    /// A live process keeps running until it completes or the next `speak`.
    pub fn set_backend(&mut self, backend: Option<TtsBackend>) {
        match &backend {
            Some(b) => info!(backend = %b, strategy = %b.strategy(), "speech backend changed"),
            None => warn!("speech backend removed, alerts will only be logged"),
        }
        self.backend = backend;
    }

    /// Speak `text`, terminating any process still running.
    ///
    /// Always produces exactly one completion for the returned session,
    /// including when nothing is spawned.
    #[instrument(level = "debug", skip(self, text))]
    pub async fn speak(&mut self, text: &str) -> SessionId {
        self.next_session += 1;
        let id = SessionId(self.next_session);

        self.terminate_current().await;

        let Some(backend) = &self.backend else {
            info!(session = %id, utterance = text, "log-only speech");
            self.report(id, SpeechOutcome::LogOnly, String::new());
            return id;
        };

        let deadline = Instant::now() + self.settings.watchdog_timeout;
        let strategy = backend.strategy();
        let job = match launch(backend.plan(text, &scratch_wav(id))) {
            Ok(job) => job,
            Err(e) => {
                let err = VoxError::speech_spawn(backend.to_string(), e.to_string());
                warn!(session = %id, error = %err, hint = err.guidance(), "TTS process not started");
                self.report(id, SpeechOutcome::SpawnFailed { message: e.to_string() }, String::new());
                return id;
            }
        };

        debug!(session = %id, %strategy, utterance = text, "TTS process started");

        let (kill_tx, kill_rx) = oneshot::channel();
        let monitor = Monitor {
            session: id,
            deadline,
            watchdog: self.settings.watchdog_timeout,
            kill_rx,
            stderr: Vec::new(),
        };
        let task = tokio::spawn(monitor.run(job, self.completion_tx.clone()));
        self.state = SpeechState::Speaking(SpeechSession { id, kill_tx, task });
        id
    }

    /// Release the slot if `session` is the live one.
    ///
    /// Returns false for stale sessions, which are left untouched.
    pub fn complete(&mut self, session: SessionId) -> bool {
        if self.current_session() != Some(session) {
            return false;
        }
        self.state = SpeechState::Idle;
        true
    }

    /// Kill any live process and wait for it, bounded by the grace period.
    pub async fn shutdown(&mut self) {
        self.terminate_current().await;
        debug!("speech manager stopped");
    }

    /// One-line description of the speech subsystem.
    pub fn diagnostic_info(&self) -> String {
        let backend = match &self.backend {
            Some(b) => format!("backend {b}, strategy {}", b.strategy()),
            None => "no backend (log-only mode)".to_string(),
        };
        let state = match self.current_session() {
            Some(id) => format!("speaking session {id}"),
            None => "idle".to_string(),
        };
        format!(
            "{backend}, {state}, watchdog {}ms",
            self.settings.watchdog_timeout.as_millis()
        )
    }

    async fn terminate_current(&mut self) {
        let SpeechState::Speaking(session) = std::mem::replace(&mut self.state, SpeechState::Idle)
        else {
            return;
        };

        debug!(session = %session.id, "terminating previous TTS process");
        let _ = session.kill_tx.send(());

        let mut task = session.task;
        if timeout(self.settings.shutdown_grace, &mut task).await.is_err() {
            warn!(session = %session.id, "TTS process did not stop within grace period, aborting");
            task.abort();
        }
    }

    fn report(&self, session: SessionId, outcome: SpeechOutcome, stderr: String) {
        let _ = self.completion_tx.send(SpeechCompletion {
            session,
            outcome,
            stderr,
        });
    }
}

/// Temporary WAV path for one session.
fn scratch_wav(session: SessionId) -> PathBuf {
    std::env::temp_dir().join(format!(
        "voxwatch-{}-{}.wav",
        std::process::id(),
        session.as_u64()
    ))
}

/// Null stdio except a captured stderr; killed if the handle is dropped.
fn supervised(cmd: &mut Command) -> &mut Command {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
}

/// Live processes behind one utterance.
enum Job {
    Single(Child),
    /// Engine stdout feeds the player's stdin.
    Piped { engine: Child, player: Child },
    /// Engine renders `wav`; the player is started once it succeeds.
    Rendered {
        engine: Child,
        player: Command,
        wav: PathBuf,
    },
}

/// Spawn the first stage of a plan.
fn launch(plan: SpeechPlan) -> io::Result<Job> {
    match plan {
        SpeechPlan::Direct(mut cmd) => Ok(Job::Single(supervised(&mut cmd).spawn()?)),
        SpeechPlan::Pipeline {
            mut engine,
            mut player,
        } => {
            let mut producer = supervised(&mut engine).stdout(Stdio::piped()).spawn()?;
            let wav_stream: Stdio = producer
                .stdout
                .take()
                .ok_or_else(|| io::Error::other("engine stdout was not captured"))?
                .try_into()?;
            let consumer = supervised(&mut player).stdin(wav_stream).spawn()?;
            Ok(Job::Piped {
                engine: producer,
                player: consumer,
            })
        }
        SpeechPlan::WavFile {
            mut engine,
            mut player,
            wav,
        } => {
            let engine = supervised(&mut engine).spawn()?;
            supervised(&mut player);
            Ok(Job::Rendered {
                engine,
                player,
                wav,
            })
        }
    }
}

enum Stop {
    Exited(io::Result<ExitStatus>),
    Watchdog,
    Killed,
    SpawnFailed(io::Error),
}

/// Supervises one utterance against a single deadline covering every stage.
struct Monitor {
    session: SessionId,
    deadline: Instant,
    watchdog: Duration,
    kill_rx: oneshot::Receiver<()>,
    stderr: Vec<JoinHandle<String>>,
}

impl Monitor {
    async fn run(mut self, job: Job, completion_tx: mpsc::UnboundedSender<SpeechCompletion>) {
        let session = self.session;

        let (stop, wav) = match job {
            Job::Single(mut child) => (self.wait(&mut child).await, None),
            Job::Piped {
                mut engine,
                mut player,
            } => {
                self.capture(&mut engine);
                let stop = self.wait(&mut player).await;
                // The player decides the outcome; the engine is done or useless
                let _ = engine.kill().await;
                (stop, None)
            }
            Job::Rendered {
                mut engine,
                mut player,
                wav,
            } => {
                let stop = match self.wait(&mut engine).await {
                    Stop::Exited(Ok(status)) if status.success() => match player.spawn() {
                        Ok(mut child) => self.wait(&mut child).await,
                        Err(e) => Stop::SpawnFailed(e),
                    },
                    other => other,
                };
                (stop, Some(wav))
            }
        };

        let outcome = match stop {
            Stop::Exited(Ok(status)) if status.success() => SpeechOutcome::Finished,
            Stop::Exited(Ok(status)) => SpeechOutcome::Failed {
                code: status.code(),
            },
            Stop::Exited(Err(e)) => SpeechOutcome::Error {
                message: e.to_string(),
            },
            Stop::Watchdog => {
                warn!(%session, timeout_ms = self.watchdog.as_millis() as u64, "TTS process hung, killed");
                SpeechOutcome::WatchdogExpired
            }
            Stop::Killed => SpeechOutcome::Cancelled,
            Stop::SpawnFailed(e) => SpeechOutcome::SpawnFailed {
                message: e.to_string(),
            },
        };

        // A killed process may leave descendants holding stderr open
        let stderr = match outcome {
            SpeechOutcome::WatchdogExpired | SpeechOutcome::Cancelled => {
                self.abort_capture();
                String::new()
            }
            _ => self.collect_stderr().await,
        };

        if let Some(wav) = wav {
            if let Err(e) = tokio::fs::remove_file(&wav).await {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(%session, path = %wav.display(), error = %e, "temporary WAV not removed");
                }
            }
        }

        match &outcome {
            SpeechOutcome::Finished => debug!(%session, "TTS process finished"),
            SpeechOutcome::Failed { code } => {
                warn!(%session, exit_code = ?code, stderr = %stderr, "TTS process failed")
            }
            SpeechOutcome::Error { message } => {
                warn!(%session, error = %message, "waiting on TTS process failed")
            }
            SpeechOutcome::SpawnFailed { message } => {
                warn!(%session, error = %message, "TTS player not started")
            }
            _ => debug!(%session, outcome = ?outcome, "TTS process stopped"),
        }

        let _ = completion_tx.send(SpeechCompletion {
            session,
            outcome,
            stderr,
        });
    }

    fn capture(&mut self, child: &mut Child) {
        if let Some(stderr) = child.stderr.take() {
            self.stderr.push(tokio::spawn(read_stderr(stderr)));
        }
    }

    /// Wait for `child`, killing it on watchdog expiry or a kill request.
    ///
    /// A dropped kill sender also counts as a kill request.
    async fn wait(&mut self, child: &mut Child) -> Stop {
        self.capture(child);
        let stop = tokio::select! {
            status = child.wait() => Stop::Exited(status),
            _ = sleep_until(self.deadline) => Stop::Watchdog,
            _ = &mut self.kill_rx => Stop::Killed,
        };
        if !matches!(stop, Stop::Exited(_)) {
            let _ = child.kill().await;
        }
        stop
    }

    fn abort_capture(&mut self) {
        for task in self.stderr.drain(..) {
            task.abort();
        }
    }

    /// Join captured stderr, bounded by [`STDERR_COLLECT_TIMEOUT`].
    async fn collect_stderr(&mut self) -> String {
        let limit = Instant::now() + STDERR_COLLECT_TIMEOUT;
        let mut parts = Vec::new();
        for mut task in self.stderr.drain(..) {
            match timeout_at(limit, &mut task).await {
                Ok(Ok(text)) => parts.push(text.trim().to_string()),
                Ok(Err(_)) => {}
                Err(_) => task.abort(),
            }
        }
        parts.retain(|p| !p.is_empty());
        parts.join("\n")
    }
}

async fn read_stderr(mut stderr: ChildStderr) -> String {
    let mut buf = Vec::new();
    let _ = stderr.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}
