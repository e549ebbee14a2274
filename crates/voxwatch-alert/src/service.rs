//! Alert service actor.
//!
//! All alert state (policy, queue, dispatcher and the speech slot) lives in
//! one [`AlertService`] task. Collaborators talk to it through a cloneable
//! [`AlertHandle`] whose methods never block: each one queues a command on an
//! unbounded channel and returns. Outward notifications are published as
//! [`AlertEvent`]s on a broadcast channel.
//!
//! ```text
//!  AlertHandle ──Command──▶ ┌──────────────┐ ──speak──▶ SpeechManager
//!                           │ AlertService │ ◀─completion──┘
//!  tick (500ms) ──────────▶ └──────────────┘ ──AlertEvent──▶ subscribers
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use voxwatch_core::{AlertEntry, HealthEvent, Result, SpeechConfig, StatusLevel, VoxConfig, VoxError};
use voxwatch_speech::{BackendDiscovery, SpeechCompletion, SpeechManager, SpeechSettings, TtsBackend};

use crate::dispatcher::{AlertDispatcher, DispatchState};
use crate::policy::{AlertPolicy, PolicyDecision};
use crate::queue::AlertQueue;
use crate::status::resolve_status;

/// Sentence spoken by [`AlertHandle::test_voice`].
pub const TEST_VOICE_TEXT: &str = "Voice alert system test. Audio is working correctly.";

/// Capacity of the event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notifications published by the service.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    /// An alert was handed to the speech subsystem.
    AlertTriggered {
        entity_id: String,
        status: StatusLevel,
        health_percent: f64,
        at: DateTime<Utc>,
    },

    /// TTS availability, published when the service starts and when a
    /// voice test finds a backend that was missing.
    TtsStatusChanged { available: bool, info: String },
}

#[derive(Debug)]
enum Command {
    HealthUpdate {
        entity_id: String,
        entity_name: String,
        token: String,
        health_percent: f64,
    },
    SetMuted(bool),
    SetCooldown(Duration),
    SetLevel(StatusLevel, bool),
    TestVoice,
    Diagnostics(oneshot::Sender<String>),
    Shutdown(oneshot::Sender<()>),
}

/// Cloneable front end to a running [`AlertService`].
#[derive(Debug, Clone)]
pub struct AlertHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<AlertEvent>,
    tts_available: Arc<AtomicBool>,
}

impl AlertHandle {
    /// Feed one health reading into the policy.
    pub fn process_health_update(
        &self,
        entity_id: impl Into<String>,
        entity_name: impl Into<String>,
        color: impl Into<String>,
        health_percent: f64,
    ) -> Result<()> {
        self.send(Command::HealthUpdate {
            entity_id: entity_id.into(),
            entity_name: entity_name.into(),
            token: color.into(),
            health_percent,
        })
    }

    /// Feed a decoded event, keyed by [`HealthEvent::alert_key`].
    ///
    /// Telemetry events carry no status and are ignored.
    pub fn process_health_event(&self, event: &HealthEvent, entity_name: &str) -> Result<()> {
        if !event.is_health_update() {
            return Ok(());
        }
        self.process_health_update(
            event.alert_key(),
            entity_name,
            event.status_token.as_str(),
            event.health_percent,
        )
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.send(Command::SetMuted(muted))
    }

    pub fn set_cooldown_seconds(&self, seconds: u64) -> Result<()> {
        self.send(Command::SetCooldown(Duration::from_secs(seconds)))
    }

    pub fn set_alert_on_critical(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetLevel(StatusLevel::Critical, enabled))
    }

    pub fn set_alert_on_degraded(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetLevel(StatusLevel::Degraded, enabled))
    }

    pub fn set_alert_on_warning(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetLevel(StatusLevel::Warning, enabled))
    }

    pub fn set_alert_on_offline(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetLevel(StatusLevel::Offline, enabled))
    }

    /// Speak [`TEST_VOICE_TEXT`] now, ignoring mute and the queue.
    ///
    /// In log-only mode the service first rescans for a backend if it was
    /// built [`with_rescan`](AlertService::with_rescan).
    pub fn test_voice(&self) -> Result<()> {
        self.send(Command::TestVoice)
    }

    /// Whether a TTS backend is in use.
    pub fn is_tts_available(&self) -> bool {
        self.tts_available.load(Ordering::SeqCst)
    }

    /// Multi-line status report.
    pub async fn diagnostic_info(&self) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Diagnostics(tx))?;
        rx.await.map_err(|_| VoxError::ServiceStopped)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    /// Stop the service and wait until the speech process is gone.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| VoxError::ServiceStopped)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| VoxError::ServiceStopped)
    }
}

/// Single owner of all alerting state.
pub struct AlertService {
    policy: AlertPolicy,
    queue: AlertQueue,
    dispatcher: AlertDispatcher,
    speech: SpeechManager,
    speech_config: SpeechConfig,
    discovery: Option<BackendDiscovery>,
    tts_available: Arc<AtomicBool>,
    tick_interval: Duration,
    commands: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::UnboundedReceiver<SpeechCompletion>,
    events: broadcast::Sender<AlertEvent>,
}

impl AlertService {
    /// Build the service and its handle. `None` as the backend selects log-only speech.
    pub fn new(config: &VoxConfig, backend: Option<TtsBackend>) -> (Self, AlertHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let speech = SpeechManager::new(backend, SpeechSettings::from(&config.speech), completion_tx);

        let tts_available = Arc::new(AtomicBool::new(speech.is_available()));
        let handle = AlertHandle {
            commands: command_tx,
            events: event_tx.clone(),
            tts_available: Arc::clone(&tts_available),
        };

        let service = Self {
            policy: AlertPolicy::from_config(&config.alerts),
            queue: AlertQueue::new(),
            dispatcher: AlertDispatcher::new(config.alerts.muted),
            speech,
            speech_config: config.speech.clone(),
            discovery: None,
            tts_available,
            tick_interval: config.alerts.tick_interval(),
            commands: command_rx,
            completions: completion_rx,
            events: event_tx,
        };

        (service, handle)
    }

    /// Let a voice test in log-only mode rescan with `discovery`.
    ///
    /// Without this, a missing backend stays missing for the service's lifetime.
    pub fn with_rescan(mut self, discovery: BackendDiscovery) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Run the service on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Event loop. Returns after [`AlertHandle::shutdown`] or once every handle is dropped.
    pub async fn run(mut self) {
        self.publish(AlertEvent::TtsStatusChanged {
            available: self.speech.is_available(),
            info: self.speech.diagnostic_info(),
        });

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_ms = self.tick_interval.as_millis() as u64,
            cooldown_secs = self.policy.cooldown().as_secs(),
            muted = self.dispatcher.is_muted(),
            "alert service started"
        );

        loop {
            tokio::select! {
                biased;

                Some(done) = self.completions.recv() => self.on_speech_complete(done),
                _ = tick.tick() => self.on_tick().await,
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.stop().await;
                        break;
                    }
                },
            }
        }

        info!("alert service stopped");
    }

    /// Apply one command. Returns false once the service should stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::HealthUpdate {
                entity_id,
                entity_name,
                token,
                health_percent,
            } => self.on_health_update(entity_id, entity_name, &token, health_percent),
            Command::SetMuted(muted) => {
                info!(muted, "mute changed");
                self.dispatcher.set_muted(muted);
            }
            Command::SetCooldown(cooldown) => {
                debug!(cooldown_secs = cooldown.as_secs(), "cooldown changed");
                self.policy.set_cooldown(cooldown);
            }
            Command::SetLevel(status, enabled) => {
                if self.policy.set_level(status, enabled) {
                    debug!(%status, enabled, "alert level changed");
                }
            }
            Command::TestVoice => {
                info!("voice test");
                if !self.speech.is_available() {
                    self.rescan().await;
                }
                let session = self.speech.speak(TEST_VOICE_TEXT).await;
                self.dispatcher.begin_speaking(session);
            }
            Command::Diagnostics(reply) => {
                let _ = reply.send(self.diagnostic_info());
            }
            Command::Shutdown(ack) => {
                self.stop().await;
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    #[instrument(level = "trace", skip(self, entity_name))]
    fn on_health_update(&mut self, entity_id: String, entity_name: String, token: &str, health_percent: f64) {
        let status = resolve_status(token);
        let now = Instant::now().into_std();

        match self.policy.evaluate(&entity_id, status, now) {
            PolicyDecision::Admit => {
                debug!(%entity_id, %status, health_percent, "alert queued");
                self.queue
                    .insert(AlertEntry::new(entity_id, entity_name, status, health_percent));
            }
            PolicyDecision::LevelDisabled => {
                debug!(%entity_id, %status, "status not alertable");
            }
            PolicyDecision::CoolingDown { remaining } => {
                debug!(
                    %entity_id,
                    %status,
                    remaining_ms = remaining.as_millis() as u64,
                    "alert suppressed by cooldown"
                );
            }
        }
    }

    async fn on_tick(&mut self) {
        let Some(entry) = self.dispatcher.next_alert(&mut self.queue) else {
            return;
        };

        let text = entry.utterance();
        info!(
            entity_id = %entry.entity_id,
            status = %entry.status,
            health_percent = entry.health_percent,
            "voice alert"
        );

        let session = self.speech.speak(&text).await;
        self.dispatcher.begin_speaking(session);

        self.publish(AlertEvent::AlertTriggered {
            entity_id: entry.entity_id,
            status: entry.status,
            health_percent: entry.health_percent,
            at: Utc::now(),
        });
    }

    fn on_speech_complete(&mut self, done: SpeechCompletion) {
        self.speech.complete(done.session);
        if self.dispatcher.on_speech_complete(done.session) {
            debug!(session = %done.session, outcome = ?done.outcome, "dispatcher idle");
        }
    }

    async fn rescan(&mut self) {
        let Some(discovery) = &self.discovery else {
            return;
        };

        info!("rescanning for a TTS backend");
        let Some(backend) = discovery.resolve(&self.speech_config).await else {
            let err = VoxError::BackendNotFound {
                searched: discovery.searched(),
            };
            warn!(error = %err, hint = err.guidance(), "voice test stays log-only");
            return;
        };

        self.speech.set_backend(Some(backend));
        self.tts_available.store(true, Ordering::SeqCst);
        self.publish(AlertEvent::TtsStatusChanged {
            available: true,
            info: self.speech.diagnostic_info(),
        });
    }

    fn diagnostic_info(&self) -> String {
        let levels = self.policy.levels().enabled_names();
        let dispatcher = match self.dispatcher.state() {
            DispatchState::Idle => "idle".to_string(),
            DispatchState::Speaking { session } => format!("speaking (session {session})"),
        };

        [
            format!("TTS: {}", self.speech.diagnostic_info()),
            format!("Muted: {}", if self.dispatcher.is_muted() { "yes" } else { "no" }),
            format!("Cooldown: {}s", self.policy.cooldown().as_secs()),
            format!(
                "Alert levels: {}",
                if levels.is_empty() { "none".to_string() } else { levels.join(", ") }
            ),
            format!("Queue depth: {}", self.queue.len()),
            format!("Dispatcher: {dispatcher}"),
            format!("Tracked entities: {}", self.policy.tracked()),
        ]
        .join("\n")
    }

    async fn stop(&mut self) {
        self.speech.shutdown().await;
        self.dispatcher.reset();
        self.queue.clear();
        self.policy.clear();
    }

    fn publish(&self, event: AlertEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
