//! voxwatch - spoken alerts for health telemetry
//!
//! Listens for health records from remote subsystems and announces
//! degraded, critical and offline components through a text-to-speech
//! backend.
//!
//! ## Usage
//!
//! ```bash
//! # Listen on the default ports (12345 stream, 12346 datagram)
//! voxwatch
//!
//! # Custom port and cooldown, verbose logging
//! voxwatch --port 9000 --cooldown 30 -v
//!
//! # Check the speech backend at startup
//! voxwatch --test-voice
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use voxwatch_alert::{AlertEvent, AlertHandle, AlertService};
use voxwatch_core::{LogGuard, LogOptions, Result, VoxConfig, VoxError, init_logging};
use voxwatch_ingest::{ListenerEvent, MessageDecoder, TelemetryListener};
use voxwatch_speech::BackendDiscovery;

/// Health telemetry listener with spoken alerts
#[derive(Parser, Debug)]
#[command(name = "voxwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// More log detail: -v for debug, -vv for trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log filter directives (overrides RUST_LOG and -v), e.g. "voxwatch_speech=trace"
    #[arg(long)]
    log_filter: Option<String>,

    /// Directory for log files (defaults to ~/.voxwatch/logs/)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Configuration file (defaults to ~/.voxwatch/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stream port; the datagram port is one higher
    #[arg(long)]
    port: Option<u16>,

    /// Seconds between repeated alerts for the same entity
    #[arg(long)]
    cooldown: Option<u64>,

    /// Start muted
    #[arg(long)]
    mute: bool,

    /// Speak a test sentence at startup
    #[arg(long)]
    test_voice: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            if let Some(hint) = e.guidance() {
                eprintln!("Hint: {}", hint);
            }
            return ExitCode::from(1);
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => return report_failure(&e),
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return report_failure(&VoxError::internal(format!("tokio runtime: {e}"))),
    };

    info!("Starting voxwatch");

    match runtime.block_on(run(config, cli.test_voice)) {
        Ok(()) => {
            info!("voxwatch exited normally");
            ExitCode::SUCCESS
        }
        Err(e) => report_failure(&e),
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> Result<LogGuard> {
    init_logging(&LogOptions {
        dir: cli.log_dir.clone(),
        verbosity: cli.verbose,
        filter: cli.log_filter.clone(),
    })
}

/// Load configuration and apply command-line overrides.
fn load_config(cli: &Cli) -> Result<VoxConfig> {
    let mut config = VoxConfig::load_or_default(cli.config.as_deref())?;

    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(cooldown) = cli.cooldown {
        config.alerts.cooldown_secs = cooldown;
    }
    if cli.mute {
        config.alerts.muted = true;
    }

    config.validate()?;
    Ok(config)
}

fn report_failure(e: &VoxError) -> ExitCode {
    error!(error = %e, fatal = e.is_fatal(), config = e.is_config_error(), "voxwatch failed");
    eprintln!("Error: {}", e);
    if let Some(hint) = e.guidance() {
        eprintln!("Hint: {}", hint);
    }
    ExitCode::from(1)
}

async fn run(config: VoxConfig, test_voice: bool) -> Result<()> {
    let discovery = BackendDiscovery::new();
    let backend = discovery.resolve(&config.speech).await;
    if backend.is_none() {
        let err = VoxError::BackendNotFound {
            searched: discovery.searched(),
        };
        warn!(error = %err, hint = err.guidance(), "running without voice output");
    }

    let (service, alerts) = AlertService::new(&config, backend);
    let event_task = tokio::spawn(log_events(alerts.subscribe()));
    let service_task = service.with_rescan(discovery).spawn();

    let (listener, mut records) = match TelemetryListener::bind(&config.listener).await {
        Ok(bound) => bound,
        Err(e) => {
            let _ = alerts.shutdown().await;
            event_task.abort();
            return Err(e);
        }
    };

    if test_voice {
        alerts.test_voice()?;
    }

    let mut decoder = MessageDecoder::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
            event = records.recv() => match event {
                Some(ListenerEvent::Record(record)) => {
                    if let Err(e) = forward(&alerts, &config, &mut decoder, &record.bytes) {
                        error!(error = %e, "alert service unavailable");
                        break;
                    }
                }
                Some(ListenerEvent::ClientConnected { peer }) => {
                    debug!(%peer, clients = listener.active_connections(), "telemetry client connected");
                }
                Some(ListenerEvent::ClientDisconnected { peer }) => {
                    debug!(%peer, clients = listener.active_connections(), "telemetry client disconnected");
                }
                None => break,
            },
        }
    }

    // Listener tasks may be blocked sending to a full channel
    drop(records);
    listener.shutdown().await;

    let stats = decoder.stats();
    info!(
        records = stats.records,
        events = stats.events,
        malformed = stats.malformed,
        missing_id = stats.missing_id,
        "telemetry summary"
    );

    let _ = alerts.shutdown().await;
    let _ = service_task.await;
    event_task.abort();
    Ok(())
}

/// Decode one record and hand its health events to the alert service.
fn forward(
    alerts: &AlertHandle,
    config: &VoxConfig,
    decoder: &mut MessageDecoder,
    bytes: &[u8],
) -> Result<()> {
    for event in decoder.decode(bytes) {
        if !event.is_health_update() {
            debug!(entity_id = %event.entity_id, "telemetry blob received");
            continue;
        }
        let name = config.entity_name(&event.alert_key(), event.display_name());
        alerts.process_health_event(&event, name)?;
    }
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<AlertEvent>) {
    loop {
        match events.recv().await {
            Ok(AlertEvent::AlertTriggered {
                entity_id,
                status,
                health_percent,
                at,
            }) => {
                info!(%entity_id, %status, health_percent, at = %at.to_rfc3339(), "alert triggered");
            }
            Ok(AlertEvent::TtsStatusChanged { available, info }) => {
                if available {
                    info!(%info, "TTS ready");
                } else {
                    warn!(%info, "TTS unavailable, alerts are logged only");
                }
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "alert event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
