//! Alert service tests on paused time with log-only speech.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;
use voxwatch_alert::{AlertEvent, AlertHandle, AlertService, TEST_VOICE_TEXT};
use voxwatch_core::{HealthEvent, StatusLevel, VoxConfig, VoxError};

fn start(config: VoxConfig) -> (AlertHandle, broadcast::Receiver<AlertEvent>) {
    voxwatch_core::logging::init_test_logging();
    let (service, handle) = AlertService::new(&config, None);
    let events = handle.subscribe();
    service.spawn();
    (handle, events)
}

/// Next `AlertTriggered` as (entity, status), or `None` if nothing arrives within `wait`.
async fn next_alert(
    events: &mut broadcast::Receiver<AlertEvent>,
    wait: Duration,
) -> Option<(String, StatusLevel)> {
    timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(AlertEvent::AlertTriggered { entity_id, status, .. }) => {
                    return (entity_id, status);
                }
                Ok(_) => continue,
                Err(e) => panic!("event channel failed: {e}"),
            }
        }
    })
    .await
    .ok()
}

const WAIT: Duration = Duration::from_secs(2);

#[tokio::test(start_paused = true)]
async fn test_tts_status_published_on_start() {
    let (handle, mut events) = start(VoxConfig::default());
    assert!(!handle.is_tts_available());

    match events.recv().await.unwrap() {
        AlertEvent::TtsStatusChanged { available, info } => {
            assert!(!available);
            assert!(info.contains("log-only"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_critical_update_is_announced() {
    let (handle, mut events) = start(VoxConfig::default());

    handle
        .process_health_update("antenna_1", "Antenna One", "#FF0000", 12.0)
        .unwrap();

    let alert = next_alert(&mut events, WAIT).await;
    assert_eq!(alert, Some(("antenna_1".to_string(), StatusLevel::Critical)));
}

#[tokio::test(start_paused = true)]
async fn test_non_alertable_levels_are_ignored() {
    let (handle, mut events) = start(VoxConfig::default());

    handle.process_health_update("a", "A", "#00FF00", 100.0).unwrap();
    handle.process_health_update("b", "B", "#FFFF00", 80.0).unwrap();
    handle.process_health_update("c", "C", "#123456", 50.0).unwrap();

    assert_eq!(next_alert(&mut events, WAIT).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_cooldown_suppresses_repeat() {
    let (handle, mut events) = start(VoxConfig::default());

    handle.process_health_update("a", "A", "red", 10.0).unwrap();
    assert!(next_alert(&mut events, WAIT).await.is_some());

    handle.process_health_update("a", "A", "red", 9.0).unwrap();
    assert_eq!(next_alert(&mut events, WAIT).await, None);

    // past the 15 s window
    tokio::time::sleep(Duration::from_secs(15)).await;
    handle.process_health_update("a", "A", "red", 8.0).unwrap();
    assert!(next_alert(&mut events, WAIT).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_escalation_bypasses_cooldown() {
    let (handle, mut events) = start(VoxConfig::default());

    handle.process_health_update("a", "A", "orange", 50.0).unwrap();
    assert_eq!(
        next_alert(&mut events, WAIT).await,
        Some(("a".to_string(), StatusLevel::Degraded))
    );

    handle.process_health_update("a", "A", "#FF0000", 20.0).unwrap();
    assert_eq!(
        next_alert(&mut events, WAIT).await,
        Some(("a".to_string(), StatusLevel::Critical))
    );
}

#[tokio::test(start_paused = true)]
async fn test_queue_drains_by_severity() {
    let (handle, mut events) = start(VoxConfig::default());

    handle.process_health_update("b", "B", "orange", 50.0).unwrap();
    handle.process_health_update("a", "A", "red", 10.0).unwrap();
    handle.process_health_update("c", "C", "red", 15.0).unwrap();
    handle.process_health_update("d", "D", "gray", 0.0).unwrap();

    let mut order = Vec::new();
    while let Some((id, _)) = next_alert(&mut events, WAIT).await {
        order.push(id);
    }
    assert_eq!(order, ["a", "c", "d", "b"]);
}

#[tokio::test(start_paused = true)]
async fn test_mute_holds_alerts_until_unmuted() {
    let (handle, mut events) = start(VoxConfig::default());

    handle.set_muted(true).unwrap();
    handle.process_health_update("a", "A", "red", 10.0).unwrap();
    assert_eq!(next_alert(&mut events, WAIT).await, None);

    let info = handle.diagnostic_info().await.unwrap();
    assert!(info.contains("Muted: yes"));
    assert!(info.contains("Queue depth: 1"));

    handle.set_muted(false).unwrap();
    assert!(next_alert(&mut events, WAIT).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_level_toggles() {
    let (handle, mut events) = start(VoxConfig::default());

    handle.set_alert_on_warning(true).unwrap();
    handle.set_alert_on_critical(false).unwrap();
    handle.process_health_update("a", "A", "red", 10.0).unwrap();
    handle.process_health_update("b", "B", "yellow", 75.0).unwrap();

    assert_eq!(
        next_alert(&mut events, WAIT).await,
        Some(("b".to_string(), StatusLevel::Warning))
    );
    assert_eq!(next_alert(&mut events, WAIT).await, None);

    let info = handle.diagnostic_info().await.unwrap();
    assert!(info.contains("Alert levels: Offline, Degraded, Warning"));
}

#[tokio::test(start_paused = true)]
async fn test_subsystems_alert_independently() {
    let (handle, mut events) = start(VoxConfig::default());

    let component = HealthEvent::component("A1", "#FF0000", 20.0);
    let subsystem = HealthEvent::subsystem("A1", "Transmitter", "#FF0000", 10.0);
    let telemetry = HealthEvent::telemetry("A1", serde_json::json!({"unit": "APCU"}));

    handle.process_health_event(&component, "Antenna").unwrap();
    handle.process_health_event(&subsystem, "Transmitter").unwrap();
    handle.process_health_event(&telemetry, "Antenna").unwrap();

    let first = next_alert(&mut events, WAIT).await.unwrap();
    let second = next_alert(&mut events, WAIT).await.unwrap();
    assert_eq!(first.0, "A1");
    assert_eq!(second.0, "A1/Transmitter");
    assert_eq!(next_alert(&mut events, WAIT).await, None);
}

#[tokio::test(start_paused = true)]
async fn test_test_voice_does_not_raise_alert() {
    let (handle, mut events) = start(VoxConfig::default());

    assert_eq!(TEST_VOICE_TEXT, "Voice alert system test. Audio is working correctly.");
    handle.set_muted(true).unwrap();
    handle.test_voice().unwrap();
    assert_eq!(next_alert(&mut events, WAIT).await, None);

    let info = handle.diagnostic_info().await.unwrap();
    assert!(info.contains("Dispatcher: idle"));
}

#[tokio::test(start_paused = true)]
async fn test_diagnostic_info_contents() {
    let mut config = VoxConfig::default();
    config.alerts.cooldown_secs = 30;
    let (handle, mut events) = start(config);

    handle.process_health_update("a", "A", "red", 10.0).unwrap();
    next_alert(&mut events, WAIT).await.unwrap();
    handle.set_cooldown_seconds(5).unwrap();

    let info = handle.diagnostic_info().await.unwrap();
    assert!(info.contains("TTS: no backend (log-only mode)"));
    assert!(info.contains("Cooldown: 5s"));
    assert!(info.contains("Alert levels: Critical, Offline, Degraded"));
    assert!(info.contains("Queue depth: 0"));
    assert!(info.contains("Tracked entities: 1"));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_service() {
    let (handle, _events) = start(VoxConfig::default());

    handle.process_health_update("a", "A", "red", 10.0).unwrap();
    handle.shutdown().await.unwrap();

    assert!(matches!(
        handle.process_health_update("a", "A", "red", 10.0),
        Err(VoxError::ServiceStopped)
    ));
    assert!(matches!(handle.diagnostic_info().await, Err(VoxError::ServiceStopped)));
}
