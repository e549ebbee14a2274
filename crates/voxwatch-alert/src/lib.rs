//! # voxwatch-alert
//!
//! Turns health updates into spoken alerts.
//!
//! - [`status`] - color token to [`StatusLevel`](voxwatch_core::StatusLevel)
//! - [`policy`] - level toggles and per-entity cooldown
//! - [`queue`] - one pending alert per entity, most severe first
//! - [`dispatcher`] - idle/speaking state machine driven by the tick
//! - [`service`] - the actor that owns all of the above, and its handle
//!
//! ## Example
//!
//! ```no_run
//! use voxwatch_alert::{AlertEvent, AlertService};
//! use voxwatch_core::VoxConfig;
//!
//! #[tokio::main]
//! async fn main() -> voxwatch_core::Result<()> {
//!     let (service, handle) = AlertService::new(&VoxConfig::default(), None);
//!     let mut events = handle.subscribe();
//!     service.spawn();
//!
//!     handle.process_health_update("antenna_1", "Antenna One", "#FF0000", 12.0)?;
//!     while let Ok(event) = events.recv().await {
//!         if let AlertEvent::AlertTriggered { entity_id, status, .. } = event {
//!             println!("{entity_id}: {status}");
//!             break;
//!         }
//!     }
//!
//!     handle.shutdown().await
//! }
//! ```

pub mod dispatcher;
pub mod policy;
pub mod queue;
pub mod service;
pub mod status;

// Re-export main types for convenience
pub use dispatcher::{AlertDispatcher, DispatchState};
pub use policy::{AlertPolicy, PolicyDecision};
pub use queue::AlertQueue;
pub use service::{AlertEvent, AlertHandle, AlertService, TEST_VOICE_TEXT};
pub use status::resolve_status;
