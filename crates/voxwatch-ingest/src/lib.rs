//! Telemetry ingestion for voxwatch.
//!
//! Remote subsystems push health records over two transports:
//!
//! ```text
//! ┌──────────────┐  newline-delimited JSON   ┌───────────────────┐
//! │ stream :P    │──────────────────────────▶│                   │
//! └──────────────┘                           │ TelemetryListener │──▶ ListenerEvent
//! ┌──────────────┐  one JSON object/packet   │                   │
//! │ datagram :P+1│──────────────────────────▶│                   │
//! └──────────────┘                           └───────────────────┘
//!                                                     │ RawRecord
//!                                                     ▼
//!                                            ┌───────────────────┐
//!                                            │  MessageDecoder   │──▶ HealthEvent*
//!                                            └───────────────────┘
//! ```
//!
//! The listener never stops because of a single bad client, and the decoder
//! drops malformed records instead of failing.

pub mod decoder;
pub mod listener;

// Re-export main types for convenience
pub use decoder::{DecodeError, DecodeStats, MessageDecoder, band_color, parse_record};
pub use listener::{ListenerEvent, RawRecord, TelemetryListener, Transport};
