//! # voxwatch-core
//!
//! Core types, errors, and utilities for the voxwatch alerting system.
//!
//! This crate provides:
//! - [`VoxError`] - Error type shared by all voxwatch crates
//! - [`logging`] - Tracing setup and log file management
//! - [`config`] - YAML configuration with defaults for every setting
//! - [`types`] - Health events, status levels and alert entries
//!
//! ## Example
//!
//! ```no_run
//! use voxwatch_core::{LogOptions, VoxConfig, init_logging};
//!
//! fn main() -> voxwatch_core::Result<()> {
//!     let _guard = init_logging(&LogOptions { verbosity: 1, ..Default::default() })?;
//!     let config = VoxConfig::load_or_default(None)?;
//!     tracing::info!(port = config.listener.port, "configuration loaded");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use config::{AlertConfig, LevelToggles, ListenerConfig, SpeechConfig, VoxConfig};
pub use error::{Result, VoxError};
pub use logging::{LogGuard, LogOptions, init_logging};
pub use types::{AlertEntry, CooldownRecord, EntityId, HealthEvent, HealthEventKind, StatusLevel};
