//! # voxwatch-speech
//!
//! Text-to-speech for voxwatch alerts.
//!
//! - [`backend`] - locate a TTS engine and audio player, pick a speak strategy
//! - [`manager`] - run one utterance at a time under a hang watchdog
//!
//! ## Example
//!
//! ```no_run
//! use tokio::sync::mpsc;
//! use voxwatch_speech::{BackendDiscovery, SpeechManager, SpeechSettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (tx, mut rx) = mpsc::unbounded_channel();
//!     let backend = BackendDiscovery::new().discover().await;
//!     let mut speech = SpeechManager::new(backend, SpeechSettings::default(), tx);
//!
//!     let session = speech.speak("Voice alert system test.").await;
//!     if let Some(done) = rx.recv().await {
//!         assert_eq!(done.session, session);
//!         speech.complete(done.session);
//!     }
//! }
//! ```

pub mod backend;
pub mod manager;

// Re-export main types for convenience
pub use backend::{
    AudioPlayer, BackendDiscovery, BackendKind, PlayerKind, SpeakStrategy, SpeechPlan, TtsBackend,
};
pub use manager::{SessionId, SpeechCompletion, SpeechManager, SpeechOutcome, SpeechSettings};
