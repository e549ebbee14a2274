//! Dispatch state machine.
//!
//! The dispatcher hands out at most one alert at a time: nothing is popped
//! while an utterance is in flight or while muted.

use voxwatch_core::AlertEntry;
use voxwatch_speech::SessionId;

use crate::queue::AlertQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Speaking { session: SessionId },
}

#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    state: DispatchState,
    muted: bool,
}

impl AlertDispatcher {
    pub fn new(muted: bool) -> Self {
        Self {
            state: DispatchState::Idle,
            muted,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Mute or unmute future ticks. An utterance in flight is not interrupted.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Tick step: the next alert to speak, if any.
    pub fn next_alert(&mut self, queue: &mut AlertQueue) -> Option<AlertEntry> {
        if self.muted || matches!(self.state, DispatchState::Speaking { .. }) {
            return None;
        }
        queue.pop_highest_priority()
    }

    /// Track `session` as the live utterance.
    pub fn begin_speaking(&mut self, session: SessionId) {
        self.state = DispatchState::Speaking { session };
    }

    /// Return to idle if `session` is the live utterance.
    ///
    /// Completions for superseded sessions are ignored.
    pub fn on_speech_complete(&mut self, session: SessionId) -> bool {
        match self.state {
            DispatchState::Speaking { session: current } if current == session => {
                self.state = DispatchState::Idle;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = DispatchState::Idle;
    }
}
