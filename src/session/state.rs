use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a speech session
///
/// `Idle -> Connecting -> Open -> Closed`. `Closed` is terminal for a
/// connection; a new `start()` opens a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Connecting,
            2 => SessionState::Open,
            _ => SessionState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Connecting => 1,
            SessionState::Open => 2,
            SessionState::Closed => 3,
        }
    }
}

/// State shared between the controller and its socket tasks
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: SessionState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Move to `Closed`; true only for the caller that actually closed it
    pub fn close(&self) -> bool {
        self.0.swap(SessionState::Closed.as_u8(), Ordering::SeqCst) != SessionState::Closed.as_u8()
    }
}
