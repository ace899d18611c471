// src/session/state.rs
use crossbeam_channel::{unbounded, Receiver, Sender};

use super::{
    catalog::FormatId,
    error::SessionError,
    types::{Authorization, DeviceInfo, SessionState},
};

/// Everything the shell renders from.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_state: SessionState,
    pub authorization: Authorization,
    pub device: Option<DeviceInfo>,
    pub format_labels: Vec<String>,
    pub selected_format_index: usize,
    pub selected_format: Option<FormatId>,
    pub is_recording: bool,
    pub last_error: Option<SessionError>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            session_state: SessionState::Stopped,
            authorization: Authorization::NotDetermined,
            device: None,
            format_labels: Vec::new(),
            selected_format_index: 0,
            selected_format: None,
            is_recording: false,
            last_error: None,
        }
    }
}

impl SessionSnapshot {
    pub fn is_running(&self) -> bool {
        self.session_state == SessionState::Running
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Session { from: SessionState, to: SessionState },
    Authorization(Authorization),
    DeviceConfigured(DeviceInfo),
    FormatsEnumerated { count: usize },
    FormatSelected { index: usize },
    Recording(bool),
    Error(SessionError),
}

/// Fan-out of state changes to any number of subscribers.
#[derive(Default)]
pub struct Observers {
    senders: Vec<Sender<StateChange>>,
}

impl Observers {
    pub fn subscribe(&mut self) -> Receiver<StateChange> {
        let (tx, rx) = unbounded();
        self.senders.push(tx);
        rx
    }

    pub fn publish(&mut self, change: StateChange) {
        // Drop subscribers whose receiver has gone away.
        self.senders.retain(|tx| tx.send(change.clone()).is_ok());
    }
}
