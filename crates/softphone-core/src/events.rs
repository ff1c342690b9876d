//! Notifications for the presentation layer
//!
//! The coordinator never calls into a UI. It publishes [`SoftphoneEvent`]s on a
//! broadcast channel; any number of subscribers (a window, a CLI, a test) render
//! them however they like.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::call::{CallId, CallInfo, CallState};
use crate::coordinator::ExitReason;
use crate::registration::{Credentials, RegistrationPhase};

/// Information about a call state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStatusInfo {
    /// Call that changed state
    pub call_id: CallId,
    /// New call state
    pub new_state: CallState,
    /// Previous call state
    pub previous_state: CallState,
    /// Reason for the state change
    pub reason: String,
    /// When the state change occurred
    pub timestamp: DateTime<Utc>,
}

/// Event priority levels for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    /// Routine status updates
    Low,
    /// Call state changes, registration progress
    Normal,
    /// Incoming calls, failures needing the user's attention
    High,
    /// The application is going away
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoftphoneEvent {
    /// A call session was created; `text` is ready to show ("Alice calling")
    SessionCreated { info: CallInfo, text: String },

    /// Call state changed
    CallStateChanged { info: CallStatusInfo },

    /// One line for the status bar
    StatusText { text: String },

    /// Account re-registration advanced; `step` is 0, 1 or 2
    RegistrationProgress { step: u8, note: String },

    /// Account re-registration stopped
    RegistrationFailed {
        phase: RegistrationPhase,
        note: String,
        detail: String,
    },

    /// User input was rejected; presentation should block on a dialog
    ValidationFailed { field: String, message: String },

    /// Presentation should open the account form pre-filled with these values
    AccountFormRequested { credentials: Option<Credentials> },

    /// The process is about to exit
    Terminating { reason: ExitReason },
}

impl SoftphoneEvent {
    pub fn status(text: impl Into<String>) -> Self {
        SoftphoneEvent::StatusText { text: text.into() }
    }

    pub fn priority(&self) -> EventPriority {
        match self {
            SoftphoneEvent::StatusText { .. } => EventPriority::Low,
            SoftphoneEvent::CallStateChanged { .. }
            | SoftphoneEvent::RegistrationProgress { .. }
            | SoftphoneEvent::AccountFormRequested { .. } => EventPriority::Normal,
            SoftphoneEvent::SessionCreated { .. }
            | SoftphoneEvent::RegistrationFailed { .. }
            | SoftphoneEvent::ValidationFailed { .. } => EventPriority::High,
            SoftphoneEvent::Terminating { .. } => EventPriority::Critical,
        }
    }

    /// Get the call ID associated with this event (if any)
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            SoftphoneEvent::SessionCreated { info, .. } => Some(&info.call_id),
            SoftphoneEvent::CallStateChanged { info } => Some(&info.call_id),
            _ => None,
        }
    }
}

/// Sending half of the presentation channel
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<SoftphoneEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SoftphoneEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn emit(&self, event: SoftphoneEvent) {
        if let Err(broadcast::error::SendError(event)) = self.tx.send(event) {
            tracing::debug!(?event, "No presentation subscriber, event dropped");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
