//! Call sessions and their state machine
//!
//! A [`CallSession`] tracks one call from creation to termination:
//!
//! ```text
//! Idle ──ringing──▶ Ringing ──pickup──▶ Connected
//!   │                  │                    │
//!   └──── hangup / error / reject ──────────┴──▶ Terminated
//! ```
//!
//! Events that do not match a listed transition are ignored. Signaling
//! retransmissions and reordering make duplicates normal, so
//! [`CallSession::handle_event`] returns `None` instead of an error.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::signaling::RequestHandle;

/// SIP Call-ID correlating every message of one call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    /// Generate a Call-ID in the `random@host` form
    pub fn generate(local_host: &str) -> Self {
        let random = Uuid::new_v4().simple().to_string();
        if local_host.is_empty() {
            Self(random)
        } else {
            Self(format!("{}@{}", random, local_host))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Current state of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Created, no provisional response seen yet
    Idle,
    /// Ringing at the callee
    Ringing,
    /// Call is connected
    Connected,
    /// Call has ended (terminal)
    Terminated,
}

impl CallState {
    /// Check if the call is connected
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Connected)
    }

    /// Check if the call reached its terminal state
    pub fn is_terminated(&self) -> bool {
        matches!(self, CallState::Terminated)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallState::Idle => write!(f, "Idle"),
            CallState::Ringing => write!(f, "Ringing"),
            CallState::Connected => write!(f, "Connected"),
            CallState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Direction of a call (from the softphone's perspective)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    /// User placed the call
    Outgoing,
    /// Call arrived from the network
    Incoming,
}

/// Everything that can move a call session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// 180 Ringing or another provisional response
    Ringing,
    /// The callee answered our INVITE
    RemotePickup,
    /// The user answered an incoming call
    LocalPickup,
    /// Error response for the call
    Error { reason: String },
    /// BYE from the peer
    RemoteHangup,
    /// The user hung up
    LocalHangup,
    /// The user rejected an incoming call with 486 Busy Here
    Rejected,
}

impl CallEvent {
    fn name(&self) -> &'static str {
        match self {
            CallEvent::Ringing => "ringing",
            CallEvent::RemotePickup => "remote_pickup",
            CallEvent::LocalPickup => "local_pickup",
            CallEvent::Error { .. } => "error",
            CallEvent::RemoteHangup => "remote_hangup",
            CallEvent::LocalHangup => "local_hangup",
            CallEvent::Rejected => "rejected",
        }
    }

    fn reason(&self) -> String {
        match self {
            CallEvent::Error { reason } => reason.clone(),
            CallEvent::RemoteHangup => "Remote hangup".to_string(),
            CallEvent::LocalHangup => "Local hangup".to_string(),
            CallEvent::Rejected => "Busy here".to_string(),
            CallEvent::Ringing => "Ringing".to_string(),
            CallEvent::RemotePickup => "Callee picked up".to_string(),
            CallEvent::LocalPickup => "Call answered".to_string(),
        }
    }
}

/// Result of an accepted state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub previous: CallState,
    pub current: CallState,
    pub reason: String,
}

/// Per-call state
#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: CallId,
    /// Display string from the From header (incoming) or the dialed URI (outgoing)
    pub peer_address: String,
    pub direction: CallDirection,
    pub state: CallState,
    /// Correlation token from the signaling stack, once known
    pub request_handle: Option<RequestHandle>,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
}

impl CallSession {
    pub fn new(call_id: CallId, peer_address: impl Into<String>, direction: CallDirection) -> Self {
        Self {
            call_id,
            peer_address: peer_address.into(),
            direction,
            state: CallState::Idle,
            request_handle: None,
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            end_reason: None,
        }
    }

    pub fn with_request_handle(mut self, handle: RequestHandle) -> Self {
        self.request_handle = Some(handle);
        self
    }

    /// State the event would move this session to, if the transition is valid
    fn next_state(&self, event: &CallEvent) -> Option<CallState> {
        use CallState::*;

        match (self.state, event) {
            (Terminated, _) => None,
            (Idle, CallEvent::Ringing) => Some(Ringing),
            (Ringing, CallEvent::RemotePickup) => Some(Connected),
            (Idle | Ringing, CallEvent::LocalPickup) if self.direction == CallDirection::Incoming => {
                Some(Connected)
            }
            (Idle | Ringing, CallEvent::Rejected) if self.direction == CallDirection::Incoming => {
                Some(Terminated)
            }
            (_, CallEvent::Error { .. } | CallEvent::RemoteHangup | CallEvent::LocalHangup) => {
                Some(Terminated)
            }
            _ => None,
        }
    }

    /// Apply an event. Returns the transition, or `None` when the event is ignored.
    pub fn handle_event(&mut self, event: CallEvent) -> Option<Transition> {
        let Some(next) = self.next_state(&event) else {
            tracing::debug!(
                call_id = %self.call_id,
                state = %self.state,
                event = event.name(),
                "Ignoring event not valid in current state"
            );
            return None;
        };

        let previous = self.state;
        self.state = next;
        let reason = event.reason();

        match next {
            CallState::Connected => {
                if self.connected_at.is_none() {
                    self.connected_at = Some(Utc::now());
                }
            }
            CallState::Terminated => {
                self.ended_at = Some(Utc::now());
                self.end_reason = Some(reason.clone());
            }
            _ => {}
        }

        Some(Transition { previous, current: next, reason })
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }

    /// Snapshot handed to presentation and queries
    pub fn info(&self) -> CallInfo {
        CallInfo {
            call_id: self.call_id.clone(),
            peer_address: self.peer_address.clone(),
            direction: self.direction,
            state: self.state,
            created_at: self.created_at,
            connected_at: self.connected_at,
            ended_at: self.ended_at,
            end_reason: self.end_reason.clone(),
        }
    }
}

/// Read-only view of a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub call_id: CallId,
    pub peer_address: String,
    pub direction: CallDirection,
    pub state: CallState,
    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<String>,
}

/// Statistics about current calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStats {
    pub total_sessions: usize,
    pub ringing_calls: usize,
    pub connected_calls: usize,
    pub terminated_awaiting_dismissal: usize,
}
