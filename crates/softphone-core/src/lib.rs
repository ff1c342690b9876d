//! Softphone-core: call/session coordination for a SIP softphone
//!
//! This crate sits between a SIP signaling stack and a user interface. It owns
//! per-call state, the account re-registration cycle and the timed shutdown,
//! and keeps both collaborators behind narrow interfaces:
//!
//! ```text
//! SignalingStack ──callbacks──▶ SessionCoordinator ──SoftphoneEvent──▶ presentation
//!        ▲                         │      ▲                                  │
//!        └──────── commands ───────┘      └──────────── intents ─────────────┘
//! ```
//!
//! Softphone-core focuses on:
//! - Call session state machines keyed by Call-ID
//! - Account replacement (unregister old, commit, register new)
//! - Serializing callbacks and intents without holding locks across the network
//! - Graceful shutdown bounded by a grace timer
//!
//! Message encoding, transport and media are the signaling stack's business.

pub mod call;
pub mod coordinator;
pub mod credentials;
pub mod error;
pub mod events;
pub mod registration;
pub mod session_table;
pub mod signaling;
pub mod uri;

// Public API exports
pub use call::{CallDirection, CallEvent, CallId, CallInfo, CallSession, CallState, CallStats};
pub use coordinator::{ExitReason, MenuAction, SessionCoordinator, SoftphoneBuilder, SoftphoneConfig};
pub use credentials::{CredentialStore, JsonFileStore, MemoryStore};
pub use error::{SoftphoneError, SoftphoneResult};
pub use events::{CallStatusInfo, EventPriority, SoftphoneEvent};
pub use registration::{AccountForm, Credentials, RegistrationController, RegistrationPhase};
pub use session_table::SessionTable;
pub use signaling::{
    CommandOrigin, DialogHandle, RequestHandle, SignalingCommand, SignalingMessage, SignalingStack, SipRequest,
    SipResponse,
};
pub use uri::SipUri;

/// Softphone-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
