//! Account re-registration
//!
//! Replacing the account is a three step exchange with the registrar:
//!
//! 1. unregister the *active* account,
//! 2. commit the new credentials and register them,
//! 3. report the outcome.
//!
//! The controller only decides; it returns the [`SignalingCommand`] to send and
//! leaves dispatching to the coordinator, which runs it after releasing its lock.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::error::{SoftphoneError, SoftphoneResult};
use crate::events::{EventEmitter, SoftphoneEvent};
use crate::signaling::{CommandOrigin, SignalingCommand};
use crate::uri::SipUri;

pub const NOTE_UNREGISTERING: &str = "Unregistering previous account";
pub const NOTE_REGISTERING: &str = "Registering new account";
pub const NOTE_REGISTERED: &str = "Account registered";
pub const NOTE_UNREGISTER_FAILED: &str = "Unregister failed";
pub const NOTE_REGISTER_FAILED: &str = "Register failed";

/// A SIP account
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub domain: String,
    pub password: String,
    #[serde(default)]
    pub outbound_proxy: Option<SipUri>,
}

impl Credentials {
    pub fn new(user: impl Into<String>, domain: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            domain: domain.into(),
            password: password.into(),
            outbound_proxy: None,
        }
    }

    pub fn with_outbound_proxy(mut self, proxy: SipUri) -> Self {
        self.outbound_proxy = Some(proxy);
        self
    }

    /// `sip:user@domain`
    pub fn address_of_record(&self) -> String {
        format!("sip:{}@{}", self.user, self.domain)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("domain", &self.domain)
            .field("password", &"<redacted>")
            .field("outbound_proxy", &self.outbound_proxy.as_ref().map(ToString::to_string))
            .finish()
    }
}

/// Raw values from the account form, as typed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountForm {
    pub user: String,
    pub domain: String,
    pub password: String,
    /// Empty means no outbound proxy
    pub outbound_proxy: String,
}

impl AccountForm {
    pub fn new(user: impl Into<String>, domain: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            domain: domain.into(),
            password: password.into(),
            outbound_proxy: String::new(),
        }
    }

    pub fn with_outbound_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.outbound_proxy = proxy.into();
        self
    }

    /// Turn the form into credentials, validating the outbound proxy URI
    pub fn validate(&self) -> SoftphoneResult<Credentials> {
        let proxy = self.outbound_proxy.trim();
        let outbound_proxy = if proxy.is_empty() { None } else { Some(SipUri::parse(proxy)?) };

        Ok(Credentials {
            user: self.user.trim().to_string(),
            domain: self.domain.trim().to_string(),
            password: self.password.clone(),
            outbound_proxy,
        })
    }
}

impl From<&Credentials> for AccountForm {
    fn from(credentials: &Credentials) -> Self {
        Self {
            user: credentials.user.clone(),
            domain: credentials.domain.clone(),
            password: credentials.password.clone(),
            outbound_proxy: credentials.outbound_proxy.as_ref().map(ToString::to_string).unwrap_or_default(),
        }
    }
}

/// Phase of the re-registration cycle
///
/// `Done` and `Failed` end a cycle. The controller passes through them back
/// to `Idle` in the same step and keeps the last one as
/// [`RegistrationController::last_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrationPhase {
    Idle,
    Unregistering,
    Registering,
    Done,
    Failed,
}

impl fmt::Display for RegistrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationPhase::Idle => "idle",
            RegistrationPhase::Unregistering => "unregistering",
            RegistrationPhase::Registering => "registering",
            RegistrationPhase::Done => "done",
            RegistrationPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Drives credential replacement
pub struct RegistrationController {
    phase: RegistrationPhase,
    last_outcome: Option<RegistrationPhase>,
    active: Option<Credentials>,
    pending: Option<Credentials>,
    store: Arc<dyn CredentialStore>,
}

impl RegistrationController {
    /// Create a controller with the account found in `store`
    ///
    /// An unreadable store is logged and treated as "no account".
    pub fn from_store(store: Arc<dyn CredentialStore>) -> Self {
        let active = match store.load() {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "Could not load stored account, starting without one");
                None
            }
        };

        Self { phase: RegistrationPhase::Idle, last_outcome: None, active, pending: None, store }
    }

    pub fn phase(&self) -> RegistrationPhase {
        self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == RegistrationPhase::Idle
    }

    /// How the most recent cycle ended: `Done` or `Failed`
    pub fn last_outcome(&self) -> Option<RegistrationPhase> {
        self.last_outcome
    }

    pub fn active(&self) -> Option<&Credentials> {
        self.active.as_ref()
    }

    pub fn pending(&self) -> Option<&Credentials> {
        self.pending.as_ref()
    }

    /// Start replacing the active account with the one in `form`
    ///
    /// A malformed outbound proxy emits exactly one `ValidationFailed` and
    /// leaves every field untouched.
    pub fn apply(&mut self, form: &AccountForm, events: &EventEmitter) -> SoftphoneResult<SignalingCommand> {
        if !self.is_idle() {
            return Err(SoftphoneError::RegistrationInProgress { phase: self.phase });
        }

        let credentials = match form.validate() {
            Ok(credentials) => credentials,
            Err(e) => {
                info!(error = %e, "Rejected account form");
                events.emit(SoftphoneEvent::ValidationFailed {
                    field: "outbound_proxy".to_string(),
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        info!(account = %credentials.address_of_record(), "Applying new account");
        self.phase = RegistrationPhase::Unregistering;
        events.emit(progress(0, NOTE_UNREGISTERING));

        match self.active.clone() {
            Some(active) => {
                self.pending = Some(credentials);
                Ok(SignalingCommand::Unregister { credentials: active, origin: CommandOrigin::Account })
            }
            None => {
                debug!("No previous account to unregister");
                Ok(self.commit(credentials, events))
            }
        }
    }

    /// The registrar accepted our last REGISTER
    pub fn on_success(&mut self, events: &EventEmitter) -> Option<SignalingCommand> {
        match self.phase {
            RegistrationPhase::Unregistering => {
                let Some(credentials) = self.pending.take() else {
                    warn!("Unregistered without staged credentials, abandoning apply");
                    self.finish(RegistrationPhase::Failed);
                    return None;
                };
                Some(self.commit(credentials, events))
            }
            RegistrationPhase::Registering => {
                events.emit(progress(2, NOTE_REGISTERED));
                info!("Account registration complete");
                self.finish(RegistrationPhase::Done);
                None
            }
            phase => {
                debug!(%phase, "Registration success outside an apply cycle");
                None
            }
        }
    }

    /// The registrar rejected our last REGISTER, or it never went out
    pub fn on_failure(&mut self, detail: &str, events: &EventEmitter) {
        let note = match self.phase {
            RegistrationPhase::Unregistering => NOTE_UNREGISTER_FAILED,
            RegistrationPhase::Registering => NOTE_REGISTER_FAILED,
            phase => {
                debug!(%phase, detail, "Registration failure outside an apply cycle");
                return;
            }
        };

        warn!(phase = %self.phase, detail, "{}", note);
        events.emit(SoftphoneEvent::RegistrationFailed {
            phase: self.phase,
            note: note.to_string(),
            detail: detail.to_string(),
        });

        self.finish(RegistrationPhase::Failed);
    }

    /// Abandon any apply cycle
    ///
    /// A cycle still in flight is reported as failed with `detail`, so the
    /// progress shown to the user never stops half way.
    pub fn revert_to_idle(&mut self, detail: &str, events: &EventEmitter) {
        if self.is_idle() {
            self.pending = None;
            return;
        }
        debug!(phase = %self.phase, "Reverting registration controller to idle");
        self.on_failure(detail, events);
    }

    fn finish(&mut self, outcome: RegistrationPhase) {
        debug!(%outcome, "Registration cycle finished");
        self.last_outcome = Some(outcome);
        self.pending = None;
        self.phase = RegistrationPhase::Idle;
    }

    /// Unregistering -> Registering: the only place `active` changes
    fn commit(&mut self, credentials: Credentials, events: &EventEmitter) -> SignalingCommand {
        if let Err(e) = self.store.save(&credentials) {
            warn!(error = %e, "Failed to persist account, continuing with it in memory");
        }

        self.active = Some(credentials.clone());
        self.phase = RegistrationPhase::Registering;
        events.emit(progress(1, NOTE_REGISTERING));

        SignalingCommand::Register { credentials, origin: CommandOrigin::Account }
    }
}

fn progress(step: u8, note: &str) -> SoftphoneEvent {
    SoftphoneEvent::RegistrationProgress { step, note: note.to_string() }
}
