//! User intents coming from the presentation layer

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use super::manager::{CoordinatorState, SessionCoordinator};
use crate::call::{CallDirection, CallEvent, CallId, CallSession};
use crate::error::{SoftphoneError, SoftphoneResult};
use crate::events::SoftphoneEvent;
use crate::registration::AccountForm;
use crate::signaling::{RequestHandle, SignalingCommand};
use crate::uri::SipUri;

/// Entries of the main window menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Exit,
    Account,
    Preferences,
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuAction::Exit => write!(f, "Exit"),
            MenuAction::Account => write!(f, "Account"),
            MenuAction::Preferences => write!(f, "Preferences"),
        }
    }
}

impl FromStr for MenuAction {
    type Err = SoftphoneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit" => Ok(MenuAction::Exit),
            "account" => Ok(MenuAction::Account),
            "preferences" => Ok(MenuAction::Preferences),
            _ => Err(SoftphoneError::UnknownMenuAction { action: s.to_string() }),
        }
    }
}

impl SessionCoordinator {
    /// Call `uri`
    ///
    /// A malformed URI is shown as status text and returned; no session is created.
    pub async fn on_user_call_intent(&self, uri: &str) -> SoftphoneResult<CallId> {
        let target = match SipUri::parse(uri) {
            Ok(target) => target,
            Err(e) => {
                info!(uri, error = %e, "Rejected call target");
                self.events.emit(SoftphoneEvent::status(e.to_string()));
                return Err(e);
            }
        };

        let call_id = {
            let mut state = self.state.lock().await;
            if state.shutdown.closing {
                return Err(SoftphoneError::ShuttingDown);
            }

            let call_id = loop {
                let candidate = CallId::generate(&self.config.local_host);
                if !state.sessions.contains(&candidate) {
                    break candidate;
                }
            };

            let session = CallSession::new(call_id.clone(), target.to_string(), CallDirection::Outgoing);
            let info = session.info();
            state.sessions.insert(session);

            info!(%call_id, target = %target, "Placing call");
            self.events.emit(SoftphoneEvent::SessionCreated { info, text: format!("Calling {}", target) });
            call_id
        };

        self.dispatch(SignalingCommand::Invite { target, call_id: call_id.clone() });
        Ok(call_id)
    }

    /// Hang up a call in any live state
    ///
    /// If the INVITE has not returned its handle yet the call ends locally and
    /// the terminate goes out as soon as the handle arrives.
    pub async fn on_user_hangup_intent(&self, call_id: &CallId) -> SoftphoneResult<()> {
        let command = {
            let mut state = self.state.lock().await;
            let handle = match state.sessions.get(call_id) {
                Some(session) => session.request_handle.clone(),
                None => return Err(SoftphoneError::CallNotFound { call_id: call_id.clone() }),
            };

            if self.drive_call(&mut state, call_id, CallEvent::LocalHangup).is_none() {
                return Ok(());
            }

            match handle {
                Some(handle) => Some(SignalingCommand::Terminate { call_id: call_id.clone(), handle }),
                None => {
                    debug!(%call_id, "Hangup before request handle is known, deferring terminate");
                    state.pending_terminations.insert(call_id.clone());
                    None
                }
            }
        };

        if let Some(command) = command {
            self.dispatch(command);
        }
        Ok(())
    }

    /// Answer an incoming call with 200 OK
    pub async fn on_user_pickup_intent(&self, call_id: &CallId) -> SoftphoneResult<()> {
        let command = {
            let mut state = self.state.lock().await;
            if state.shutdown.closing {
                return Err(SoftphoneError::ShuttingDown);
            }

            let handle = self.incoming_handle(&state, call_id)?;
            self.drive_call(&mut state, call_id, CallEvent::LocalPickup)
                .map(|_| SignalingCommand::Accept { call_id: call_id.clone(), handle })
        };

        if let Some(command) = command {
            self.dispatch(command);
        }
        Ok(())
    }

    /// Answer an incoming call with 486 Busy Here
    pub async fn on_user_reject_intent(&self, call_id: &CallId) -> SoftphoneResult<()> {
        let command = {
            let mut state = self.state.lock().await;
            let handle = self.incoming_handle(&state, call_id)?;
            self.drive_call(&mut state, call_id, CallEvent::Rejected)
                .map(|_| SignalingCommand::Reject { call_id: call_id.clone(), handle })
        };

        if let Some(command) = command {
            self.dispatch(command);
        }
        Ok(())
    }

    /// Presentation is done showing a terminated call
    ///
    /// Returns `true` if the session was removed. Live sessions are never removed.
    pub async fn on_session_dismissed(&self, call_id: &CallId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.sessions.remove_if_terminated(call_id).is_some();
        if !removed {
            debug!(%call_id, "Dismissal ignored, call unknown or still live");
        }
        removed
    }

    /// Replace the account with the values from the account form
    pub async fn apply_account(&self, form: AccountForm) -> SoftphoneResult<()> {
        let command = {
            let mut state = self.state.lock().await;
            if state.shutdown.closing {
                return Err(SoftphoneError::ShuttingDown);
            }
            state.registration.apply(&form, &self.events)?
        };

        self.dispatch(command);
        Ok(())
    }

    pub async fn on_menu_action(&self, action: MenuAction) {
        debug!(%action, "Menu action");
        match action {
            MenuAction::Exit => self.on_window_close_intent().await,
            MenuAction::Account => {
                let credentials = self.state.lock().await.registration.active().cloned();
                self.events.emit(SoftphoneEvent::AccountFormRequested { credentials });
            }
            MenuAction::Preferences => {
                debug!("No preferences to show");
            }
        }
    }

    fn incoming_handle(&self, state: &CoordinatorState, call_id: &CallId) -> SoftphoneResult<RequestHandle> {
        let session = state
            .sessions
            .get(call_id)
            .ok_or_else(|| SoftphoneError::CallNotFound { call_id: call_id.clone() })?;

        session
            .request_handle
            .clone()
            .ok_or_else(|| SoftphoneError::MissingRequestHandle { call_id: call_id.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_action_parsing() {
        assert_eq!("Exit".parse::<MenuAction>().unwrap(), MenuAction::Exit);
        assert_eq!(" account ".parse::<MenuAction>().unwrap(), MenuAction::Account);
        assert_eq!("PREFERENCES".parse::<MenuAction>().unwrap(), MenuAction::Preferences);

        let err = "Help".parse::<MenuAction>().unwrap_err();
        assert_eq!(err, SoftphoneError::UnknownMenuAction { action: "Help".to_string() });
    }

    #[test]
    fn test_menu_action_display_round_trips() {
        for action in [MenuAction::Exit, MenuAction::Account, MenuAction::Preferences] {
            assert_eq!(action.to_string().parse::<MenuAction>().unwrap(), action);
        }
    }
}
