//! Signaling stack callbacks and command completions

use tracing::{debug, error, info, warn};

use super::dispatch::CommandOutput;
use super::manager::{CoordinatorState, SessionCoordinator};
use super::shutdown::ExitReason;
use crate::call::{CallDirection, CallEvent, CallId, CallSession};
use crate::error::{SoftphoneError, SoftphoneResult};
use crate::events::SoftphoneEvent;
use crate::signaling::{
    extract_display_name, CommandOrigin, RequestHandle, SignalingCommand, SignalingMessage, SipRequest,
    SipResponse,
};

/// Text shown for the caller: the display name, else the bare address
fn peer_display(from_value: &str) -> String {
    if let Some(name) = extract_display_name(from_value) {
        return name;
    }

    let value = from_value.split(";tag=").next().unwrap_or(from_value).trim();
    match (value.find('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => value[start + 1..end].to_string(),
        _ => value.to_string(),
    }
}

impl SessionCoordinator {
    /// The registrar accepted a REGISTER (or an un-REGISTER)
    pub async fn on_register_success(&self, response: &SipResponse) {
        debug!(status = response.status_code, "Register success");

        let command = {
            let mut state = self.state.lock().await;
            let next = state.registration.on_success(&self.events);
            self.after_registration_callback(&mut state, "Account registered");
            next
        };

        if let Some(command) = command {
            self.dispatch(command);
        }
    }

    /// The registrar rejected a REGISTER (or an un-REGISTER)
    pub async fn on_register_failed(&self, response: &SipResponse) {
        let mut state = self.state.lock().await;
        self.registration_failed(&mut state, &response.status_line());
    }

    /// An INVITE arrived; the stack already answered it with `provisional`
    pub async fn on_incoming_call(&self, request: &SipRequest, provisional: &SipResponse) {
        let Some(call_id) = request.call_id().or_else(|| provisional.call_id()) else {
            warn!(method = %request.method, "Incoming call without Call-ID, ignoring");
            return;
        };

        let peer = peer_display(request.from_value().unwrap_or_default());
        let session = CallSession::new(call_id.clone(), peer.clone(), CallDirection::Incoming)
            .with_request_handle(request.handle.clone());
        let info = session.info();

        let mut state = self.state.lock().await;
        if let Some(previous) = state.sessions.insert(session) {
            error!(
                %call_id,
                previous_state = %previous.state,
                "Call-ID collision on incoming call, replacing existing session"
            );
        }
        state.pending_terminations.remove(&call_id);

        info!(%call_id, %peer, "Incoming call");
        self.events.emit(SoftphoneEvent::SessionCreated { info, text: format!("{} calling", peer) });
    }

    /// Provisional response for one of our calls
    pub async fn on_ringing(&self, response: &SipResponse) {
        self.route(response.call_id(), CallEvent::Ringing).await;
    }

    /// Error final response for one of our calls
    pub async fn on_error(&self, response: &SipResponse) {
        self.route(response.call_id(), CallEvent::Error { reason: response.status_line() }).await;
    }

    /// The callee answered one of our calls
    pub async fn on_callee_pickup(&self, response: &SipResponse) {
        self.route(response.call_id(), CallEvent::RemotePickup).await;
    }

    /// BYE from the peer
    pub async fn on_remote_hangup(&self, request: &SipRequest) {
        self.route(request.call_id(), CallEvent::RemoteHangup).await;
    }

    async fn route(&self, call_id: Option<CallId>, event: CallEvent) {
        let Some(call_id) = call_id else {
            debug!(?event, "Dropping signaling event without Call-ID");
            return;
        };

        let mut state = self.state.lock().await;
        self.drive_call(&mut state, &call_id, event);
    }

    /// Common tail of every registration outcome: exit or tell the user
    fn after_registration_callback(&self, state: &mut CoordinatorState, status: &str) {
        if !state.registration.is_idle() {
            return;
        }

        if state.shutdown.closing {
            self.trigger_exit(state, ExitReason::RegistrationSettled);
        } else {
            self.events.emit(SoftphoneEvent::status(status));
        }
    }

    fn registration_failed(&self, state: &mut CoordinatorState, detail: &str) {
        warn!(detail, "Registration failed");
        state.registration.on_failure(detail, &self.events);
        self.after_registration_callback(state, "Registration failed");
    }

    pub(crate) async fn on_command_completed(&self, command: SignalingCommand, result: SoftphoneResult<CommandOutput>) {
        match (command, result) {
            (SignalingCommand::Invite { call_id, .. }, Ok(CommandOutput::InviteSent(handle))) => {
                self.on_invite_sent(call_id, handle).await;
            }
            (command, Ok(_)) => {
                debug!(command = command.name(), call_id = ?command.call_id(), "Command handed to signaling stack");
            }
            (command, Err(e)) => self.on_command_failed(command, e).await,
        }
    }

    /// The stack accepted our INVITE and returned its transaction handle
    async fn on_invite_sent(&self, call_id: CallId, handle: RequestHandle) {
        let terminate = {
            let mut state = self.state.lock().await;
            if let Some(session) = state.sessions.get_mut(&call_id) {
                session.request_handle = Some(handle.clone());
            }

            if state.pending_terminations.remove(&call_id) {
                debug!(%call_id, "Sending deferred terminate now that the request handle is known");
                Some(SignalingCommand::Terminate { call_id, handle })
            } else {
                None
            }
        };

        if let Some(command) = terminate {
            self.dispatch(command);
        }
    }

    async fn on_command_failed(&self, command: SignalingCommand, error: SoftphoneError) {
        let mut state = self.state.lock().await;

        match command {
            SignalingCommand::Unregister { origin: CommandOrigin::Shutdown, .. } => {
                // The grace timer still ends the process
                warn!(error = %error, "Best-effort unregister failed during shutdown");
                state.registration.revert_to_idle(&error.to_string(), &self.events);
            }
            SignalingCommand::Register { origin: CommandOrigin::Startup, .. } => {
                warn!(error = %error, "Startup registration could not be sent");
                self.events.emit(SoftphoneEvent::status(format!("Registration failed: {}", error)));
            }
            SignalingCommand::Register { .. } | SignalingCommand::Unregister { .. } => {
                self.registration_failed(&mut state, &error.to_string());
            }
            SignalingCommand::Invite { call_id, .. } => {
                warn!(%call_id, error = %error, "Invite could not be sent");
                state.pending_terminations.remove(&call_id);
                self.drive_call(&mut state, &call_id, CallEvent::Error { reason: error.to_string() });
            }
            command => {
                warn!(command = command.name(), call_id = ?command.call_id(), error = %error, "Signaling command failed");
                self.events.emit(SoftphoneEvent::status(format!("{} failed: {}", command.name(), error)));
            }
        }
    }
}
