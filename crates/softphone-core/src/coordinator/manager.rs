use std::collections::HashSet;
use std::sync::{Arc, Weak};

use chrono::Utc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info};

use super::config::SoftphoneConfig;
use super::dispatch::CommandDispatcher;
use super::shutdown::{ExitReason, ShutdownState};
use crate::call::{CallEvent, CallId, CallInfo, CallStats, Transition};
use crate::credentials::CredentialStore;
use crate::error::{SoftphoneError, SoftphoneResult};
use crate::events::{CallStatusInfo, EventEmitter, SoftphoneEvent};
use crate::registration::{Credentials, RegistrationController, RegistrationPhase};
use crate::session_table::SessionTable;
use crate::signaling::{CommandOrigin, SignalingCommand, SignalingStack};

/// Everything guarded by the coordinator lock
pub(crate) struct CoordinatorState {
    pub(crate) sessions: SessionTable,
    pub(crate) registration: RegistrationController,
    pub(crate) shutdown: ShutdownState,
    /// Outgoing calls hung up before the stack returned their request handle
    pub(crate) pending_terminations: HashSet<CallId>,
}

/// Central dispatcher between the signaling stack and the presentation layer
pub struct SessionCoordinator {
    pub(crate) config: SoftphoneConfig,
    pub(crate) state: Mutex<CoordinatorState>,
    pub(crate) events: EventEmitter,
    pub(crate) dispatcher: CommandDispatcher,
    pub(crate) exit_tx: watch::Sender<Option<ExitReason>>,
    pub(crate) weak_self: Weak<SessionCoordinator>,
}

impl SessionCoordinator {
    /// Create a coordinator
    ///
    /// The stored account (if any) is loaded here; nothing is sent until [`start`](Self::start).
    pub fn new(
        config: SoftphoneConfig,
        stack: Arc<dyn SignalingStack>,
        store: Arc<dyn CredentialStore>,
    ) -> SoftphoneResult<Arc<Self>> {
        config.validate()?;

        let registration = RegistrationController::from_store(store);
        if let Some(account) = registration.active() {
            info!(account = %account.address_of_record(), "Loaded stored account");
        }

        let events = EventEmitter::new(config.event_channel_capacity);
        let dispatcher = CommandDispatcher::new(stack, config.max_concurrent_commands);
        let (exit_tx, _) = watch::channel(None);

        let state = CoordinatorState {
            sessions: SessionTable::new(),
            registration,
            shutdown: ShutdownState::default(),
            pending_terminations: HashSet::new(),
        };

        Ok(Arc::new_cyclic(|weak_self| Self {
            config,
            state: Mutex::new(state),
            events,
            dispatcher,
            exit_tx,
            weak_self: weak_self.clone(),
        }))
    }

    /// Register the stored account, if there is one
    pub async fn start(&self) -> SoftphoneResult<()> {
        let command = {
            let state = self.state.lock().await;
            if state.shutdown.closing {
                return Err(SoftphoneError::ShuttingDown);
            }
            state
                .registration
                .active()
                .cloned()
                .map(|credentials| SignalingCommand::Register { credentials, origin: CommandOrigin::Startup })
        };

        match command {
            Some(command) => {
                info!("Softphone started, registering stored account");
                self.dispatch(command);
            }
            None => {
                info!("Softphone started without an account");
                self.events.emit(SoftphoneEvent::status("No account configured"));
            }
        }
        Ok(())
    }

    /// Subscribe to presentation events
    pub fn subscribe_events(&self) -> broadcast::Receiver<SoftphoneEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &SoftphoneConfig {
        &self.config
    }

    pub async fn get_call(&self, call_id: &CallId) -> Option<CallInfo> {
        self.state.lock().await.sessions.get(call_id).map(|session| session.info())
    }

    /// All sessions still in the table, oldest first
    pub async fn list_calls(&self) -> Vec<CallInfo> {
        let state = self.state.lock().await;
        let mut calls: Vec<CallInfo> = state.sessions.iter().map(|session| session.info()).collect();
        calls.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.call_id.cmp(&b.call_id)));
        calls
    }

    pub async fn stats(&self) -> CallStats {
        self.state.lock().await.sessions.stats()
    }

    pub async fn registration_phase(&self) -> RegistrationPhase {
        self.state.lock().await.registration.phase()
    }

    /// `Done` or `Failed` for the most recent account apply, if any finished
    pub async fn last_registration_outcome(&self) -> Option<RegistrationPhase> {
        self.state.lock().await.registration.last_outcome()
    }

    pub async fn active_credentials(&self) -> Option<Credentials> {
        self.state.lock().await.registration.active().cloned()
    }

    /// Hand a command to a worker task. Callers release the state lock first.
    pub(crate) fn dispatch(&self, command: SignalingCommand) {
        debug!(command = command.name(), call_id = ?command.call_id(), "Dispatching signaling command");
        self.dispatcher.spawn(self.weak_self.clone(), command);
    }

    /// Feed an event to the session's state machine and publish the result
    ///
    /// Unknown Call-IDs are stale events and dropped.
    pub(crate) fn drive_call(
        &self,
        state: &mut CoordinatorState,
        call_id: &CallId,
        event: CallEvent,
    ) -> Option<Transition> {
        let Some(session) = state.sessions.get_mut(call_id) else {
            debug!(%call_id, ?event, "Dropping event for unknown call");
            return None;
        };

        let transition = session.handle_event(event)?;
        info!(
            %call_id,
            from = %transition.previous,
            to = %transition.current,
            reason = %transition.reason,
            "Call state changed"
        );

        self.events.emit(SoftphoneEvent::CallStateChanged {
            info: CallStatusInfo {
                call_id: call_id.clone(),
                new_state: transition.current,
                previous_state: transition.previous,
                reason: transition.reason.clone(),
                timestamp: Utc::now(),
            },
        });

        if transition.current.is_terminated() && self.config.auto_dismiss_terminated {
            state.sessions.remove(call_id);
            debug!(%call_id, "Auto-dismissed terminated call");
        }

        Some(transition)
    }
}
