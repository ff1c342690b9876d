//! Window close and the timed exit
//!
//! Closing the window sends a best-effort un-REGISTER and arms a grace timer
//! of `grace_multiplier * T1`. Whichever comes first ends the process:
//!
//! - the registration controller settles (success or failure) while closing
//! - the grace timer fires
//!
//! The exit is a value on a `watch` channel, not a process exit, so the
//! embedding application decides how to leave.

use std::fmt;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, Instrument, Span};

use super::manager::{CoordinatorState, SessionCoordinator};
use crate::events::SoftphoneEvent;
use crate::signaling::{CommandOrigin, SignalingCommand};

/// Why the softphone is exiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The registrar answered during shutdown
    RegistrationSettled,
    /// Nobody answered within the grace period
    GraceTimeout,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::RegistrationSettled => write!(f, "registration settled"),
            ExitReason::GraceTimeout => write!(f, "grace period elapsed"),
        }
    }
}

/// Set once, never cleared
#[derive(Debug, Default)]
pub(crate) struct ShutdownState {
    pub(crate) closing: bool,
    pub(crate) grace_deadline: Option<Instant>,
    pub(crate) grace_timer: Option<JoinHandle<()>>,
    pub(crate) exit: Option<ExitReason>,
}

impl SessionCoordinator {
    /// The user closed the main window
    ///
    /// Returns immediately; await [`wait_for_exit`](Self::wait_for_exit) for the outcome.
    /// Calling it again has no effect.
    pub async fn on_window_close_intent(&self) {
        let command = {
            let mut state = self.state.lock().await;
            if state.shutdown.closing {
                debug!("Window close while already closing");
                return;
            }

            let grace = self.config.grace_period();
            let deadline = Instant::now() + grace;
            state.shutdown.closing = true;
            state.shutdown.grace_deadline = Some(deadline);
            state.shutdown.grace_timer = Some(self.spawn_grace_timer(deadline));

            info!(grace_ms = grace.as_millis() as u64, "Window closed, shutting down");

            match state.registration.active() {
                Some(credentials) => Some(SignalingCommand::Unregister {
                    credentials: credentials.clone(),
                    origin: CommandOrigin::Shutdown,
                }),
                None => {
                    debug!("No account to unregister");
                    None
                }
            }
        };

        if let Some(command) = command {
            self.dispatch(command);
        }
    }

    pub async fn is_closing(&self) -> bool {
        self.state.lock().await.shutdown.closing
    }

    /// When the grace timer fires, once shutdown has started
    pub async fn grace_deadline(&self) -> Option<Instant> {
        self.state.lock().await.shutdown.grace_deadline
    }

    /// Exit reason, if the softphone already decided to exit
    pub fn exit_reason(&self) -> Option<ExitReason> {
        *self.exit_tx.borrow()
    }

    /// Resolve once the softphone decided to exit
    pub async fn wait_for_exit(&self) -> ExitReason {
        let mut rx = self.exit_tx.subscribe();
        match rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ExitReason::GraceTimeout),
            // The sender lives as long as `self`
            Err(_) => ExitReason::GraceTimeout,
        }
    }

    fn spawn_grace_timer(&self, deadline: Instant) -> JoinHandle<()> {
        let coordinator = self.weak_self.clone();
        let timer = async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(coordinator) = coordinator.upgrade() {
                coordinator.on_grace_timeout().await;
            }
        };
        tokio::spawn(timer.instrument(Span::current()))
    }

    async fn on_grace_timeout(&self) {
        let mut state = self.state.lock().await;
        // This task is the timer; nothing left to abort
        state.shutdown.grace_timer = None;
        info!("Grace period elapsed");
        self.trigger_exit(&mut state, ExitReason::GraceTimeout);
    }

    /// Decide to exit. Only the first call has an effect.
    pub(crate) fn trigger_exit(&self, state: &mut CoordinatorState, reason: ExitReason) {
        if let Some(previous) = state.shutdown.exit {
            debug!(%previous, %reason, "Exit already triggered");
            return;
        }
        state.shutdown.exit = Some(reason);

        if let Some(timer) = state.shutdown.grace_timer.take() {
            timer.abort();
        }

        info!(%reason, "Softphone exiting");
        self.events.emit(SoftphoneEvent::Terminating { reason });
        self.exit_tx.send_replace(Some(reason));
    }
}
