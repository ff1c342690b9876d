use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, info_span, Instrument};

use super::manager::SessionCoordinator;
use crate::call::CallId;
use crate::error::SoftphoneResult;
use crate::signaling::{RequestHandle, SignalingCommand, SignalingStack};

/// What a successfully handed-off command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommandOutput {
    Sent,
    InviteSent(RequestHandle),
}

/// Tail of a call's command queue: the last command spawned for it
struct Lane {
    seq: u64,
    done: oneshot::Receiver<()>,
}

#[derive(Default)]
struct Lanes {
    next_seq: u64,
    tails: HashMap<CallId, Lane>,
}

/// Runs signaling commands on worker tasks, bounded by a semaphore
///
/// Commands for the same call reach the stack in dispatch order: each waits
/// for the previous one for that Call-ID before taking a permit. Registration
/// commands are not ordered against each other.
pub(crate) struct CommandDispatcher {
    stack: Arc<dyn SignalingStack>,
    permits: Arc<Semaphore>,
    lanes: Arc<StdMutex<Lanes>>,
}

impl CommandDispatcher {
    pub(crate) fn new(stack: Arc<dyn SignalingStack>, max_concurrent: usize) -> Self {
        Self {
            stack,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            lanes: Arc::new(StdMutex::new(Lanes::default())),
        }
    }

    /// Spawn the command; its outcome is reported back to the coordinator
    pub(crate) fn spawn(&self, coordinator: Weak<SessionCoordinator>, command: SignalingCommand) {
        let stack = self.stack.clone();
        let permits = self.permits.clone();
        let lanes = self.lanes.clone();
        let span = info_span!("signaling_command", command = command.name());

        // Joined here, synchronously, so lane order is dispatch order
        let lane = command.call_id().cloned().map(|call_id| {
            let (done_tx, done_rx) = oneshot::channel();
            let mut guard = lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let seq = guard.next_seq;
            guard.next_seq += 1;
            let previous = guard.tails.insert(call_id.clone(), Lane { seq, done: done_rx });
            (call_id, seq, previous.map(|lane| lane.done), done_tx)
        });

        let task = async move {
            let mut finished = None;
            if let Some((call_id, seq, previous, done_tx)) = lane {
                if let Some(previous) = previous {
                    // Err only means the predecessor's task is gone
                    let _ = previous.await;
                }
                finished = Some((call_id, seq, done_tx));
            }

            if let Ok(_permit) = permits.acquire_owned().await {
                let result = execute(stack.as_ref(), &command).await;
                match coordinator.upgrade() {
                    Some(coordinator) => coordinator.on_command_completed(command, result).await,
                    None => debug!(command = command.name(), "Coordinator dropped before command completed"),
                }
            } else {
                debug!(command = command.name(), "Dispatcher closed, dropping command");
            }

            if let Some((call_id, seq, done_tx)) = finished {
                let _ = done_tx.send(());
                let mut guard = lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                if guard.tails.get(&call_id).is_some_and(|lane| lane.seq == seq) {
                    guard.tails.remove(&call_id);
                }
            }
        };
        tokio::spawn(task.instrument(span));
    }

    /// Calls with a command queued or in flight
    #[cfg(test)]
    pub(crate) fn busy_lanes(&self) -> usize {
        self.lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).tails.len()
    }
}

async fn execute(stack: &dyn SignalingStack, command: &SignalingCommand) -> SoftphoneResult<CommandOutput> {
    match command {
        SignalingCommand::Register { credentials, .. } => {
            stack.register(credentials).await?;
        }
        SignalingCommand::Unregister { credentials, .. } => {
            stack.unregister(credentials).await?;
        }
        SignalingCommand::Invite { target, call_id } => {
            let handle = stack.invite(target, call_id).await?;
            return Ok(CommandOutput::InviteSent(handle));
        }
        SignalingCommand::Terminate { handle, .. } => {
            stack.terminate(handle).await?;
        }
        SignalingCommand::Accept { call_id, handle } => {
            let dialog = stack.dialog_for(call_id);
            if dialog.is_none() {
                debug!(%call_id, "No dialog known for call, accepting without one");
            }
            stack.accept_call(handle, dialog.as_ref()).await?;
        }
        SignalingCommand::Reject { handle, .. } => {
            stack.reject_call(handle).await?;
        }
    }
    Ok(CommandOutput::Sent)
}
