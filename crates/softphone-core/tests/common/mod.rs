//! Shared helpers for softphone-core integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use rvoip_softphone_core::{
    CallId, Credentials, DialogHandle, MemoryStore, RequestHandle, SessionCoordinator, SignalingStack,
    SipRequest, SipResponse, SipUri, SoftphoneBuilder, SoftphoneError, SoftphoneEvent, SoftphoneResult,
};

/// A command as the signaling stack saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Register(Credentials),
    Unregister(Credentials),
    Invite { target: String, call_id: CallId, handle: RequestHandle },
    Terminate(RequestHandle),
    Accept { handle: RequestHandle, dialog: Option<DialogHandle> },
    Reject(RequestHandle),
}

/// Signaling stack double that records every command it receives
pub struct RecordingStack {
    tx: mpsc::UnboundedSender<Recorded>,
    failing: Mutex<HashSet<&'static str>>,
    dialogs: Mutex<HashMap<CallId, DialogHandle>>,
}

impl RecordingStack {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Recorded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stack = Arc::new(Self {
            tx,
            failing: Mutex::new(HashSet::new()),
            dialogs: Mutex::new(HashMap::new()),
        });
        (stack, rx)
    }

    /// Make every future `command` ("register", "invite", ...) fail
    pub fn fail(&self, command: &'static str) {
        self.failing.lock().unwrap().insert(command);
    }

    pub fn add_dialog(&self, call_id: &str, dialog: &str) {
        self.dialogs.lock().unwrap().insert(CallId::from(call_id), DialogHandle(dialog.to_string()));
    }

    fn record(&self, command: &'static str, recorded: Recorded) -> SoftphoneResult<()> {
        if self.failing.lock().unwrap().contains(command) {
            return Err(SoftphoneError::transport_failed(format!("{} refused by test stack", command)));
        }
        let _ = self.tx.send(recorded);
        Ok(())
    }
}

#[async_trait]
impl SignalingStack for RecordingStack {
    async fn register(&self, credentials: &Credentials) -> SoftphoneResult<()> {
        self.record("register", Recorded::Register(credentials.clone()))
    }

    async fn unregister(&self, credentials: &Credentials) -> SoftphoneResult<()> {
        self.record("unregister", Recorded::Unregister(credentials.clone()))
    }

    async fn invite(&self, target: &SipUri, call_id: &CallId) -> SoftphoneResult<RequestHandle> {
        let handle = RequestHandle(format!("invite-{}", call_id));
        self.record(
            "invite",
            Recorded::Invite { target: target.to_string(), call_id: call_id.clone(), handle: handle.clone() },
        )?;
        Ok(handle)
    }

    async fn terminate(&self, handle: &RequestHandle) -> SoftphoneResult<()> {
        self.record("terminate", Recorded::Terminate(handle.clone()))
    }

    async fn accept_call(&self, handle: &RequestHandle, dialog: Option<&DialogHandle>) -> SoftphoneResult<()> {
        self.record("accept", Recorded::Accept { handle: handle.clone(), dialog: dialog.cloned() })
    }

    async fn reject_call(&self, handle: &RequestHandle) -> SoftphoneResult<()> {
        self.record("reject", Recorded::Reject(handle.clone()))
    }

    fn dialog_for(&self, call_id: &CallId) -> Option<DialogHandle> {
        self.dialogs.lock().unwrap().get(call_id).cloned()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rvoip_softphone_core=debug")
        .with_test_writer()
        .try_init();
}

pub fn account() -> Credentials {
    Credentials::new("alice", "old.example.com", "secret")
}

/// Coordinator with a stored account and a recording stack
pub fn softphone() -> (Arc<SessionCoordinator>, Arc<RecordingStack>, mpsc::UnboundedReceiver<Recorded>) {
    softphone_with(SoftphoneBuilder::new())
}

pub fn softphone_with(
    builder: SoftphoneBuilder,
) -> (Arc<SessionCoordinator>, Arc<RecordingStack>, mpsc::UnboundedReceiver<Recorded>) {
    init_tracing();
    let (stack, rx) = RecordingStack::new();
    let softphone = builder
        .signaling_stack(stack.clone())
        .credential_store(Arc::new(MemoryStore::with_credentials(account())))
        .build()
        .expect("Failed to build softphone");
    (softphone, stack, rx)
}

pub async fn next_command(rx: &mut mpsc::UnboundedReceiver<Recorded>) -> Recorded {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timed out waiting for a signaling command")
        .expect("Signaling stack dropped")
}

/// Wait until no further commands arrive for a while
pub async fn assert_no_command(rx: &mut mpsc::UnboundedReceiver<Recorded>) {
    if let Ok(Some(command)) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await {
        panic!("Unexpected signaling command: {:?}", command);
    }
}

pub async fn next_event(rx: &mut broadcast::Receiver<SoftphoneEvent>) -> SoftphoneEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("Timed out waiting for an event")
        .expect("Event channel closed")
}

/// Everything already published, without waiting
pub fn drain_events(rx: &mut broadcast::Receiver<SoftphoneEvent>) -> Vec<SoftphoneEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn incoming_invite(call_id: &str, from: &str) -> (SipRequest, SipResponse) {
    let request = SipRequest::new("INVITE", RequestHandle(format!("uas-{}", call_id)))
        .with_header("Call-ID", call_id)
        .with_header("From", from);
    let provisional = SipResponse::new(180, "Ringing").with_header("Call-ID", call_id);
    (request, provisional)
}

pub fn response(status_code: u16, reason: &str, call_id: &str) -> SipResponse {
    SipResponse::new(status_code, reason).with_header("Call-ID", call_id)
}

pub fn bye(call_id: &str) -> SipRequest {
    SipRequest::new("BYE", RequestHandle(format!("bye-{}", call_id))).with_header("Call-ID", call_id)
}

pub fn registrar_ok() -> SipResponse {
    SipResponse::new(200, "OK")
}
