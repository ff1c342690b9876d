//! Scripted softphone session against an in-process loopback signaling stack
//!
//! Registers an account, places and receives calls, hangs them up and closes
//! the window, printing every event the coordinator publishes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use rvoip_softphone_core::{
    AccountForm, CallId, Credentials, DialogHandle, RequestHandle, SessionCoordinator, SignalingStack, SipRequest,
    SipResponse, SipUri, SoftphoneBuilder, SoftphoneConfig, SoftphoneEvent, SoftphoneResult,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Account user name
    #[arg(short, long, default_value = "alice")]
    user: String,

    /// Registrar domain
    #[arg(short, long, default_value = "example.com")]
    domain: String,

    /// Account password
    #[arg(short, long, default_value = "secret")]
    password: String,

    /// Outbound proxy URI
    #[arg(long)]
    proxy: Option<String>,

    /// Target to call; may be repeated
    #[arg(short, long = "call")]
    calls: Vec<String>,

    /// Number of incoming calls to simulate
    #[arg(short, long, default_value = "1")]
    incoming: usize,

    /// How long calls stay connected, in milliseconds
    #[arg(long, default_value = "1000")]
    duration_ms: u64,

    /// Simulated network latency, in milliseconds
    #[arg(long, default_value = "50")]
    latency_ms: u64,

    /// SIP T1 timer in milliseconds (grace period is three times this)
    #[arg(long, default_value = "500")]
    t1_ms: u64,

    /// Registrar never answers, so shutdown waits for the grace timer
    #[arg(long)]
    silent_registrar: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// File the committed account is persisted to
    #[arg(long)]
    credentials: Option<PathBuf>,
}

/// What the simulated network sends back to the softphone
#[derive(Debug)]
enum Wire {
    RegistrarOk,
    Ringing(CallId),
    Answered(CallId),
}

/// Signaling stack that answers its own requests after a fixed latency
struct LoopbackStack {
    wire: mpsc::UnboundedSender<Wire>,
    silent_registrar: bool,
}

impl LoopbackStack {
    fn new(silent_registrar: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<Wire>) {
        let (wire, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { wire, silent_registrar }), rx)
    }

    fn reply(&self, message: Wire) {
        if self.wire.send(message).is_err() {
            debug!("Loopback network is gone");
        }
    }
}

#[async_trait]
impl SignalingStack for LoopbackStack {
    async fn register(&self, credentials: &Credentials) -> SoftphoneResult<()> {
        info!("REGISTER {}", credentials.address_of_record());
        if !self.silent_registrar {
            self.reply(Wire::RegistrarOk);
        }
        Ok(())
    }

    async fn unregister(&self, credentials: &Credentials) -> SoftphoneResult<()> {
        info!("REGISTER {} (expires=0)", credentials.address_of_record());
        if !self.silent_registrar {
            self.reply(Wire::RegistrarOk);
        }
        Ok(())
    }

    async fn invite(&self, target: &SipUri, call_id: &CallId) -> SoftphoneResult<RequestHandle> {
        info!("INVITE {} (Call-ID {})", target, call_id);
        self.reply(Wire::Ringing(call_id.clone()));
        self.reply(Wire::Answered(call_id.clone()));
        Ok(RequestHandle::new())
    }

    async fn terminate(&self, handle: &RequestHandle) -> SoftphoneResult<()> {
        info!("BYE/CANCEL for {}", handle);
        Ok(())
    }

    async fn accept_call(&self, handle: &RequestHandle, dialog: Option<&DialogHandle>) -> SoftphoneResult<()> {
        info!("200 OK for {} in dialog {:?}", handle, dialog);
        Ok(())
    }

    async fn reject_call(&self, handle: &RequestHandle) -> SoftphoneResult<()> {
        info!("486 Busy Here for {}", handle);
        Ok(())
    }

    fn dialog_for(&self, call_id: &CallId) -> Option<DialogHandle> {
        Some(DialogHandle(format!("dialog-{}", call_id)))
    }
}

/// Delivers loopback replies to the coordinator one at a time
async fn run_network(softphone: Arc<SessionCoordinator>, mut rx: mpsc::UnboundedReceiver<Wire>, latency: Duration) {
    while let Some(message) = rx.recv().await {
        sleep(latency).await;
        match message {
            Wire::RegistrarOk => softphone.on_register_success(&SipResponse::new(200, "OK")).await,
            Wire::Ringing(call_id) => {
                let response = SipResponse::new(180, "Ringing").with_header("Call-ID", call_id.as_str());
                softphone.on_ringing(&response).await;
            }
            Wire::Answered(call_id) => {
                let response = SipResponse::new(200, "OK").with_header("Call-ID", call_id.as_str());
                softphone.on_callee_pickup(&response).await;
            }
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<SoftphoneEvent>) {
    loop {
        match events.recv().await {
            Ok(SoftphoneEvent::SessionCreated { info, text }) => println!("[{}] {}", info.call_id, text),
            Ok(SoftphoneEvent::CallStateChanged { info }) => {
                println!("[{}] {} -> {} ({})", info.call_id, info.previous_state, info.new_state, info.reason)
            }
            Ok(SoftphoneEvent::StatusText { text }) => println!("status: {}", text),
            Ok(SoftphoneEvent::RegistrationProgress { step, note }) => println!("account step {}: {}", step, note),
            Ok(SoftphoneEvent::RegistrationFailed { phase, note, detail }) => {
                println!("account {} during {}: {}", note, phase, detail)
            }
            Ok(SoftphoneEvent::ValidationFailed { field, message }) => println!("invalid {}: {}", field, message),
            Ok(SoftphoneEvent::AccountFormRequested { credentials }) => {
                println!("account form requested ({:?})", credentials)
            }
            Ok(SoftphoneEvent::Terminating { reason }) => {
                println!("terminating: {}", reason);
                break;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => warn!("Event printer missed {} events", missed),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rvoip_softphone_core=info".parse()?)
                .add_directive("softphone_sim=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SoftphoneConfig::from_file(path)?,
        None => SoftphoneConfig::new(),
    };
    config = config.with_t1(Duration::from_millis(args.t1_ms));
    if let Some(path) = &args.credentials {
        config = config.with_credentials_path(path);
    }
    let latency = Duration::from_millis(args.latency_ms);

    info!("Starting softphone simulation");
    info!("Account: {}@{}", args.user, args.domain);
    info!("Grace period: {:?}", config.grace_period());

    let (stack, wire) = LoopbackStack::new(args.silent_registrar);
    let softphone = SoftphoneBuilder::new().config(config).signaling_stack(stack).build()?;

    tokio::spawn(run_network(softphone.clone(), wire, latency));
    let printer = tokio::spawn(print_events(softphone.subscribe_events()));

    softphone.start().await?;
    sleep(latency * 2).await;

    let mut form = AccountForm::new(&args.user, &args.domain, &args.password);
    if let Some(proxy) = &args.proxy {
        form = form.with_outbound_proxy(proxy);
    }
    if let Err(e) = softphone.apply_account(form).await {
        warn!("Account not applied: {}", e);
    }
    // Unregister, then register
    sleep(latency * 4).await;

    let mut outgoing = Vec::new();
    for target in &args.calls {
        match softphone.on_user_call_intent(target).await {
            Ok(call_id) => outgoing.push(call_id),
            Err(e) => warn!("Call to {} not placed: {}", target, e),
        }
    }

    let mut incoming = Vec::new();
    for n in 0..args.incoming {
        let call_id = CallId::generate("remote.example.com");
        let invite = SipRequest::new("INVITE", RequestHandle::new())
            .with_header("Call-ID", call_id.as_str())
            .with_header("From", format!("\"Caller {}\" <sip:caller{}@remote.example.com>", n + 1, n + 1));
        let provisional = SipResponse::new(180, "Ringing").with_header("Call-ID", call_id.as_str());
        softphone.on_incoming_call(&invite, &provisional).await;
        softphone.on_ringing(&provisional).await;
        incoming.push(call_id);
    }

    sleep(latency).await;
    for call_id in &incoming {
        softphone.on_user_pickup_intent(call_id).await?;
    }

    sleep(Duration::from_millis(args.duration_ms)).await;

    for call_id in &outgoing {
        softphone.on_user_hangup_intent(call_id).await?;
    }
    for call_id in &incoming {
        let bye = SipRequest::new("BYE", RequestHandle::new()).with_header("Call-ID", call_id.as_str());
        softphone.on_remote_hangup(&bye).await;
    }

    let stats = softphone.stats().await;
    info!(
        "Sessions: {} total, {} awaiting dismissal",
        stats.total_sessions, stats.terminated_awaiting_dismissal
    );
    for call in softphone.list_calls().await {
        softphone.on_session_dismissed(&call.call_id).await;
    }

    softphone.on_window_close_intent().await;
    let reason = softphone.wait_for_exit().await;
    info!("Exited: {}", reason);

    let _ = printer.await;
    Ok(())
}
