//! Boundary to the SIP signaling stack
//!
//! The stack is an external collaborator. The softphone core consumes its
//! callbacks ([`SipRequest`] / [`SipResponse`] handed to the coordinator's
//! `on_*` methods) and issues commands through the [`SignalingStack`] trait.
//! Every command is asynchronous: a returned `Ok` only means the request was
//! handed to the transport; the outcome arrives later as a callback.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::call::CallId;
use crate::error::SoftphoneResult;
use crate::registration::Credentials;
use crate::uri::SipUri;

/// Opaque token the stack uses to correlate a request with its transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestHandle(pub String);

impl RequestHandle {
    pub fn new() -> Self {
        Self(format!("req-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque dialog context the stack needs to accept a call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DialogHandle(pub String);

/// Headers as delivered by the stack
pub type SipHeaders = HashMap<String, String>;

fn header<'a>(headers: &'a SipHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Anything that can be correlated with a call
pub trait SignalingMessage {
    fn headers(&self) -> &SipHeaders;

    /// Call-ID header value (compact form `i` accepted)
    fn call_id(&self) -> Option<CallId> {
        header(self.headers(), "Call-ID")
            .or_else(|| header(self.headers(), "i"))
            .map(|value| CallId::from(value.trim()))
            .filter(|id| !id.as_str().is_empty())
    }
}

/// A request received from the network (INVITE, BYE)
#[derive(Debug, Clone)]
pub struct SipRequest {
    pub method: String,
    pub headers: SipHeaders,
    /// Server transaction handle for responding to this request
    pub handle: RequestHandle,
}

impl SipRequest {
    pub fn new(method: impl Into<String>, handle: RequestHandle) -> Self {
        Self { method: method.into(), headers: SipHeaders::new(), handle }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Raw From header value (compact form `f` accepted)
    pub fn from_value(&self) -> Option<&str> {
        header(&self.headers, "From").or_else(|| header(&self.headers, "f"))
    }
}

impl SignalingMessage for SipRequest {
    fn headers(&self) -> &SipHeaders {
        &self.headers
    }
}

/// A response received from the network
#[derive(Debug, Clone)]
pub struct SipResponse {
    pub status_code: u16,
    pub reason_phrase: String,
    pub headers: SipHeaders,
}

impl SipResponse {
    pub fn new(status_code: u16, reason_phrase: impl Into<String>) -> Self {
        Self { status_code, reason_phrase: reason_phrase.into(), headers: SipHeaders::new() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// "486 Busy Here"
    pub fn status_line(&self) -> String {
        format!("{} {}", self.status_code, self.reason_phrase)
    }
}

impl SignalingMessage for SipResponse {
    fn headers(&self) -> &SipHeaders {
        &self.headers
    }
}

/// Extract a display name from a From/To header value
///
/// `"Alice Smith" <sip:alice@example.com>;tag=1` yields `Alice Smith`,
/// `Bob <sip:bob@example.com>` yields `Bob`. Returns `None` for a bare URI.
pub fn extract_display_name(value: &str) -> Option<String> {
    if let Some(start) = value.find('"') {
        if let Some(end) = value[start + 1..].find('"') {
            let display_name = &value[start + 1..start + 1 + end];
            if !display_name.is_empty() {
                return Some(display_name.to_string());
            }
        }
    }

    if let Some(angle_pos) = value.find('<') {
        let potential_name = value[..angle_pos].trim();
        if !potential_name.is_empty() && !potential_name.starts_with("sip:") {
            return Some(potential_name.to_string());
        }
    }

    None
}

/// Why a REGISTER / un-REGISTER was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOrigin {
    /// Registering the stored account when the softphone starts
    Startup,
    /// Part of an account apply cycle
    Account,
    /// Best-effort teardown on window close
    Shutdown,
}

/// A command waiting to be carried out by a worker task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingCommand {
    Register { credentials: Credentials, origin: CommandOrigin },
    Unregister { credentials: Credentials, origin: CommandOrigin },
    Invite { target: SipUri, call_id: CallId },
    Terminate { call_id: CallId, handle: RequestHandle },
    /// The dialog handle is resolved by the worker through [`SignalingStack::dialog_for`]
    Accept { call_id: CallId, handle: RequestHandle },
    Reject { call_id: CallId, handle: RequestHandle },
}

impl SignalingCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SignalingCommand::Register { .. } => "register",
            SignalingCommand::Unregister { .. } => "unregister",
            SignalingCommand::Invite { .. } => "invite",
            SignalingCommand::Terminate { .. } => "terminate",
            SignalingCommand::Accept { .. } => "accept",
            SignalingCommand::Reject { .. } => "reject",
        }
    }

    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            SignalingCommand::Register { .. } | SignalingCommand::Unregister { .. } => None,
            SignalingCommand::Invite { call_id, .. }
            | SignalingCommand::Terminate { call_id, .. }
            | SignalingCommand::Accept { call_id, .. }
            | SignalingCommand::Reject { call_id, .. } => Some(call_id),
        }
    }
}

/// Commands the softphone core issues to the signaling stack
///
/// Implementations may block on the network; the coordinator always calls them
/// from worker tasks, never while holding its lock.
#[async_trait]
pub trait SignalingStack: Send + Sync {
    /// Send REGISTER for the given account
    async fn register(&self, credentials: &Credentials) -> SoftphoneResult<()>;

    /// Send REGISTER with `Expires: 0` for the given account
    async fn unregister(&self, credentials: &Credentials) -> SoftphoneResult<()>;

    /// Send INVITE; returns the client transaction handle
    async fn invite(&self, target: &SipUri, call_id: &CallId) -> SoftphoneResult<RequestHandle>;

    /// Send BYE (or CANCEL before the call is answered)
    async fn terminate(&self, handle: &RequestHandle) -> SoftphoneResult<()>;

    /// Answer an incoming call with 200 OK
    async fn accept_call(&self, handle: &RequestHandle, dialog: Option<&DialogHandle>) -> SoftphoneResult<()>;

    /// Answer an incoming call with 486 Busy Here
    async fn reject_call(&self, handle: &RequestHandle) -> SoftphoneResult<()>;

    /// Dialog established for a Call-ID, if any
    fn dialog_for(&self, call_id: &CallId) -> Option<DialogHandle>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_id_header_lookup_is_case_insensitive() {
        let response = SipResponse::new(180, "Ringing").with_header("call-id", " abc123 ");
        assert_eq!(response.call_id(), Some(CallId::from("abc123")));

        let compact = SipRequest::new("BYE", RequestHandle::new()).with_header("i", "xyz");
        assert_eq!(compact.call_id(), Some(CallId::from("xyz")));

        let missing = SipResponse::new(200, "OK");
        assert_eq!(missing.call_id(), None);

        let empty = SipResponse::new(200, "OK").with_header("Call-ID", "  ");
        assert_eq!(empty.call_id(), None);
    }

    #[test]
    fn test_display_name_extraction() {
        assert_eq!(
            extract_display_name("\"Alice Smith\" <sip:alice@example.com>;tag=88"),
            Some("Alice Smith".to_string())
        );
        assert_eq!(extract_display_name("Bob <sip:bob@example.com>"), Some("Bob".to_string()));
        assert_eq!(extract_display_name("<sip:carol@example.com>"), None);
        assert_eq!(extract_display_name("sip:dave@example.com"), None);
    }

    #[test]
    fn test_status_line() {
        assert_eq!(SipResponse::new(486, "Busy Here").status_line(), "486 Busy Here");
    }
}
