//! Builder for creating a softphone coordinator
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rvoip_softphone_core::{Credentials, SoftphoneBuilder, SoftphoneEvent};
//! # use async_trait::async_trait;
//! # use rvoip_softphone_core::{CallId, DialogHandle, RequestHandle, SignalingStack, SipUri, SoftphoneResult};
//! # struct NullStack;
//! # #[async_trait]
//! # impl SignalingStack for NullStack {
//! #     async fn register(&self, _: &Credentials) -> SoftphoneResult<()> { Ok(()) }
//! #     async fn unregister(&self, _: &Credentials) -> SoftphoneResult<()> { Ok(()) }
//! #     async fn invite(&self, _: &SipUri, _: &CallId) -> SoftphoneResult<RequestHandle> { Ok(RequestHandle::new()) }
//! #     async fn terminate(&self, _: &RequestHandle) -> SoftphoneResult<()> { Ok(()) }
//! #     async fn accept_call(&self, _: &RequestHandle, _: Option<&DialogHandle>) -> SoftphoneResult<()> { Ok(()) }
//! #     async fn reject_call(&self, _: &RequestHandle) -> SoftphoneResult<()> { Ok(()) }
//! #     fn dialog_for(&self, _: &CallId) -> Option<DialogHandle> { None }
//! # }
//!
//! # tokio_test::block_on(async {
//! let softphone = SoftphoneBuilder::new()
//!     .signaling_stack(Arc::new(NullStack))
//!     .t1(Duration::from_millis(200))
//!     .local_host("192.168.1.20")
//!     .build()
//!     .expect("Failed to build softphone");
//!
//! let mut events = softphone.subscribe_events();
//! softphone.start().await.expect("Failed to start");
//! assert_eq!(events.recv().await.unwrap(), SoftphoneEvent::status("No account configured"));
//! # })
//! ```
//!
//! ## Stored account
//!
//! ```rust
//! use std::sync::Arc;
//! use rvoip_softphone_core::{Credentials, MemoryStore, RegistrationPhase, SoftphoneBuilder};
//! # use async_trait::async_trait;
//! # use rvoip_softphone_core::{CallId, DialogHandle, RequestHandle, SignalingStack, SipUri, SoftphoneResult};
//! # struct NullStack;
//! # #[async_trait]
//! # impl SignalingStack for NullStack {
//! #     async fn register(&self, _: &Credentials) -> SoftphoneResult<()> { Ok(()) }
//! #     async fn unregister(&self, _: &Credentials) -> SoftphoneResult<()> { Ok(()) }
//! #     async fn invite(&self, _: &SipUri, _: &CallId) -> SoftphoneResult<RequestHandle> { Ok(RequestHandle::new()) }
//! #     async fn terminate(&self, _: &RequestHandle) -> SoftphoneResult<()> { Ok(()) }
//! #     async fn accept_call(&self, _: &RequestHandle, _: Option<&DialogHandle>) -> SoftphoneResult<()> { Ok(()) }
//! #     async fn reject_call(&self, _: &RequestHandle) -> SoftphoneResult<()> { Ok(()) }
//! #     fn dialog_for(&self, _: &CallId) -> Option<DialogHandle> { None }
//! # }
//!
//! # tokio_test::block_on(async {
//! let account = Credentials::new("alice", "example.com", "secret");
//! let softphone = SoftphoneBuilder::new()
//!     .signaling_stack(Arc::new(NullStack))
//!     .credential_store(Arc::new(MemoryStore::with_credentials(account.clone())))
//!     .build()
//!     .expect("Failed to build softphone");
//!
//! assert_eq!(softphone.active_credentials().await, Some(account));
//! assert_eq!(softphone.registration_phase().await, RegistrationPhase::Idle);
//! # })
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::coordinator::{SessionCoordinator, SoftphoneConfig};
use crate::credentials::{CredentialStore, JsonFileStore, MemoryStore};
use crate::error::{SoftphoneError, SoftphoneResult};
use crate::signaling::SignalingStack;

/// Builder for creating a [`SessionCoordinator`]
pub struct SoftphoneBuilder {
    config: SoftphoneConfig,
    stack: Option<Arc<dyn SignalingStack>>,
    store: Option<Arc<dyn CredentialStore>>,
}

impl SoftphoneBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self { config: SoftphoneConfig::default(), stack: None, store: None }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: SoftphoneConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the signaling stack (required)
    pub fn signaling_stack(mut self, stack: Arc<dyn SignalingStack>) -> Self {
        self.stack = Some(stack);
        self
    }

    /// Set where the account is persisted
    ///
    /// Without one, `credentials_path` from the configuration is used, and
    /// without that the account lives in memory.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set SIP timer T1
    pub fn t1(mut self, t1: Duration) -> Self {
        self.config = self.config.with_t1(t1);
        self
    }

    /// Set the host used in generated Call-IDs
    pub fn local_host(mut self, host: impl Into<String>) -> Self {
        self.config = self.config.with_local_host(host);
        self
    }

    /// Remove terminated calls without waiting for dismissal
    pub fn auto_dismiss(mut self, enabled: bool) -> Self {
        self.config = self.config.with_auto_dismiss(enabled);
        self
    }

    /// Build the coordinator
    pub fn build(self) -> SoftphoneResult<Arc<SessionCoordinator>> {
        let stack = self.stack.ok_or_else(|| SoftphoneError::InvalidConfiguration {
            field: "signaling_stack".to_string(),
            reason: "a signaling stack is required".to_string(),
        })?;

        let store: Arc<dyn CredentialStore> = match (self.store, &self.config.credentials_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(JsonFileStore::new(path)),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        SessionCoordinator::new(self.config, stack, store)
    }
}

impl Default for SoftphoneBuilder {
    fn default() -> Self {
        Self::new()
    }
}
