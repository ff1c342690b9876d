//! Session coordinator
//!
//! The [`SessionCoordinator`] is the single entry point for everything that can
//! change softphone state:
//!
//! - **callbacks** from the signaling stack (`on_ringing`, `on_register_success`, ...)
//! - **intents** from the presentation layer (`on_user_call_intent`, `apply_account`, ...)
//! - **completions** of commands it handed to worker tasks
//!
//! All three paths take the same `tokio::sync::Mutex`, so they are totally
//! ordered. The lock is only held for in-memory bookkeeping: commands for the
//! signaling stack are collected while it is held and spawned after it is
//! released.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use rvoip_softphone_core::{SoftphoneBuilder, SoftphoneEvent, SignalingStack};
//! # async fn example(stack: Arc<dyn SignalingStack>) -> Result<(), Box<dyn std::error::Error>> {
//! let softphone = SoftphoneBuilder::new()
//!     .signaling_stack(stack)
//!     .local_host("192.168.1.20")
//!     .build()?;
//!
//! let mut events = softphone.subscribe_events();
//! softphone.start().await?;
//!
//! let call_id = softphone.on_user_call_intent("sip:bob@example.com").await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let SoftphoneEvent::CallStateChanged { info } = event {
//!         println!("{} is now {}", info.call_id, info.new_state);
//!     }
//! }
//!
//! softphone.on_window_close_intent().await;
//! let reason = softphone.wait_for_exit().await;
//! println!("exiting: {}", reason);
//! # let _ = call_id;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod manager;

mod callbacks;
mod dispatch;
mod intents;
mod shutdown;


pub use builder::SoftphoneBuilder;
pub use config::SoftphoneConfig;
pub use intents::MenuAction;
pub use manager::SessionCoordinator;
pub use shutdown::ExitReason;

// Note: operations are implemented as impl blocks in separate files
