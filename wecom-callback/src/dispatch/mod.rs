//! Fire-and-forget dispatch of parsed messages.
//!
//! This module provides:
//! - [`DispatchJob`], the four-argument contract with the downstream handler
//! - The [`MessageHandler`] trait and the process-spawning [`CommandHandler`]
//! - A bounded worker pool that runs handlers off the request path
//!
//! ## Architecture
//!
//! ```text
//! Callback Controller → Dispatcher::dispatch() → bounded queue → workers → MessageHandler
//! ```

pub mod dispatcher;
pub mod handler;
pub mod types;

pub use dispatcher::{DispatchError, Dispatcher, DispatcherOptions, WorkerPool};
pub use handler::{CommandHandler, HandlerError, MessageHandler};
pub use types::DispatchJob;
