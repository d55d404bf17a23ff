//! WeCom callback endpoint.
//!
//! This library provides the pieces of the `wecom-callback` server:
//! - `crypto`: signature verification and payload decryption (WXBizMsgCrypt)
//! - `message`: typed parsing of decrypted message documents
//! - `dispatch`: bounded, fire-and-forget hand-off to a downstream handler
//! - `web`: the axum callback controller
//!
//! ## Architecture
//!
//! ```text
//! GET  → verify_url → echo plaintext
//! POST → decrypt_message → parse_message → Dispatcher → workers → handler
//! ```

pub mod config;
pub mod crypto;
pub mod dispatch;
pub mod message;
pub mod web;
pub mod xml;

// Re-export commonly used types
pub use config::Config;
pub use crypto::{CallbackSecrets, CryptoError, MsgCrypt};
pub use dispatch::{CommandHandler, DispatchJob, Dispatcher, DispatcherOptions, MessageHandler};
pub use message::{parse_message, MessageKind, ParseError, ParsedMessage};
pub use web::{router, AppState};
