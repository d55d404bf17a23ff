//! WeCom callback cryptography (the WXBizMsgCrypt scheme).
//!
//! This module provides:
//! - SHA-1 signature computation and constant-time verification
//! - AES-256-CBC payload encryption with the platform's 32-byte padding
//! - [`MsgCrypt`], which binds both to the configured callback secrets
//!
//! ## Flow
//!
//! ```text
//! echostr / <Encrypt> → verify signature → AES decrypt → check corp id → plaintext
//! ```

pub mod cipher;
pub mod error;
pub mod msg_crypt;
pub mod signature;

pub use cipher::PayloadCipher;
pub use error::CryptoError;
pub use msg_crypt::{CallbackSecrets, MsgCrypt};
pub use signature::{compute_signature, signatures_match};
