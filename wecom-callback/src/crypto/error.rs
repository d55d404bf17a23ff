//! Crypto failure taxonomy.
//!
//! Each variant carries the numeric status the platform SDK reports for the
//! same failure, so logs line up with WeCom's error code documentation.

use thiserror::Error;

/// Errors raised by signature checks, envelope handling and AES operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("signature mismatch")]
    ValidateSignature,

    #[error("malformed xml envelope: {0}")]
    ParseXml(String),

    #[error("failed to compute signature")]
    ComputeSignature,

    #[error("encoding aes key is invalid")]
    IllegalAesKey,

    #[error("receive id does not match the configured corp id")]
    ValidateCorpId,

    #[error("aes encryption failed")]
    EncryptAes,

    #[error("aes decryption failed")]
    DecryptAes,

    #[error("decrypted buffer is malformed: {0}")]
    IllegalBuffer(&'static str),

    #[error("base64 encoding failed")]
    EncodeBase64,

    #[error("base64 decoding failed")]
    DecodeBase64,

    #[error("failed to render reply xml")]
    GenReturnXml,
}

impl CryptoError {
    /// The platform status code for this failure. Success is `0`.
    pub fn code(&self) -> i32 {
        match self {
            CryptoError::ValidateSignature => -40001,
            CryptoError::ParseXml(_) => -40002,
            CryptoError::ComputeSignature => -40003,
            CryptoError::IllegalAesKey => -40004,
            CryptoError::ValidateCorpId => -40005,
            CryptoError::EncryptAes => -40006,
            CryptoError::DecryptAes => -40007,
            CryptoError::IllegalBuffer(_) => -40008,
            CryptoError::EncodeBase64 => -40009,
            CryptoError::DecodeBase64 => -40010,
            CryptoError::GenReturnXml => -40011,
        }
    }
}
