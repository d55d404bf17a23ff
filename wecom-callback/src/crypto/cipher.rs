//! AES-256-CBC payload cipher.
//!
//! Plaintext layout before padding:
//!
//! ```text
//! random(16) | msg_len (u32, big-endian) | msg | receive_id
//! ```
//!
//! The buffer is PKCS#7 padded to a 32-byte block (not the AES block size),
//! encrypted with the 32-byte key and an IV equal to the key's first 16 bytes,
//! then base64 encoded.

use aes::Aes256;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::Engine;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::Rng;

use super::error::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Length of the `EncodingAESKey` shown in the WeCom console.
pub const ENCODING_AES_KEY_LEN: usize = 43;

/// Block size used by the platform's PKCS#7 padding.
const PAD_BLOCK: usize = 32;

const RANDOM_PREFIX_LEN: usize = 16;
const LENGTH_FIELD_LEN: usize = 4;
const HEADER_LEN: usize = RANDOM_PREFIX_LEN + LENGTH_FIELD_LEN;

// The console key is 43 characters, so its final symbol carries two unused
// bits that the platform does not keep at zero.
const KEY_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Decrypted payload and the receive id carried behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedPayload {
    pub message: String,
    pub receive_id: String,
}

/// AES key material derived from an `EncodingAESKey`.
#[derive(Clone)]
pub struct PayloadCipher {
    key: [u8; 32],
}

impl std::fmt::Debug for PayloadCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCipher").finish_non_exhaustive()
    }
}

impl PayloadCipher {
    /// Derive the AES key from the 43-character `EncodingAESKey`.
    pub fn from_encoding_aes_key(encoding_aes_key: &str) -> Result<Self, CryptoError> {
        if encoding_aes_key.len() != ENCODING_AES_KEY_LEN {
            return Err(CryptoError::IllegalAesKey);
        }

        let decoded = KEY_ENGINE
            .decode(format!("{}=", encoding_aes_key))
            .map_err(|_| CryptoError::IllegalAesKey)?;

        let key: [u8; 32] = decoded
            .try_into()
            .map_err(|_| CryptoError::IllegalAesKey)?;

        Ok(Self { key })
    }

    fn iv(&self) -> &[u8] {
        &self.key[..16]
    }

    /// Encrypt `message` for `receive_id` with a fresh random prefix.
    pub fn encrypt(&self, message: &str, receive_id: &str) -> Result<String, CryptoError> {
        let mut prefix = [0u8; RANDOM_PREFIX_LEN];
        rand::thread_rng().fill(&mut prefix);
        self.encrypt_with_prefix(&prefix, message, receive_id)
    }

    fn encrypt_with_prefix(
        &self,
        prefix: &[u8; RANDOM_PREFIX_LEN],
        message: &str,
        receive_id: &str,
    ) -> Result<String, CryptoError> {
        let message_len = u32::try_from(message.len()).map_err(|_| CryptoError::EncryptAes)?;

        let mut buf = Vec::with_capacity(HEADER_LEN + message.len() + receive_id.len() + PAD_BLOCK);
        buf.extend_from_slice(prefix);
        buf.extend_from_slice(&message_len.to_be_bytes());
        buf.extend_from_slice(message.as_bytes());
        buf.extend_from_slice(receive_id.as_bytes());
        pad(&mut buf);

        let len = buf.len();
        let ciphertext = Aes256CbcEnc::new_from_slices(&self.key, self.iv())
            .map_err(|_| CryptoError::EncryptAes)?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(|_| CryptoError::EncryptAes)?;

        Ok(STANDARD.encode(ciphertext))
    }

    /// Decrypt a base64 ciphertext into the message and its receive id.
    pub fn decrypt(&self, encrypted: &str) -> Result<DecryptedPayload, CryptoError> {
        let mut buf = STANDARD
            .decode(encrypted)
            .map_err(|_| CryptoError::DecodeBase64)?;

        if buf.is_empty() || buf.len() % 16 != 0 {
            return Err(CryptoError::DecryptAes);
        }

        let plaintext = Aes256CbcDec::new_from_slices(&self.key, self.iv())
            .map_err(|_| CryptoError::DecryptAes)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| CryptoError::DecryptAes)?;

        let content = unpad(plaintext)?;
        if content.len() < HEADER_LEN {
            return Err(CryptoError::IllegalBuffer("payload shorter than header"));
        }

        let mut length_field = [0u8; LENGTH_FIELD_LEN];
        length_field.copy_from_slice(&content[RANDOM_PREFIX_LEN..HEADER_LEN]);
        let message_len = u32::from_be_bytes(length_field) as usize;

        let body = &content[HEADER_LEN..];
        if message_len > body.len() {
            return Err(CryptoError::IllegalBuffer("message length exceeds payload"));
        }

        let (message, receive_id) = body.split_at(message_len);
        let message = std::str::from_utf8(message)
            .map_err(|_| CryptoError::IllegalBuffer("message is not utf-8"))?;
        let receive_id = std::str::from_utf8(receive_id)
            .map_err(|_| CryptoError::IllegalBuffer("receive id is not utf-8"))?;

        Ok(DecryptedPayload {
            message: message.to_string(),
            receive_id: receive_id.to_string(),
        })
    }
}

/// PKCS#7 pad to a multiple of [`PAD_BLOCK`]. A full block is added when the
/// buffer is already aligned.
fn pad(buf: &mut Vec<u8>) {
    let amount = PAD_BLOCK - buf.len() % PAD_BLOCK;
    buf.resize(buf.len() + amount, amount as u8);
}

fn unpad(buf: &[u8]) -> Result<&[u8], CryptoError> {
    let amount = match buf.last() {
        Some(&b) => b as usize,
        None => return Err(CryptoError::IllegalBuffer("empty plaintext")),
    };

    if amount == 0 || amount > PAD_BLOCK || amount > buf.len() {
        return Err(CryptoError::IllegalBuffer("invalid padding"));
    }

    Ok(&buf[..buf.len() - amount])
}
