//! Callback verifier bound to one set of WeCom callback secrets.

use tracing::warn;

use super::cipher::PayloadCipher;
use super::error::CryptoError;
use super::signature::{compute_signature, signatures_match};
use crate::xml::read_fields;

/// The three secrets configured for a WeCom callback URL.
#[derive(Clone)]
pub struct CallbackSecrets {
    /// Token used in the SHA-1 signature
    pub token: String,
    /// 43-character base64 AES key material
    pub encoding_aes_key: String,
    /// Corp id every decrypted payload must be addressed to
    pub corp_id: String,
}

/// Verifies and decrypts callbacks, and encrypts passive replies.
///
/// Built once at startup and shared read-only between requests.
pub struct MsgCrypt {
    token: String,
    corp_id: String,
    cipher: PayloadCipher,
}

impl std::fmt::Debug for MsgCrypt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgCrypt")
            .field("corp_id", &self.corp_id)
            .finish_non_exhaustive()
    }
}

impl MsgCrypt {
    /// Build a verifier, failing if the AES key material is malformed.
    pub fn new(secrets: CallbackSecrets) -> Result<Self, CryptoError> {
        let cipher = PayloadCipher::from_encoding_aes_key(&secrets.encoding_aes_key)?;
        Ok(Self {
            token: secrets.token,
            corp_id: secrets.corp_id,
            cipher,
        })
    }

    /// Answer the one-time URL ownership challenge.
    ///
    /// Verifies `msg_signature` over `echostr` and returns the decrypted
    /// echo string, which the caller must return verbatim.
    pub fn verify_url(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        echostr: &str,
    ) -> Result<String, CryptoError> {
        self.verify_signature(msg_signature, timestamp, nonce, echostr)?;
        self.decrypt(echostr)
    }

    /// Verify and decrypt a POSTed callback envelope.
    ///
    /// `body` is the raw XML posted by the platform; its `<Encrypt>` element
    /// carries the ciphertext the signature covers.
    pub fn decrypt_message(
        &self,
        body: &str,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
    ) -> Result<String, CryptoError> {
        let encrypted = extract_encrypted(body)?;
        self.verify_signature(msg_signature, timestamp, nonce, &encrypted)?;
        self.decrypt(&encrypted)
    }

    /// Encrypt and sign a passive reply, rendering the reply envelope.
    pub fn encrypt_message(
        &self,
        reply: &str,
        nonce: &str,
        timestamp: &str,
    ) -> Result<String, CryptoError> {
        let encrypted = self.cipher.encrypt(reply, &self.corp_id)?;
        let signature = compute_signature(&self.token, timestamp, nonce, &encrypted);
        render_reply(&encrypted, &signature, timestamp, nonce)
    }

    fn verify_signature(
        &self,
        msg_signature: &str,
        timestamp: &str,
        nonce: &str,
        encrypted: &str,
    ) -> Result<(), CryptoError> {
        let expected = compute_signature(&self.token, timestamp, nonce, encrypted);
        if signatures_match(&expected, msg_signature) {
            Ok(())
        } else {
            Err(CryptoError::ValidateSignature)
        }
    }

    fn decrypt(&self, encrypted: &str) -> Result<String, CryptoError> {
        let payload = self.cipher.decrypt(encrypted)?;

        if payload.receive_id != self.corp_id {
            warn!(
                receive_id_length = payload.receive_id.len(),
                "callback_corp_id_mismatch"
            );
            return Err(CryptoError::ValidateCorpId);
        }

        Ok(payload.message)
    }
}

fn extract_encrypted(body: &str) -> Result<String, CryptoError> {
    let mut fields = read_fields(body).map_err(|e| CryptoError::ParseXml(e.to_string()))?;

    match fields.remove("Encrypt") {
        Some(encrypted) if !encrypted.is_empty() => Ok(encrypted),
        _ => Err(CryptoError::ParseXml("missing Encrypt element".to_string())),
    }
}

fn render_reply(
    encrypted: &str,
    signature: &str,
    timestamp: &str,
    nonce: &str,
) -> Result<String, CryptoError> {
    // CDATA sections cannot contain their own terminator.
    if [encrypted, signature, nonce].iter().any(|v| v.contains("]]>"))
        || timestamp.contains(['<', '&'])
    {
        return Err(CryptoError::GenReturnXml);
    }

    Ok(format!(
        "<xml>\n<Encrypt><![CDATA[{}]]></Encrypt>\n<MsgSignature><![CDATA[{}]]></MsgSignature>\n<TimeStamp>{}</TimeStamp>\n<Nonce><![CDATA[{}]]></Nonce>\n</xml>",
        encrypted, signature, timestamp, nonce
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "QDG6eK";
    const KEY: &str = "jWmYm7qr5nMoAUwZRjGtBxmz3KA1tkAj3ykkR6q2B2C";
    const CORP_ID: &str = "wx5823bf96d3bd56c7";

    fn crypt(corp_id: &str) -> MsgCrypt {
        MsgCrypt::new(CallbackSecrets {
            token: TOKEN.to_string(),
            encoding_aes_key: KEY.to_string(),
            corp_id: corp_id.to_string(),
        })
        .unwrap()
    }

    fn reply_field(reply: &str, name: &str) -> String {
        read_fields(reply).unwrap().remove(name).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_key() {
        let result = MsgCrypt::new(CallbackSecrets {
            token: TOKEN.to_string(),
            encoding_aes_key: "too-short".to_string(),
            corp_id: CORP_ID.to_string(),
        });
        assert_eq!(result.unwrap_err(), CryptoError::IllegalAesKey);
    }

    #[test]
    fn test_verify_url_success() {
        let crypt = crypt(CORP_ID);
        let echostr = crypt.cipher.encrypt("1616140317555161061", CORP_ID).unwrap();
        let signature = compute_signature(TOKEN, "1409659589", "263014780", &echostr);

        let plaintext = crypt
            .verify_url(&signature, "1409659589", "263014780", &echostr)
            .unwrap();
        assert_eq!(plaintext, "1616140317555161061");
    }

    #[test]
    fn test_verify_url_rejects_any_mutation() {
        let crypt = crypt(CORP_ID);
        let echostr = crypt.cipher.encrypt("challenge", CORP_ID).unwrap();
        let signature = compute_signature(TOKEN, "1409659589", "263014780", &echostr);

        let mut mutated_sig = signature.clone();
        mutated_sig.replace_range(0..1, if signature.starts_with('0') { "1" } else { "0" });

        assert_eq!(
            crypt.verify_url(&mutated_sig, "1409659589", "263014780", &echostr),
            Err(CryptoError::ValidateSignature)
        );
        assert_eq!(
            crypt.verify_url(&signature, "1409659580", "263014780", &echostr),
            Err(CryptoError::ValidateSignature)
        );
        assert_eq!(
            crypt.verify_url(&signature, "1409659589", "263014781", &echostr),
            Err(CryptoError::ValidateSignature)
        );
        assert_eq!(
            crypt.verify_url(&signature, "1409659589", "263014780", &format!("{}A", echostr)),
            Err(CryptoError::ValidateSignature)
        );
    }

    #[test]
    fn test_verify_url_with_other_token_fails() {
        let crypt = crypt(CORP_ID);
        let echostr = crypt.cipher.encrypt("challenge", CORP_ID).unwrap();
        let signature = compute_signature("other-token", "1", "2", &echostr);

        assert_eq!(
            crypt.verify_url(&signature, "1", "2", &echostr),
            Err(CryptoError::ValidateSignature)
        );
    }

    #[test]
    fn test_encrypt_then_decrypt_message() {
        let crypt = crypt(CORP_ID);
        let message = "<xml><FromUserName><![CDATA[bob]]></FromUserName></xml>";

        let reply = crypt.encrypt_message(message, "5208", "1409659813").unwrap();
        let signature = reply_field(&reply, "MsgSignature");
        assert_eq!(reply_field(&reply, "TimeStamp"), "1409659813");
        assert_eq!(reply_field(&reply, "Nonce"), "5208");

        let plaintext = crypt
            .decrypt_message(&reply, &signature, "1409659813", "5208")
            .unwrap();
        assert_eq!(plaintext, message);
    }

    #[test]
    fn test_decrypt_message_platform_envelope() {
        let crypt = crypt(CORP_ID);
        let encrypted = crypt.cipher.encrypt("payload", CORP_ID).unwrap();
        let body = format!(
            "<xml><ToUserName><![CDATA[{}]]></ToUserName><Encrypt><![CDATA[{}]]></Encrypt><AgentID><![CDATA[218]]></AgentID></xml>",
            CORP_ID, encrypted
        );
        let signature = compute_signature(TOKEN, "1409659813", "1372623149", &encrypted);

        assert_eq!(
            crypt.decrypt_message(&body, &signature, "1409659813", "1372623149"),
            Ok("payload".to_string())
        );
    }

    #[test]
    fn test_decrypt_message_corp_id_mismatch() {
        let sender = crypt("ww_other_corp");
        let receiver = crypt(CORP_ID);

        let reply = sender.encrypt_message("hello", "1", "2").unwrap();
        let signature = reply_field(&reply, "MsgSignature");

        assert_eq!(
            receiver.decrypt_message(&reply, &signature, "2", "1"),
            Err(CryptoError::ValidateCorpId)
        );
    }

    #[test]
    fn test_decrypt_message_bad_signature() {
        let crypt = crypt(CORP_ID);
        let reply = crypt.encrypt_message("hello", "1", "2").unwrap();

        assert_eq!(
            crypt.decrypt_message(&reply, "0000000000000000000000000000000000000000", "2", "1"),
            Err(CryptoError::ValidateSignature)
        );
    }

    #[test]
    fn test_decrypt_message_malformed_envelope() {
        let crypt = crypt(CORP_ID);

        assert!(matches!(
            crypt.decrypt_message("not xml at all <", "sig", "1", "2"),
            Err(CryptoError::ParseXml(_))
        ));
        assert!(matches!(
            crypt.decrypt_message("<xml><ToUserName>x</ToUserName></xml>", "sig", "1", "2"),
            Err(CryptoError::ParseXml(_))
        ));
        assert!(matches!(
            crypt.decrypt_message("<xml><Encrypt></Encrypt></xml>", "sig", "1", "2"),
            Err(CryptoError::ParseXml(_))
        ));
    }

    #[test]
    fn test_decrypt_message_bad_base64_with_valid_signature() {
        let crypt = crypt(CORP_ID);
        let encrypted = "%%%notbase64%%%";
        let body = format!("<xml><Encrypt>{}</Encrypt></xml>", encrypted);
        let signature = compute_signature(TOKEN, "1", "2", encrypted);

        assert_eq!(
            crypt.decrypt_message(&body, &signature, "1", "2"),
            Err(CryptoError::DecodeBase64)
        );
    }

    #[test]
    fn test_render_reply_rejects_cdata_terminator() {
        assert_eq!(
            render_reply("abc", "sig", "1", "]]>"),
            Err(CryptoError::GenReturnXml)
        );
    }
}
