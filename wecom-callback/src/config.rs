//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables. A `.env` file in the
//! working directory is loaded by the binary before this runs.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Result};
use tracing::warn;

use crate::crypto::CallbackSecrets;
use crate::dispatch::{CommandHandler, DispatcherOptions};

/// Application configuration loaded from environment variables.
pub struct Config {
    // =========================================================================
    // Callback Secrets
    // =========================================================================

    /// WeCom corp id the callbacks are addressed to
    pub corp_id: String,

    /// Callback token used in signature verification
    pub token: String,

    /// 43-character EncodingAESKey from the WeCom console
    pub encoding_aes_key: String,

    // =========================================================================
    // Web Server Configuration
    // =========================================================================

    /// Port for the web server to listen on
    pub port: u16,

    /// Route the platform calls back on
    pub callback_path: String,

    /// PEM certificate for TLS termination
    pub ssl_cert_path: Option<PathBuf>,

    /// PEM private key for TLS termination
    pub ssl_key_path: Option<PathBuf>,

    // =========================================================================
    // Dispatch Configuration
    // =========================================================================

    /// Downstream command line; the four job arguments are appended
    pub handler_command: String,

    /// Channel id passed to the downstream handler
    pub channel_id: i32,

    /// Number of dispatcher workers
    pub dispatch_workers: usize,

    /// Jobs that may wait for a worker before new ones are dropped
    pub dispatch_queue_capacity: usize,

    /// Optional deadline for one handler invocation
    pub handler_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails if any of the three callback secrets is missing.
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            corp_id: required("CORP_ID")?,
            token: required("SUITE_TOKEN")?,
            encoding_aes_key: required("SUITE_ENCODING_AES_KEY")?,

            port: parse_port(),

            callback_path: parse_path("CALLBACK_PATH", "/hook_path"),

            ssl_cert_path: optional("SSL_CERT_PATH").map(PathBuf::from),

            ssl_key_path: optional("SSL_KEY_PATH").map(PathBuf::from),

            handler_command: optional("HANDLER_COMMAND")
                .unwrap_or_else(|| "python3 command.py".to_string()),

            channel_id: parse_or("CALLBACK_CHANNEL_ID", 0),

            dispatch_workers: parse_or("DISPATCH_WORKERS", 4),

            dispatch_queue_capacity: parse_or("DISPATCH_QUEUE_CAPACITY", 1024),

            handler_timeout_secs: optional("HANDLER_TIMEOUT_SECS").and_then(|raw| {
                match raw.parse::<u64>() {
                    Ok(secs) => Some(secs),
                    Err(_) => {
                        warn!(env_var = "HANDLER_TIMEOUT_SECS", value = %raw, "Invalid value, disabling timeout");
                        None
                    }
                }
            }),
        })
    }

    /// The secrets the crypto verifier is built from.
    pub fn secrets(&self) -> CallbackSecrets {
        CallbackSecrets {
            token: self.token.clone(),
            encoding_aes_key: self.encoding_aes_key.clone(),
            corp_id: self.corp_id.clone(),
        }
    }

    /// Certificate and key paths, when both are configured and exist.
    pub fn tls_paths(&self) -> Option<(&Path, &Path)> {
        match (&self.ssl_cert_path, &self.ssl_key_path) {
            (Some(cert), Some(key)) if cert.exists() && key.exists() => {
                Some((cert.as_path(), key.as_path()))
            }
            _ => None,
        }
    }

    /// The process-spawning handler described by `handler_command`.
    pub fn command_handler(&self) -> Result<CommandHandler> {
        match CommandHandler::from_command_line(&self.handler_command) {
            Some(handler) => Ok(handler),
            None => bail!("HANDLER_COMMAND is empty"),
        }
    }

    pub fn dispatcher_options(&self) -> DispatcherOptions {
        DispatcherOptions {
            workers: self.dispatch_workers,
            queue_capacity: self.dispatch_queue_capacity,
            handler_timeout: self.handler_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Read a variable, treating empty or whitespace-only values as unset.
fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(name: &str) -> Result<String> {
    match optional(name) {
        Some(value) => Ok(value),
        None => bail!("{} must be set", name),
    }
}

/// Parse a variable, falling back to `default` when unset or invalid.
fn parse_or<T: FromStr>(name: &str, default: T) -> T {
    let raw = match optional(name) {
        Some(v) => v,
        None => return default,
    };

    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

/// `PORT`, falling back to `FLASK_PORT` so existing `.env` files keep working.
fn parse_port() -> u16 {
    let name = if optional("PORT").is_some() {
        "PORT"
    } else {
        "FLASK_PORT"
    };
    parse_or(name, 8066)
}

/// Parse a route path, adding the leading slash if it was left off.
fn parse_path(name: &str, default: &str) -> String {
    let raw = optional(name).unwrap_or_else(|| default.to_string());
    if raw.starts_with('/') {
        raw
    } else {
        format!("/{}", raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_valid() {
        env::set_var("TEST_WECOM_PORT", "9000");
        assert_eq!(parse_or("TEST_WECOM_PORT", 8066u16), 9000);
        env::remove_var("TEST_WECOM_PORT");
    }

    #[test]
    fn test_parse_or_invalid_uses_default() {
        env::set_var("TEST_WECOM_WORKERS", "many");
        assert_eq!(parse_or("TEST_WECOM_WORKERS", 4usize), 4);
        env::remove_var("TEST_WECOM_WORKERS");
    }

    #[test]
    fn test_parse_port_falls_back_to_flask_port() {
        env::remove_var("PORT");
        env::set_var("FLASK_PORT", "9443");
        assert_eq!(parse_port(), 9443);

        env::set_var("PORT", "9000");
        assert_eq!(parse_port(), 9000);

        env::remove_var("PORT");
        env::remove_var("FLASK_PORT");
        assert_eq!(parse_port(), 8066);
    }

    #[test]
    fn test_parse_or_default() {
        assert_eq!(parse_or("NONEXISTENT_WECOM_VAR", 7i32), 7);
    }

    #[test]
    fn test_required_rejects_blank() {
        env::set_var("TEST_WECOM_BLANK", "   ");
        assert!(required("TEST_WECOM_BLANK").is_err());
        env::remove_var("TEST_WECOM_BLANK");

        assert!(required("NONEXISTENT_WECOM_SECRET").is_err());
    }

    #[test]
    fn test_parse_path_adds_slash() {
        env::set_var("TEST_WECOM_PATH", "wecom/callback");
        assert_eq!(parse_path("TEST_WECOM_PATH", "/hook_path"), "/wecom/callback");
        env::remove_var("TEST_WECOM_PATH");

        assert_eq!(parse_path("NONEXISTENT_WECOM_PATH", "/hook_path"), "/hook_path");
    }

    fn config() -> Config {
        Config {
            corp_id: "corp".to_string(),
            token: "token".to_string(),
            encoding_aes_key: "key".to_string(),
            port: 8066,
            callback_path: "/hook_path".to_string(),
            ssl_cert_path: None,
            ssl_key_path: None,
            handler_command: "python3 command.py".to_string(),
            channel_id: 0,
            dispatch_workers: 2,
            dispatch_queue_capacity: 16,
            handler_timeout_secs: Some(30),
        }
    }

    #[test]
    fn test_tls_paths_require_existing_files() {
        let mut config = config();
        assert!(config.tls_paths().is_none());

        config.ssl_cert_path = Some(PathBuf::from("/nonexistent/cert.pem"));
        config.ssl_key_path = Some(PathBuf::from("/nonexistent/key.pem"));
        assert!(config.tls_paths().is_none());

        let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        config.ssl_cert_path = Some(manifest.clone());
        config.ssl_key_path = Some(manifest);
        assert!(config.tls_paths().is_some());
    }

    #[test]
    fn test_derived_settings() {
        let config = config();

        let secrets = config.secrets();
        assert_eq!(secrets.corp_id, "corp");
        assert_eq!(secrets.token, "token");

        let options = config.dispatcher_options();
        assert_eq!(options.workers, 2);
        assert_eq!(options.queue_capacity, 16);
        assert_eq!(options.handler_timeout, Some(Duration::from_secs(30)));

        assert_eq!(config.command_handler().unwrap().program(), "python3");
    }
}
