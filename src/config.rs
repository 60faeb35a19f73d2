//! Runtime configuration shared by the binaries

use tracing::info;

use crate::error::{RelayError, Result};
use crate::relay::signer::SigningContext;

/// Environment variable holding the shared HMAC secret
pub const SECRET_ENV_VAR: &str = "SECRET_MESSAGE_KEY";

pub const DEFAULT_PORT: u16 = 60000;
pub const DEFAULT_DESTINATION: &str = "127.0.0.1:60000";

/// Default log directives for the relay binaries
pub const DEFAULT_LOG_DIRECTIVES: &str = "info,tokio_tungstenite=warn,tungstenite=warn";

/// Build the signing context from `SECRET_MESSAGE_KEY`, loading `.env` first.
pub fn load_signing_context() -> Result<SigningContext> {
    dotenv::dotenv().ok();
    signing_context_from(std::env::var(SECRET_ENV_VAR).ok())
}

fn signing_context_from(secret: Option<String>) -> Result<SigningContext> {
    match secret {
        Some(secret) if !secret.is_empty() => {
            info!("Loaded secret key from {}", SECRET_ENV_VAR);
            SigningContext::new(secret.as_bytes())
        }
        _ => Err(RelayError::MissingSecret(SECRET_ENV_VAR.to_string())),
    }
}
