// Auth Gate - bearer token check in front of job submission

use sha2::{Digest, Sha256};
use std::sync::Once;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

const BEARER_SCHEME: &str = "bearer";

/// Auth configuration (environment-sourced)
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Explicit bypass: every request passes
    pub disabled: bool,
    pub expected_token: Option<String>,
}

/// Auth failures. Each variant maps to its own status and RPC code.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// Auth is enabled but no token is configured (server defect)
    #[error("Server auth is misconfigured: no API token configured")]
    Misconfigured,

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Invalid token")]
    InvalidToken,
}

impl AuthError {
    /// HTTP-equivalent status
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::Misconfigured => 500,
            AuthError::Unauthenticated => 401,
            AuthError::InvalidToken => 403,
        }
    }
}

pub struct AuthGate {
    config: AuthConfig,
    bypass_warning: Once,
}

impl AuthGate {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            bypass_warning: Once::new(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.config.disabled
    }

    /// Check the raw `Authorization` header value of one request
    ///
    /// # Errors
    /// * `Misconfigured` - enabled without an expected token
    /// * `Unauthenticated` - header missing or not a bearer credential
    /// * `InvalidToken` - bearer credential does not match
    pub fn authorize(&self, authorization: Option<&str>) -> Result<(), AuthError> {
        if self.config.disabled {
            self.bypass_warning.call_once(|| {
                warn!("Authentication is DISABLED by configuration; submissions are not checked");
            });
            return Ok(());
        }

        let expected = match self.config.expected_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthError::Misconfigured),
        };

        let provided = authorization
            .and_then(parse_bearer)
            .ok_or(AuthError::Unauthenticated)?;

        if tokens_match(provided, expected) {
            Ok(())
        } else {
            Err(AuthError::InvalidToken)
        }
    }
}

/// Extract the credential from `Bearer <token>`
fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}

/// Digests are fixed-size, so the comparison does the same work for any input length
fn tokens_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided.as_slice().ct_eq(expected.as_slice()).into()
}
