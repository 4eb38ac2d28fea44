//! PKCE code pair for the authorization-code flow.
//!
//! RFC 7636: <https://datatracker.ietf.org/doc/html/rfc7636>

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use sha2::{Digest, Sha256};

/// Verifier/challenge pair bound to one authorization request.
#[derive(Debug, Clone)]
pub struct PkceCodes {
    /// Secret sent with the code exchange.
    pub verifier: String,
    /// base64url(SHA-256(verifier)), sent with `code_challenge_method=S256`.
    pub challenge: String,
}

impl PkceCodes {
    /// Generate a fresh pair.
    #[must_use]
    pub fn generate() -> Self {
        let verifier = random_urlsafe();
        let digest = Sha256::digest(verifier.as_bytes());

        Self {
            challenge: URL_SAFE_NO_PAD.encode(digest),
            verifier,
        }
    }
}

/// CSRF nonce for the `state` parameter.
#[must_use]
pub fn generate_state() -> String {
    random_urlsafe()
}

/// 32 random bytes, base64url without padding (43 chars).
fn random_urlsafe() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
