//! Helpers for minting synthetic identity assertions in unit tests.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use rand_core::OsRng;

use crate::token::IssuerKeys;

/// A synthetic identity provider holding a single Ed25519 signing key.
pub(crate) struct Issuer {
    kid: String,
    key: SigningKey,
}

impl Issuer {
    pub fn new(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn sign(&self, signed: &[u8]) -> String {
        URL_SAFE_NO_PAD.encode(self.key.sign(signed).to_bytes())
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }
}

impl IssuerKeys for Issuer {
    fn signing_key(&self, kid: &str) -> Option<VerifyingKey> {
        (kid == self.kid).then(|| self.key.verifying_key())
    }
}

/// Mint a well-formed EdDSA assertion over the given claims.
#[allow(clippy::too_many_arguments)]
pub(crate) fn mint_assertion(
    issuer: &Issuer,
    iss: &str,
    aud: &str,
    name: &str,
    nonce: &str,
    iat: u64,
    exp: u64,
) -> String {
    let header = serde_json::json!({"alg": "EdDSA", "kid": issuer.kid(), "typ": "JWT"});
    let claims = serde_json::json!({
        "iss": iss,
        "aud": aud,
        "sub": "subject-1",
        "name": name,
        "nonce": nonce,
        "iat": iat,
        "exp": exp,
    });
    let signed = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap()),
    );
    let signature = issuer.sign(signed.as_bytes());
    format!("{signed}.{signature}")
}

/// Mint an otherwise valid assertion whose header claims a foreign
/// signing algorithm.
pub(crate) fn mint_with_alg(issuer: &Issuer, alg: &str, iss: &str, aud: &str, now: u64) -> String {
    let header = serde_json::json!({"alg": alg, "kid": issuer.kid()});
    let claims = serde_json::json!({
        "iss": iss,
        "aud": aud,
        "name": "Alice Example",
        "nonce": "n",
        "iat": now - 10,
        "exp": now + 3600,
    });
    let signed = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap()),
    );
    let signature = issuer.sign(signed.as_bytes());
    format!("{signed}.{signature}")
}
