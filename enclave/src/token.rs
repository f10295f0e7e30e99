//! Verification of identity assertions minted by the identity provider.
//!
//! Assertions arrive as compact JWS strings:
//! `base64url(header) . base64url(claims) . base64url(signature)`,
//! signed with Ed25519 under one of the provider's published keys. The
//! signing keys are resolved through the injected [`IssuerKeys`]
//! capability, so the verifier can be exercised with synthetic keys and
//! carries no baked-in trust anchor.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::Deserialize;
use thiserror::Error;

/// Tolerated clock drift between the identity provider and the enclave.
const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Assertion was not a well-formed signed token")]
    MalformedAssertion,
    #[error("No signing key known for key id `{0}`")]
    UnknownSigningKey(String),
    #[error("Signature did not verify under the issuer's signing key")]
    SignatureInvalid,
    #[error("Issuer or audience did not match the expected values")]
    IssuerOrAudienceMismatch,
    #[error("Assertion has expired")]
    Expired,
    #[error("Assertion is not valid yet")]
    NotYetValid,
}

/// Source of the identity provider's current signing keys, keyed by the
/// `kid` header of an assertion. Refreshed externally; read-only here.
pub trait IssuerKeys {
    fn signing_key(&self, kid: &str) -> Option<VerifyingKey>;
}

#[derive(Deserialize)]
struct Header {
    alg: String,
    kid: String,
}

#[derive(Deserialize)]
struct Claims {
    iss: String,
    aud: String,
    name: String,
    nonce: String,
    iat: u64,
    exp: u64,
}

/// Claims extracted from an assertion that passed every check.
///
/// Cannot be constructed outside [`IdentityTokenVerifier::verify`]:
/// holding a value of this type means signature, issuer, audience and
/// validity window have all been checked.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    subject_name: String,
    nonce: String,
    expires_at: u64,
}

impl VerifiedClaims {
    /// The display name the identity provider asserted for the subject.
    pub fn subject_name(&self) -> &str {
        &self.subject_name
    }

    /// The session binding claim.
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }
}

/// Validates identity assertions against a configured issuer and
/// audience. Stateless: the same assertion and clock always produce the
/// same outcome.
pub struct IdentityTokenVerifier {
    expected_issuer: String,
    expected_audience: String,
    clock_skew: u64,
}

impl IdentityTokenVerifier {
    pub fn new(expected_issuer: String, expected_audience: String) -> Self {
        Self {
            expected_issuer,
            expected_audience,
            clock_skew: DEFAULT_CLOCK_SKEW_SECS,
        }
    }

    /// Run every check against an assertion at time `now` (seconds since
    /// the Unix epoch).
    ///
    /// Checks run in a fixed order: structure, key resolution, signature,
    /// issuer/audience, validity window. Every failure is terminal for
    /// the request; no partially verified claims are ever handed out.
    pub fn verify(
        &self,
        assertion: &str,
        keys: &impl IssuerKeys,
        now: u64,
    ) -> Result<VerifiedClaims, VerificationError> {
        let (signed, header, claims, signature) = parse(assertion)?;
        // an assertion signed with an algorithm the issuer's Ed25519 keys
        // cannot verify is treated as a bad signature, not a parse error
        if header.alg != "EdDSA" {
            return Err(VerificationError::SignatureInvalid);
        }
        let key = keys
            .signing_key(&header.kid)
            .ok_or(VerificationError::UnknownSigningKey(header.kid))?;
        key.verify(signed, &signature)
            .map_err(|_| VerificationError::SignatureInvalid)?;
        if claims.iss != self.expected_issuer || claims.aud != self.expected_audience {
            return Err(VerificationError::IssuerOrAudienceMismatch);
        }
        if now > claims.exp {
            return Err(VerificationError::Expired);
        }
        if now + self.clock_skew < claims.iat {
            return Err(VerificationError::NotYetValid);
        }
        Ok(VerifiedClaims {
            subject_name: claims.name,
            nonce: claims.nonce,
            expires_at: claims.exp,
        })
    }
}

/// Split an assertion into its three segments, decoding the header and
/// claims. The signature is checked over the exact received bytes of
/// `header.claims`, never over a re-serialization.
fn parse(assertion: &str) -> Result<(&[u8], Header, Claims, Signature), VerificationError> {
    let mut segments = assertion.split('.');
    let (Some(header_b64), Some(claims_b64), Some(sig_b64), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(VerificationError::MalformedAssertion);
    };
    let header: Header = decode_json(header_b64)?;
    let claims: Claims = decode_json(claims_b64)?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(sig_b64)
        .map_err(|_| VerificationError::MalformedAssertion)?;
    let signature =
        Signature::from_slice(&sig_bytes).map_err(|_| VerificationError::MalformedAssertion)?;
    let signed = &assertion.as_bytes()[..header_b64.len() + 1 + claims_b64.len()];
    Ok((signed, header, claims, signature))
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, VerificationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| VerificationError::MalformedAssertion)?;
    serde_json::from_slice(&bytes).map_err(|_| VerificationError::MalformedAssertion)
}
