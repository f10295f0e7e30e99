//! The sealed mail protocol spoken between clients and the enclave.
//!
//! Each client session is identified by the client's ephemeral x25519
//! public key. Both directions of a session encrypt under the same
//! ChaCha20 key, derived from a Diffie-Hellman exchange between that key
//! and the enclave's long-term mail key. Requests use random nonces
//! chosen by the client; replies use a counter-based nonce schedule with
//! a domain prefix, so the two directions can never collide.

use alloc::string::String;
use alloc::vec::Vec;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{AeadCore, ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

/// Domain prefix of the reply nonce schedule.
const REPLY_NONCE_PREFIX: [u8; 4] = *b"rply";

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Shared secret was non-contributory. This suggests a man-in-the-middle attack.")]
    NonContributory,
    #[error("Could not decrypt mail")]
    Decryption,
    #[error("Could not encrypt mail")]
    Encryption,
    #[error("Reply nonce did not follow the session's schedule")]
    ReplySchedule,
}

/// An authenticated-encrypted mail item.
///
/// `session_pk` names the client session the payload belongs to: the
/// sender's public key on inbound mail, the addressee's on replies.
#[derive(Debug, Clone)]
pub struct SealedEnvelope {
    pub session_pk: [u8; 32],
    pub nonce: Nonce,
    pub payload: Vec<u8>,
}

impl Serialize for SealedEnvelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct SimplifiedEnvelope {
            session_pk: [u8; 32],
            nonce: Vec<u8>,
            payload: Vec<u8>,
        }
        let simplified = SimplifiedEnvelope {
            session_pk: self.session_pk,
            nonce: self.nonce.as_slice().to_vec(),
            payload: self.payload.clone(),
        };
        simplified.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SealedEnvelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct SimplifiedEnvelope {
            session_pk: [u8; 32],
            nonce: Vec<u8>,
            payload: Vec<u8>,
        }
        let simplified = SimplifiedEnvelope::deserialize(deserializer)?;
        let nonce: [u8; 12] = simplified
            .nonce
            .try_into()
            .map_err(|_| serde::de::Error::custom("Nonce was of wrong size"))?;
        Ok(Self {
            session_pk: simplified.session_pk,
            nonce: Nonce::from(nonce),
            payload: simplified.payload,
        })
    }
}

/// Derive the ChaCha20 cipher shared between `secret` and `pk`.
pub fn session_cipher(secret: &StaticSecret, pk: &PublicKey) -> Result<ChaCha20Poly1305, MailError> {
    let shared_secret = secret.diffie_hellman(pk);
    if !shared_secret.was_contributory() {
        return Err(MailError::NonContributory);
    }
    let key: [u8; 32] = Sha256::digest(shared_secret.as_bytes()).into();
    Ok(ChaCha20Poly1305::new(Key::from_slice(&key)))
}

/// The binding transform between an encryption session and an identity
/// assertion: the nonce claim of the assertion must equal the unpadded
/// base64url SHA-256 digest of the session's public key.
///
/// Clients compute this value when requesting an assertion from the
/// identity provider; the enclave recomputes it from the envelope it
/// decrypted. The transform is a protocol contract between the two and
/// must not change.
pub fn session_binding(session_pk: &[u8; 32]) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(session_pk))
}

/// Nonce of the `seq`-th reply within a session.
pub fn reply_nonce(seq: u64) -> Nonce {
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&REPLY_NONCE_PREFIX);
    bytes[4..].copy_from_slice(&seq.to_le_bytes());
    Nonce::from(bytes)
}

/// The client side of one mail session with the enclave.
///
/// Holds the client's session secret and the cipher negotiated against
/// the enclave's published mail key. Replies are checked against the
/// reply nonce schedule, so a reply can neither be replayed nor
/// delivered out of order.
pub struct PostOffice {
    session_pk: PublicKey,
    cipher: ChaCha20Poly1305,
    received: u64,
}

impl PostOffice {
    /// Open a session addressed to the enclave identified by `enclave_pk`.
    pub fn new(secret: StaticSecret, enclave_pk: PublicKey) -> Result<Self, MailError> {
        let session_pk = PublicKey::from(&secret);
        let cipher = session_cipher(&secret, &enclave_pk)?;
        Ok(Self {
            session_pk,
            cipher,
            received: 0,
        })
    }

    /// The public key identifying this session.
    pub fn session_pk(&self) -> &PublicKey {
        &self.session_pk
    }

    /// The nonce claim an identity assertion must carry to be accepted
    /// alongside mail from this session.
    pub fn binding_nonce(&self) -> String {
        session_binding(self.session_pk.as_bytes())
    }

    /// Seal a request payload for the enclave under a fresh random nonce.
    pub fn seal_request(
        &self,
        payload: &[u8],
        rng: &mut (impl CryptoRng + RngCore),
    ) -> Result<SealedEnvelope, MailError> {
        let nonce = ChaCha20Poly1305::generate_nonce(rng);
        Ok(SealedEnvelope {
            session_pk: self.session_pk.to_bytes(),
            nonce,
            payload: self
                .cipher
                .encrypt(&nonce, payload)
                .map_err(|_| MailError::Encryption)?,
        })
    }

    /// Open the next reply in this session.
    pub fn open_reply(&mut self, mail: &SealedEnvelope) -> Result<Vec<u8>, MailError> {
        if mail.nonce != reply_nonce(self.received) {
            return Err(MailError::ReplySchedule);
        }
        let plaintext = self
            .cipher
            .decrypt(&mail.nonce, &*mail.payload)
            .or(Err(MailError::Decryption))?;
        self.received += 1;
        Ok(plaintext)
    }
}
