//! The enclave's post office: opening inbound mail and sealing replies.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chacha20poly1305::ChaCha20Poly1305;
use chacha20poly1305::aead::Aead;
use shared::mail::{MailError, SealedEnvelope, reply_nonce, session_cipher};
use x25519_dalek::{PublicKey, StaticSecret};

/// Cached state for one sender's session.
struct Session {
    cipher: ChaCha20Poly1305,
    /// Number of replies already sealed for this sender.
    sent: u64,
}

/// Encrypted channel between the enclave and its correspondents.
///
/// Sessions are keyed by the sender's public key and derived against the
/// enclave's long-term mail secret, so a reply always travels through
/// the same session its request arrived on. The cache exists to keep
/// reply counters monotonic per session; deriving keys per message
/// would be equally correct for decryption.
pub struct SecureMailChannel {
    secret: StaticSecret,
    sessions: HashMap<[u8; 32], Session>,
}

impl SecureMailChannel {
    pub fn new(secret: StaticSecret) -> Self {
        Self {
            secret,
            sessions: HashMap::new(),
        }
    }

    /// The public half of the enclave's mail key, published to clients
    /// through the attestation report.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(&self.secret)
    }

    /// Decrypt an inbound envelope.
    ///
    /// Every failure collapses into [`MailError::Decryption`]: the
    /// untrusted host must not learn which check rejected the mail.
    ///
    /// A session is only cached once an envelope under its key has
    /// authenticated. The host delivers arbitrary envelopes under
    /// arbitrary keys; caching before authentication would let it grow
    /// the session map without bound.
    pub fn open(&mut self, mail: &SealedEnvelope) -> Result<Vec<u8>, MailError> {
        if let Some(session) = self.sessions.get(&mail.session_pk) {
            return session
                .cipher
                .decrypt(&mail.nonce, &*mail.payload)
                .or(Err(MailError::Decryption));
        }
        let cipher = session_cipher(&self.secret, &PublicKey::from(mail.session_pk))
            .map_err(|_| MailError::Decryption)?;
        let plaintext = cipher
            .decrypt(&mail.nonce, &*mail.payload)
            .or(Err(MailError::Decryption))?;
        self.sessions
            .insert(mail.session_pk, Session { cipher, sent: 0 });
        Ok(plaintext)
    }

    /// Seal a reply addressed to `session_pk` through the same session
    /// the request arrived on, drawing the next nonce from the session's
    /// monotonic reply counter.
    pub fn seal(&mut self, plaintext: &[u8], session_pk: &[u8; 32]) -> Result<SealedEnvelope, MailError> {
        let session = self.session(session_pk)?;
        let nonce = reply_nonce(session.sent);
        let payload = session
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| MailError::Encryption)?;
        session.sent += 1;
        Ok(SealedEnvelope {
            session_pk: *session_pk,
            nonce,
            payload,
        })
    }

    fn session(&mut self, session_pk: &[u8; 32]) -> Result<&mut Session, MailError> {
        match self.sessions.entry(*session_pk) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let cipher = session_cipher(&self.secret, &PublicKey::from(*session_pk))?;
                Ok(entry.insert(Session { cipher, sent: 0 }))
            }
        }
    }
}
