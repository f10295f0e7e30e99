//! The protocol state machine tying decryption, token verification and
//! nonce binding together before any business logic runs.
//!
//! One delivery walks `open -> verify -> bind -> handle -> seal`; the
//! first failing step rejects the request and nothing after it runs. In
//! particular the request handler only ever observes plaintext whose
//! sender identity has been verified and bound to the session the mail
//! arrived on.

use shared::mail::{MailError, SealedEnvelope};
use thiserror::Error;

use crate::binding::{NonceMismatch, SessionNonceBinder};
use crate::mail::SecureMailChannel;
use crate::token::{IdentityTokenVerifier, IssuerKeys, VerificationError};

/// The application logic sitting behind the verification layer.
///
/// Invoked exactly once per accepted request, synchronously, with the
/// exact decrypted payload and the verified display name of the sender.
/// Never invoked for a request that failed any verification step.
pub trait RequestHandler {
    fn handle_message(&mut self, plaintext: &[u8], subject_name: &str)
    -> Result<Vec<u8>, HandlerError>;
}

/// Opaque failure signalled by the request handler.
#[derive(Error, Debug)]
#[error("Handler failed: {0}")]
pub struct HandlerError(pub String);

/// Wall clock capability. The platform owns time; the core only reads
/// it to evaluate assertion validity windows, never to time out a call.
pub trait Clock {
    /// Seconds since the Unix epoch.
    fn now(&self) -> u64;
}

/// Everything that can reject a delivery.
///
/// Internal only: the host boundary sees the single opaque [`REJECTED`]
/// signal, never the variant. Distinguishable rejection codes would hand
/// the untrusted host an oracle for which sub-check failed.
#[derive(Error, Debug)]
pub enum Rejection {
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Binding(#[from] NonceMismatch),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// The only rejection message ever sent past the enclave boundary.
pub const REJECTED: &str = "mail rejected";

/// Drives each delivered envelope through the verification protocol and
/// hands replies back for the host to deliver.
pub struct VerifiedRequestDispatcher<H, K, C> {
    channel: SecureMailChannel,
    verifier: IdentityTokenVerifier,
    handler: H,
    issuer_keys: K,
    clock: C,
}

impl<H, K, C> VerifiedRequestDispatcher<H, K, C>
where
    H: RequestHandler,
    K: IssuerKeys,
    C: Clock,
{
    pub fn new(
        channel: SecureMailChannel,
        verifier: IdentityTokenVerifier,
        handler: H,
        issuer_keys: K,
        clock: C,
    ) -> Self {
        Self {
            channel,
            verifier,
            handler,
            issuer_keys,
            clock,
        }
    }

    /// The enclave's mail key, to be published through attestation.
    pub fn enclave_public_key(&self) -> x25519_dalek::PublicKey {
        self.channel.public_key()
    }

    /// Process one delivery from the host.
    ///
    /// The sequence id is opaque ordering metadata chosen by the host;
    /// it is logged but takes no part in any cryptographic check. Each
    /// delivery is a fresh, independent attempt: nothing is retried and
    /// no memory of prior rejections is kept.
    pub fn deliver(
        &mut self,
        sequence_id: u64,
        mail: &SealedEnvelope,
        assertion: &str,
    ) -> Result<SealedEnvelope, Rejection> {
        self.try_deliver(mail, assertion).inspect_err(|rejection| {
            // the reason stays inside the enclave
            tracing::debug!(sequence_id, %rejection, "rejected mail");
        })
    }

    fn try_deliver(
        &mut self,
        mail: &SealedEnvelope,
        assertion: &str,
    ) -> Result<SealedEnvelope, Rejection> {
        let plaintext = self.channel.open(mail)?;
        let claims = self
            .verifier
            .verify(assertion, &self.issuer_keys, self.clock.now())?;
        SessionNonceBinder::bind(claims.nonce(), &mail.session_pk)?;
        let response = self
            .handler
            .handle_message(&plaintext, claims.subject_name())?;
        Ok(self.channel.seal(&response, &mail.session_pk)?)
    }
}
