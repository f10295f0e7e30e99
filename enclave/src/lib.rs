//! The trusted core of the Hermod mail service.
//!
//! Accepts encrypted mail from untrusted clients, binds each item to a
//! verified end-user identity asserted by a third-party identity
//! provider, and replies through the same encryption session. Generic
//! over the TEE platform through the traits in [`shared::tee`], so the
//! same logic runs inside a real enclave or as a transparent process.

pub mod binding;
pub mod dispatch;
pub mod mail;
#[cfg(test)]
pub(crate) mod testing;
pub mod token;

use shared::tee::{EnclaveComm, EnclaveRNG, RemoteAttestation};
use shared::{MsgFromHost, MsgToHost};

use crate::dispatch::{Clock, REJECTED, RequestHandler, VerifiedRequestDispatcher};
use crate::mail::SecureMailChannel;
use crate::token::{IdentityTokenVerifier, IssuerKeys};

/// Configuration fixed at enclave startup.
pub struct EnclaveConfig {
    /// The identity provider this enclave trusts.
    pub expected_issuer: String,
    /// The audience identity assertions must be scoped to.
    pub expected_audience: String,
}

/// Initialize the enclave and serve host messages forever.
///
/// Mail is delivered one item at a time by the host; each item runs the
/// full verification protocol synchronously before the next is read.
pub fn main<RA, COM, RNG, H, K, C>(config: EnclaveConfig, handler: H, issuer_keys: K, clock: C)
where
    RA: RemoteAttestation,
    COM: EnclaveComm,
    RNG: EnclaveRNG,
    H: RequestHandler,
    K: IssuerKeys,
    C: Clock,
{
    let ra = RA::init();
    let mut com = COM::init();
    let rng = RNG::init();

    let channel = SecureMailChannel::new(ra.mail_secret(rng));
    let verifier = IdentityTokenVerifier::new(config.expected_issuer, config.expected_audience);
    let mut dispatcher = VerifiedRequestDispatcher::new(channel, verifier, handler, issuer_keys, clock);
    tracing::info!(
        enclave_pk = hex::encode(dispatcher.enclave_public_key().to_bytes()),
        "Mail service initialized."
    );

    loop {
        match com.read() {
            Ok(MsgFromHost::DeliverMail {
                sequence_id,
                mail,
                assertion,
            }) => match dispatcher.deliver(sequence_id, &mail, &assertion) {
                Ok(reply) => com.write(&MsgToHost::PostMail {
                    sequence_id,
                    mail: reply,
                }),
                // a rejected request produces no mail and no detail
                Err(_) => com.write_client_err(REJECTED),
            },
            Ok(MsgFromHost::RequestReport { nonce }) => {
                let quote = ra.get_quote(report_data(&dispatcher, nonce));
                com.write(&MsgToHost::Report(quote));
            }
            Ok(MsgFromHost::Basic(msg)) => {
                tracing::debug!("Received message from host: {msg}");
            }
            Err(e) => com.write_err(&e.to_string()),
        }
    }
}

/// Report user data layout: the enclave's mail key followed by the
/// client's challenge nonce, little-endian.
fn report_data<H, K, C>(dispatcher: &VerifiedRequestDispatcher<H, K, C>, nonce: u64) -> [u8; 64]
where
    H: RequestHandler,
    K: IssuerKeys,
    C: Clock,
{
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(dispatcher.enclave_public_key().as_bytes());
    data[32..40].copy_from_slice(&nonce.to_le_bytes());
    data
}
