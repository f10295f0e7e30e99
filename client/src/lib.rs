//! Client library for the Hermod verified mail service.
//!
//! Establishes an encrypted session with the enclave's published mail
//! key and delivers mail bound to an identity assertion from a trusted
//! issuer.

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use shared::mail::{PostOffice, session_binding};
use shared::tee::EnclaveClient;
use shared::{ClientMsg, ServerMsg};
use tracing_subscriber::fmt::SubscriberBuilder;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::com::ServiceConn;
use crate::error::Error;

pub mod com;
pub mod error;
pub mod transparent;

pub fn init_logging() {
    SubscriberBuilder::default().with_ansi(true).init();
}

/// Derive a stable session secret from a passphrase.
pub fn session_secret(passphrase: &str) -> StaticSecret {
    let digest: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
    StaticSecret::from(digest)
}

/// The nonce claim an identity assertion must carry for mail sent
/// from the session keyed by `secret`.
pub fn binding_nonce(secret: &StaticSecret) -> String {
    session_binding(PublicKey::from(secret).as_bytes())
}

/// Fetch and verify the enclave's attestation report, returning its
/// published mail key.
pub fn fetch_enclave_key<C: EnclaveClient>(url: &str) -> error::Result<PublicKey> {
    let nonce = OsRng.next_u64();
    let mut conn = ServiceConn::open(url)?;
    let report = match conn.request(ClientMsg::RequestReport { nonce }) {
        Ok(ServerMsg::Report(report)) => report,
        Ok(ServerMsg::Error(err)) => return Err(Error::ServerError(err)),
        Ok(_) => {
            return Err(Error::ServerError(format!(
                "Requesting a report from the enclave at {url} failed. Could not parse response."
            )));
        }
        Err(err) => return Err(err),
    };
    let user_data =
        C::verify_quote(&report, nonce).map_err(|e| Error::Attestation(e.to_string()))?;
    let pk: [u8; 32] = user_data[..32]
        .try_into()
        .map_err(|_| Error::Attestation("Report carried no enclave key".to_string()))?;
    Ok(PublicKey::from(pk))
}

/// Deliver one piece of mail to the enclave at `url` and return the
/// decrypted reply, if the enclave sent one.
pub fn send_mail<C: EnclaveClient>(
    url: &str,
    secret: StaticSecret,
    assertion: String,
    payload: &[u8],
) -> error::Result<Vec<u8>> {
    let enclave_pk = fetch_enclave_key::<C>(url)?;
    let mut office = PostOffice::new(secret, enclave_pk).map_err(Error::Mail)?;
    let mail = office.seal_request(payload, &mut OsRng).map_err(Error::Mail)?;
    tracing::info!("Delivering mail bound to nonce {}", office.binding_nonce());
    let mut conn = ServiceConn::open(url)?;
    match conn.request(ClientMsg::DeliverMail {
        sequence_id: 1,
        mail,
        assertion,
    }) {
        Ok(ServerMsg::Mail(reply)) => office.open_reply(&reply).map_err(Error::Mail),
        Ok(ServerMsg::Error(err)) => Err(Error::ServerError(err)),
        Ok(_) => Err(Error::ServerError(format!(
            "Delivering mail to the enclave at {url} failed. Could not parse response."
        ))),
        Err(err) => Err(err),
    }
}
