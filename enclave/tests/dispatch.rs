//! Black-box behavioral tests of the verified mail dispatcher, driving
//! it the way the host boundary does: one sealed envelope plus one
//! identity assertion per delivery.

use std::cell::RefCell;
use std::rc::Rc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use enclave::dispatch::{
    Clock, HandlerError, Rejection, RequestHandler, VerifiedRequestDispatcher,
};
use enclave::mail::SecureMailChannel;
use enclave::token::{IdentityTokenVerifier, IssuerKeys, VerificationError};
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use shared::mail::PostOffice;
use x25519_dalek::StaticSecret;

const ISSUER: &str = "https://issuer.test";
const AUDIENCE: &str = "mail-service";
const SUBJECT_NAME: &str = "Alice Example";
const NOW: u64 = 1_750_000_000;

/// A synthetic identity provider with one published signing key.
struct TestIssuer {
    key: SigningKey,
}

impl TestIssuer {
    fn new() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// The provider's published key set, as the enclave would cache it.
    fn published_keys(&self) -> PublishedKeys {
        PublishedKeys(self.key.verifying_key())
    }

    /// Mint an assertion binding `nonce`, valid in `[iat, exp]`.
    fn mint(&self, nonce: &str, iat: u64, exp: u64) -> String {
        let header = serde_json::json!({"alg": "EdDSA", "kid": "issuer-key", "typ": "JWT"});
        let claims = serde_json::json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "sub": "subject-1",
            "name": SUBJECT_NAME,
            "nonce": nonce,
            "iat": iat,
            "exp": exp,
        });
        let signed = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).unwrap()),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap()),
        );
        let signature = URL_SAFE_NO_PAD.encode(self.key.sign(signed.as_bytes()).to_bytes());
        format!("{signed}.{signature}")
    }
}

struct PublishedKeys(VerifyingKey);

impl IssuerKeys for PublishedKeys {
    fn signing_key(&self, kid: &str) -> Option<VerifyingKey> {
        (kid == "issuer-key").then_some(self.0)
    }
}

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

/// Records every invocation so tests can assert the handler was called
/// exactly as expected, or not at all.
#[derive(Clone)]
struct RecordingHandler {
    calls: Rc<RefCell<Vec<(Vec<u8>, String)>>>,
    response: Result<Vec<u8>, String>,
}

impl RecordingHandler {
    fn replying(response: &[u8]) -> Self {
        Self {
            calls: Rc::new(RefCell::new(Vec::new())),
            response: Ok(response.to_vec()),
        }
    }

    fn failing(err: &str) -> Self {
        Self {
            calls: Rc::new(RefCell::new(Vec::new())),
            response: Err(err.to_string()),
        }
    }
}

impl RequestHandler for RecordingHandler {
    fn handle_message(
        &mut self,
        plaintext: &[u8],
        subject_name: &str,
    ) -> Result<Vec<u8>, HandlerError> {
        self.calls
            .borrow_mut()
            .push((plaintext.to_vec(), subject_name.to_string()));
        self.response.clone().map_err(HandlerError)
    }
}

/// Client session keys are derived from passphrases, the same way real
/// clients derive theirs from a stored secret.
fn session_secret(passphrase: &str) -> StaticSecret {
    let seed: [u8; 32] = Sha256::digest(passphrase.as_bytes()).into();
    StaticSecret::from(seed)
}

fn make_enclave(
    issuer: &TestIssuer,
    handler: RecordingHandler,
) -> VerifiedRequestDispatcher<RecordingHandler, PublishedKeys, FixedClock> {
    let channel = SecureMailChannel::new(session_secret("enclave long-term mail key"));
    let verifier = IdentityTokenVerifier::new(ISSUER.to_string(), AUDIENCE.to_string());
    VerifiedRequestDispatcher::new(
        channel,
        verifier,
        handler,
        issuer.published_keys(),
        FixedClock(NOW),
    )
}

fn post_office(
    passphrase: &str,
    enclave: &VerifiedRequestDispatcher<RecordingHandler, PublishedKeys, FixedClock>,
) -> PostOffice {
    PostOffice::new(session_secret(passphrase), enclave.enclave_public_key()).expect("Test failed")
}

/// A valid message, sealed under a valid session, delivered with a
/// matching identity assertion: the handler runs exactly once with the
/// exact plaintext and the verified display name, and the reply opens
/// at the client to exactly the handler's bytes.
#[test]
fn test_happy_case_returned_mail() {
    let issuer = TestIssuer::new();
    let handler = RecordingHandler::replying(b"response");
    let mut enclave = make_enclave(&issuer, handler.clone());
    let mut client = post_office("secret", &enclave);

    let mail = client.seal_request(b"message", &mut OsRng).expect("Test failed");
    let token = issuer.mint(&client.binding_nonce(), NOW - 100, NOW + 3600);

    let reply = enclave.deliver(1, &mail, &token).expect("Test failed");
    assert_eq!(
        handler.calls.borrow().as_slice(),
        &[(b"message".to_vec(), SUBJECT_NAME.to_string())]
    );
    assert_eq!(client.open_reply(&reply).expect("Test failed"), b"response");
}

/// A token that does not even parse rejects the delivery before the
/// handler is ever invoked.
#[test]
fn test_invalid_token() {
    let issuer = TestIssuer::new();
    let handler = RecordingHandler::replying(b"response");
    let mut enclave = make_enclave(&issuer, handler.clone());
    let client = post_office("a different secret", &enclave);

    let mail = client
        .seal_request(b"different message", &mut OsRng)
        .expect("Test failed");
    let result = enclave.deliver(1, &mail, "eyinvalidtoken");
    assert!(matches!(
        result,
        Err(Rejection::Verification(
            VerificationError::MalformedAssertion
        ))
    ));
    assert!(handler.calls.borrow().is_empty());
}

/// A structurally valid, correctly signed, unexpired token whose nonce
/// was minted for session A is rejected when delivered alongside mail
/// encrypted under session B, before the handler runs.
#[test]
fn test_pub_key_mismatch() {
    let issuer = TestIssuer::new();
    let handler = RecordingHandler::replying(b"response");
    let mut enclave = make_enclave(&issuer, handler.clone());
    let session_a = post_office("secret", &enclave);
    let session_b = post_office("DIFFERENT secret", &enclave);

    let token = issuer.mint(&session_a.binding_nonce(), NOW - 100, NOW + 3600);
    let mail = session_b
        .seal_request(b"message", &mut OsRng)
        .expect("Test failed");

    let result = enclave.deliver(1, &mail, &token);
    assert!(matches!(result, Err(Rejection::Binding(_))));
    assert!(handler.calls.borrow().is_empty());
}

/// Mail that fails to decrypt is rejected before the (valid) token is
/// even relevant, and produces no reply.
#[test]
fn test_tampered_mail() {
    let issuer = TestIssuer::new();
    let handler = RecordingHandler::replying(b"response");
    let mut enclave = make_enclave(&issuer, handler.clone());
    let client = post_office("secret", &enclave);

    let mut mail = client.seal_request(b"message", &mut OsRng).expect("Test failed");
    mail.payload[0] ^= 0xFF;
    let token = issuer.mint(&client.binding_nonce(), NOW - 100, NOW + 3600);

    let result = enclave.deliver(1, &mail, &token);
    assert!(matches!(result, Err(Rejection::Mail(_))));
    assert!(handler.calls.borrow().is_empty());
}

/// Expiry one second in the past rejects; one second in the future,
/// with everything else identical, accepts.
#[test]
fn test_expiry_boundary() {
    let issuer = TestIssuer::new();
    let handler = RecordingHandler::replying(b"response");
    let mut enclave = make_enclave(&issuer, handler.clone());
    let client = post_office("secret", &enclave);

    let mail = client.seal_request(b"message", &mut OsRng).expect("Test failed");
    let stale = issuer.mint(&client.binding_nonce(), NOW - 3600, NOW - 1);
    assert!(matches!(
        enclave.deliver(1, &mail, &stale),
        Err(Rejection::Verification(VerificationError::Expired))
    ));
    assert!(handler.calls.borrow().is_empty());

    let fresh = issuer.mint(&client.binding_nonce(), NOW - 3600, NOW + 1);
    assert!(enclave.deliver(2, &mail, &fresh).is_ok());
    assert_eq!(handler.calls.borrow().len(), 1);
}

/// A failing handler rejects the reply step: no mail is sealed.
#[test]
fn test_handler_failure_posts_no_reply() {
    let issuer = TestIssuer::new();
    let handler = RecordingHandler::failing("backend unavailable");
    let mut enclave = make_enclave(&issuer, handler.clone());
    let client = post_office("secret", &enclave);

    let mail = client.seal_request(b"message", &mut OsRng).expect("Test failed");
    let token = issuer.mint(&client.binding_nonce(), NOW - 100, NOW + 3600);

    let result = enclave.deliver(1, &mail, &token);
    assert!(matches!(result, Err(Rejection::Handler(_))));
    // the handler did run; its failure just never leaves the enclave
    // as a reply
    assert_eq!(handler.calls.borrow().len(), 1);
}

/// Every delivery is an independent attempt: redelivering the same
/// envelope and token reaches the same verdict, and each accepted copy
/// is answered through the session's own reply schedule.
#[test]
fn test_redelivery_is_independent() {
    let issuer = TestIssuer::new();
    let handler = RecordingHandler::replying(b"response");
    let mut enclave = make_enclave(&issuer, handler.clone());
    let mut client = post_office("secret", &enclave);

    let mail = client.seal_request(b"message", &mut OsRng).expect("Test failed");
    let token = issuer.mint(&client.binding_nonce(), NOW - 100, NOW + 3600);

    let first = enclave.deliver(1, &mail, &token).expect("Test failed");
    let second = enclave.deliver(2, &mail, &token).expect("Test failed");
    assert_eq!(handler.calls.borrow().len(), 2);
    assert_ne!(first.nonce, second.nonce);
    assert_eq!(client.open_reply(&first).expect("Test failed"), b"response");
    assert_eq!(client.open_reply(&second).expect("Test failed"), b"response");
}
