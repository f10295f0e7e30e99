//! Binding identity assertions to encryption sessions.

use shared::mail::session_binding;
use subtle::ConstantTimeEq;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Assertion nonce was not minted for this encryption session")]
pub struct NonceMismatch;

/// Checks that an assertion's nonce claim commits to the session key
/// that encrypted the accompanying mail.
///
/// This is what stops an attacker who captured a valid assertion from
/// replaying it alongside mail encrypted under a different session: the
/// nonce claim only matches the exact key it was minted for.
pub struct SessionNonceBinder;

impl SessionNonceBinder {
    /// Compare the claimed nonce against the expected binding value.
    /// The comparison runs in constant time so partial matches do not
    /// leak through timing.
    pub fn bind(nonce: &str, session_pk: &[u8; 32]) -> Result<(), NonceMismatch> {
        let expected = session_binding(session_pk);
        if bool::from(nonce.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(NonceMismatch)
        }
    }
}
