//! Error type for the Hermod client library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Error in response from Hermod service: {0}")]
    ServerError(String),
    #[error("{0}")]
    Io(std::io::Error),
    #[error("{0}")]
    MsgError(shared::MsgError),
    #[error("{0}")]
    Mail(shared::mail::MailError),
    #[error("Verifying the enclave report failed: {0}")]
    Attestation(String),
}
