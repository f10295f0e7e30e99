use shared::tee::EnclaveClient;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("Report was not 64 bytes")]
    UserData,
    #[error("Report nonce {0} did not match challenge {1}")]
    Nonce(u64, u64),
}

/// Accepts any well-formed report. Only suitable against a
/// transparent enclave running on trusted infrastructure.
#[derive(Copy, Clone)]
pub struct TClient;

impl EnclaveClient for TClient {
    type Error = VerifyError;

    fn verify_quote(report: &[u8], nonce: u64) -> Result<[u8; 64], Self::Error> {
        let user_data: [u8; 64] = report.try_into().map_err(|_| VerifyError::UserData)?;
        let echoed = u64::from_le_bytes(
            user_data[32..40]
                .try_into()
                .map_err(|_| VerifyError::UserData)?,
        );
        if echoed != nonce {
            return Err(VerifyError::Nonce(echoed, nonce));
        }
        Ok(user_data)
    }
}
