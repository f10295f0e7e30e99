//! An implementation of the verified mail service that does not run in
//! a TEE. The verification protocol is unchanged; only the hardware
//! isolation and real attestation are missing.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use ed25519_dalek::VerifyingKey;
use enclave::EnclaveConfig;
use enclave::dispatch::{Clock, HandlerError, RequestHandler};
use enclave::token::IssuerKeys;
use rand_core::{CryptoRng, Error, OsRng, RngCore};
use shared::tcp::{DEFAULT_ENCLAVE_ADDRESS, ENCLAVE_ADDRESS, Tcp};
use shared::tee::{EnclaveRNG, RemoteAttestation};

#[derive(Parser, Clone)]
#[command(version, about, long_about=None)]
struct Cli {
    #[arg(
        long,
        value_name = "URL",
        help = "Address for the companion host process. Defaults to [ 0.0.0.0:12345 ]."
    )]
    host: Option<String>,
    #[arg(
        long,
        value_name = "URL",
        help = "The identity provider whose assertions are accepted."
    )]
    issuer: String,
    #[arg(
        long,
        value_name = "ID",
        help = "The audience assertions must be scoped to."
    )]
    audience: String,
    #[arg(
        long = "issuer-key",
        value_name = "KID=HEXKEY",
        help = "An issuer signing key as `kid=hex`. May be given multiple times."
    )]
    issuer_keys: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    ENCLAVE_ADDRESS
        .set(cli.host.unwrap_or(DEFAULT_ENCLAVE_ADDRESS.to_string()))
        .unwrap();
    init_logging();
    let issuer_keys = StaticIssuerKeys::parse(&cli.issuer_keys).unwrap_or_else(|e| {
        tracing::error!("Could not parse issuer keys: {e}");
        std::process::exit(1);
    });
    tracing::info!("Using address: {}", ENCLAVE_ADDRESS.get().unwrap());
    tracing::info!("Mail service initializing, running transparently.");
    enclave::main::<Transparent, Tcp, TRng, _, _, _>(
        EnclaveConfig {
            expected_issuer: cli.issuer,
            expected_audience: cli.audience,
        },
        EchoHandler,
        issuer_keys,
        SystemClock,
    );
}

#[derive(Copy, Clone)]
struct Transparent;

impl RemoteAttestation for Transparent {
    fn init() -> Self {
        Self
    }

    fn get_quote(&self, report_data: [u8; 64]) -> Vec<u8> {
        report_data.to_vec()
    }
}

/// An externally refreshed key cache, loaded once from the CLI here.
struct StaticIssuerKeys(BTreeMap<String, VerifyingKey>);

impl StaticIssuerKeys {
    fn parse(entries: &[String]) -> Result<Self, String> {
        let mut keys = BTreeMap::new();
        for entry in entries {
            let (kid, hex_key) = entry
                .split_once('=')
                .ok_or_else(|| format!("`{entry}` is not of the form kid=hex"))?;
            let bytes: [u8; 32] = hex::decode(hex_key)
                .map_err(|e| format!("Invalid hex in `{entry}`: {e}"))?
                .try_into()
                .map_err(|_| format!("Key in `{entry}` was not 32 bytes"))?;
            let key = VerifyingKey::from_bytes(&bytes)
                .map_err(|e| format!("Invalid Ed25519 key in `{entry}`: {e}"))?;
            keys.insert(kid.to_string(), key);
        }
        Ok(Self(keys))
    }
}

impl IssuerKeys for StaticIssuerKeys {
    fn signing_key(&self, kid: &str) -> Option<VerifyingKey> {
        self.0.get(kid).copied()
    }
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Demo application logic: logs the verified sender and echoes the
/// payload back.
struct EchoHandler;

impl RequestHandler for EchoHandler {
    fn handle_message(
        &mut self,
        plaintext: &[u8],
        subject_name: &str,
    ) -> Result<Vec<u8>, HandlerError> {
        tracing::info!(subject_name, bytes = plaintext.len(), "Handling verified message");
        Ok(plaintext.to_vec())
    }
}

fn init_logging() {
    tracing_subscriber::fmt::SubscriberBuilder::default()
        .with_ansi(true)
        .init();
}

#[derive(Copy, Clone)]
struct TRng(OsRng);

impl RngCore for TRng {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.0.try_fill_bytes(dest)
    }
}

impl CryptoRng for TRng {}

impl EnclaveRNG for TRng {
    fn init() -> Self {
        Self(OsRng)
    }
}
