use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Cli;

const CLIENT_TIMEOUT: u64 = 1;
const CONFIG_FILE: &str = "config.toml";
const ENCLAVE_ADDRESS: &str = "0.0.0.0:12345";
const HERMOD_DIR: &str = ".hermod";
const LISTENING_ADDRESS: &str = "0.0.0.0:666";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub enclave_url: String,
    pub listen_url: String,
    pub listen_timeout: Duration,
}

impl Config {
    /// Load a config from file
    pub fn load() -> std::io::Result<Self> {
        let config_file = hermod_dir().join(CONFIG_FILE);
        toml::from_str(&std::fs::read_to_string(config_file)?).map_err(|e| {
            std::io::Error::new(
                ErrorKind::InvalidData,
                format!("Could not parse host config file: {e}"),
            )
        })
    }

    /// Parse a config from CLI arguments
    pub fn init(cli: Cli) -> Self {
        Self {
            enclave_url: cli.enclave.unwrap_or_else(|| ENCLAVE_ADDRESS.to_string()),
            listen_url: cli.listen.unwrap_or_else(|| LISTENING_ADDRESS.to_string()),
            listen_timeout: cli
                .listen_timeout
                .map(Duration::from_millis)
                .unwrap_or_else(|| Duration::from_secs(CLIENT_TIMEOUT)),
        }
    }

    /// First try to load the config file. If that succeeds, overwrite the config
    /// with the CLI args present and persist it. If loading fails, create a config
    /// from the CLI args and persist it.
    ///
    /// Returns the final config.
    pub fn load_or_init(cli: Cli) -> Self {
        match Self::load() {
            Ok(mut conf) => {
                if let Some(e) = cli.enclave {
                    conf.enclave_url = e;
                }
                if let Some(l) = cli.listen {
                    conf.listen_url = l;
                }
                if let Some(t) = cli.listen_timeout {
                    conf.listen_timeout = Duration::from_millis(t);
                }
                conf.save().unwrap();
                conf
            }
            Err(e) => {
                tracing::warn!("Could not load config file: {e}");
                let conf = Self::init(cli);
                tracing::info!("New config created.");
                conf.save().unwrap();
                conf
            }
        }
    }

    /// Save the config file
    pub fn save(&self) -> std::io::Result<()> {
        let h_dir = hermod_dir();
        if !std::fs::exists(&h_dir).unwrap() {
            std::fs::create_dir(&h_dir).unwrap();
        }
        let config_file = h_dir.join(CONFIG_FILE);
        std::fs::write(config_file, toml::to_string(self).unwrap())
    }
}

pub fn hermod_dir() -> PathBuf {
    home::home_dir().unwrap().join(HERMOD_DIR)
}
