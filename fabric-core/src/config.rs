use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use bitcoin_hashes::Hash as _;
use serde::{Deserialize, Serialize};
use sha3::Digest as _;

use crate::envs::{
    FABRIC_DELIVER_TIMEOUT_MS_ENV, FABRIC_SECURITY_ENABLED_ENV, FABRIC_TCERT_BATCH_SIZE_ENV,
    is_env_var_set, parse_env_var,
};

/// Default time a single orderer gets to deliver a requested block
pub const DEFAULT_DELIVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Hash family used for transaction ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HashAlgorithm {
    #[default]
    Sha2,
    Sha3,
}

impl HashAlgorithm {
    pub fn digest(self, data: &[u8]) -> [u8; 32] {
        match self {
            HashAlgorithm::Sha2 => bitcoin_hashes::sha256::Hash::hash(data).to_byte_array(),
            HashAlgorithm::Sha3 => sha3::Sha3_256::digest(data).into(),
        }
    }
}

/// Settings the channel client is constructed with
///
/// Passed explicitly to every channel through its client context; nothing
/// reads configuration from global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub security_enabled: bool,
    /// Hint for how many transaction certificates to request per batch
    pub tcert_batch_size: usize,
    /// How long a single orderer may take to deliver a block before it
    /// counts as failed
    pub deliver_timeout_ms: u64,
    pub security_level: u16,
    pub hash_algorithm: HashAlgorithm,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            security_enabled: true,
            tcert_batch_size: 200,
            deliver_timeout_ms: u64::try_from(DEFAULT_DELIVER_TIMEOUT.as_millis())
                .unwrap_or(u64::MAX),
            security_level: 256,
            hash_algorithm: HashAlgorithm::default(),
        }
    }
}

impl ClientConfig {
    /// Read a JSON config file; missing fields take their default value
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Can't read config file {}", path.display()))?;
        serde_json::from_reader(file)
            .with_context(|| format!("Could not parse config file {}", path.display()))
    }

    /// Apply the `FABRIC_*` environment overrides on top of `self`
    pub fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        if std::env::var_os(FABRIC_SECURITY_ENABLED_ENV).is_some() {
            self.security_enabled = is_env_var_set(FABRIC_SECURITY_ENABLED_ENV);
        }
        if let Some(batch_size) = parse_env_var(FABRIC_TCERT_BATCH_SIZE_ENV)? {
            self.tcert_batch_size = batch_size;
        }
        if let Some(timeout_ms) = parse_env_var(FABRIC_DELIVER_TIMEOUT_MS_ENV)? {
            self.deliver_timeout_ms = timeout_ms;
        }
        Ok(self)
    }

    pub fn deliver_timeout(&self) -> Duration {
        Duration::from_millis(self.deliver_timeout_ms)
    }
}
