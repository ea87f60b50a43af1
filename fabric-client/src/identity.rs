//! Identity of the caller and how it signs

use std::fmt;
use std::sync::Arc;

use fabric_core::config::{ClientConfig, HashAlgorithm};
use fabric_core::protos::SerializedIdentity;
use fabric_logging::LOG_IDENTITY;
use prost::Message as _;
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair as _};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity is not available: {0}")]
    Unavailable(String),
    #[error("Invalid key material: {0}")]
    InvalidKey(String),
    #[error("Hash algorithm {0:?} is not supported by this identity")]
    UnsupportedHash(HashAlgorithm),
    #[error("Signing failed")]
    SigningFailed,
}

pub type DynSigningIdentity = Arc<dyn ISigningIdentity>;

/// The enrolled identity of the caller
pub trait ISigningIdentity: fmt::Debug + Send + Sync + 'static {
    fn msp_id(&self) -> &str;

    /// The identity as placed in message headers: a marshaled
    /// `SerializedIdentity`
    fn serialized_identity(&self) -> Result<Vec<u8>, IdentityError>;

    fn sign(&self, message: &[u8], hash: HashAlgorithm) -> Result<Vec<u8>, IdentityError>;

    fn into_dyn(self) -> DynSigningIdentity
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// ECDSA P-256 identity backed by a PKCS#8 private key
pub struct EcdsaSigningIdentity {
    msp_id: String,
    certificate: Vec<u8>,
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl fmt::Debug for EcdsaSigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaSigningIdentity")
            .field("msp_id", &self.msp_id)
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}

impl EcdsaSigningIdentity {
    pub fn from_pkcs8(
        msp_id: impl Into<String>,
        certificate: Vec<u8>,
        pkcs8: &[u8],
    ) -> Result<Self, IdentityError> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8, &rng)
            .map_err(|e| IdentityError::InvalidKey(e.to_string()))?;
        Ok(Self {
            msp_id: msp_id.into(),
            certificate,
            key_pair,
            rng,
        })
    }

    /// Create an identity with a freshly generated key
    pub fn generate(
        msp_id: impl Into<String>,
        certificate: Vec<u8>,
    ) -> Result<Self, IdentityError> {
        let rng = SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|_| IdentityError::InvalidKey("key generation failed".to_owned()))?;
        let identity = Self::from_pkcs8(msp_id, certificate, pkcs8.as_ref())?;
        debug!(
            target: LOG_IDENTITY,
            msp_id = %identity.msp_id,
            "Generated signing key"
        );
        Ok(identity)
    }

    /// Uncompressed SEC1 public key
    pub fn public_key(&self) -> &[u8] {
        self.key_pair.public_key().as_ref()
    }
}

impl ISigningIdentity for EcdsaSigningIdentity {
    fn msp_id(&self) -> &str {
        &self.msp_id
    }

    fn serialized_identity(&self) -> Result<Vec<u8>, IdentityError> {
        Ok(SerializedIdentity {
            mspid: self.msp_id.clone(),
            id_bytes: self.certificate.clone(),
        }
        .encode_to_vec())
    }

    fn sign(&self, message: &[u8], hash: HashAlgorithm) -> Result<Vec<u8>, IdentityError> {
        // The P-256 signing algorithm hashes with SHA-256 itself
        if hash != HashAlgorithm::Sha2 {
            return Err(IdentityError::UnsupportedHash(hash));
        }
        let signature = self
            .key_pair
            .sign(&self.rng, message)
            .map_err(|_| IdentityError::SigningFailed)?;
        Ok(signature.as_ref().to_vec())
    }
}

/// Deterministic identity for tests: its "signature" is a hash over the
/// message and the identity
#[derive(Debug, Clone)]
pub struct StaticSigningIdentity {
    msp_id: String,
    id_bytes: Vec<u8>,
    broken: bool,
}

impl StaticSigningIdentity {
    pub fn new(msp_id: impl Into<String>, id_bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            msp_id: msp_id.into(),
            id_bytes: id_bytes.into(),
            broken: false,
        }
    }

    /// An identity whose backing store is gone: every call fails
    pub fn broken(msp_id: impl Into<String>) -> Self {
        Self {
            broken: true,
            ..Self::new(msp_id, vec![])
        }
    }
}

impl ISigningIdentity for StaticSigningIdentity {
    fn msp_id(&self) -> &str {
        &self.msp_id
    }

    fn serialized_identity(&self) -> Result<Vec<u8>, IdentityError> {
        if self.broken {
            return Err(IdentityError::Unavailable(format!(
                "no enrollment for {}",
                self.msp_id
            )));
        }
        Ok(SerializedIdentity {
            mspid: self.msp_id.clone(),
            id_bytes: self.id_bytes.clone(),
        }
        .encode_to_vec())
    }

    fn sign(&self, message: &[u8], hash: HashAlgorithm) -> Result<Vec<u8>, IdentityError> {
        if self.broken {
            return Err(IdentityError::SigningFailed);
        }
        let mut data = message.to_vec();
        data.extend_from_slice(&self.id_bytes);
        Ok(hash.digest(&data).to_vec())
    }
}

/// What a channel needs to know about its caller: configuration and signing
/// identity
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub config: ClientConfig,
    pub identity: DynSigningIdentity,
}

impl ClientContext {
    pub fn new(config: ClientConfig, identity: DynSigningIdentity) -> Self {
        Self { config, identity }
    }

    pub fn creator(&self) -> Result<Vec<u8>, IdentityError> {
        self.identity.serialized_identity()
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, IdentityError> {
        self.identity.sign(message, self.config.hash_algorithm)
    }
}
