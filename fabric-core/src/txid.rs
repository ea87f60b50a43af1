use std::fmt;

use rand::RngCore as _;
use serde::{Deserialize, Serialize};

use crate::config::HashAlgorithm;

/// Size of the random nonce placed in every signature header
pub const NONCE_SIZE: usize = 24;

pub fn generate_nonce() -> Vec<u8> {
    let mut nonce = vec![0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Identifier of a transaction: the hex encoded hash of the nonce followed by
/// the serialized creator identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn compute(nonce: &[u8], creator: &[u8], hash: HashAlgorithm) -> Self {
        let mut data = Vec::with_capacity(nonce.len() + creator.len());
        data.extend_from_slice(nonce);
        data.extend_from_slice(creator);
        Self(hex::encode(hash.digest(&data)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_id_depends_on_nonce_and_creator() {
        let creator = b"creator".as_slice();
        let a = TransactionId::compute(&[1; NONCE_SIZE], creator, HashAlgorithm::Sha2);
        let b = TransactionId::compute(&[2; NONCE_SIZE], creator, HashAlgorithm::Sha2);
        let a_again = TransactionId::compute(&[1; NONCE_SIZE], creator, HashAlgorithm::Sha2);

        assert_ne!(a, b);
        assert_eq!(a, a_again);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn nonces_are_fresh() {
        let first = generate_nonce();
        assert_eq!(first.len(), NONCE_SIZE);
        assert_ne!(first, generate_nonce());
    }
}
