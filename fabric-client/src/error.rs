use fabric_api_client::api::{DeliverError, OrdererError};
use fabric_core::TransactionId;
use thiserror::Error;

use crate::identity::IdentityError;

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Everything that can go wrong in a channel operation
///
/// Failures of single endorsers or orderers during a fan-out are not in
/// here: those are recorded per target in the returned responses.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel name must not be empty")]
    InvalidName,
    #[error("{address} is not an endorser of this channel")]
    UnknownPeer { address: String },
    #[error("Endorser {address} is already registered")]
    DuplicateEndorser { address: String },
    #[error("Orderer {address} is already registered")]
    DuplicateOrderer { address: String },
    #[error("{address} is not an orderer of this channel")]
    UnknownOrderer { address: String },
    #[error("No endorsers to send the proposal to")]
    NoEndorsers,
    #[error("Proposal {tx_id} is not signed")]
    UnsignedProposal { tx_id: TransactionId },
    #[error("Could not obtain the caller identity: {0}")]
    Identity(IdentityError),
    #[error("Could not serialize {what}: {error}")]
    Serialization {
        what: &'static str,
        error: prost::EncodeError,
    },
    #[error("Could not sign {what}: {error}")]
    Signing {
        what: &'static str,
        error: IdentityError,
    },
    #[error("Can't assemble a transaction without proposal responses")]
    EmptyResponses,
    #[error("Endorser {endorser} failed to endorse with status {status}: {message}")]
    Endorsement {
        endorser: String,
        status: i32,
        message: String,
    },
    #[error("No orderers registered on this channel")]
    NoOrderer,
    #[error("Envelope to broadcast is missing")]
    NilEnvelope,
    #[error("All {count} orderers failed, last error from {address}: {error}")]
    AggregatedOrderer {
        count: usize,
        address: String,
        error: OrdererError,
    },
    #[error("Block retrieval finished with neither a block nor an error")]
    UnexpectedEmptyOutcome,
    #[error("Config block {number} is malformed: {reason}")]
    MalformedConfigBlock { number: u64, reason: String },
    #[error("Config is malformed: {reason}")]
    MalformedConfig { reason: String },
    #[error("Block {number} is not a config block (header type {header_type})")]
    WrongBlockType { number: u64, header_type: i32 },
    #[error("MSP config {key} has an unsupported provider type {provider_type}")]
    UnsupportedProvider { key: String, provider_type: i32 },
    #[error("MSP config {name:?} is invalid: {reason}")]
    InvalidProviderConfig { name: String, reason: String },
    #[error("Policy {key} has an unsupported type {policy_type}")]
    UnsupportedPolicyType { key: String, policy_type: i32 },
    #[error("Could not decode {what}: {error}")]
    Decode {
        what: String,
        error: prost::DecodeError,
    },
    #[error("Query {function} failed: {reason}")]
    QueryFailed { function: String, reason: String },
}

impl ChannelError {
    /// Build a [`ChannelError::Decode`] mapper for `what`
    pub fn decode(what: impl Into<String>) -> impl FnOnce(prost::DecodeError) -> Self {
        let what = what.into();
        move |error| ChannelError::Decode { what, error }
    }
}

impl From<DeliverError> for ChannelError {
    fn from(error: DeliverError) -> Self {
        match error {
            DeliverError::NoOrderers => ChannelError::NoOrderer,
            DeliverError::AllFailed {
                count,
                address,
                last,
            } => ChannelError::AggregatedOrderer {
                count,
                address,
                error: last,
            },
            DeliverError::EmptyOutcome => ChannelError::UnexpectedEmptyOutcome,
        }
    }
}
