use std::time::Duration;

use fabric_logging::{LOG_NET_ENDORSER, LOG_NET_ORDERER};
use thiserror::Error;
use tracing::{trace, warn};

pub type EndorserResult<T> = Result<T, EndorserError>;
pub type OrdererResult<T> = Result<T, OrdererError>;

/// An error when calling a single endorsing peer
#[derive(Debug, Error)]
pub enum EndorserError {
    #[error("Connection error: {0}")]
    Connection(anyhow::Error),
    #[error("Timeout reached after waiting {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl EndorserError {
    /// Report errors that are worth reporting
    ///
    /// The goal here is to avoid spamming logs with errors that happen commonly
    /// for all sorts of expected reasons, while printing ones that suggest
    /// there's a problem.
    pub fn report_if_important(&self, address: &str) {
        let important = match self {
            EndorserError::Connection(_) | EndorserError::Timeout(_) => false,
            EndorserError::InvalidResponse(_) => true,
        };

        trace!(target: LOG_NET_ENDORSER, error = %self, %address, "EndorserError");

        if important {
            warn!(target: LOG_NET_ENDORSER, error = %self, %address, "Unusual EndorserError");
        }
    }
}

/// An error when calling a single ordering node
#[derive(Debug, Error)]
pub enum OrdererError {
    #[error("Connection error: {0}")]
    Connection(anyhow::Error),
    #[error("Timeout reached after waiting {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Rejected with status {status}: {info}")]
    Rejected { status: i32, info: String },
    #[error("Deliver stream closed: {0}")]
    DeliverFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl OrdererError {
    pub fn report_if_important(&self, address: &str) {
        let important = match self {
            OrdererError::Connection(_) | OrdererError::Timeout(_) => false,
            OrdererError::Rejected { .. }
            | OrdererError::DeliverFailed(_)
            | OrdererError::InvalidResponse(_) => true,
        };

        trace!(target: LOG_NET_ORDERER, error = %self, %address, "OrdererError");

        if important {
            warn!(target: LOG_NET_ORDERER, error = %self, %address, "Unusual OrdererError");
        }
    }
}

/// Failure of [`super::retrieve_first_block`] as a whole
#[derive(Debug, Error)]
pub enum DeliverError {
    #[error("No orderers to request the block from")]
    NoOrderers,
    #[error("All {count} orderers failed to deliver, last error from {address}: {last}")]
    AllFailed {
        count: usize,
        address: String,
        last: OrdererError,
    },
    /// Every task finished without a block and without an error. Should not
    /// happen, handled anyway.
    #[error("Block delivery finished without a block and without an error")]
    EmptyOutcome,
}
