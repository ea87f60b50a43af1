//! Assembling endorsed proposal responses into an orderable transaction

use fabric_api_client::api::TransactionProposalResponse;
use fabric_core::protos::{
    self, ChaincodeActionPayload, ChaincodeEndorsedAction, ChaincodeHeaderExtension,
    ChaincodeProposalPayload, ChannelHeader, Payload, TransactionAction,
};
use fabric_logging::LOG_CHANNEL;
use tracing::{debug, trace};

use crate::envelope::{decode, encode};
use crate::error::{ChannelError, ChannelResult};
use crate::proposal::TransactionProposal;

/// A transaction built from successful endorsements of `proposal`
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub proposal: TransactionProposal,
    pub transaction: protos::Transaction,
}

impl Transaction {
    /// The payload submitted to orderers: the proposal header plus the
    /// serialized transaction
    pub fn to_payload(&self) -> ChannelResult<Payload> {
        Ok(Payload {
            header: Some(self.proposal.header()?),
            data: encode("transaction", &self.transaction)?,
        })
    }
}

/// Merge `responses` to `proposal` into a single transaction
///
/// Every response must be a successful endorsement. The endorsements keep
/// the order of `responses`. The response payload of the first response is
/// used for the transaction; payloads of the other responses are not
/// compared against it, so endorsers disagreeing on the simulation result
/// go unnoticed here. Callers that need that guarantee must compare
/// [`fabric_core::protos::ProposalResponse::payload`] themselves.
pub fn create_transaction(
    proposal: &TransactionProposal,
    responses: &[TransactionProposalResponse],
) -> ChannelResult<Transaction> {
    let Some(first) = responses.first() else {
        return Err(ChannelError::EmptyResponses);
    };

    let mut endorsements = Vec::with_capacity(responses.len());
    for response in responses {
        if !response.is_success() {
            return Err(ChannelError::Endorsement {
                endorser: response.endorser.clone(),
                status: response.status,
                message: response.message(),
            });
        }
        let endorsement = response
            .response
            .as_ref()
            .and_then(|r| r.endorsement.clone())
            .ok_or_else(|| ChannelError::Endorsement {
                endorser: response.endorser.clone(),
                status: response.status,
                message: "response carries no endorsement".to_owned(),
            })?;
        endorsements.push(endorsement);
    }

    let proposal_response_payload = first
        .response
        .as_ref()
        .map(|r| r.payload.clone())
        .unwrap_or_default();

    let header = proposal.header()?;
    let channel_header: ChannelHeader = decode("channel header", &header.channel_header)?;
    let extension: ChaincodeHeaderExtension =
        decode("header extension", &channel_header.extension)?;
    if !extension.payload_visibility.is_empty() {
        // Only full visibility exists; anything else is treated the same
        debug!(
            target: LOG_CHANNEL,
            tx_id = %proposal.tx_id,
            "Ignoring custom payload visibility"
        );
    }

    let mut proposal_payload: ChaincodeProposalPayload =
        decode("proposal payload", &proposal.proposal.payload)?;
    proposal_payload.transient_map.clear();

    let action_payload = ChaincodeActionPayload {
        chaincode_proposal_payload: encode("proposal payload", &proposal_payload)?,
        action: Some(ChaincodeEndorsedAction {
            proposal_response_payload,
            endorsements,
        }),
    };
    let transaction = protos::Transaction {
        actions: vec![TransactionAction {
            header: header.signature_header,
            payload: encode("chaincode action payload", &action_payload)?,
        }],
    };

    trace!(
        target: LOG_CHANNEL,
        tx_id = %proposal.tx_id,
        endorsements = responses.len(),
        "Assembled transaction"
    );

    Ok(Transaction {
        proposal: proposal.clone(),
        transaction,
    })
}
