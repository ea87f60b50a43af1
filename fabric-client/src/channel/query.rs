//! Queries answered by the ledger query system chaincode (qscc)

use std::collections::BTreeMap;

use fabric_core::protos::{Block, BlockchainInfo, ProcessedTransaction};
use fabric_core::{NodeAddress, TransactionId};
use fabric_logging::LOG_CHANNEL;
use tracing::debug;

use super::{Channel, system_invocation};
use crate::envelope::decode;
use crate::error::{ChannelError, ChannelResult};
use crate::proposal::{ProposalRequest, build_chaincode_proposal};

const QSCC: &str = "qscc";

impl Channel {
    /// Invoke `request` without submitting a transaction and return the
    /// payload of every response
    ///
    /// Fails on the first response that is not a successful endorsement.
    pub async fn query_by_chaincode(
        &self,
        request: &ProposalRequest,
        targets: &[NodeAddress],
    ) -> ChannelResult<Vec<Vec<u8>>> {
        let function = request
            .args
            .first()
            .map(|f| String::from_utf8_lossy(f).into_owned())
            .unwrap_or_default();
        let proposal = self.create_transaction_proposal(request, true)?;
        let responses = self.send_transaction_proposal(&proposal, targets).await?;

        responses
            .into_iter()
            .map(|response| {
                if response.is_success() {
                    Ok(response.payload)
                } else {
                    Err(ChannelError::QueryFailed {
                        function: function.clone(),
                        reason: format!(
                            "{} answered with status {}: {}",
                            response.endorser,
                            response.status,
                            response.message()
                        ),
                    })
                }
            })
            .collect()
    }

    /// Run a qscc `function` on the primary endorser
    async fn query_system(&self, function: &str, args: Vec<Vec<u8>>) -> ChannelResult<Vec<u8>> {
        let primary = self.primary_endorser().ok_or(ChannelError::NoEndorsers)?;
        let mut input = vec![function.as_bytes().to_vec(), self.name.as_bytes().to_vec()];
        input.extend(args);

        let proposal = build_chaincode_proposal(
            &self.ctx,
            "",
            QSCC,
            system_invocation(QSCC, input)?,
            BTreeMap::new(),
            true,
        )?;
        debug!(
            target: LOG_CHANNEL,
            channel = %self.name,
            %function,
            endorser = %primary.address(),
            "Querying system chaincode"
        );
        let responses = self
            .send_transaction_proposal(&proposal, &[primary.address().to_owned()])
            .await?;

        let Some(response) = responses.into_iter().next() else {
            return Err(ChannelError::QueryFailed {
                function: function.to_owned(),
                reason: "no response".to_owned(),
            });
        };
        if !response.is_success() {
            return Err(ChannelError::QueryFailed {
                function: function.to_owned(),
                reason: format!(
                    "{} answered with status {}: {}",
                    response.endorser,
                    response.status,
                    response.message()
                ),
            });
        }
        Ok(response.payload)
    }

    /// Height and head hashes of the channel's ledger
    pub async fn query_info(&self) -> ChannelResult<BlockchainInfo> {
        let payload = self.query_system("GetChainInfo", vec![]).await?;
        decode("blockchain info", &payload)
    }

    pub async fn query_block(&self, number: u64) -> ChannelResult<Block> {
        let payload = self
            .query_system("GetBlockByNumber", vec![number.to_string().into_bytes()])
            .await?;
        decode(&format!("block {number}"), &payload)
    }

    pub async fn query_block_by_hash(&self, hash: &[u8]) -> ChannelResult<Block> {
        let payload = self
            .query_system("GetBlockByHash", vec![hash.to_vec()])
            .await?;
        decode(&format!("block {}", hex::encode(hash)), &payload)
    }

    /// The transaction `tx_id` together with its validation code
    pub async fn query_transaction(
        &self,
        tx_id: &TransactionId,
    ) -> ChannelResult<ProcessedTransaction> {
        let payload = self
            .query_system("GetTransactionByID", vec![tx_id.as_str().as_bytes().to_vec()])
            .await?;
        decode(&format!("transaction {tx_id}"), &payload)
    }
}
