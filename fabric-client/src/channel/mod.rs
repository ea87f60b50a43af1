//! The channel: its members, its configuration and the transaction flow
//!
//! A transaction goes through four steps, each its own call so callers can
//! inspect or persist intermediate results:
//!
//! 1. [`Channel::create_transaction_proposal`] builds and signs a proposal
//! 2. [`Channel::send_transaction_proposal`] collects endorsements
//! 3. [`Channel::create_transaction`] assembles them into a transaction
//! 4. [`Channel::send_transaction`] hands it to every orderer

pub mod config;
mod query;
#[cfg(test)]
mod test_utils;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use fabric_api_client::api::{
    DynEndorser, DynOrderer, SeekSpec, TransactionProposalResponse, TransactionResponse,
    broadcast_to_all, retrieve_first_block, send_proposal_to_all,
};
use fabric_core::protos::{
    Block, BlockMetadataIndex, ChaincodeDeploymentSpec, ChaincodeId, ChaincodeInput,
    ChaincodeInvocationSpec, ChaincodeSpec, ChaincodeType, ChannelHeader, ConfigEnvelope, Envelope,
    HeaderType, LastConfig, Metadata, Payload,
};
use fabric_core::{NodeAddress, TransactionId};
use fabric_logging::{LOG_CHANNEL, LOG_CHANNEL_CONFIG};
use itertools::Itertools as _;
use tracing::{debug, info, warn};

pub use self::config::{AnchorPeerInfo, ConfigItems, VersionsGroup};
use crate::envelope::{decode, deliver_envelope, encode, signed_envelope};
use crate::error::{ChannelError, ChannelResult};
use crate::events::{ITxEventNotifier, TxEventCallback};
use crate::identity::ClientContext;
use crate::msp::{FabricMsp, MspManager};
use crate::proposal::{
    ProposalRequest, TransactionProposal, build_chaincode_proposal, build_transaction_proposal,
};
use crate::transaction::{self, Transaction};

/// Configuration system chaincode
const CSCC: &str = "cscc";
/// Lifecycle system chaincode
const LSCC: &str = "lscc";

/// Where [`Channel::initialize`] got to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
    /// Initialization failed with the given error; membership still works
    Failed(String),
}

/// A node together with the order it was added in
#[derive(Debug)]
struct Member<T> {
    seq: u64,
    node: T,
}

#[derive(Debug, Default)]
struct Members {
    next_seq: u64,
    endorsers: BTreeMap<NodeAddress, Member<DynEndorser>>,
    orderers: BTreeMap<NodeAddress, Member<DynOrderer>>,
    /// Explicitly chosen primary endorser
    primary: Option<NodeAddress>,
}

impl Members {
    fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn endorsers(&self) -> Vec<DynEndorser> {
        self.endorsers
            .values()
            .sorted_by_key(|member| member.seq)
            .map(|member| member.node.clone())
            .collect()
    }

    fn orderers(&self) -> Vec<DynOrderer> {
        self.orderers
            .values()
            .sorted_by_key(|member| member.seq)
            .map(|member| member.node.clone())
            .collect()
    }

    /// The explicit primary, or else the earliest added endorser
    fn primary(&self) -> Option<DynEndorser> {
        self.primary
            .as_ref()
            .and_then(|address| self.endorsers.get(address))
            .or_else(|| self.endorsers.values().min_by_key(|member| member.seq))
            .map(|member| member.node.clone())
    }
}

/// Request to instantiate a chaincode on a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstantiateRequest {
    pub chaincode_id: String,
    pub chaincode_path: String,
    pub chaincode_version: String,
    /// Arguments of the chaincode's init function
    pub args: Vec<Vec<u8>>,
}

/// A channel as seen by one client
#[derive(Debug)]
pub struct Channel {
    name: String,
    ctx: Arc<ClientContext>,
    security_enabled: bool,
    tcert_batch_size: AtomicUsize,
    members: Mutex<Members>,
    msp_manager: Mutex<MspManager>,
    anchor_peers: Mutex<Vec<AnchorPeerInfo>>,
    /// Orderer addresses found in the channel config
    config_orderers: Mutex<Vec<String>>,
    state: Mutex<InitState>,
}

impl Channel {
    pub fn new(name: impl Into<String>, ctx: Arc<ClientContext>) -> ChannelResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChannelError::InvalidName);
        }
        debug!(target: LOG_CHANNEL, channel = %name, "Creating channel");
        Ok(Self {
            security_enabled: ctx.config.security_enabled,
            tcert_batch_size: AtomicUsize::new(ctx.config.tcert_batch_size),
            name,
            ctx,
            members: Mutex::new(Members::default()),
            msp_manager: Mutex::new(MspManager::new()),
            anchor_peers: Mutex::new(vec![]),
            config_orderers: Mutex::new(vec![]),
            state: Mutex::new(InitState::Uninitialized),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &Arc<ClientContext> {
        &self.ctx
    }

    pub fn is_security_enabled(&self) -> bool {
        self.security_enabled
    }

    pub fn tcert_batch_size(&self) -> usize {
        self.tcert_batch_size.load(Ordering::Relaxed)
    }

    pub fn set_tcert_batch_size(&self, batch_size: usize) {
        self.tcert_batch_size.store(batch_size, Ordering::Relaxed);
    }

    pub fn state(&self) -> InitState {
        self.state.lock().expect("lock poison").clone()
    }

    fn set_state(&self, state: InitState) {
        debug!(target: LOG_CHANNEL, channel = %self.name, ?state, "Channel state changed");
        *self.state.lock().expect("lock poison") = state;
    }

    pub fn add_endorser(&self, endorser: DynEndorser) -> ChannelResult<()> {
        let mut members = self.members.lock().expect("lock poison");
        let address = endorser.address().to_owned();
        if members.endorsers.contains_key(&address) {
            return Err(ChannelError::DuplicateEndorser { address });
        }
        let seq = members.next_seq();
        debug!(target: LOG_CHANNEL, channel = %self.name, %address, "Adding endorser");
        members.endorsers.insert(
            address,
            Member {
                seq,
                node: endorser,
            },
        );
        Ok(())
    }

    /// Remove the endorser registered under `address`, returning it
    ///
    /// Removing the primary endorser makes the earliest added remaining
    /// endorser the primary.
    pub fn remove_endorser(&self, address: &str) -> ChannelResult<DynEndorser> {
        let mut members = self.members.lock().expect("lock poison");
        let removed =
            members.endorsers.remove(address).ok_or_else(|| ChannelError::UnknownPeer {
                address: address.to_owned(),
            })?;
        if members.primary.as_deref() == Some(address) {
            members.primary = None;
        }
        debug!(target: LOG_CHANNEL, channel = %self.name, %address, "Removed endorser");
        Ok(removed.node)
    }

    /// All endorsers, in the order they were added
    pub fn endorsers(&self) -> Vec<DynEndorser> {
        self.members.lock().expect("lock poison").endorsers()
    }

    pub fn set_primary_endorser(&self, address: &str) -> ChannelResult<()> {
        let mut members = self.members.lock().expect("lock poison");
        if !members.endorsers.contains_key(address) {
            return Err(ChannelError::UnknownPeer {
                address: address.to_owned(),
            });
        }
        members.primary = Some(address.to_owned());
        Ok(())
    }

    /// Endorser that queries go to: the one set explicitly, or else the
    /// first endorser added
    pub fn primary_endorser(&self) -> Option<DynEndorser> {
        self.members.lock().expect("lock poison").primary()
    }

    pub fn add_orderer(&self, orderer: DynOrderer) -> ChannelResult<()> {
        let mut members = self.members.lock().expect("lock poison");
        let address = orderer.address().to_owned();
        if members.orderers.contains_key(&address) {
            return Err(ChannelError::DuplicateOrderer { address });
        }
        let seq = members.next_seq();
        debug!(target: LOG_CHANNEL, channel = %self.name, %address, "Adding orderer");
        members.orderers.insert(
            address,
            Member {
                seq,
                node: orderer,
            },
        );
        Ok(())
    }

    pub fn remove_orderer(&self, address: &str) -> ChannelResult<DynOrderer> {
        let mut members = self.members.lock().expect("lock poison");
        let removed =
            members.orderers.remove(address).ok_or_else(|| ChannelError::UnknownOrderer {
                address: address.to_owned(),
            })?;
        debug!(target: LOG_CHANNEL, channel = %self.name, %address, "Removed orderer");
        Ok(removed.node)
    }

    pub fn orderers(&self) -> Vec<DynOrderer> {
        self.members.lock().expect("lock poison").orderers()
    }

    /// Anchor peers from the last derived configuration
    pub fn anchor_peers(&self) -> Vec<AnchorPeerInfo> {
        self.anchor_peers.lock().expect("lock poison").clone()
    }

    /// Orderer addresses from the last derived configuration
    ///
    /// These are not connected to automatically; see [`Self::add_orderer`].
    pub fn config_orderer_addresses(&self) -> Vec<String> {
        self.config_orderers.lock().expect("lock poison").clone()
    }

    pub fn msp_identifiers(&self) -> Vec<String> {
        self.msp_manager.lock().expect("lock poison").identifiers()
    }

    pub fn msp(&self, identifier: &str) -> Option<FabricMsp> {
        self.msp_manager
            .lock()
            .expect("lock poison")
            .msp(identifier)
            .cloned()
    }

    /// Organizational units of all MSPs of the channel
    pub fn organization_units(&self) -> Vec<String> {
        self.msp_manager
            .lock()
            .expect("lock poison")
            .organizational_units()
    }

    /// A request for `chaincode_id` on this channel
    pub fn proposal_request(&self, chaincode_id: impl Into<String>) -> ProposalRequest {
        ProposalRequest::new(self.name.clone(), chaincode_id)
    }

    pub fn create_transaction_proposal(
        &self,
        request: &ProposalRequest,
        sign: bool,
    ) -> ChannelResult<TransactionProposal> {
        build_transaction_proposal(&self.ctx, request, sign)
    }

    /// Send `proposal` to `targets`, or to every endorser when `targets` is
    /// empty
    ///
    /// Returns one response per target. Endorsers that fail are reported in
    /// their response, they don't fail the call.
    pub async fn send_transaction_proposal(
        &self,
        proposal: &TransactionProposal,
        targets: &[NodeAddress],
    ) -> ChannelResult<Vec<TransactionProposalResponse>> {
        let signed = proposal
            .signed
            .as_ref()
            .ok_or_else(|| ChannelError::UnsignedProposal {
                tx_id: proposal.tx_id.clone(),
            })?;
        let targets = self.resolve_targets(targets)?;

        debug!(
            target: LOG_CHANNEL,
            channel = %self.name,
            tx_id = %proposal.tx_id,
            targets = %targets.iter().map(|t| t.address()).join(","),
            "Sending proposal"
        );
        let responses = send_proposal_to_all(&targets, signed).await;

        let failed = responses.iter().filter(|r| !r.is_success()).count();
        if failed != 0 {
            warn!(
                target: LOG_CHANNEL,
                channel = %self.name,
                tx_id = %proposal.tx_id,
                failed,
                total = responses.len(),
                "Some endorsers did not endorse"
            );
        }
        Ok(responses)
    }

    fn resolve_targets(&self, targets: &[NodeAddress]) -> ChannelResult<Vec<DynEndorser>> {
        let members = self.members.lock().expect("lock poison");
        let resolved = if targets.is_empty() {
            members.endorsers()
        } else {
            targets
                .iter()
                .map(|address| {
                    members
                        .endorsers
                        .get(address)
                        .map(|member| member.node.clone())
                        .ok_or_else(|| ChannelError::UnknownPeer {
                            address: address.clone(),
                        })
                })
                .collect::<ChannelResult<Vec<_>>>()?
        };
        if resolved.is_empty() {
            return Err(ChannelError::NoEndorsers);
        }
        Ok(resolved)
    }

    pub fn create_transaction(
        &self,
        proposal: &TransactionProposal,
        responses: &[TransactionProposalResponse],
    ) -> ChannelResult<Transaction> {
        transaction::create_transaction(proposal, responses)
    }

    /// Sign `transaction` and broadcast it to every orderer
    pub async fn send_transaction(
        &self,
        transaction: &Transaction,
    ) -> ChannelResult<Vec<TransactionResponse>> {
        let envelope = signed_envelope(&self.ctx, &transaction.to_payload()?)?;
        debug!(
            target: LOG_CHANNEL,
            channel = %self.name,
            tx_id = %transaction.proposal.tx_id,
            "Sending transaction"
        );
        self.broadcast_envelope(Some(&envelope)).await
    }

    /// Broadcast `envelope` to every orderer, one response per orderer
    pub async fn broadcast_envelope(
        &self,
        envelope: Option<&Envelope>,
    ) -> ChannelResult<Vec<TransactionResponse>> {
        let envelope = envelope.ok_or(ChannelError::NilEnvelope)?;
        let orderers = self.orderers();
        if orderers.is_empty() {
            return Err(ChannelError::NoOrderer);
        }
        Ok(broadcast_to_all(&orderers, envelope).await)
    }

    /// Fetch a block from whichever orderer delivers it first
    pub async fn retrieve_block(&self, seek: SeekSpec) -> ChannelResult<Block> {
        let orderers = self.orderers();
        if orderers.is_empty() {
            return Err(ChannelError::NoOrderer);
        }
        let envelope = deliver_envelope(&self.ctx, &self.name, seek)?;
        let block =
            retrieve_first_block(&orderers, &envelope, self.ctx.config.deliver_timeout()).await?;
        debug!(
            target: LOG_CHANNEL,
            channel = %self.name,
            ?seek,
            number = ?block.number(),
            "Retrieved block"
        );
        Ok(block)
    }

    pub async fn genesis_block(&self) -> ChannelResult<Block> {
        self.retrieve_block(SeekSpec::Specified(0)).await
    }

    /// Load the channel configuration
    ///
    /// With `config_update`, a serialized config update envelope, the
    /// configuration is derived from it without contacting the network.
    /// Otherwise it is read from the channel's config block.
    ///
    /// On failure the channel is left without any derived configuration,
    /// including what an earlier successful call had loaded.
    pub async fn initialize(&self, config_update: Option<&[u8]>) -> ChannelResult<()> {
        self.set_state(InitState::Initializing);

        let result = match config_update {
            Some(bytes) => config::derive_from_config_update_envelope(bytes),
            None => self.load_config_from_orderers().await,
        }
        .and_then(|items| self.apply_config(items));

        match &result {
            Ok(()) => {
                info!(target: LOG_CHANNEL, channel = %self.name, "Channel initialized");
                self.set_state(InitState::Ready);
            }
            Err(error) => {
                warn!(
                    target: LOG_CHANNEL,
                    channel = %self.name,
                    %error,
                    "Channel initialization failed"
                );
                self.clear_config();
                self.set_state(InitState::Failed(error.to_string()));
            }
        }
        result
    }

    async fn load_config_from_orderers(&self) -> ChannelResult<ConfigItems> {
        let newest = self.retrieve_block(SeekSpec::Newest).await?;
        let last_config = last_config_index(&newest)?;
        // The last config index is not trusted yet, the genesis block is
        // read instead
        debug!(
            target: LOG_CHANNEL_CONFIG,
            channel = %self.name,
            last_config,
            "Fetching config block 0 instead of last config block"
        );
        let block = self.retrieve_block(SeekSpec::Specified(0)).await?;
        let envelope = config_envelope_from_block(&block)?;
        config::derive_from_config_envelope(&envelope)
    }

    fn apply_config(&self, items: ConfigItems) -> ChannelResult<()> {
        self.msp_manager
            .lock()
            .expect("lock poison")
            .setup(items.msps)?;
        debug!(
            target: LOG_CHANNEL_CONFIG,
            channel = %self.name,
            anchor_peers = items.anchor_peers.len(),
            orderers = items.orderers.len(),
            "Applying derived config"
        );
        *self.anchor_peers.lock().expect("lock poison") = items.anchor_peers;
        *self.config_orderers.lock().expect("lock poison") = items.orderers;
        Ok(())
    }

    /// Drop everything derived by an earlier [`Self::initialize`]
    fn clear_config(&self) {
        *self.msp_manager.lock().expect("lock poison") = MspManager::new();
        self.anchor_peers.lock().expect("lock poison").clear();
        self.config_orderers.lock().expect("lock poison").clear();
    }

    /// Ask `targets` (every endorser when empty) to join the channel,
    /// giving them its genesis block
    pub async fn join_channel(
        &self,
        targets: &[NodeAddress],
    ) -> ChannelResult<Vec<TransactionProposalResponse>> {
        let genesis = self.genesis_block().await?;
        let args = vec![b"JoinChain".to_vec(), encode("genesis block", &genesis)?];
        let proposal = build_chaincode_proposal(
            &self.ctx,
            "",
            CSCC,
            system_invocation(CSCC, args)?,
            BTreeMap::new(),
            true,
        )?;

        let responses = self.send_transaction_proposal(&proposal, targets).await?;
        if let Some(failed) = responses.iter().find(|r| !r.is_success()) {
            return Err(ChannelError::Endorsement {
                endorser: failed.endorser.clone(),
                status: failed.status,
                message: failed.message(),
            });
        }
        info!(target: LOG_CHANNEL, channel = %self.name, peers = responses.len(), "Joined channel");
        Ok(responses)
    }

    /// Propose instantiating a chaincode to `targets` (every endorser when
    /// empty)
    ///
    /// Returns the proposal with its responses, ready for
    /// [`Self::create_transaction`].
    pub async fn send_instantiate_proposal(
        &self,
        request: &InstantiateRequest,
        targets: &[NodeAddress],
    ) -> ChannelResult<(TransactionProposal, Vec<TransactionProposalResponse>)> {
        let deployment = ChaincodeDeploymentSpec {
            chaincode_spec: Some(ChaincodeSpec {
                r#type: ChaincodeType::Golang as i32,
                chaincode_id: Some(ChaincodeId {
                    path: request.chaincode_path.clone(),
                    name: request.chaincode_id.clone(),
                    version: request.chaincode_version.clone(),
                }),
                input: Some(ChaincodeInput {
                    args: request.args.clone(),
                }),
                timeout: 0,
            }),
            effective_date: None,
            code_package: vec![],
            exec_env: 0,
        };
        let args = vec![
            b"deploy".to_vec(),
            self.name.as_bytes().to_vec(),
            encode("deployment spec", &deployment)?,
        ];
        let proposal = build_chaincode_proposal(
            &self.ctx,
            &self.name,
            LSCC,
            system_invocation(LSCC, args)?,
            BTreeMap::new(),
            true,
        )?;

        let responses = self.send_transaction_proposal(&proposal, targets).await?;
        Ok((proposal, responses))
    }

    /// Have `notifier` call `callback` once `tx_id` commits; doesn't wait
    pub fn register_tx_event(
        &self,
        notifier: &dyn ITxEventNotifier,
        tx_id: &TransactionId,
        callback: TxEventCallback,
    ) {
        debug!(
            target: LOG_CHANNEL,
            channel = %self.name,
            %tx_id,
            "Registering for transaction event"
        );
        notifier.register_tx_event(tx_id.clone(), callback);
    }
}

/// Serialized invocation of system chaincode `chaincode` with `args`
pub(crate) fn system_invocation(chaincode: &str, args: Vec<Vec<u8>>) -> ChannelResult<Vec<u8>> {
    encode(
        "invocation spec",
        &ChaincodeInvocationSpec {
            chaincode_spec: Some(ChaincodeSpec {
                r#type: ChaincodeType::Golang as i32,
                chaincode_id: Some(ChaincodeId {
                    name: chaincode.to_owned(),
                    ..Default::default()
                }),
                input: Some(ChaincodeInput { args }),
                timeout: 0,
            }),
            id_generation_alg: String::new(),
        },
    )
}

/// Index of the last config block, as recorded in `block`'s metadata
///
/// An empty entry decodes to index 0, as found in a genesis block.
pub fn last_config_index(block: &Block) -> ChannelResult<u64> {
    let number = block.number().unwrap_or_default();
    let raw = block
        .metadata
        .as_ref()
        .and_then(|metadata| {
            metadata
                .metadata
                .get(BlockMetadataIndex::LastConfig as usize)
        })
        .ok_or_else(|| ChannelError::MalformedConfigBlock {
            number,
            reason: "block has no last config metadata".to_owned(),
        })?;
    let metadata: Metadata = decode(&format!("metadata of block {number}"), raw)?;
    let last_config: LastConfig =
        decode(&format!("last config of block {number}"), &metadata.value)?;
    Ok(last_config.index)
}

/// Unwrap the config envelope of a config block
pub fn config_envelope_from_block(block: &Block) -> ChannelResult<ConfigEnvelope> {
    let number = block.number().unwrap_or_default();
    let [raw] = block.envelopes() else {
        return Err(ChannelError::MalformedConfigBlock {
            number,
            reason: format!(
                "expected exactly one transaction, found {}",
                block.envelopes().len()
            ),
        });
    };

    let envelope: Envelope = decode(&format!("envelope of block {number}"), raw)?;
    let payload: Payload = decode(&format!("payload of block {number}"), &envelope.payload)?;
    let header = payload
        .header
        .ok_or_else(|| ChannelError::MalformedConfigBlock {
            number,
            reason: "payload has no header".to_owned(),
        })?;
    let channel_header: ChannelHeader = decode(
        &format!("channel header of block {number}"),
        &header.channel_header,
    )?;
    if channel_header.r#type != HeaderType::Config as i32 {
        return Err(ChannelError::WrongBlockType {
            number,
            header_type: channel_header.r#type,
        });
    }
    decode(&format!("config envelope of block {number}"), &payload.data)
}
