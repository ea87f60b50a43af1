//! Fake (in-memory) endorsers and orderers, for tests
//!
//! They implement the same capability traits as real transports, so a
//! channel can be driven end to end without a network.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fabric_core::STATUS_SUCCESS;
use fabric_core::config::HashAlgorithm;
use fabric_core::protos::{
    Block, BroadcastResponse, ChaincodeAction, Endorsement, Envelope, Payload, ProposalResponse,
    ProposalResponsePayload, Response, SeekInfo, SerializedIdentity, SignedProposal, Status,
    Timestamp,
};
use fabric_core::runtime;
use prost::Message as _;
use tokio::sync::oneshot;

use crate::api::{
    DeliverSignals, EndorserError, EndorserResult, IEndorser, IOrderer, OrdererError, OrdererResult,
    SeekSpec,
};

type ProposalHandler = dyn Fn(&SignedProposal) -> EndorserResult<ProposalResponse> + Send + Sync;

/// Build the response an endorser gives after simulating `proposal`
///
/// Every endorser answering the same proposal with the same `status` and
/// `payload` produces the same response payload; only the endorsement
/// differs.
pub fn endorsement_response(
    endorser: &str,
    proposal: &SignedProposal,
    status: i32,
    message: &str,
    payload: Vec<u8>,
) -> ProposalResponse {
    let response = Response {
        status,
        message: message.to_owned(),
        payload,
    };
    let action = ChaincodeAction {
        results: b"simulated read-write set".to_vec(),
        events: vec![],
        response: Some(response.clone()),
        chaincode_id: None,
    };
    let response_payload = ProposalResponsePayload {
        proposal_hash: HashAlgorithm::Sha2.digest(&proposal.proposal_bytes).to_vec(),
        extension: action.encode_to_vec(),
    }
    .encode_to_vec();
    let endorser_identity = SerializedIdentity {
        mspid: "FakeMSP".to_owned(),
        id_bytes: endorser.as_bytes().to_vec(),
    }
    .encode_to_vec();
    let mut signed = response_payload.clone();
    signed.extend_from_slice(&endorser_identity);

    ProposalResponse {
        version: 1,
        timestamp: Some(Timestamp::now()),
        response: Some(response),
        payload: response_payload,
        endorsement: Some(Endorsement {
            endorser: endorser_identity,
            signature: HashAlgorithm::Sha2.digest(&signed).to_vec(),
        }),
    }
}

pub struct FakeEndorser {
    address: String,
    handler: Arc<ProposalHandler>,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl fmt::Debug for FakeEndorser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeEndorser")
            .field("address", &self.address)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl FakeEndorser {
    pub fn with_handler(
        address: impl Into<String>,
        handler: impl Fn(&SignedProposal) -> EndorserResult<ProposalResponse>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            address: address.into(),
            handler: Arc::new(handler),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Endorses every proposal with status 200 and an empty payload
    pub fn endorsing(address: impl Into<String>) -> Self {
        Self::responding(address, STATUS_SUCCESS, vec![])
    }

    pub fn responding(address: impl Into<String>, status: i32, payload: Vec<u8>) -> Self {
        let address = address.into();
        let endorser = address.clone();
        Self::with_handler(address, move |proposal| {
            let message = if status == STATUS_SUCCESS { "OK" } else { "simulation failed" };
            Ok(endorsement_response(
                &endorser,
                proposal,
                status,
                message,
                payload.clone(),
            ))
        })
    }

    /// Fails every proposal at the transport level
    pub fn unreachable(address: impl Into<String>) -> Self {
        let address = address.into();
        let message = format!("{address} is unreachable");
        Self::with_handler(address, move |_| {
            Err(EndorserError::Connection(anyhow::anyhow!(message.clone())))
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of proposals this endorser received so far
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl IEndorser for FakeEndorser {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send_proposal(&self, proposal: &SignedProposal) -> EndorserResult<ProposalResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            runtime::sleep(delay).await;
        }
        (self.handler)(proposal)
    }
}

/// What a [`FakeOrderer`] does with a deliver request
#[derive(Debug, Clone)]
pub enum DeliverBehavior {
    /// Deliver the block after an optional delay
    Block(Block, Option<Duration>),
    Error(String),
    /// Never answer
    Silent,
}

#[derive(Debug, Clone)]
pub enum BroadcastBehavior {
    Accept,
    Reject(Status),
    Unreachable,
}

type DeliverHandler = dyn Fn(Option<SeekSpec>) -> DeliverBehavior + Send + Sync;

pub struct FakeOrderer {
    address: String,
    broadcast: BroadcastBehavior,
    deliver: Arc<DeliverHandler>,
    broadcasts: Arc<Mutex<Vec<Envelope>>>,
    // keeps the signals of silent deliveries pending
    parked: Mutex<Vec<(oneshot::Sender<Block>, oneshot::Sender<OrdererError>)>>,
}

impl fmt::Debug for FakeOrderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeOrderer")
            .field("address", &self.address)
            .field("broadcast", &self.broadcast)
            .finish_non_exhaustive()
    }
}

impl FakeOrderer {
    pub fn with_deliver_handler(
        address: impl Into<String>,
        handler: impl Fn(Option<SeekSpec>) -> DeliverBehavior + Send + Sync + 'static,
    ) -> Self {
        Self {
            address: address.into(),
            broadcast: BroadcastBehavior::Accept,
            deliver: Arc::new(handler),
            broadcasts: Arc::new(Mutex::new(vec![])),
            parked: Mutex::new(vec![]),
        }
    }

    /// Accepts broadcasts; delivers nothing
    pub fn accepting(address: impl Into<String>) -> Self {
        Self::with_deliver_handler(address, |_| DeliverBehavior::Silent)
    }

    /// Serves `blocks` by their number; `Newest` and `Oldest` resolve to the
    /// last and first entry
    pub fn serving_blocks(address: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self::with_deliver_handler(address, move |seek| {
            let found = match seek {
                Some(SeekSpec::Newest) => blocks.last(),
                Some(SeekSpec::Oldest) => blocks.first(),
                Some(SeekSpec::Specified(number)) => {
                    blocks.iter().find(|block| block.number() == Some(number))
                }
                None => None,
            };
            match found {
                Some(block) => DeliverBehavior::Block(block.clone(), None),
                None => DeliverBehavior::Error(format!("block {seek:?} not found")),
            }
        })
    }

    pub fn delivering(address: impl Into<String>, behavior: DeliverBehavior) -> Self {
        Self::with_deliver_handler(address, move |_| behavior.clone())
    }

    pub fn with_broadcast(mut self, broadcast: BroadcastBehavior) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Every envelope broadcast to this orderer so far
    pub fn broadcast_log(&self) -> Arc<Mutex<Vec<Envelope>>> {
        self.broadcasts.clone()
    }

    fn decode_seek(envelope: &Envelope) -> Option<SeekSpec> {
        let payload = Payload::decode(envelope.payload.as_slice()).ok()?;
        let info = SeekInfo::decode(payload.data.as_slice()).ok()?;
        SeekSpec::from_seek_info(&info)
    }
}

#[async_trait]
impl IOrderer for FakeOrderer {
    fn address(&self) -> &str {
        &self.address
    }

    async fn send_broadcast(&self, envelope: &Envelope) -> OrdererResult<BroadcastResponse> {
        self.broadcasts
            .lock()
            .expect("lock poison")
            .push(envelope.clone());
        match &self.broadcast {
            BroadcastBehavior::Accept => Ok(BroadcastResponse {
                status: Status::Success as i32,
                info: String::new(),
            }),
            BroadcastBehavior::Reject(status) => Ok(BroadcastResponse {
                status: *status as i32,
                info: "rejected by fake orderer".to_owned(),
            }),
            BroadcastBehavior::Unreachable => Err(OrdererError::Connection(anyhow::anyhow!(
                "{} is unreachable",
                self.address
            ))),
        }
    }

    fn send_deliver(&self, envelope: &Envelope) -> DeliverSignals {
        let ((block_tx, error_tx), signals) = DeliverSignals::channel();
        match (self.deliver)(Self::decode_seek(envelope)) {
            DeliverBehavior::Block(block, delay) => {
                runtime::spawn("fake deliver", async move {
                    if let Some(delay) = delay {
                        runtime::sleep(delay).await;
                    }
                    let _ = block_tx.send(block);
                });
            }
            DeliverBehavior::Error(message) => {
                let _ = error_tx.send(OrdererError::DeliverFailed(message));
            }
            DeliverBehavior::Silent => {
                self.parked
                    .lock()
                    .expect("lock poison")
                    .push((block_tx, error_tx));
            }
        }
        signals
    }
}
