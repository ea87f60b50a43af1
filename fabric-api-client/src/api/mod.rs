mod error;

use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
pub use error::*;
use fabric_core::protos::{
    Block, BroadcastResponse, Envelope, ProposalResponse, SeekBehavior, SeekInfo, SeekNewest,
    SeekOldest, SeekPosition, SeekSpecified, SignedProposal, Status, seek_position,
};
use fabric_core::task::TaskGroup;
use fabric_core::task::waiter::Waiter;
use fabric_core::{NodeAddress, STATUS_SUCCESS, runtime};
use fabric_logging::{LOG_NET_ENDORSER, LOG_NET_ORDERER};
use futures::StreamExt as _;
use futures::stream::FuturesUnordered;
use tokio::sync::oneshot;
use tracing::{debug, trace};

pub type DynEndorser = Arc<dyn IEndorser>;
pub type DynOrderer = Arc<dyn IOrderer>;

/// A peer that can simulate and endorse transaction proposals
///
/// Implementations own the transport to a single peer, including any
/// timeouts; callers never add their own.
#[async_trait]
pub trait IEndorser: Debug + Send + Sync + 'static {
    /// Address the peer is registered under, unique within a channel
    fn address(&self) -> &str;

    async fn send_proposal(&self, proposal: &SignedProposal) -> EndorserResult<ProposalResponse>;

    /// Convert the struct to trait object.
    fn into_dyn(self) -> DynEndorser
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// Two one-shot signals produced by opening a deliver stream: at most one of
/// them is expected to fire
#[derive(Debug)]
pub struct DeliverSignals {
    pub block: oneshot::Receiver<Block>,
    pub error: oneshot::Receiver<OrdererError>,
}

impl DeliverSignals {
    /// Create the signals together with the sending halves an implementation
    /// completes
    pub fn channel() -> (
        (oneshot::Sender<Block>, oneshot::Sender<OrdererError>),
        Self,
    ) {
        let (block_tx, block) = oneshot::channel();
        let (error_tx, error) = oneshot::channel();
        ((block_tx, error_tx), Self { block, error })
    }
}

/// An ordering node
#[async_trait]
pub trait IOrderer: Debug + Send + Sync + 'static {
    fn address(&self) -> &str;

    /// Submit an envelope for ordering and wait for the acknowledgement
    async fn send_broadcast(&self, envelope: &Envelope) -> OrdererResult<BroadcastResponse>;

    /// Open a deliver stream for the seek request in `envelope`
    ///
    /// Must not block: the request runs in the background and completes one
    /// of the returned signals.
    fn send_deliver(&self, envelope: &Envelope) -> DeliverSignals;

    fn into_dyn(self) -> DynOrderer
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

/// Outcome of sending a proposal to one endorser
///
/// Failures are recorded here rather than returned, so a collection of these
/// always has one entry per addressed endorser.
#[derive(Debug)]
pub struct TransactionProposalResponse {
    pub endorser: NodeAddress,
    pub status: i32,
    pub payload: Vec<u8>,
    pub response: Option<ProposalResponse>,
    pub error: Option<EndorserError>,
}

impl TransactionProposalResponse {
    pub fn from_result(endorser: &str, result: EndorserResult<ProposalResponse>) -> Self {
        match result {
            Ok(response) => {
                let (status, payload) = response
                    .response
                    .as_ref()
                    .map(|r| (r.status, r.payload.clone()))
                    .unwrap_or_default();
                Self {
                    endorser: endorser.to_owned(),
                    status,
                    payload,
                    response: Some(response),
                    error: None,
                }
            }
            Err(error) => Self {
                endorser: endorser.to_owned(),
                status: 0,
                payload: vec![],
                response: None,
                error: Some(error),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.status == STATUS_SUCCESS
    }

    /// Message the endorser attached to its response, or the error
    pub fn message(&self) -> String {
        match (&self.error, &self.response) {
            (Some(error), _) => error.to_string(),
            (None, Some(response)) => response
                .response
                .as_ref()
                .map(|r| r.message.clone())
                .unwrap_or_default(),
            (None, None) => String::new(),
        }
    }
}

/// Outcome of broadcasting an envelope to one orderer
#[derive(Debug)]
pub struct TransactionResponse {
    pub orderer: NodeAddress,
    pub error: Option<OrdererError>,
}

impl TransactionResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Which block a deliver request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekSpec {
    Oldest,
    Newest,
    Specified(u64),
}

impl SeekSpec {
    /// Seek request for exactly this one block, waiting until it exists
    pub fn to_seek_info(self) -> SeekInfo {
        let position = SeekPosition {
            r#type: Some(match self {
                SeekSpec::Oldest => seek_position::Type::Oldest(SeekOldest {}),
                SeekSpec::Newest => seek_position::Type::Newest(SeekNewest {}),
                SeekSpec::Specified(number) => {
                    seek_position::Type::Specified(SeekSpecified { number })
                }
            }),
        };
        SeekInfo {
            start: Some(position),
            stop: Some(position),
            behavior: SeekBehavior::BlockUntilReady as i32,
        }
    }

    pub fn from_seek_info(info: &SeekInfo) -> Option<Self> {
        match info.start.as_ref()?.r#type? {
            seek_position::Type::Oldest(_) => Some(SeekSpec::Oldest),
            seek_position::Type::Newest(_) => Some(SeekSpec::Newest),
            seek_position::Type::Specified(SeekSpecified { number }) => {
                Some(SeekSpec::Specified(number))
            }
        }
    }
}

/// Send `proposal` to every target concurrently and collect one response per
/// target
///
/// Never fails as a whole: a failing endorser shows up as an error-valued
/// entry. Returns after every target answered, in completion order.
pub async fn send_proposal_to_all(
    targets: &[DynEndorser],
    proposal: &SignedProposal,
) -> Vec<TransactionProposalResponse> {
    let mut futures = targets
        .iter()
        .map(|endorser| async move {
            let result = endorser.send_proposal(proposal).await;
            if let Err(error) = &result {
                error.report_if_important(endorser.address());
            }
            TransactionProposalResponse::from_result(endorser.address(), result)
        })
        .collect::<FuturesUnordered<_>>();

    let mut responses = Vec::with_capacity(targets.len());
    while let Some(response) = futures.next().await {
        trace!(
            target: LOG_NET_ENDORSER,
            endorser = %response.endorser,
            status = response.status,
            failed = response.error.is_some(),
            "Received proposal response"
        );
        responses.push(response);
    }

    debug_assert_eq!(responses.len(), targets.len());
    responses
}

/// Broadcast `envelope` to every orderer concurrently, one response each
pub async fn broadcast_to_all(
    orderers: &[DynOrderer],
    envelope: &Envelope,
) -> Vec<TransactionResponse> {
    let mut futures = orderers
        .iter()
        .map(|orderer| async move {
            let error = match orderer.send_broadcast(envelope).await {
                Ok(ack) if ack.status == Status::Success as i32 => None,
                Ok(ack) => Some(OrdererError::Rejected {
                    status: ack.status,
                    info: ack.info,
                }),
                Err(error) => Some(error),
            };
            if let Some(error) = &error {
                error.report_if_important(orderer.address());
            }
            TransactionResponse {
                orderer: orderer.address().to_owned(),
                error,
            }
        })
        .collect::<FuturesUnordered<_>>();

    let mut responses = Vec::with_capacity(orderers.len());
    while let Some(response) = futures.next().await {
        responses.push(response);
    }
    responses
}

#[derive(Debug)]
struct DeliverState {
    block: Option<Block>,
    last_error: Option<(NodeAddress, OrdererError)>,
    outstanding: usize,
}

/// Ask every orderer for the block described by `envelope` and return the
/// first one delivered
///
/// Each orderer gets `timeout` to answer, after which it counts as failed.
/// The call returns as soon as one block arrives; the remaining requests are
/// not waited for; they are told to stop and finish in the background. Only
/// when every orderer failed does the call fail, reporting the last error
/// seen.
pub async fn retrieve_first_block(
    orderers: &[DynOrderer],
    envelope: &Envelope,
    timeout: Duration,
) -> Result<Block, DeliverError> {
    if orderers.is_empty() {
        return Err(DeliverError::NoOrderers);
    }

    let state = Arc::new(Mutex::new(DeliverState {
        block: None,
        last_error: None,
        outstanding: orderers.len(),
    }));
    let done = Arc::new(Waiter::new());
    let tg = TaskGroup::new();

    for orderer in orderers {
        let address = orderer.address().to_owned();
        let DeliverSignals { block, error } = orderer.send_deliver(envelope);
        let state = state.clone();
        let done = done.clone();

        tg.spawn(format!("deliver from {address}"), move |handle| async move {
            let outcome = tokio::select! {
                Ok(block) = block => Ok(block),
                Ok(error) = error => Err(error),
                () = runtime::sleep(timeout) => Err(OrdererError::Timeout(timeout)),
                () = handle.make_shutdown_rx() => {
                    trace!(target: LOG_NET_ORDERER, %address, "Block already delivered, stopping");
                    return;
                }
            };

            let mut state = state.lock().expect("lock poison");
            match outcome {
                Ok(block) => {
                    if state.block.is_none() {
                        debug!(
                            target: LOG_NET_ORDERER,
                            %address,
                            number = ?block.number(),
                            "Received block"
                        );
                        state.block = Some(block);
                        done.done();
                    } else {
                        trace!(
                            target: LOG_NET_ORDERER,
                            %address,
                            "Ignoring block, already have one"
                        );
                    }
                }
                Err(error) => {
                    error.report_if_important(&address);
                    state.outstanding -= 1;
                    state.last_error = Some((address, error));
                    if state.outstanding == 0 && state.block.is_none() {
                        done.done();
                    }
                }
            }
        });
    }

    done.wait().await;
    // Stragglers are signalled but not joined
    tg.shutdown();

    let mut state = state.lock().expect("lock poison");
    if let Some(block) = state.block.take() {
        return Ok(block);
    }
    match state.last_error.take() {
        Some((address, last)) => Err(DeliverError::AllFailed {
            count: orderers.len(),
            address,
            last,
        }),
        None => Err(DeliverError::EmptyOutcome),
    }
}

#[cfg(test)]
mod tests;
