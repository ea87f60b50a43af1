//! Building and signing transaction proposals

use std::collections::BTreeMap;

use fabric_core::TransactionId;
use fabric_core::fmt_utils::AbbreviateHexBytes;
use fabric_core::protos::{
    ChaincodeHeaderExtension, ChaincodeId, ChaincodeInput, ChaincodeInvocationSpec,
    ChaincodeProposalPayload, ChaincodeSpec, ChaincodeType, Header, HeaderType, Proposal,
    SignatureHeader, SignedProposal,
};
use fabric_logging::LOG_CHANNEL;
use tracing::debug;

use crate::envelope::{MessageOrigin, decode, encode};
use crate::error::{ChannelError, ChannelResult};
use crate::identity::ClientContext;

/// A chaincode invocation to turn into a proposal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProposalRequest {
    pub chaincode_id: String,
    pub channel_id: String,
    /// By convention the first argument names the chaincode function
    pub args: Vec<Vec<u8>>,
    /// Private data passed to the chaincode but never recorded on the ledger
    pub transient: BTreeMap<String, Vec<u8>>,
}

impl ProposalRequest {
    pub fn new(channel_id: impl Into<String>, chaincode_id: impl Into<String>) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
            channel_id: channel_id.into(),
            ..Self::default()
        }
    }

    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.args.extend(args.into_iter().map(|arg| arg.as_ref().to_vec()));
        self
    }

    pub fn with_transient(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.transient.insert(key.into(), value.into());
        self
    }
}

/// A proposal ready to be sent to endorsers, once signed
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionProposal {
    pub tx_id: TransactionId,
    pub proposal: Proposal,
    pub signed: Option<SignedProposal>,
}

impl TransactionProposal {
    pub fn header(&self) -> ChannelResult<Header> {
        decode("proposal header", &self.proposal.header)
    }

    pub fn signature_header(&self) -> ChannelResult<SignatureHeader> {
        decode("signature header", &self.header()?.signature_header)
    }

    pub fn is_signed(&self) -> bool {
        self.signed.is_some()
    }
}

/// Build a proposal invoking `request`, signed with the caller identity when
/// `sign` is set
///
/// Purely local: no network calls.
pub fn build_transaction_proposal(
    ctx: &ClientContext,
    request: &ProposalRequest,
    sign: bool,
) -> ChannelResult<TransactionProposal> {
    let invocation = ChaincodeInvocationSpec {
        chaincode_spec: Some(ChaincodeSpec {
            r#type: ChaincodeType::Golang as i32,
            chaincode_id: Some(ChaincodeId {
                name: request.chaincode_id.clone(),
                ..Default::default()
            }),
            input: Some(ChaincodeInput {
                args: request.args.clone(),
            }),
            timeout: 0,
        }),
        id_generation_alg: String::new(),
    };

    build_chaincode_proposal(
        ctx,
        &request.channel_id,
        &request.chaincode_id,
        encode("invocation spec", &invocation)?,
        request.transient.clone(),
        sign,
    )
}

/// Wrap an already serialized chaincode `input` into a proposal
pub(crate) fn build_chaincode_proposal(
    ctx: &ClientContext,
    channel_id: &str,
    chaincode_id: &str,
    input: Vec<u8>,
    transient_map: BTreeMap<String, Vec<u8>>,
    sign: bool,
) -> ChannelResult<TransactionProposal> {
    let origin = MessageOrigin::new(ctx)?;
    let extension = ChaincodeHeaderExtension {
        payload_visibility: vec![],
        chaincode_id: Some(ChaincodeId {
            name: chaincode_id.to_owned(),
            ..Default::default()
        }),
    };
    let header = origin.header(
        HeaderType::EndorserTransaction,
        channel_id,
        encode("header extension", &extension)?,
    )?;
    let payload = ChaincodeProposalPayload {
        input,
        transient_map,
    };
    let proposal = Proposal {
        header: encode("proposal header", &header)?,
        payload: encode("proposal payload", &payload)?,
        extension: vec![],
    };

    let signed = if sign {
        Some(sign_proposal(ctx, &proposal)?)
    } else {
        None
    };

    debug!(
        target: LOG_CHANNEL,
        tx_id = %origin.tx_id,
        channel = %channel_id,
        chaincode = %chaincode_id,
        signed = sign,
        "Built proposal"
    );

    Ok(TransactionProposal {
        tx_id: origin.tx_id,
        proposal,
        signed,
    })
}

pub fn sign_proposal(ctx: &ClientContext, proposal: &Proposal) -> ChannelResult<SignedProposal> {
    let proposal_bytes = encode("proposal", proposal)?;
    let signature = ctx
        .sign(&proposal_bytes)
        .map_err(|error| ChannelError::Signing {
            what: "proposal",
            error,
        })?;
    debug!(
        target: LOG_CHANNEL,
        signature = %AbbreviateHexBytes(&signature),
        "Signed proposal"
    );
    Ok(SignedProposal {
        proposal_bytes,
        signature,
    })
}
