//! Headers, payloads and envelopes shared by proposals, transactions and
//! deliver requests

use fabric_api_client::api::SeekSpec;
use fabric_core::TransactionId;
use fabric_core::protos::{
    ChannelHeader, Envelope, Header, HeaderType, Payload, SignatureHeader, Timestamp,
};
use fabric_core::txid::generate_nonce;
use prost::Message;

use crate::error::{ChannelError, ChannelResult};
use crate::identity::ClientContext;

pub(crate) fn encode<M: Message>(what: &'static str, message: &M) -> ChannelResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(message.encoded_len());
    message
        .encode(&mut buf)
        .map_err(|error| ChannelError::Serialization { what, error })?;
    Ok(buf)
}

pub(crate) fn decode<M: Message + Default>(what: &str, bytes: &[u8]) -> ChannelResult<M> {
    M::decode(bytes).map_err(ChannelError::decode(what))
}

/// Creator, nonce and transaction id of a new message from the caller
pub(crate) struct MessageOrigin {
    pub creator: Vec<u8>,
    pub nonce: Vec<u8>,
    pub tx_id: TransactionId,
}

impl MessageOrigin {
    pub fn new(ctx: &ClientContext) -> ChannelResult<Self> {
        let creator = ctx.creator().map_err(ChannelError::Identity)?;
        let nonce = generate_nonce();
        let tx_id = TransactionId::compute(&nonce, &creator, ctx.config.hash_algorithm);
        Ok(Self {
            creator,
            nonce,
            tx_id,
        })
    }

    pub fn header(
        &self,
        header_type: HeaderType,
        channel_id: &str,
        extension: Vec<u8>,
    ) -> ChannelResult<Header> {
        let channel_header = ChannelHeader {
            r#type: header_type as i32,
            version: 1,
            timestamp: Some(Timestamp::now()),
            channel_id: channel_id.to_owned(),
            tx_id: self.tx_id.to_string(),
            epoch: 0,
            extension,
        };
        let signature_header = SignatureHeader {
            creator: self.creator.clone(),
            nonce: self.nonce.clone(),
        };
        Ok(Header {
            channel_header: encode("channel header", &channel_header)?,
            signature_header: encode("signature header", &signature_header)?,
        })
    }
}

/// Serialize `payload` and sign it as the caller
pub(crate) fn signed_envelope(ctx: &ClientContext, payload: &Payload) -> ChannelResult<Envelope> {
    let payload = encode("payload", payload)?;
    let signature = ctx.sign(&payload).map_err(|error| ChannelError::Signing {
        what: "envelope",
        error,
    })?;
    Ok(Envelope { payload, signature })
}

/// Signed request for the single block `seek` on `channel_id`
pub(crate) fn deliver_envelope(
    ctx: &ClientContext,
    channel_id: &str,
    seek: SeekSpec,
) -> ChannelResult<Envelope> {
    let origin = MessageOrigin::new(ctx)?;
    let payload = Payload {
        header: Some(origin.header(HeaderType::DeliverSeekInfo, channel_id, vec![])?),
        data: encode("seek info", &seek.to_seek_info())?,
    };
    signed_envelope(ctx, &payload)
}
