#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Client side of a permissioned-ledger channel
//!
//! A [`Channel`] tracks the endorsing peers and orderers of one channel,
//! drives transactions from proposal to ordering and loads the channel
//! configuration from its config block.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use fabric_api_client::api::{DynEndorser, DynOrderer};
//! # use fabric_client::{Channel, ClientContext};
//! # async fn invoke(ctx: Arc<ClientContext>, peer: DynEndorser, orderer: DynOrderer)
//! #     -> Result<(), fabric_client::ChannelError> {
//! let channel = Channel::new("mychannel", ctx)?;
//! channel.add_endorser(peer)?;
//! channel.add_orderer(orderer)?;
//!
//! let request = channel.proposal_request("mycc").with_args(["move", "a", "b", "10"]);
//! let proposal = channel.create_transaction_proposal(&request, true)?;
//! let responses = channel.send_transaction_proposal(&proposal, &[]).await?;
//! let transaction = channel.create_transaction(&proposal, &responses)?;
//! channel.send_transaction(&transaction).await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
mod envelope;
pub mod error;
pub mod events;
pub mod identity;
pub mod msp;
pub mod proposal;
pub mod transaction;

pub use channel::{AnchorPeerInfo, Channel, InitState, InstantiateRequest};
pub use error::{ChannelError, ChannelResult};
pub use identity::{ClientContext, DynSigningIdentity, ISigningIdentity};
