#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

//! Types and utilities shared by the channel client crates
//!
//! Wire messages live in [`protos`]; [`runtime`] and [`task`] wrap the async
//! executor; [`config`] holds the explicit client configuration.

pub mod config;
pub mod envs;
pub mod fmt_utils;
pub mod protos;
pub mod runtime;
pub mod task;
pub mod txid;

pub use txid::TransactionId;

/// Status code an endorser uses for a successful simulation
pub const STATUS_SUCCESS: i32 = 200;

/// Network address of a peer or orderer, e.g. `grpcs://peer0.org1:7051`
pub type NodeAddress = String;
