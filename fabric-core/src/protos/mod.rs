//! Wire messages exchanged with endorsing peers and ordering nodes
//!
//! These mirror the protobuf schema the network speaks. They are declared
//! by hand with `prost` derives instead of being generated by a build
//! script, so the crate builds without `protoc`.

mod common;
mod msp;
mod orderer;
mod peer;

use std::time::{SystemTime, UNIX_EPOCH};

pub use common::*;
pub use msp::*;
pub use orderer::*;
pub use peer::*;

/// `google.protobuf.Timestamp`
#[derive(Clone, Copy, PartialEq, Eq, ::prost::Message)]
pub struct Timestamp {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            seconds: i64::try_from(since_epoch.as_secs()).unwrap_or(i64::MAX),
            nanos: i32::try_from(since_epoch.subsec_nanos()).unwrap_or_default(),
        }
    }
}
