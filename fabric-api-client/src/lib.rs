#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Talking to the nodes of a channel
//!
//! [`api`] defines what an endorsing peer and an ordering node can do, and
//! the concurrent fan-out over many of them. [`fake`] holds in-memory nodes
//! for tests.

pub mod api;
pub mod fake;
