#![deny(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

//! Constants for categorizing the logging type
//!
//! To help stabilize logging targets, avoid typos and improve consistency,
//! it's preferable for logging statements use static target constants,
//! that we define in this module.
//!
//! All targets live under `fabric::`, grouped by component, so a whole
//! component can be filtered at once, e.g.
//! `RUST_LOG=fabric::channel=debug,fabric::net=trace`.

use std::env;

use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, Layer as _};

pub const LOG_TASK: &str = "fabric::task";
/// Channel membership, proposal and transaction flow
pub const LOG_CHANNEL: &str = "fabric::channel";
/// Configuration block derivation
pub const LOG_CHANNEL_CONFIG: &str = "fabric::channel::config";
pub const LOG_NET_ENDORSER: &str = "fabric::net::endorser";
pub const LOG_NET_ORDERER: &str = "fabric::net::orderer";
pub const LOG_IDENTITY: &str = "fabric::identity";

/// Consolidates the setup of tracing into an easy-to-use builder.
#[derive(Default)]
pub struct TracingSetup {
    base_level: Option<String>,
    extra_directives: Option<String>,
    with_ansi: Option<bool>,
}

impl TracingSetup {
    /// Sets the log level applied to most modules. Some overly chatty modules
    /// are muted even if this is set to a lower log level, use the `RUST_LOG`
    /// environment variable to override.
    pub fn with_base_level(&mut self, level: impl Into<String>) -> &mut Self {
        self.base_level = Some(level.into());
        self
    }

    /// Add a filter directive.
    pub fn with_directive(&mut self, directive: &str) -> &mut Self {
        if let Some(old) = self.extra_directives.as_mut() {
            *old = format!("{old},{directive}");
        } else {
            self.extra_directives = Some(directive.to_owned());
        }
        self
    }

    pub fn with_ansi(&mut self, enabled: bool) -> &mut Self {
        self.with_ansi = Some(enabled);
        self
    }

    /// Initialize the logging, must be called for tracing to begin
    pub fn init(&mut self) -> anyhow::Result<()> {
        let var = env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default();
        let filter_layer = EnvFilter::builder().parse(format!(
            // We prefix everything with a default general log level and
            // good per-module specific default. User provided RUST_LOG
            // can override one or both
            "{},{},{},{}",
            self.base_level.as_deref().unwrap_or("info"),
            "fabric::net=warn",
            var,
            self.extra_directives.as_deref().unwrap_or(""),
        ))?;

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_thread_names(false)
            .with_ansi(self.with_ansi.unwrap_or(true))
            .with_writer(std::io::stderr)
            .with_filter(filter_layer);

        tracing_subscriber::registry().with(fmt_layer).try_init()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_accumulate() {
        let mut setup = TracingSetup::default();
        setup
            .with_directive("fabric::channel=debug")
            .with_directive("fabric::net=trace");
        assert_eq!(
            setup.extra_directives.as_deref(),
            Some("fabric::channel=debug,fabric::net=trace")
        );
    }

    #[test]
    fn init_installs_global_subscriber_once() {
        let mut setup = TracingSetup::default();
        setup.with_base_level("debug").with_ansi(false);
        assert!(setup.init().is_ok());
        assert!(setup.init().is_err());
    }
}
