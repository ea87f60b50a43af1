//! Membership service providers (MSPs) a channel trusts

use std::collections::BTreeMap;

use fabric_core::protos::FabricMspConfig;
use fabric_logging::LOG_IDENTITY;
use itertools::Itertools as _;
use tracing::debug;

use crate::error::{ChannelError, ChannelResult};

/// A verifying identity provider built from a [`FabricMspConfig`]
#[derive(Debug, Clone)]
pub struct FabricMsp {
    config: FabricMspConfig,
}

impl FabricMsp {
    pub fn new(config: FabricMspConfig) -> ChannelResult<Self> {
        Self::validate(&config)?;
        Ok(Self { config })
    }

    /// Check the minimum an MSP needs to verify anything
    pub fn validate(config: &FabricMspConfig) -> ChannelResult<()> {
        if config.name.is_empty() {
            return Err(ChannelError::InvalidProviderConfig {
                name: config.name.clone(),
                reason: "name is empty".to_owned(),
            });
        }
        if config.root_certs.is_empty() {
            return Err(ChannelError::InvalidProviderConfig {
                name: config.name.clone(),
                reason: "no root certificates".to_owned(),
            });
        }
        Ok(())
    }

    pub fn identifier(&self) -> &str {
        &self.config.name
    }

    pub fn root_certs(&self) -> &[Vec<u8>] {
        &self.config.root_certs
    }

    pub fn organizational_units(&self) -> impl Iterator<Item = &str> {
        self.config
            .organizational_unit_identifiers
            .iter()
            .map(|ou| ou.organizational_unit_identifier.as_str())
    }

    pub fn config(&self) -> &FabricMspConfig {
        &self.config
    }
}

/// The set of MSPs of a channel, keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct MspManager {
    msps: BTreeMap<String, FabricMsp>,
}

impl MspManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the managed MSPs with `configs`
    ///
    /// All configs are validated first; on error nothing changes.
    pub fn setup(&mut self, configs: Vec<FabricMspConfig>) -> ChannelResult<()> {
        let msps = configs
            .into_iter()
            .map(|config| FabricMsp::new(config).map(|msp| (msp.identifier().to_owned(), msp)))
            .collect::<ChannelResult<BTreeMap<_, _>>>()?;

        debug!(
            target: LOG_IDENTITY,
            msps = %msps.keys().join(","),
            "Setting up MSPs"
        );
        self.msps = msps;
        Ok(())
    }

    pub fn msps(&self) -> impl Iterator<Item = &FabricMsp> {
        self.msps.values()
    }

    pub fn msp(&self, identifier: &str) -> Option<&FabricMsp> {
        self.msps.get(identifier)
    }

    pub fn identifiers(&self) -> Vec<String> {
        self.msps.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.msps.is_empty()
    }

    /// Organizational units across all MSPs, sorted and without duplicates
    pub fn organizational_units(&self) -> Vec<String> {
        self.msps
            .values()
            .flat_map(FabricMsp::organizational_units)
            .map(str::to_owned)
            .sorted()
            .dedup()
            .collect()
    }
}
