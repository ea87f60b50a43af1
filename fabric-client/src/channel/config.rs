//! Deriving channel configuration from config groups
//!
//! A config group holds named sub-groups, values and policies, each with a
//! version. Walking the tree collects the MSPs, anchor peers and orderer
//! addresses it declares, and mirrors the versions of every element into a
//! [`VersionsGroup`] of the same shape.

use std::collections::BTreeMap;

use fabric_core::protos::{
    AnchorPeers, BatchSize, BatchTimeout, BlockDataHashingStructure, ChannelRestrictions,
    ConfigEnvelope, ConfigGroup, ConfigPolicy, ConfigUpdate, ConfigUpdateEnvelope, ConfigValue,
    ConsensusType, Consortium, FabricMspConfig, HashingAlgorithm, ImplicitMetaPolicy, KafkaBrokers,
    MspConfig, MspType, OrdererAddresses, PolicyType, SignaturePolicyEnvelope,
};
use fabric_logging::LOG_CHANNEL_CONFIG;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::envelope::decode;
use crate::error::{ChannelError, ChannelResult};
use crate::msp::FabricMsp;

pub const ANCHOR_PEERS_KEY: &str = "AnchorPeers";
pub const MSP_KEY: &str = "MSP";
pub const ORDERER_ADDRESSES_KEY: &str = "OrdererAddresses";
pub const CONSENSUS_TYPE_KEY: &str = "ConsensusType";
pub const BATCH_SIZE_KEY: &str = "BatchSize";
pub const BATCH_TIMEOUT_KEY: &str = "BatchTimeout";
pub const CHANNEL_RESTRICTIONS_KEY: &str = "ChannelRestrictions";
pub const HASHING_ALGORITHM_KEY: &str = "HashingAlgorithm";
pub const CONSORTIUM_KEY: &str = "Consortium";
pub const BLOCK_DATA_HASHING_STRUCTURE_KEY: &str = "BlockDataHashingStructure";
pub const KAFKA_BROKERS_KEY: &str = "KafkaBrokers";

/// Name of the root group
const CHANNEL_GROUP: &str = "Channel";

/// An externally reachable peer of an organization
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorPeerInfo {
    pub org: String,
    pub host: String,
    pub port: i32,
}

/// Versions of a config group and everything below it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionsGroup {
    pub version: u64,
    pub groups: BTreeMap<String, VersionsGroup>,
    pub values: BTreeMap<String, u64>,
    pub policies: BTreeMap<String, u64>,
}

/// What one derivation found in a config tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigItems {
    pub msps: Vec<FabricMspConfig>,
    pub anchor_peers: Vec<AnchorPeerInfo>,
    pub orderers: Vec<String>,
    pub versions: VersionsGroup,
}

/// Derive from the full config of a config block
pub fn derive_from_config_envelope(envelope: &ConfigEnvelope) -> ChannelResult<ConfigItems> {
    let group = envelope
        .config
        .as_ref()
        .and_then(|config| config.channel_group.as_ref())
        .ok_or_else(|| ChannelError::MalformedConfig {
            reason: "config envelope has no channel group".to_owned(),
        })?;

    let mut items = ConfigItems::default();
    let mut versions = VersionsGroup::default();
    load_group(&mut items, &mut versions, group, CHANNEL_GROUP, "")?;
    items.versions = versions;
    Ok(items)
}

/// Derive from a config update, walking its read set and then its write set
///
/// Both walks write into the same versions tree. A walk replaces the child
/// maps of every group it visits that has children, so a group present in
/// both sets ends up with the write set's children only; elements the read
/// set found below it are dropped. MSPs, anchor peers and orderers are
/// collected by both walks.
pub fn derive_from_config_update(update: &ConfigUpdate) -> ChannelResult<ConfigItems> {
    let mut items = ConfigItems::default();
    let mut versions = VersionsGroup::default();

    if let Some(read_set) = &update.read_set {
        load_group(&mut items, &mut versions, read_set, CHANNEL_GROUP, "")?;
    }
    if let Some(write_set) = &update.write_set {
        load_group(&mut items, &mut versions, write_set, CHANNEL_GROUP, "")?;
    }

    items.versions = versions;
    Ok(items)
}

/// Derive from a serialized [`ConfigUpdateEnvelope`]
pub fn derive_from_config_update_envelope(bytes: &[u8]) -> ChannelResult<ConfigItems> {
    let envelope: ConfigUpdateEnvelope = decode("config update envelope", bytes)?;
    let update: ConfigUpdate = decode("config update", &envelope.config_update)?;
    debug!(
        target: LOG_CHANNEL_CONFIG,
        channel = %update.channel_id,
        signatures = envelope.signatures.len(),
        "Deriving config from config update"
    );
    derive_from_config_update(&update)
}

/// `org` is the name of the group enclosing `group`, empty at the root
fn load_group(
    items: &mut ConfigItems,
    versions: &mut VersionsGroup,
    group: &ConfigGroup,
    name: &str,
    org: &str,
) -> ChannelResult<()> {
    trace!(
        target: LOG_CHANNEL_CONFIG,
        group = %name,
        version = group.version,
        mod_policy = %group.mod_policy,
        "Loading config group"
    );
    versions.version = group.version;

    if !group.groups.is_empty() {
        versions.groups = BTreeMap::new();
        for (key, child) in &group.groups {
            let mut child_versions = VersionsGroup::default();
            load_group(
                items,
                &mut child_versions,
                child,
                &format!("{name}/{key}"),
                key,
            )?;
            versions.groups.insert(key.clone(), child_versions);
        }
    }

    if !group.values.is_empty() {
        versions.values = BTreeMap::new();
        for (key, value) in &group.values {
            load_value(items, key, value, name, org)?;
            versions.values.insert(key.clone(), value.version);
        }
    }

    if !group.policies.is_empty() {
        versions.policies = BTreeMap::new();
        for (key, policy) in &group.policies {
            load_policy(key, policy, name)?;
            versions.policies.insert(key.clone(), policy.version);
        }
    }

    Ok(())
}

fn load_value(
    items: &mut ConfigItems,
    key: &str,
    value: &ConfigValue,
    group: &str,
    org: &str,
) -> ChannelResult<()> {
    let what = format!("config value {group}/{key}");
    let bytes = value.value.as_slice();

    match key {
        ANCHOR_PEERS_KEY => {
            let anchor_peers: AnchorPeers = decode(&what, bytes)?;
            for anchor in anchor_peers.anchor_peers {
                trace!(
                    target: LOG_CHANNEL_CONFIG,
                    %org,
                    host = %anchor.host,
                    port = anchor.port,
                    "Found anchor peer"
                );
                items.anchor_peers.push(AnchorPeerInfo {
                    org: org.to_owned(),
                    host: anchor.host,
                    port: anchor.port,
                });
            }
        }
        MSP_KEY => {
            let msp: MspConfig = decode(&what, bytes)?;
            if msp.r#type != MspType::Fabric as i32 {
                return Err(ChannelError::UnsupportedProvider {
                    key: format!("{group}/{key}"),
                    provider_type: msp.r#type,
                });
            }
            let config: FabricMspConfig = decode(&what, &msp.config)?;
            FabricMsp::validate(&config)?;
            debug!(target: LOG_CHANNEL_CONFIG, msp = %config.name, %group, "Found MSP");
            items.msps.push(config);
        }
        ORDERER_ADDRESSES_KEY => {
            let addresses: OrdererAddresses = decode(&what, bytes)?;
            trace!(
                target: LOG_CHANNEL_CONFIG,
                addresses = ?addresses.addresses,
                "Found orderer addresses"
            );
            items.orderers.extend(addresses.addresses);
        }
        // Decoded to validate them; the channel does not use them
        CONSENSUS_TYPE_KEY => {
            let consensus: ConsensusType = decode(&what, bytes)?;
            trace!(target: LOG_CHANNEL_CONFIG, consensus = %consensus.r#type, "Consensus type");
        }
        BATCH_SIZE_KEY => {
            let batch_size: BatchSize = decode(&what, bytes)?;
            trace!(
                target: LOG_CHANNEL_CONFIG,
                max_message_count = batch_size.max_message_count,
                "Batch size"
            );
        }
        BATCH_TIMEOUT_KEY => {
            let timeout: BatchTimeout = decode(&what, bytes)?;
            trace!(target: LOG_CHANNEL_CONFIG, timeout = %timeout.timeout, "Batch timeout");
        }
        CHANNEL_RESTRICTIONS_KEY => {
            let restrictions: ChannelRestrictions = decode(&what, bytes)?;
            trace!(
                target: LOG_CHANNEL_CONFIG,
                max_count = restrictions.max_count,
                "Channel restrictions"
            );
        }
        HASHING_ALGORITHM_KEY => {
            let algorithm: HashingAlgorithm = decode(&what, bytes)?;
            trace!(target: LOG_CHANNEL_CONFIG, name = %algorithm.name, "Hashing algorithm");
        }
        CONSORTIUM_KEY => {
            let consortium: Consortium = decode(&what, bytes)?;
            trace!(target: LOG_CHANNEL_CONFIG, name = %consortium.name, "Consortium");
        }
        BLOCK_DATA_HASHING_STRUCTURE_KEY => {
            let structure: BlockDataHashingStructure = decode(&what, bytes)?;
            trace!(
                target: LOG_CHANNEL_CONFIG,
                width = structure.width,
                "Block data hashing structure"
            );
        }
        KAFKA_BROKERS_KEY => {
            let brokers: KafkaBrokers = decode(&what, bytes)?;
            trace!(target: LOG_CHANNEL_CONFIG, brokers = ?brokers.brokers, "Kafka brokers");
        }
        _ => {
            debug!(target: LOG_CHANNEL_CONFIG, %group, %key, "Skipping unknown config value");
        }
    }
    Ok(())
}

fn load_policy(key: &str, policy: &ConfigPolicy, group: &str) -> ChannelResult<()> {
    let what = format!("policy {group}/{key}");
    let (policy_type, bytes) = policy
        .policy
        .as_ref()
        .map_or((PolicyType::Unknown as i32, &[][..]), |p| {
            (p.r#type, p.value.as_slice())
        });

    match PolicyType::try_from(policy_type) {
        Ok(PolicyType::Signature) => {
            let envelope: SignaturePolicyEnvelope = decode(&what, bytes)?;
            trace!(
                target: LOG_CHANNEL_CONFIG,
                %group,
                %key,
                identities = envelope.identities.len(),
                "Signature policy"
            );
        }
        Ok(PolicyType::ImplicitMeta) => {
            let implicit: ImplicitMetaPolicy = decode(&what, bytes)?;
            trace!(
                target: LOG_CHANNEL_CONFIG,
                %group,
                %key,
                sub_policy = %implicit.sub_policy,
                rule = implicit.rule,
                "Implicit meta policy"
            );
        }
        _ => {
            return Err(ChannelError::UnsupportedPolicyType {
                key: format!("{group}/{key}"),
                policy_type,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
