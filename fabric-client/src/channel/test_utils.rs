//! Config trees and blocks shaped like the ones a network produces

use std::collections::BTreeMap;

use fabric_core::protos::{
    AnchorPeer, AnchorPeers, BatchSize, Block, BlockData, BlockHeader, BlockMetadata,
    BlockMetadataIndex, ChannelHeader, Config, ConfigEnvelope, ConfigGroup, ConfigPolicy,
    ConfigValue, ConsensusType, Envelope, FabricMspConfig, FabricOuIdentifier, HashingAlgorithm,
    Header, HeaderType, ImplicitMetaPolicy, ImplicitMetaRule, LastConfig, Metadata, MspConfig,
    MspType, OrdererAddresses, Payload, Policy, PolicyType, SignaturePolicyEnvelope,
};
use prost::Message as _;

pub fn value(message: &impl prost::Message) -> ConfigValue {
    ConfigValue {
        version: 0,
        value: message.encode_to_vec(),
        mod_policy: "Admins".to_owned(),
    }
}

pub fn anchor_peers_value(peers: &[(&str, i32)]) -> ConfigValue {
    value(&AnchorPeers {
        anchor_peers: peers
            .iter()
            .map(|(host, port)| AnchorPeer {
                host: (*host).to_owned(),
                port: *port,
            })
            .collect(),
    })
}

pub fn fabric_msp_config(name: &str, root_certs: usize) -> FabricMspConfig {
    FabricMspConfig {
        name: name.to_owned(),
        root_certs: (0..root_certs)
            .map(|i| format!("{name} root {i}").into_bytes())
            .collect(),
        organizational_unit_identifiers: vec![FabricOuIdentifier {
            certificate: vec![],
            organizational_unit_identifier: format!("{name}.peer"),
        }],
        ..Default::default()
    }
}

pub fn msp_value(name: &str, root_certs: usize) -> ConfigValue {
    msp_value_of_type(MspType::Fabric as i32, &fabric_msp_config(name, root_certs))
}

pub fn msp_value_of_type(provider_type: i32, config: &FabricMspConfig) -> ConfigValue {
    value(&MspConfig {
        r#type: provider_type,
        config: config.encode_to_vec(),
    })
}

pub fn policy(policy_type: PolicyType) -> ConfigPolicy {
    let value = match policy_type {
        PolicyType::ImplicitMeta => ImplicitMetaPolicy {
            sub_policy: "Admins".to_owned(),
            rule: ImplicitMetaRule::Majority as i32,
        }
        .encode_to_vec(),
        PolicyType::Signature => SignaturePolicyEnvelope::default().encode_to_vec(),
        PolicyType::Unknown | PolicyType::Msp => vec![],
    };
    ConfigPolicy {
        version: 0,
        policy: Some(Policy {
            r#type: policy_type as i32,
            value,
        }),
        mod_policy: "Admins".to_owned(),
    }
}

pub fn group(
    version: u64,
    groups: impl IntoIterator<Item = (&'static str, ConfigGroup)>,
    values: impl IntoIterator<Item = (&'static str, ConfigValue)>,
    policies: impl IntoIterator<Item = (&'static str, ConfigPolicy)>,
) -> ConfigGroup {
    fn owned<T>(entries: impl IntoIterator<Item = (&'static str, T)>) -> BTreeMap<String, T> {
        entries
            .into_iter()
            .map(|(key, entry)| (key.to_owned(), entry))
            .collect()
    }
    ConfigGroup {
        version,
        groups: owned(groups),
        values: owned(values),
        policies: owned(policies),
        mod_policy: "Admins".to_owned(),
    }
}

/// A channel with one application org (`Org1MSP`, anchor peer
/// `peer0.org1:7051`) and one orderer org
pub fn channel_group() -> ConfigGroup {
    let org1 = group(
        1,
        [],
        [
            ("MSP", msp_value("Org1MSP", 1)),
            ("AnchorPeers", anchor_peers_value(&[("peer0.org1", 7051)])),
        ],
        [("Admins", policy(PolicyType::Signature))],
    );
    let application = group(
        1,
        [("Org1MSP", org1)],
        [],
        [("Admins", policy(PolicyType::ImplicitMeta))],
    );
    let orderer_org = group(0, [], [("MSP", msp_value("OrdererMSP", 1))], []);
    let orderer = group(
        0,
        [("OrdererOrg", orderer_org)],
        [
            (
                "ConsensusType",
                value(&ConsensusType {
                    r#type: "solo".to_owned(),
                }),
            ),
            (
                "BatchSize",
                value(&BatchSize {
                    max_message_count: 10,
                    absolute_max_bytes: 99 * 1024 * 1024,
                    preferred_max_bytes: 512 * 1024,
                }),
            ),
        ],
        [("Admins", policy(PolicyType::ImplicitMeta))],
    );
    group(
        0,
        [("Application", application), ("Orderer", orderer)],
        [
            (
                "OrdererAddresses",
                value(&OrdererAddresses {
                    addresses: vec!["orderer0:7050".to_owned()],
                }),
            ),
            (
                "HashingAlgorithm",
                value(&HashingAlgorithm {
                    name: "SHA256".to_owned(),
                }),
            ),
        ],
        [("Admins", policy(PolicyType::ImplicitMeta))],
    )
}

fn envelope(header_type: HeaderType, number: u64, data: Vec<u8>) -> Vec<u8> {
    let channel_header = ChannelHeader {
        r#type: header_type as i32,
        channel_id: "mychannel".to_owned(),
        tx_id: format!("tx{number}"),
        ..Default::default()
    };
    Envelope {
        payload: Payload {
            header: Some(Header {
                channel_header: channel_header.encode_to_vec(),
                signature_header: vec![],
            }),
            data,
        }
        .encode_to_vec(),
        signature: vec![],
    }
    .encode_to_vec()
}

fn metadata(last_config: u64) -> BlockMetadata {
    let mut metadata = vec![vec![]; BlockMetadataIndex::Orderer as usize + 1];
    metadata[BlockMetadataIndex::LastConfig as usize] = Metadata {
        value: LastConfig { index: last_config }.encode_to_vec(),
        signatures: vec![],
    }
    .encode_to_vec();
    BlockMetadata { metadata }
}

pub fn block(number: u64, envelopes: Vec<Vec<u8>>, last_config: u64) -> Block {
    Block {
        header: Some(BlockHeader {
            number,
            previous_hash: vec![],
            data_hash: vec![],
        }),
        data: Some(BlockData { data: envelopes }),
        metadata: Some(metadata(last_config)),
    }
}

pub fn config_envelope(channel_group: ConfigGroup) -> ConfigEnvelope {
    ConfigEnvelope {
        config: Some(Config {
            sequence: 1,
            channel_group: Some(channel_group),
        }),
        last_update: None,
    }
}

pub fn config_block(number: u64, channel_group: ConfigGroup) -> Block {
    let data = config_envelope(channel_group).encode_to_vec();
    block(
        number,
        vec![envelope(HeaderType::Config, number, data)],
        number,
    )
}

pub fn transaction_block(number: u64, last_config: u64) -> Block {
    block(
        number,
        vec![envelope(
            HeaderType::EndorserTransaction,
            number,
            b"tx".to_vec(),
        )],
        last_config,
    )
}
