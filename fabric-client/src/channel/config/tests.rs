use fabric_core::protos::{ConfigUpdateEnvelope, MspType, PolicyType};
use prost::Message as _;

use super::*;
use crate::channel::test_utils::{
    anchor_peers_value, channel_group, config_envelope, fabric_msp_config, group, msp_value,
    msp_value_of_type, policy, value,
};

fn org_group(org_version: u64, anchor: (&str, i32)) -> ConfigGroup {
    group(
        org_version,
        [],
        [("AnchorPeers", anchor_peers_value(&[anchor]))],
        [],
    )
}

#[test]
fn full_config_collects_msps_anchors_and_orderers() -> anyhow::Result<()> {
    let items = derive_from_config_envelope(&config_envelope(channel_group()))?;

    let msp_names = items.msps.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
    assert_eq!(msp_names, vec!["Org1MSP", "OrdererMSP"]);
    assert_eq!(
        items.anchor_peers,
        vec![AnchorPeerInfo {
            org: "Org1MSP".to_owned(),
            host: "peer0.org1".to_owned(),
            port: 7051,
        }]
    );
    assert_eq!(items.orderers, vec!["orderer0:7050"]);
    Ok(())
}

#[test]
fn versions_mirror_the_config_tree() -> anyhow::Result<()> {
    let items = derive_from_config_envelope(&config_envelope(channel_group()))?;
    let versions = &items.versions;

    assert_eq!(
        versions.groups.keys().collect::<Vec<_>>(),
        vec!["Application", "Orderer"]
    );
    let application = &versions.groups["Application"];
    assert_eq!(application.version, 1);
    assert_eq!(application.policies["Admins"], 0);
    let org1 = &application.groups["Org1MSP"];
    assert_eq!(org1.version, 1);
    assert_eq!(
        org1.values.keys().collect::<Vec<_>>(),
        vec!["AnchorPeers", "MSP"]
    );
    assert!(versions.values.contains_key("OrdererAddresses"));
    Ok(())
}

#[test]
fn write_set_anchor_peer_is_tagged_with_org() -> anyhow::Result<()> {
    let update = ConfigUpdate {
        channel_id: "mychannel".to_owned(),
        read_set: None,
        write_set: Some(group(
            0,
            [(
                "Application",
                group(0, [("org1", org_group(1, ("h", 7051)))], [], []),
            )],
            [],
            [],
        )),
    };

    let items = derive_from_config_update(&update)?;

    assert_eq!(
        items.anchor_peers,
        vec![AnchorPeerInfo {
            org: "org1".to_owned(),
            host: "h".to_owned(),
            port: 7051,
        }]
    );
    Ok(())
}

#[test]
fn write_set_replaces_read_set_children() -> anyhow::Result<()> {
    let read_set = group(
        0,
        [(
            "Application",
            group(
                0,
                [
                    ("org1", org_group(0, ("old.org1", 7051))),
                    ("org2", org_group(0, ("peer.org2", 8051))),
                ],
                [],
                [],
            ),
        )],
        [],
        [],
    );
    let write_set = group(
        0,
        [(
            "Application",
            group(1, [("org1", org_group(1, ("new.org1", 7051)))], [], []),
        )],
        [],
        [],
    );
    let update = ConfigUpdate {
        channel_id: "mychannel".to_owned(),
        read_set: Some(read_set),
        write_set: Some(write_set),
    };

    let items = derive_from_config_update(&update)?;

    let application = &items.versions.groups["Application"];
    assert_eq!(application.version, 1);
    // org2 only appeared in the read set and is gone
    assert_eq!(application.groups.keys().collect::<Vec<_>>(), vec!["org1"]);
    assert_eq!(application.groups["org1"].version, 1);

    // both walks contribute their anchor peers
    let hosts = items
        .anchor_peers
        .iter()
        .map(|a| a.host.as_str())
        .collect::<Vec<_>>();
    assert_eq!(hosts, vec!["old.org1", "peer.org2", "new.org1"]);
    Ok(())
}

#[test]
fn empty_write_set_keeps_read_set_versions() -> anyhow::Result<()> {
    let update = ConfigUpdate {
        channel_id: "mychannel".to_owned(),
        read_set: Some(group(
            3,
            [("Application", group(2, [], [], []))],
            [],
            [],
        )),
        write_set: Some(group(4, [], [], [])),
    };

    let items = derive_from_config_update(&update)?;

    assert_eq!(items.versions.version, 4);
    assert_eq!(items.versions.groups["Application"].version, 2);
    Ok(())
}

#[test]
fn msp_without_root_certs_is_rejected() {
    let org = group(0, [], [("MSP", msp_value("Org1MSP", 0))], []);
    let tree = group(0, [("Org1MSP", org)], [], []);

    let err = derive_from_config_envelope(&config_envelope(tree)).expect_err("no root certs");
    assert!(matches!(
        err,
        ChannelError::InvalidProviderConfig { ref name, .. } if name == "Org1MSP"
    ));
}

#[test]
fn unknown_provider_type_is_rejected() {
    let msp = msp_value_of_type(MspType::Fabric as i32 + 1, &fabric_msp_config("Org1MSP", 1));
    let tree = group(0, [("Org1MSP", group(0, [], [("MSP", msp)], []))], [], []);

    let err = derive_from_config_envelope(&config_envelope(tree)).expect_err("unknown provider");
    assert!(matches!(
        err,
        ChannelError::UnsupportedProvider {
            ref key,
            provider_type: 1,
        } if key == "Channel/Org1MSP/MSP"
    ));
}

#[test]
fn unknown_policy_type_is_rejected() {
    let tree = group(0, [], [], [("Readers", policy(PolicyType::Msp))]);

    let err = derive_from_config_envelope(&config_envelope(tree)).expect_err("msp policy");
    assert!(matches!(
        err,
        ChannelError::UnsupportedPolicyType { policy_type: 2, .. }
    ));
}

#[test]
fn policy_without_body_is_rejected() {
    let mut readers = policy(PolicyType::Signature);
    readers.policy = None;
    let tree = group(0, [], [], [("Readers", readers)]);

    assert!(matches!(
        derive_from_config_envelope(&config_envelope(tree)),
        Err(ChannelError::UnsupportedPolicyType { policy_type: 0, .. })
    ));
}

#[test]
fn unknown_values_are_skipped_and_bad_known_values_fail() {
    let unknown = ConfigValue {
        value: b"\xff\xff".to_vec(),
        ..value(&OrdererAddresses::default())
    };
    let tree = group(0, [], [("Capabilities", unknown.clone())], []);
    assert!(derive_from_config_envelope(&config_envelope(tree)).is_ok());

    let tree = group(0, [], [("BatchSize", unknown)], []);
    assert!(matches!(
        derive_from_config_envelope(&config_envelope(tree)),
        Err(ChannelError::Decode { ref what, .. }) if what == "config value Channel/BatchSize"
    ));
}

#[test]
fn envelope_without_channel_group_is_malformed() {
    assert!(matches!(
        derive_from_config_envelope(&ConfigEnvelope::default()),
        Err(ChannelError::MalformedConfig { .. })
    ));
}

#[test]
fn config_update_envelope_is_unwrapped() -> anyhow::Result<()> {
    let update = ConfigUpdate {
        channel_id: "mychannel".to_owned(),
        read_set: None,
        write_set: Some(channel_group()),
    };
    let bytes = ConfigUpdateEnvelope {
        config_update: update.encode_to_vec(),
        signatures: vec![],
    }
    .encode_to_vec();

    let items = derive_from_config_update_envelope(&bytes)?;
    assert_eq!(items, derive_from_config_update(&update)?);
    assert_eq!(items.orderers, vec!["orderer0:7050"]);
    Ok(())
}
