use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use fabric_core::STATUS_SUCCESS;
use fabric_core::protos::{Block, BlockHeader, Envelope, SignedProposal, Status};

use super::*;
use crate::fake::{BroadcastBehavior, DeliverBehavior, FakeEndorser, FakeOrderer};

fn proposal() -> SignedProposal {
    SignedProposal {
        proposal_bytes: b"proposal".to_vec(),
        signature: b"signature".to_vec(),
    }
}

fn block(number: u64) -> Block {
    Block {
        header: Some(BlockHeader {
            number,
            previous_hash: vec![],
            data_hash: vec![],
        }),
        data: None,
        metadata: None,
    }
}

#[test_log::test(tokio::test)]
async fn one_response_per_endorser() {
    let targets = vec![
        FakeEndorser::endorsing("peer0").into_dyn(),
        FakeEndorser::responding("peer1", 500, vec![]).into_dyn(),
        FakeEndorser::unreachable("peer2").into_dyn(),
        FakeEndorser::endorsing("peer3")
            .with_delay(Duration::from_millis(20))
            .into_dyn(),
    ];

    let responses = send_proposal_to_all(&targets, &proposal()).await;

    assert_eq!(responses.len(), 4);
    let endorsers = responses
        .iter()
        .map(|r| r.endorser.as_str())
        .collect::<BTreeSet<_>>();
    assert_eq!(
        endorsers,
        BTreeSet::from(["peer0", "peer1", "peer2", "peer3"])
    );

    let by_name = |name: &str| {
        responses
            .iter()
            .find(|r| r.endorser == name)
            .expect("response present")
    };
    assert!(by_name("peer0").is_success());
    assert_eq!(by_name("peer0").status, STATUS_SUCCESS);
    assert!(!by_name("peer1").is_success());
    assert_eq!(by_name("peer1").status, 500);
    assert!(matches!(
        by_name("peer2").error,
        Some(EndorserError::Connection(_))
    ));
    assert!(by_name("peer2").message().contains("unreachable"));
}

#[test_log::test(tokio::test)]
async fn single_endorser_is_called_once() {
    let endorser = FakeEndorser::endorsing("peer0");
    let calls = endorser.call_counter();

    let responses = send_proposal_to_all(&[endorser.into_dyn()], &proposal()).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test_log::test(tokio::test)]
async fn no_endorsers_no_responses() {
    assert!(send_proposal_to_all(&[], &proposal()).await.is_empty());
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn many_endorsers_lose_no_responses() {
    const TARGETS: usize = 10_000;
    let targets = (0..TARGETS)
        .map(|i| {
            if i % 7 == 0 {
                FakeEndorser::unreachable(format!("peer{i}")).into_dyn()
            } else {
                FakeEndorser::endorsing(format!("peer{i}")).into_dyn()
            }
        })
        .collect::<Vec<_>>();

    let responses = send_proposal_to_all(&targets, &proposal()).await;

    assert_eq!(responses.len(), TARGETS);
    let unique = responses
        .iter()
        .map(|r| r.endorser.as_str())
        .collect::<BTreeSet<_>>();
    assert_eq!(unique.len(), TARGETS);
    assert_eq!(
        responses.iter().filter(|r| r.error.is_some()).count(),
        TARGETS.div_ceil(7)
    );
}

#[test_log::test(tokio::test)]
async fn broadcast_reports_rejections_per_orderer() {
    let accepting = FakeOrderer::accepting("orderer0");
    let log = accepting.broadcast_log();
    let orderers = vec![
        accepting.into_dyn(),
        FakeOrderer::accepting("orderer1")
            .with_broadcast(BroadcastBehavior::Reject(Status::BadRequest))
            .into_dyn(),
        FakeOrderer::accepting("orderer2")
            .with_broadcast(BroadcastBehavior::Unreachable)
            .into_dyn(),
    ];
    let envelope = Envelope {
        payload: b"payload".to_vec(),
        signature: b"sig".to_vec(),
    };

    let responses = broadcast_to_all(&orderers, &envelope).await;

    assert_eq!(responses.len(), 3);
    let by_name = |name: &str| {
        responses
            .iter()
            .find(|r| r.orderer == name)
            .expect("response present")
    };
    assert!(by_name("orderer0").is_success());
    assert!(matches!(
        by_name("orderer1").error,
        Some(OrdererError::Rejected { status: 400, .. })
    ));
    assert!(matches!(
        by_name("orderer2").error,
        Some(OrdererError::Connection(_))
    ));
    assert_eq!(log.lock().expect("lock poison").as_slice(), &[envelope]);
}

#[test_log::test(tokio::test)]
async fn first_delivered_block_wins() -> anyhow::Result<()> {
    let orderers = vec![
        FakeOrderer::delivering("orderer0", DeliverBehavior::Silent).into_dyn(),
        FakeOrderer::delivering(
            "orderer1",
            DeliverBehavior::Block(block(7), Some(Duration::from_millis(10))),
        )
        .into_dyn(),
        FakeOrderer::delivering("orderer2", DeliverBehavior::Silent).into_dyn(),
    ];

    let start = Instant::now();
    let block = retrieve_first_block(
        &orderers,
        &Envelope::default(),
        Duration::from_secs(5),
    )
    .await?;

    assert_eq!(block.number(), Some(7));
    // silent orderers are not waited for
    assert!(start.elapsed() < Duration::from_secs(2));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn block_wins_over_earlier_errors() -> anyhow::Result<()> {
    let orderers = vec![
        FakeOrderer::delivering("orderer0", DeliverBehavior::Error("gone".into())).into_dyn(),
        FakeOrderer::delivering("orderer1", DeliverBehavior::Error("gone".into())).into_dyn(),
        FakeOrderer::delivering(
            "orderer2",
            DeliverBehavior::Block(block(1), Some(Duration::from_millis(20))),
        )
        .into_dyn(),
    ];

    let block = retrieve_first_block(
        &orderers,
        &Envelope::default(),
        Duration::from_secs(5),
    )
    .await?;

    assert_eq!(block.number(), Some(1));
    Ok(())
}

#[test_log::test(tokio::test)]
async fn all_orderers_failing_reports_last_error() {
    let orderers = vec![
        FakeOrderer::delivering("orderer0", DeliverBehavior::Error("no such block".into()))
            .into_dyn(),
        FakeOrderer::delivering("orderer1", DeliverBehavior::Error("no such block".into()))
            .into_dyn(),
    ];

    let err = retrieve_first_block(&orderers, &Envelope::default(), Duration::from_secs(5))
        .await
        .expect_err("no orderer delivers");

    match err {
        DeliverError::AllFailed {
            count,
            address,
            last,
        } => {
            assert_eq!(count, 2);
            assert!(address == "orderer0" || address == "orderer1");
            assert!(matches!(last, OrdererError::DeliverFailed(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn silent_orderers_time_out() {
    let orderers = vec![
        FakeOrderer::delivering("orderer0", DeliverBehavior::Silent).into_dyn(),
        FakeOrderer::delivering("orderer1", DeliverBehavior::Silent).into_dyn(),
    ];

    let err = retrieve_first_block(&orderers, &Envelope::default(), Duration::from_secs(5))
        .await
        .expect_err("nobody answers");

    assert!(matches!(
        err,
        DeliverError::AllFailed {
            count: 2,
            last: OrdererError::Timeout(_),
            ..
        }
    ));
}

#[test_log::test(tokio::test)]
async fn no_orderers_fails_immediately() {
    let err = retrieve_first_block(&[], &Envelope::default(), Duration::from_secs(5))
        .await
        .expect_err("no orderers");
    assert!(matches!(err, DeliverError::NoOrderers));
}

#[test]
fn seek_spec_survives_seek_info() {
    for spec in [SeekSpec::Oldest, SeekSpec::Newest, SeekSpec::Specified(42)] {
        let info = spec.to_seek_info();
        assert_eq!(info.start, info.stop);
        assert_eq!(SeekSpec::from_seek_info(&info), Some(spec));
    }
    assert_eq!(SeekSpec::from_seek_info(&SeekInfo::default()), None);
}
