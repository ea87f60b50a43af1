use std::sync::Arc;
use std::time::Duration;

use super::TaskGroup;
use super::waiter::Waiter;
use crate::runtime::sleep;

#[test_log::test(tokio::test)]
async fn shutdown_stops_waiting_tasks() -> anyhow::Result<()> {
    let tg = TaskGroup::new();
    let rx = tg.spawn("shutdown waiter", |handle| async move {
        handle.make_shutdown_rx().await;
        handle.is_shutting_down()
    });
    sleep(Duration::from_millis(10)).await;
    tg.shutdown();
    assert!(tg.is_shutting_down());
    assert!(rx.await?);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn handle_made_after_shutdown_sees_it() -> anyhow::Result<()> {
    let tg = TaskGroup::new();
    tg.shutdown();
    tg.shutdown();
    let rx = tg.spawn("late", |handle| async move {
        tokio::select! {
            () = handle.make_shutdown_rx() => "stopped",
            () = sleep(Duration::from_secs(60)) => "slept",
        }
    });
    assert_eq!(rx.await?, "stopped");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn dropped_receiver_discards_output() {
    let tg = TaskGroup::new();
    drop(tg.spawn("ignored", |_| async { 42 }));
    let rx = tg.spawn("kept", |_| async { 7 });
    assert_eq!(rx.await.expect("task finished"), 7);
}

#[test_log::test(tokio::test)]
async fn waiter_completes_once_for_many_racers() {
    let waiter = Arc::new(Waiter::new());
    assert!(!waiter.is_done());

    let racers = (0..3)
        .map(|_| {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.done() })
        })
        .collect::<Vec<_>>();

    waiter.wait().await;
    for racer in racers {
        racer.await.expect("racer finished");
    }
    assert!(waiter.is_done());
    // already done, returns immediately
    waiter.wait().await;
}
