//! Router tests
//!
//! End-to-end tests for the dispatch loop: fan-out refcounting, output/filter
//! ordering, live matcher removal, loop-guarded re-injection, stats, and the
//! shutdown protocol.

use std::sync::Arc;
use std::time::Duration;

use ferry_config::EngineConfig;
use tokio::time::timeout;

use crate::matcher::Matcher;
use crate::pack::PackRef;
use crate::pool::PackPool;
use crate::router::MessageRouter;
use crate::runner::RunnerState;

/// Engine config tuned for fast tests
fn test_config() -> EngineConfig {
    EngineConfig {
        hub_capacity: 16,
        pool_capacity: 4,
        ticker_interval_secs: 3600, // keep ticks out of the way
        max_pack_loops: 4,
        stop_poll_interval_ms: 5,
        ..Default::default()
    }
}

async fn make_pack(pool: &PackPool, ident: &str) -> PackRef {
    let pack = pool.acquire().await;
    {
        let mut data = pack.data_mut();
        data.message.set_payload(format!("payload for {ident}"));
        data.ident = ident.to_string();
        data.project = "test".to_string();
    }
    pack.mark_input();
    pack
}

/// Poll until every pack is back in the pool, or fail after a second
async fn wait_pool_full(pool: &PackPool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while pool.available() < pool.capacity() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "pool never refilled: {} of {}",
            pool.available(),
            pool.capacity()
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_router_new() {
    let router = MessageRouter::new(test_config());
    assert_eq!(router.output_matcher_count(), 0);
    assert_eq!(router.filter_matcher_count(), 0);
}

#[tokio::test]
async fn test_fanout_and_stats() {
    // Smallest possible hub: enqueue still never loses a pack, it just blocks
    let config = EngineConfig {
        hub_capacity: 1,
        ..test_config()
    };
    let mut router = MessageRouter::new(config);

    let out_runner = RunnerState::new("out");
    let (out_matcher, mut out_rx) = Matcher::new(Arc::clone(&out_runner) as Arc<dyn crate::runner::DestinationRunner>, 16, |_| true);
    router.add_output_matcher(out_matcher);

    let filter_runner = RunnerState::new("filter");
    let (filter_matcher, mut filter_rx) = Matcher::new(Arc::clone(&filter_runner) as Arc<dyn crate::runner::DestinationRunner>, 16, |_| false);
    router.add_filter_matcher(filter_matcher);

    let handle = router.handle();
    let router_task = tokio::spawn(router.start());

    let pool = PackPool::new(4);
    for _ in 0..3 {
        let pack = make_pack(&pool, "syslog").await;
        handle.enqueue(pack).await;
    }

    // The always-true output sees all three packs
    for _ in 0..3 {
        let pack = timeout(Duration::from_secs(1), out_rx.recv())
            .await
            .expect("timeout waiting for pack")
            .expect("channel closed");
        assert_eq!(pack.data().ident, "syslog");
        assert!(!pack.stamps().is_empty());
        pack.recycle();
    }

    // The always-false filter sees none
    assert!(
        timeout(Duration::from_millis(50), filter_rx.recv())
            .await
            .is_err()
    );

    wait_pool_full(&pool).await;

    let s = handle.stats();
    assert_eq!(s.total_processed_msgs, 3);
    assert_eq!(s.period_processed_msgs, 3);
    assert_eq!(s.total_input_msgs, 3);
    assert_eq!(s.unmatched, 0);
    assert!(s.total_processed_bytes > 0);

    out_runner.mark_stopped();
    filter_runner.mark_stopped();
    handle.stop().await;
    timeout(Duration::from_secs(1), router_task)
        .await
        .expect("router didn't shut down in time")
        .expect("router panicked");
}

#[tokio::test]
async fn test_fanout_shares_one_pack() {
    let mut router = MessageRouter::new(test_config());

    let runner_a = RunnerState::new("a");
    let (matcher_a, mut rx_a) = Matcher::new(runner_a, 16, |_| true);
    router.add_output_matcher(matcher_a);

    let runner_b = RunnerState::new("b");
    let (matcher_b, mut rx_b) = Matcher::new(runner_b, 16, |_| true);
    router.add_output_matcher(matcher_b);

    let handle = router.handle();
    tokio::spawn(router.start());

    let pool = PackPool::new(2);
    let pack = make_pack(&pool, "syslog").await;
    handle.enqueue(pack).await;

    let received_a = timeout(Duration::from_secs(1), rx_a.recv())
        .await
        .expect("timeout")
        .expect("channel closed");
    let received_b = timeout(Duration::from_secs(1), rx_b.recv())
        .await
        .expect("timeout")
        .expect("channel closed");

    // Same pack, no copy; the diagnostics trail names both destinations
    assert!(Arc::ptr_eq(&received_a, &received_b));
    // Both destination references are still live; the router releases its
    // own once dispatch completes
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(received_a.ref_count(), 2);
    let stamps = received_a.stamps();
    assert_eq!(stamps.len(), 2);
    assert_eq!(&*stamps[0], "a");
    assert_eq!(&*stamps[1], "b");

    // The pack stays out of the pool until the last holder recycles
    received_a.recycle();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pool.available() < pool.capacity());

    received_b.recycle();
    wait_pool_full(&pool).await;
}

#[tokio::test]
async fn test_unmatched_pack_recycled() {
    let mut router = MessageRouter::new(test_config());

    let runner = RunnerState::new("out");
    let (matcher, mut rx) = Matcher::new(runner, 16, |data| data.ident == "alarm");
    router.add_output_matcher(matcher);

    let handle = router.handle();
    tokio::spawn(router.start());

    let pool = PackPool::new(1);
    let pack = make_pack(&pool, "not-alarm").await;
    handle.enqueue(pack).await;

    // Nothing delivered, pack back in the pool, unmatched counted
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    wait_pool_full(&pool).await;
    assert_eq!(handle.stats().unmatched, 1);
    assert_eq!(handle.stats().total_processed_msgs, 1);
}

#[tokio::test]
async fn test_filter_mutates_and_reinjects() {
    let mut router = MessageRouter::new(test_config());

    // Output wants post-filter packs, filter wants raw ones
    let out_runner = RunnerState::new("alarm_out");
    let (out_matcher, mut out_rx) =
        Matcher::new(out_runner, 16, |data| data.ident == "alarm");
    router.add_output_matcher(out_matcher);

    let filter_runner = RunnerState::new("alarm_filter");
    let (filter_matcher, mut filter_rx) =
        Matcher::new(filter_runner, 16, |data| data.ident == "raw");
    router.add_filter_matcher(filter_matcher);

    let handle = router.handle();
    tokio::spawn(router.start());

    // Filter run loop: rewrite the ident, re-inject
    let filter_handle = handle.clone();
    tokio::spawn(async move {
        while let Some(pack) = filter_rx.recv().await {
            pack.data_mut().ident = "alarm".to_string();
            filter_handle.inject(pack).await;
        }
    });

    let pool = PackPool::new(2);
    let pack = make_pack(&pool, "raw").await;
    handle.enqueue(pack).await;

    // First pass goes to the filter only, second pass to the output:
    // loop_count == 1 proves the output never saw the pack pre-mutation
    let received = timeout(Duration::from_secs(1), out_rx.recv())
        .await
        .expect("timeout waiting for re-injected pack")
        .expect("channel closed");
    assert_eq!(received.data().ident, "alarm");
    assert_eq!(received.loop_count(), 1);
    received.recycle();

    // Exactly one delivery, never a same-pass double dispatch
    assert!(
        timeout(Duration::from_millis(50), out_rx.recv())
            .await
            .is_err()
    );

    wait_pool_full(&pool).await;
    assert_eq!(handle.stats().total_processed_msgs, 2);
}

#[tokio::test]
async fn test_inject_loop_guard_drops_runaways() {
    let config = EngineConfig {
        max_pack_loops: 2,
        ..test_config()
    };
    let mut router = MessageRouter::new(config);

    // Filter that always matches and always re-injects: a routing loop
    let filter_runner = RunnerState::new("loop_filter");
    let (filter_matcher, mut filter_rx) = Matcher::new(filter_runner, 16, |_| true);
    router.add_filter_matcher(filter_matcher);

    let handle = router.handle();
    tokio::spawn(router.start());

    let filter_handle = handle.clone();
    tokio::spawn(async move {
        while let Some(pack) = filter_rx.recv().await {
            filter_handle.inject(pack).await;
        }
    });

    let pool = PackPool::new(1);
    let pack = make_pack(&pool, "raw").await;
    handle.enqueue(pack).await;

    // The loop guard drops the pack instead of spinning forever
    wait_pool_full(&pool).await;
    // Initial pass plus max_pack_loops re-injections
    assert_eq!(handle.stats().total_processed_msgs, 3);
}

#[tokio::test]
async fn test_remove_output_matcher() {
    let mut router = MessageRouter::new(test_config());

    let runner_a = RunnerState::new("a");
    let (matcher_a, mut rx_a) = Matcher::new(runner_a, 16, |_| true);
    router.add_output_matcher(Arc::clone(&matcher_a));

    let runner_b = RunnerState::new("b");
    let (matcher_b, mut rx_b) = Matcher::new(runner_b, 16, |_| true);
    router.add_output_matcher(matcher_b);

    let handle = router.handle();
    tokio::spawn(router.start());

    let pool = PackPool::new(4);
    let p1 = make_pack(&pool, "syslog").await;
    handle.enqueue(p1).await;

    // B's receipt proves dispatch finished; p1 is still queued in A's channel
    timeout(Duration::from_secs(1), rx_b.recv())
        .await
        .expect("timeout")
        .expect("channel closed")
        .recycle();

    // Remove A while its channel holds a queued pack: the pack stays
    // drainable, then the destination observes closure
    handle.remove_output_matcher(&matcher_a).await.unwrap();
    let queued = timeout(Duration::from_secs(1), rx_a.recv())
        .await
        .expect("timeout draining removed matcher")
        .expect("queued pack lost by removal");
    assert_eq!(queued.data().ident, "syslog");
    queued.recycle();
    assert!(
        timeout(Duration::from_secs(1), rx_a.recv())
            .await
            .expect("timeout waiting for close")
            .is_none()
    );
    assert!(matcher_a.is_closed());

    // Only B sees packs from now on
    let p2 = make_pack(&pool, "syslog").await;
    handle.enqueue(p2).await;
    timeout(Duration::from_secs(1), rx_b.recv())
        .await
        .expect("timeout")
        .expect("channel closed")
        .recycle();

    wait_pool_full(&pool).await;
}

#[tokio::test]
async fn test_remove_matcher_twice_is_noop() {
    let mut router = MessageRouter::new(test_config());

    let runner = RunnerState::new("a");
    let (matcher, mut rx) = Matcher::new(runner, 16, |_| true);
    router.add_output_matcher(Arc::clone(&matcher));

    let handle = router.handle();
    tokio::spawn(router.start());

    handle.remove_output_matcher(&matcher).await.unwrap();
    assert!(
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timeout waiting for close")
            .is_none()
    );

    // Second removal of the same (now tombstoned) matcher is harmless,
    // and so is removing from the wrong collection
    handle.remove_output_matcher(&matcher).await.unwrap();
    handle.remove_filter_matcher(&matcher).await.unwrap();

    // Router still routes
    let pool = PackPool::new(1);
    let pack = make_pack(&pool, "x").await;
    handle.enqueue(pack).await;
    wait_pool_full(&pool).await;
    assert_eq!(handle.stats().total_processed_msgs, 1);
}

#[tokio::test]
async fn test_stop_waits_for_destinations() {
    let mut router = MessageRouter::new(test_config());

    let runner = RunnerState::new("slow");
    let (matcher, _rx) = Matcher::new(Arc::clone(&runner) as Arc<dyn crate::runner::DestinationRunner>, 16, |_| true);
    router.add_output_matcher(matcher);

    let handle = router.handle();
    let router_task = tokio::spawn(router.start());

    // stop() must not complete while a destination is still running
    let stopper = {
        let handle = handle.clone();
        tokio::spawn(async move { handle.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopper.is_finished());

    runner.mark_stopped();
    timeout(Duration::from_secs(1), stopper)
        .await
        .expect("stop never completed")
        .expect("stop panicked");
    timeout(Duration::from_secs(1), router_task)
        .await
        .expect("router didn't exit after stop")
        .expect("router panicked");

    // Idempotent: stopping an already-stopped router returns immediately
    timeout(Duration::from_millis(100), handle.stop())
        .await
        .expect("second stop did not return");
}

#[tokio::test]
async fn test_shutdown_drains_queued_packs() {
    let mut router = MessageRouter::new(test_config());
    let handle = router.handle();

    let runner = RunnerState::new("out");
    let (matcher, mut rx) = Matcher::new(Arc::clone(&runner) as Arc<dyn crate::runner::DestinationRunner>, 16, |_| true);
    router.add_output_matcher(matcher);

    let pool = PackPool::new(4);

    // Queue packs into the hub before the router task even starts, then
    // cancel immediately: the drain path must still dispatch them.
    for _ in 0..3 {
        let pack = make_pack(&pool, "syslog").await;
        handle.enqueue(pack).await;
    }

    let router_task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        router.start().await;
    });
    runner.mark_stopped();
    handle.stop().await;

    timeout(Duration::from_secs(1), router_task)
        .await
        .expect("router didn't exit")
        .expect("router panicked");

    let mut delivered = 0;
    while let Ok(Some(pack)) = timeout(Duration::from_millis(100), rx.recv()).await {
        pack.recycle();
        delivered += 1;
    }
    assert_eq!(delivered, 3);
    wait_pool_full(&pool).await;
}

#[tokio::test]
async fn test_enqueue_after_router_gone() {
    let router = MessageRouter::new(test_config());
    let handle = router.handle();
    drop(router); // hub receiver dropped, channel closed

    let pool = PackPool::new(1);
    let pack = make_pack(&pool, "orphan").await;

    // No panic; the pack goes straight back to the pool
    handle.enqueue(pack).await;
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn test_router_debug() {
    let router = MessageRouter::new(test_config());
    let debug = format!("{:?}", router);
    assert!(debug.contains("MessageRouter"));
    assert!(debug.contains("outputs"));

    let handle = router.handle();
    assert!(format!("{:?}", handle).contains("RouterHandle"));
}
