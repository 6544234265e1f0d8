//! Pack and pool tests
//!
//! Lifecycle tests for the reference-counted pack and its pool: acquire,
//! fan-out refcounting, recycle, reset, and exhaustion backpressure.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::pool::PackPool;

#[tokio::test]
async fn test_acquire_returns_armed_pack() {
    let pool = PackPool::new(2);
    assert_eq!(pool.available(), 2);

    let pack = pool.acquire().await;
    assert_eq!(pack.ref_count(), 1);
    assert_eq!(pool.available(), 1);

    pack.recycle();
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn test_refcount_lifecycle() {
    let pool = PackPool::new(1);
    let pack = pool.acquire().await;

    // Simulate fan-out to three destinations
    pack.inc_ref();
    pack.inc_ref();
    pack.inc_ref();
    assert_eq!(pack.ref_count(), 4);

    // Destination releases don't return the pack yet
    pack.recycle();
    pack.recycle();
    pack.recycle();
    assert_eq!(pool.available(), 0);

    // The last holder's release does
    pack.recycle();
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
#[should_panic(expected = "recycled below zero")]
async fn test_recycle_past_zero_panics() {
    let pool = PackPool::new(1);
    let pack = pool.acquire().await;

    pack.recycle();
    pack.recycle(); // one release too many
}

#[tokio::test]
async fn test_pack_reset_before_reuse() {
    let pool = PackPool::new(1);

    let pack = pool.acquire().await;
    {
        let mut data = pack.data_mut();
        data.message.set_payload("hello ferry");
        data.ident = "syslog".into();
        data.project = "acme".into();
    }
    pack.mark_input();
    pack.bump_loop_count();
    pack.add_stamp("stdout".into());
    pack.recycle();

    // Same pack comes back fully reset
    let pack = pool.acquire().await;
    let data = pack.data();
    assert!(data.message.is_empty());
    assert!(data.ident.is_empty());
    assert!(data.project.is_empty());
    drop(data);
    assert!(!pack.is_input());
    assert_eq!(pack.loop_count(), 0);
    assert!(pack.stamps().is_empty());
    assert_eq!(pack.ref_count(), 1);

    pack.recycle();
}

#[tokio::test]
async fn test_acquire_blocks_until_recycle() {
    let pool = PackPool::new(1);
    let pack = pool.acquire().await;

    // Pool is dry: acquire must wait
    assert!(
        timeout(Duration::from_millis(50), pool.acquire())
            .await
            .is_err()
    );

    // A recycle from another task unblocks the waiter
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    pack.recycle();

    let reacquired = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("acquire did not unblock")
        .expect("waiter panicked");
    assert_eq!(reacquired.ref_count(), 1);
    reacquired.recycle();
}

#[tokio::test]
async fn test_try_acquire() {
    let pool = PackPool::new(1);

    let pack = pool.try_acquire().expect("pool should have a free pack");
    assert!(pool.try_acquire().is_none());

    pack.recycle();
    assert!(pool.try_acquire().is_some());
}

#[tokio::test]
async fn test_stamps_trail() {
    let pool = PackPool::new(1);
    let pack = pool.acquire().await;

    pack.add_stamp("es_output".into());
    pack.add_stamp("archive_output".into());
    let stamps = pack.stamps();
    assert_eq!(stamps.len(), 2);
    assert_eq!(&*stamps[0], "es_output");
    assert_eq!(&*stamps[1], "archive_output");

    // A new routing pass starts from a clean trail
    pack.reset_diagnostics();
    assert!(pack.stamps().is_empty());

    pack.recycle();
}

#[tokio::test]
async fn test_recycle_after_pool_dropped() {
    let pool = PackPool::new(1);
    let pack = pool.acquire().await;
    drop(pool);

    // No pool to return to; the pack just resets and drops with the Arc
    pack.recycle();
    assert!(Arc::strong_count(&pack) >= 1);
}

#[tokio::test]
async fn test_pool_debug() {
    let pool = PackPool::new(4);
    let debug = format!("{:?}", pool);
    assert!(debug.contains("PackPool"));
    assert!(debug.contains("capacity"));
}
