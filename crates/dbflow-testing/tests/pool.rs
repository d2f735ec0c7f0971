//! Pool lifecycle scenarios against the scriptable in-memory manager.

use std::time::Duration;

use dbflow_pool::{Pool, PoolConfig};
use dbflow_testing::TestManager;

/// Let already-runnable tasks make progress without advancing the clock.
async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

/// Yield until `cond` holds; panics if it never does.
async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..4096 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition was never reached");
}

fn pool_with(manager: TestManager, config: PoolConfig) -> Pool<TestManager> {
    Pool::new(manager, config).expect("config must be valid")
}

#[tokio::test]
async fn released_resource_is_reused_and_waiters_outrank_idle() {
    let manager = TestManager::new();
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(3));

    let a = pool.acquire().await.expect("acquire a");
    let b = pool.acquire().await.expect("acquire b");
    let c = pool.acquire().await.expect("acquire c");
    assert_eq!(manager.opened_count(), 3);
    assert_eq!(pool.connections_count(), 3);

    let b_id = b.resource().id;
    b.release().await.expect("release b");

    // d must reuse b's resource without a fourth open.
    let d = pool.acquire().await.expect("acquire d");
    assert_eq!(d.resource().id, b_id);
    assert_eq!(manager.opened_count(), 3);

    // e queues behind a full pool.
    let e_task = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    wait_until(|| pool.queue_len() == 1).await;

    // Releasing a hands its resource straight to e; it never goes idle.
    let a_id = a.resource().id;
    a.release().await.expect("release a");
    let e = e_task.await.expect("join").expect("acquire e");
    assert_eq!(e.resource().id, a_id);
    assert_eq!(pool.idle_connections_count(), 0);
    assert!(pool.metrics().waiter_hand_offs >= 1);

    for handle in [c, d, e] {
        handle.release().await.expect("release");
    }
}

#[tokio::test]
async fn capacity_is_never_exceeded() {
    let manager = TestManager::new();
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(2));

    let a = pool.acquire().await.expect("acquire a");
    let b = pool.acquire().await.expect("acquire b");

    let third = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    wait_until(|| pool.queue_len() == 1).await;
    assert_eq!(pool.connections_count(), 2);
    assert!(pool.status().is_at_capacity());

    a.release().await.expect("release a");
    let c = third.await.expect("join").expect("acquire c");
    assert_eq!(pool.connections_count(), 2);
    assert_eq!(manager.opened_count(), 2);

    b.release().await.expect("release b");
    c.release().await.expect("release c");
}

#[tokio::test]
async fn waiters_are_served_in_fifo_order() {
    let manager = TestManager::new();
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(1));

    let held = pool.acquire().await.expect("acquire");

    let first = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    wait_until(|| pool.queue_len() == 1).await;
    let second = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    wait_until(|| pool.queue_len() == 2).await;

    held.release().await.expect("release");
    wait_until(|| first.is_finished()).await;
    assert!(!second.is_finished());

    let from_first = first.await.expect("join").expect("acquire");
    from_first.release().await.expect("release");
    let from_second = second.await.expect("join").expect("acquire");
    from_second.release().await.expect("release");
}

#[tokio::test]
async fn use_limit_closes_instead_of_recycling() {
    let manager = TestManager::new();
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(2).max_uses(1));

    let a = pool.acquire().await.expect("acquire");
    let a_id = a.resource().id;
    a.release().await.expect("release");

    assert_eq!(manager.closed_ids(), vec![a_id]);
    assert_eq!(pool.connections_count(), 0);
    assert_eq!(pool.idle_connections_count(), 0);

    let b = pool.acquire().await.expect("acquire");
    assert_ne!(b.resource().id, a_id);
    assert_eq!(manager.opened_count(), 2);
    b.release().await.expect("release");
}

#[tokio::test(start_paused = true)]
async fn queue_timeout_fails_waiter_without_losing_the_resource() {
    let manager = TestManager::new();
    let pool = pool_with(
        manager.clone(),
        PoolConfig::new()
            .max_size(1)
            .queue_timeout(Duration::from_millis(100)),
    );

    let held = pool.acquire().await.expect("acquire");
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    wait_until(|| pool.queue_len() == 1).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    let error = waiter.await.expect("join").expect_err("must time out");
    assert_eq!(error.code(), "CONNECTION_POOL:QUEUE_TIMEOUT");
    assert_eq!(pool.metrics().queue_timeouts, 1);

    // The stale waiter is skipped on release and the resource goes idle.
    held.release().await.expect("release");
    assert_eq!(pool.idle_connections_count(), 1);
    assert_eq!(pool.connections_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn open_timeout_leaks_and_reaps_the_late_resource() {
    let manager = TestManager::new();
    manager.set_open_delay(Duration::from_secs(10));
    let pool = pool_with(
        manager.clone(),
        PoolConfig::new().max_size(2).open_timeout(Duration::from_secs(1)),
    );

    let error = pool.acquire().await.expect_err("open must time out");
    assert_eq!(error.code(), "CONNECTION_POOL:OPEN_TIMEOUT");
    assert_eq!(pool.connections_count(), 0);

    // The open itself keeps running; once it resolves the resource is
    // closed instead of joining the pool.
    tokio::time::sleep(Duration::from_secs(15)).await;
    settle().await;
    assert_eq!(manager.opened_count(), 1);
    assert_eq!(manager.closed_ids().len(), 1);
    assert_eq!(pool.connections_count(), 0);
}

#[tokio::test]
async fn open_failure_releases_the_capacity_slot() {
    let manager = TestManager::new();
    manager.fail_next_opens(1);
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(1));

    let error = pool.acquire().await.expect_err("open must fail");
    assert_eq!(error.code(), "CONNECTION_POOL:OPEN_FAILED");
    assert_eq!(pool.connections_count(), 0);

    // The slot is free again; the next acquire succeeds.
    let conn = pool.acquire().await.expect("acquire after failure");
    conn.release().await.expect("release");
}

#[tokio::test(start_paused = true)]
async fn idle_timeout_reaps_parked_resources() {
    let manager = TestManager::new();
    let pool = pool_with(
        manager.clone(),
        PoolConfig::new().max_size(2).idle_timeout(Duration::from_secs(5)),
    );

    let conn = pool.acquire().await.expect("acquire");
    let id = conn.resource().id;
    conn.release().await.expect("release");
    assert_eq!(pool.idle_connections_count(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(pool.idle_connections_count(), 0);
    assert_eq!(pool.connections_count(), 0);
    assert_eq!(manager.closed_ids(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn release_after_timeout_is_a_no_op() {
    let manager = TestManager::new().handling_release_timeouts();
    let pool = pool_with(
        manager.clone(),
        PoolConfig::new()
            .max_size(1)
            .release_timeout(Duration::from_secs(1)),
    );

    let conn = pool.acquire().await.expect("acquire");
    let id = conn.resource().id;

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(manager.release_timed_out_ids(), vec![id]);
    assert_eq!(pool.connections_count(), 0);
    assert_eq!(pool.metrics().release_timeouts, 1);

    // The handler owns the resource now; the original holder's release is
    // silently ignored and nothing re-enters the idle list.
    conn.release().await.expect("release is a no-op");
    assert_eq!(pool.idle_connections_count(), 0);
    // The manager's handler records instead of closing, so the pool must
    // not have closed it either.
    assert!(manager.closed_ids().is_empty());
}

#[tokio::test]
async fn failing_on_active_hook_destroys_the_resource() {
    let manager = TestManager::new();
    manager.set_fail_on_active(true);
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(1));

    let error = pool.acquire().await.expect_err("hook failure must surface");
    assert_eq!(error.code(), "CONNECTION_POOL:HOOK_FAILED");
    assert_eq!(pool.connections_count(), 0);
    assert_eq!(manager.closed_ids().len(), 1);
}

#[tokio::test]
async fn failing_on_idle_hook_destroys_on_release() {
    let manager = TestManager::new();
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(1));

    let conn = pool.acquire().await.expect("acquire");
    manager.set_fail_on_idle(true);
    let error = conn.release().await.expect_err("hook failure must surface");
    assert_eq!(error.code(), "CONNECTION_POOL:HOOK_FAILED");
    assert_eq!(pool.connections_count(), 0);
    assert_eq!(manager.closed_ids().len(), 1);
}

#[tokio::test]
async fn release_timeout_without_handler_fails_construction() {
    let result = Pool::new(
        TestManager::new(),
        PoolConfig::new().release_timeout(Duration::from_secs(1)),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn dispose_offers_freed_capacity_to_the_oldest_waiter() {
    let manager = TestManager::new();
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(1));

    let held = pool.acquire().await.expect("acquire");
    let held_id = held.resource().id;

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    wait_until(|| pool.queue_len() == 1).await;

    held.dispose().await.expect("dispose");
    let fresh = waiter.await.expect("join").expect("acquire");
    assert_ne!(fresh.resource().id, held_id);
    assert_eq!(manager.opened_count(), 2);
    assert_eq!(manager.closed_ids(), vec![held_id]);
    fresh.release().await.expect("release");
}

#[tokio::test]
async fn drain_is_idempotent_and_fails_queued_waiters() {
    let manager = TestManager::new();
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(2));

    let a = pool.acquire().await.expect("acquire a");
    let b = pool.acquire().await.expect("acquire b");
    let b_id = b.resource().id;
    b.release().await.expect("release b");
    assert_eq!(pool.idle_connections_count(), 1);

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire().await })
    };
    wait_until(|| pool.queue_len() == 1).await;

    let drains: Vec<_> = (0..2)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.drain().await })
        })
        .collect();
    wait_until(|| pool.is_draining()).await;

    // The queued waiter fails fast, the idle record is closed, and new
    // acquisitions are rejected.
    let error = waiter.await.expect("join").expect_err("waiter must fail");
    assert_eq!(error.code(), "CONNECTION_POOL:DRAINING");
    assert!(manager.closed_ids().contains(&b_id));
    let error = pool.acquire().await.expect_err("must fail fast");
    assert_eq!(error.code(), "CONNECTION_POOL:DRAINING");

    // Drain completes once the outstanding connection comes back.
    settle().await;
    assert!(drains.iter().all(|task| !task.is_finished()));
    a.release().await.expect("release a");
    for task in drains {
        task.await.expect("drain completes");
    }
    assert_eq!(pool.connections_count(), 0);
    assert_eq!(manager.closed_ids().len(), 2);
}

#[tokio::test]
async fn discard_on_release_follows_driver_recycling_verdict() {
    let manager = TestManager::new();
    let pool = pool_with(manager.clone(), PoolConfig::new().max_size(1));

    let conn = pool.acquire().await.expect("acquire");
    let id = conn.resource().id;
    conn.discard_on_release();
    conn.release().await.expect("release");

    assert_eq!(manager.closed_ids(), vec![id]);
    assert_eq!(pool.idle_connections_count(), 0);
    assert_eq!(pool.connections_count(), 0);
}
