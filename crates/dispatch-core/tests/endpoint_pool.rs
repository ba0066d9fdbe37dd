// crates/dispatch-core/tests/endpoint_pool.rs
mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dispatch_core::{DispatchError, EndpointPool};

#[tokio::test]
async fn leases_are_returned_on_drop() {
    let pool = Arc::new(common::endpoints(2));
    assert_eq!(pool.size(), 2);

    let a = pool.acquire(Duration::from_millis(10)).await.unwrap();
    let b = pool.acquire(Duration::from_millis(10)).await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(pool.available(), 0);

    drop(a);
    assert_eq!(pool.available(), 1);
    drop(b);
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn released_endpoints_rotate_to_the_back() {
    let pool = Arc::new(common::endpoints(3));

    let first = pool.acquire(Duration::ZERO).await.unwrap();
    assert_eq!(first.id(), 1);
    assert_eq!(first.url(), "http://endpoint-1");
    drop(first);

    let ids: Vec<usize> = {
        let mut leases = Vec::new();
        for _ in 0..3 {
            leases.push(pool.acquire(Duration::ZERO).await.unwrap());
        }
        leases.iter().map(|l| l.id()).collect()
    };
    assert_eq!(ids, vec![2, 3, 1]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_holders_never_share_an_endpoint() {
    let pool = Arc::new(common::endpoints(3));
    let held = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for _ in 0..40 {
        let pool = Arc::clone(&pool);
        let held = Arc::clone(&held);
        tasks.push(tokio::spawn(async move {
            let lease = pool.acquire(Duration::from_secs(10)).await.unwrap();
            assert!(
                held.lock().unwrap().insert(lease.id()),
                "endpoint {} handed out twice",
                lease.id()
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
            held.lock().unwrap().remove(&lease.id());
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(pool.available(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_pool_times_out_instead_of_hanging() {
    let pool = Arc::new(common::endpoints(1));
    let _held = pool.acquire(Duration::ZERO).await.unwrap();

    let started = tokio::time::Instant::now();
    let err = pool.acquire(Duration::from_secs(10)).await.unwrap_err();

    assert!(matches!(err, DispatchError::PoolExhausted(d) if d == Duration::from_secs(10)));
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert_eq!(pool.available(), 0);
}

#[tokio::test(start_paused = true)]
async fn waiter_is_woken_by_release() {
    let pool = Arc::new(common::endpoints(1));
    let held = pool.acquire(Duration::ZERO).await.unwrap();
    let held_id = held.id();

    let waiter = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.acquire(Duration::from_secs(10)).await.map(|l| l.id()) })
    };

    tokio::time::sleep(Duration::from_secs(3)).await;
    drop(held);

    assert_eq!(waiter.await.unwrap().unwrap(), held_id);
    assert_eq!(pool.available(), 1);
}

#[tokio::test]
async fn cancelled_holder_releases_its_endpoint() {
    let pool = Arc::new(EndpointPool::new(["http://only"]));

    let holder = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            let _lease = pool.acquire(Duration::from_secs(1)).await.unwrap();
            std::future::pending::<()>().await;
        })
    };

    while pool.available() != 0 {
        tokio::task::yield_now().await;
    }

    holder.abort();
    assert!(holder.await.unwrap_err().is_cancelled());
    assert_eq!(pool.available(), 1);

    let again = pool.acquire(Duration::ZERO).await.unwrap();
    assert_eq!(again.url(), "http://only");
}

#[tokio::test(start_paused = true)]
async fn empty_pool_always_times_out() {
    let pool = Arc::new(EndpointPool::new(Vec::<String>::new()));
    assert_eq!(pool.size(), 0);
    assert!(pool.acquire(Duration::from_millis(500)).await.is_err());
}
