//! Integration tests for the work queue.

use std::sync::Arc;
use std::time::Duration;

use stu_controller::queue::{ItemExponentialFailureRateLimiter, RateLimitingQueue, WorkQueue};

fn test_queue() -> WorkQueue<String> {
    WorkQueue::new("test")
}

fn rate_limited_queue() -> RateLimitingQueue<String> {
    RateLimitingQueue::new(
        "test",
        Arc::new(ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(10),
            Duration::from_secs(1),
        )),
    )
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_adds_before_get_dequeue_once() {
    let queue = test_queue();

    for _ in 0..5 {
        queue.add("a".to_string());
    }
    queue.add("b".to_string());
    assert_eq!(queue.len(), 2);

    let first = queue.get().await.unwrap();
    assert_eq!(first, "a");
    queue.done(&first);

    let second = queue.get().await.unwrap();
    assert_eq!(second, "b");
    queue.done(&second);

    assert!(queue.is_empty());
}

#[tokio::test]
async fn items_come_out_in_arrival_order() {
    let queue = test_queue();
    for item in ["c", "a", "b"] {
        queue.add(item.to_string());
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let item = queue.get().await.unwrap();
        queue.done(&item);
        seen.push(item);
    }
    assert_eq!(seen, vec!["c", "a", "b"]);
}

// ---------------------------------------------------------------------------
// In-flight bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_while_processing_is_parked_until_done() {
    let queue = test_queue();
    queue.add("a".to_string());

    let item = queue.get().await.unwrap();
    assert!(queue.is_processing(&item));

    queue.add("a".to_string());
    queue.add("a".to_string());
    assert_eq!(queue.len(), 0, "a processing item must not be handed out again");

    queue.done(&item);
    assert!(!queue.is_processing(&item));
    assert_eq!(queue.len(), 1, "re-added item surfaces exactly once");

    let again = queue.get().await.unwrap();
    assert_eq!(again, "a");
    queue.done(&again);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn done_without_readd_does_not_requeue() {
    let queue = test_queue();
    queue.add("a".to_string());
    let item = queue.get().await.unwrap();
    queue.done(&item);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn get_waits_for_an_add() {
    let queue = Arc::new(test_queue());

    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.get().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    queue.add("a".to_string());
    let item = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("get should wake up")
        .unwrap();
    assert_eq!(item.as_deref(), Some("a"));
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_drains_pending_items_then_reports_shutdown() {
    let queue = test_queue();
    queue.add("a".to_string());
    queue.add("b".to_string());

    queue.shut_down();
    queue.add("c".to_string());
    assert_eq!(queue.len(), 2, "adds after shutdown are ignored");

    assert_eq!(queue.get().await.as_deref(), Some("a"));
    assert_eq!(queue.get().await.as_deref(), Some("b"));
    assert_eq!(queue.get().await, None);
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let queue = test_queue();
    queue.shut_down();
    queue.shut_down();
    assert!(queue.is_shutting_down());
    assert_eq!(queue.get().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_wakes_every_waiting_get() {
    let queue = Arc::new(test_queue());

    let waiters: Vec<_> = (0..3)
        .map(|_| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.shut_down();

    for waiter in waiters {
        let item = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should observe shutdown")
            .unwrap();
        assert_eq!(item, None);
    }
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn add_rate_limited_readds_after_backoff() {
    let queue = rate_limited_queue();

    queue.add_rate_limited("a".to_string());
    assert_eq!(queue.len(), 0, "not added before the backoff elapses");
    assert_eq!(queue.num_requeues(&"a".to_string()), 1);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.len(), 1);

    queue.forget(&"a".to_string());
    assert_eq!(queue.num_requeues(&"a".to_string()), 0);
    assert_eq!(queue.len(), 1, "forget does not remove a queued item");
}

#[tokio::test(start_paused = true)]
async fn delayed_adds_are_dropped_on_shutdown() {
    let queue = rate_limited_queue();

    queue.add_after("a".to_string(), Duration::from_secs(1));
    queue.shut_down();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(queue.len(), 0);
    assert_eq!(queue.get().await, None);
}

#[tokio::test]
async fn add_rate_limited_after_shutdown_is_ignored() {
    let queue = rate_limited_queue();
    queue.shut_down();
    queue.add_rate_limited("a".to_string());
    assert_eq!(queue.num_requeues(&"a".to_string()), 0);
}

#[tokio::test]
async fn zero_delay_add_after_is_immediate() {
    let queue = rate_limited_queue();
    queue.add_after("a".to_string(), Duration::ZERO);
    assert_eq!(queue.len(), 1);
}
