//! Tests for retry delay policies.

use std::time::Duration;

use stu_controller::queue::{
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimitConfig,
    RateLimiter, default_controller_rate_limiter,
};

#[test]
fn exponential_backoff_doubles_and_caps() {
    let limiter = ItemExponentialFailureRateLimiter::new(
        Duration::from_millis(5),
        Duration::from_millis(100),
    );
    let key = "default/alice".to_string();

    let delays: Vec<Duration> = (0..10).map(|_| limiter.when(&key)).collect();

    assert_eq!(delays[0], Duration::from_millis(5));
    assert_eq!(delays[1], Duration::from_millis(10));
    assert_eq!(delays[2], Duration::from_millis(20));
    assert!(delays.windows(2).all(|w| w[0] <= w[1]), "{delays:?}");
    assert!(delays.iter().all(|d| *d <= Duration::from_millis(100)));
    assert_eq!(*delays.last().unwrap(), Duration::from_millis(100));
    assert_eq!(limiter.num_requeues(&key), 10);
}

#[test]
fn exponential_backoff_survives_huge_failure_counts() {
    let limiter =
        ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1000));
    let key = 1u32;
    let mut last = Duration::ZERO;
    for _ in 0..100 {
        let delay = limiter.when(&key);
        assert!(delay >= last);
        last = delay;
    }
    assert_eq!(last, Duration::from_secs(1000));
}

#[test]
fn forget_resets_backoff() {
    let limiter = ItemExponentialFailureRateLimiter::new(
        Duration::from_millis(5),
        Duration::from_secs(1),
    );
    let key = "a".to_string();
    limiter.when(&key);
    limiter.when(&key);
    limiter.forget(&key);

    assert_eq!(limiter.num_requeues(&key), 0);
    assert_eq!(limiter.when(&key), Duration::from_millis(5));
}

#[test]
fn backoff_is_tracked_per_key() {
    let limiter = ItemExponentialFailureRateLimiter::new(
        Duration::from_millis(5),
        Duration::from_secs(1),
    );
    limiter.when(&"a");
    limiter.when(&"a");
    assert_eq!(limiter.when(&"b"), Duration::from_millis(5));
}

#[test]
fn bucket_allows_burst_then_spaces_out() {
    let limiter = BucketRateLimiter::new(1.0, 3);
    for _ in 0..3 {
        assert_eq!(RateLimiter::<&str>::when(&limiter, &"x"), Duration::ZERO);
    }
    let delay = RateLimiter::<&str>::when(&limiter, &"x");
    assert!(delay > Duration::from_millis(500), "{delay:?}");
    assert!(delay <= Duration::from_secs(1), "{delay:?}");
}

#[test]
fn bucket_with_unusable_rate_does_not_panic() {
    for qps in [0.0, -3.0, f64::NAN] {
        let limiter = BucketRateLimiter::new(qps, 1);
        assert_eq!(RateLimiter::<&str>::when(&limiter, &"x"), Duration::ZERO);
        let delay = RateLimiter::<&str>::when(&limiter, &"x");
        assert!(delay > Duration::from_secs(3600), "qps {qps}: {delay:?}");
    }
}

#[test]
fn max_of_takes_the_slowest_limiter() {
    let limiter: MaxOfRateLimiter<&str> = MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(5),
            Duration::from_secs(1),
        )),
        Box::new(ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(50),
            Duration::from_secs(1),
        )),
    ]);

    assert_eq!(limiter.when(&"a"), Duration::from_millis(50));
    assert_eq!(limiter.when(&"a"), Duration::from_millis(100));
    assert_eq!(limiter.num_requeues(&"a"), 2);

    limiter.forget(&"a");
    assert_eq!(limiter.num_requeues(&"a"), 0);
}

#[test]
fn default_limiter_starts_at_base_delay() {
    let config = RateLimitConfig::default();
    let limiter = default_controller_rate_limiter::<String>(&config);
    let key = "default/alice".to_string();

    assert_eq!(limiter.when(&key), config.base_delay);
    assert_eq!(limiter.when(&key), config.base_delay * 2);
    assert_eq!(limiter.num_requeues(&key), 2);
}
