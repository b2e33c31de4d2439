//! Integration tests for the exponential backoff.
//!
//! Most tests use zero jitter so delays are exact. The timing test uses
//! `tokio::time::pause()` so sleeping is instant and deterministic.

use std::time::Duration;

use parley_backoff::{BackoffConfig, ExpBackoff};

// =========================================================================
// Helpers
// =========================================================================

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// min=100ms, factor=2, max=5s, no jitter.
fn exact() -> ExpBackoff {
    ExpBackoff::new(BackoffConfig {
        min_delay: ms(100),
        max_delay: Duration::from_secs(5),
        factor: 2.0,
        jitter: 0.0,
    })
}

// =========================================================================
// Growth and cap
// =========================================================================

#[test]
fn test_delays_double_from_minimum() {
    let mut b = exact();
    assert_eq!(b.next_delay(), ms(100));
    assert_eq!(b.next_delay(), ms(200));
    assert_eq!(b.next_delay(), ms(400));
    assert_eq!(b.next_delay(), ms(800));
}

#[test]
fn test_delays_are_capped_at_maximum() {
    let mut b = exact();
    let delays: Vec<Duration> = (0..9).map(|_| b.next_delay()).collect();
    assert_eq!(
        delays,
        vec![
            ms(100),
            ms(200),
            ms(400),
            ms(800),
            ms(1600),
            ms(3200),
            ms(5000),
            ms(5000),
            ms(5000),
        ]
    );
}

#[test]
fn test_delays_never_decrease() {
    let mut b = ExpBackoff::new(BackoffConfig {
        min_delay: ms(30),
        max_delay: ms(1000),
        factor: 1.5,
        jitter: 0.0,
    });
    let mut prev = Duration::ZERO;
    for _ in 0..20 {
        let d = b.next_delay();
        assert!(d >= prev, "{d:?} < {prev:?}");
        prev = d;
    }
    assert_eq!(prev, ms(1000));
}

// =========================================================================
// Attempts and reset
// =========================================================================

#[test]
fn test_attempts_count_each_delay() {
    let mut b = exact();
    assert_eq!(b.attempts(), 0);
    b.next_delay();
    b.next_delay();
    b.next_delay();
    assert_eq!(b.attempts(), 3);
}

#[test]
fn test_reset_restarts_from_minimum() {
    let mut b = exact();
    for _ in 0..4 {
        b.next_delay();
    }
    assert_eq!(b.current_base(), ms(1600));

    b.reset();

    assert_eq!(b.attempts(), 0);
    assert_eq!(b.next_delay(), ms(100));
    assert_eq!(b.next_delay(), ms(200));
}

// =========================================================================
// Jitter
// =========================================================================

#[test]
fn test_jitter_stays_within_fraction_of_base() {
    let mut b = ExpBackoff::new(BackoffConfig {
        min_delay: ms(100),
        max_delay: Duration::from_secs(5),
        factor: 2.0,
        jitter: 0.1,
    });
    let mut base = ms(100);
    for _ in 0..8 {
        let d = b.next_delay();
        assert!(d >= base, "{d:?} below base {base:?}");
        assert!(d <= base + base / 10, "{d:?} above base {base:?} + 10%");
        base = (base * 2).min(Duration::from_secs(5));
    }
}

// =========================================================================
// Sleeping
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_sleeps_for_the_delay() {
    let mut b = exact();

    let start = tokio::time::Instant::now();
    b.wait().await;
    assert_eq!(start.elapsed(), ms(100));

    let start = tokio::time::Instant::now();
    b.wait().await;
    assert_eq!(start.elapsed(), ms(200));
    assert_eq!(b.attempts(), 2);
}
