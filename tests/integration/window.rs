//! Rolling window behavior over simulated time.

use std::sync::Arc;
use std::time::Duration;

use tokio_shedder::clock::ManualClock;
use tokio_shedder::collection::RollingWindow;

fn max_sum(window: &RollingWindow) -> f64 {
    let mut max = 0.0f64;
    window.reduce(|b| max = max.max(b.sum));
    max
}

#[test]
fn test_max_over_complete_buckets() {
    let clock = Arc::new(ManualClock::new());
    let window = RollingWindow::with_clock(10, Duration::from_millis(50), clock.clone())
        .unwrap()
        .ignore_current_bucket(true);

    for i in 0..10 {
        window.add((i * 100) as f64);
        clock.advance(Duration::from_millis(50));
    }

    assert_eq!(max_sum(&window), 900.0);

    // The last add lands in the current bucket once it is complete
    window.add(1000.0);
    clock.advance(Duration::from_millis(50));
    assert_eq!(max_sum(&window), 1000.0);
}

#[test]
fn test_window_forgets_after_full_span() {
    let clock = Arc::new(ManualClock::new());
    let window =
        RollingWindow::with_clock(5, Duration::from_millis(100), clock.clone()).unwrap();

    for _ in 0..5 {
        window.add(1.0);
        clock.advance(Duration::from_millis(100));
    }

    let mut count = 0;
    window.reduce(|b| count += b.count);
    assert_eq!(count, 4, "oldest bucket already reused");

    clock.advance(Duration::from_millis(500));
    let mut count = 0;
    window.reduce(|b| count += b.count);
    assert_eq!(count, 0);
}

#[test]
fn test_rejects_empty_shape() {
    assert!(RollingWindow::new(0, Duration::from_millis(100)).is_err());
    assert!(RollingWindow::new(10, Duration::ZERO).is_err());
}
