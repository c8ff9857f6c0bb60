//! Fixed-bucket rolling window.
//!
//! The window is a ring of `size` buckets, each covering `interval`. Nothing
//! ticks in the background: every [`add`](RollingWindow::add) and
//! [`reduce`](RollingWindow::reduce) first slides the ring forward to the
//! current time, clearing the slots it steps into.
//!
//! ```text
//!  offset = 2 (current)
//!        ↓
//! [b0][b1][b2][b3][b4]     reduce visits b3, b4, b0, b1, b2 (oldest → newest)
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};

/// A sum/count pair for one time slot.
///
/// `sum` is whatever the owner accumulates: a count of passes for a
/// throughput window, total milliseconds for a latency window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bucket {
    /// Number of samples added to this slot.
    pub count: u64,
    /// Sum of the sample values.
    pub sum: f64,
}

impl Bucket {
    fn add(&mut self, v: f64) {
        self.count += 1;
        self.sum += v;
    }

    fn reset(&mut self) {
        self.count = 0;
        self.sum = 0.0;
    }

    /// Whether anything was recorded in this slot.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug)]
struct Ring {
    buckets: Vec<Bucket>,
    /// Index of the bucket covering `last_time`.
    offset: usize,
    /// Start of the current bucket's time slot.
    last_time: Instant,
}

/// Sliding window of time-bucketed sums and counts.
pub struct RollingWindow {
    ring: Mutex<Ring>,
    size: usize,
    interval: Duration,
    ignore_current: bool,
    clock: Arc<dyn Clock>,
}

impl RollingWindow {
    /// Create a window of `size` buckets, each spanning `interval`.
    pub fn new(size: usize, interval: Duration) -> Result<Self> {
        Self::with_clock(size, interval, Arc::new(SystemClock))
    }

    /// Create a window reading time from `clock`.
    pub fn with_clock(size: usize, interval: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        if size < 1 {
            return Err(Error::invalid("buckets", "must be at least 1"));
        }
        if interval.is_zero() {
            return Err(Error::invalid("bucket duration", "must be greater than zero"));
        }

        let now = clock.now();
        Ok(Self {
            ring: Mutex::new(Ring {
                buckets: vec![Bucket::default(); size],
                offset: 0,
                last_time: now,
            }),
            size,
            interval,
            ignore_current: false,
            clock,
        })
    }

    /// Exclude the still-filling bucket from [`reduce`](Self::reduce).
    pub fn ignore_current_bucket(mut self, ignore: bool) -> Self {
        self.ignore_current = ignore;
        self
    }

    /// Number of buckets in the ring.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Duration covered by one bucket.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Record `v` into the current bucket.
    pub fn add(&self, v: f64) {
        let now = self.clock.now();
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        self.advance(&mut ring, now);
        let offset = ring.offset;
        ring.buckets[offset].add(v);
    }

    /// Visit buckets from oldest to newest.
    pub fn reduce<F>(&self, mut f: F)
    where
        F: FnMut(&Bucket),
    {
        let now = self.clock.now();
        let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
        self.advance(&mut ring, now);

        let visible = if self.ignore_current {
            self.size - 1
        } else {
            self.size
        };
        let start = (ring.offset + 1) % self.size;
        for i in 0..visible {
            f(&ring.buckets[(start + i) % self.size]);
        }
    }

    /// Slide the ring to `now`.
    ///
    /// Clears one slot per whole interval elapsed since `last_time`, at most
    /// `size` of them, then realigns `last_time` to the start of the slot
    /// that contains `now`.
    fn advance(&self, ring: &mut Ring, now: Instant) {
        let elapsed = now.saturating_duration_since(ring.last_time);
        let interval = self.interval.as_nanos();
        let steps = elapsed.as_nanos() / interval;
        if steps == 0 {
            return;
        }

        let span = steps.min(self.size as u128) as usize;
        for i in 1..=span {
            let idx = (ring.offset + i) % self.size;
            ring.buckets[idx].reset();
        }
        ring.offset = (ring.offset + span) % self.size;

        let remainder = (elapsed.as_nanos() % interval) as u64;
        ring.last_time = now - Duration::from_nanos(remainder);
    }
}

impl std::fmt::Debug for RollingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingWindow")
            .field("size", &self.size)
            .field("interval", &self.interval)
            .field("ignore_current", &self.ignore_current)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const INTERVAL: Duration = Duration::from_millis(50);

    fn window(size: usize, clock: &Arc<ManualClock>) -> RollingWindow {
        RollingWindow::with_clock(size, INTERVAL, clock.clone()).unwrap()
    }

    fn sums(w: &RollingWindow) -> Vec<f64> {
        let mut out = Vec::new();
        w.reduce(|b| out.push(b.sum));
        out
    }

    #[test]
    fn test_rejects_zero_buckets() {
        let err = RollingWindow::new(0, INTERVAL).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { field: "buckets", .. }));
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(RollingWindow::new(4, Duration::ZERO).is_err());
    }

    #[test]
    fn test_add_visible_immediately() {
        let clock = Arc::new(ManualClock::new());
        let w = window(4, &clock);
        w.add(7.0);

        let mut total = 0.0;
        let mut count = 0;
        w.reduce(|b| {
            total += b.sum;
            count += b.count;
        });
        assert_eq!(total, 7.0);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_ignore_current_hides_filling_bucket() {
        let clock = Arc::new(ManualClock::new());
        let w = window(4, &clock).ignore_current_bucket(true);
        w.add(7.0);

        assert_eq!(sums(&w), vec![0.0, 0.0, 0.0]);

        clock.advance(INTERVAL);
        assert_eq!(sums(&w), vec![0.0, 0.0, 7.0]);
    }

    #[test]
    fn test_reduce_oldest_to_newest() {
        let clock = Arc::new(ManualClock::new());
        let w = window(3, &clock);
        for v in [1.0, 2.0, 3.0] {
            w.add(v);
            clock.advance(INTERVAL);
        }
        // The fourth slot reused the oldest bucket and cleared it.
        assert_eq!(sums(&w), vec![2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_advance_sweeps_every_skip_count() {
        let size = 5;
        for skip in 0..=size + 1 {
            let clock = Arc::new(ManualClock::new());
            let w = window(size, &clock);

            // Fill every slot with one sample, ending on the last slot.
            for i in 0..size {
                if i > 0 {
                    clock.advance(INTERVAL);
                }
                w.add(1.0);
            }
            assert_eq!(sums(&w).iter().sum::<f64>(), size as f64);

            clock.advance(INTERVAL * skip as u32);
            let remaining: f64 = sums(&w).iter().sum();
            let expected = size.saturating_sub(skip) as f64;
            assert_eq!(remaining, expected, "skip={}", skip);

            // The next add lands in a freshly cleared slot.
            w.add(10.0);
            let newest = *sums(&w).last().unwrap();
            let expected_newest = if skip == 0 { 11.0 } else { 10.0 };
            assert_eq!(newest, expected_newest, "skip={}", skip);
        }
    }

    #[test]
    fn test_partial_interval_keeps_alignment() {
        let clock = Arc::new(ManualClock::new());
        let w = window(4, &clock);

        w.add(1.0);
        clock.advance(Duration::from_millis(70));
        w.add(2.0);
        // 70ms in: second slot, aligned at 50ms. 30ms more crosses into the third.
        clock.advance(Duration::from_millis(30));
        w.add(4.0);

        assert_eq!(sums(&w), vec![0.0, 1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_max_of_complete_buckets() {
        let clock = Arc::new(ManualClock::new());
        let w = RollingWindow::with_clock(10, INTERVAL, clock.clone())
            .unwrap()
            .ignore_current_bucket(true);

        for i in 0..=10 {
            w.add((i * 100) as f64);
            clock.advance(INTERVAL);
        }

        let mut max = 0.0f64;
        w.reduce(|b| max = max.max(b.sum));
        assert_eq!(max, 1000.0);
    }

    #[test]
    fn test_concurrent_adds() {
        let w = Arc::new(RollingWindow::new(10, Duration::from_secs(60)).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let w = Arc::clone(&w);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        w.add(1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut count = 0;
        w.reduce(|b| count += b.count);
        assert_eq!(count, 8000);
    }
}
