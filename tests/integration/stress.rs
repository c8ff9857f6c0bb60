//! Concurrent callers against an always-overloaded shedder.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio_shedder::system::FixedCpu;
use tokio_shedder::{AdaptiveShedder, Shedder, ShedderContext, ShedderOptions};

const CALLERS: u64 = 100;
const CYCLES: u64 = 30;

#[derive(Default)]
struct Totals {
    calls: AtomicU64,
    drops: AtomicU64,
    passes: AtomicU64,
    fails: AtomicU64,
}

#[test]
fn test_concurrent_allow_is_conserved() {
    let ctx = ShedderContext::builder()
        .cpu(Arc::new(FixedCpu::new(1000)))
        .stat_logging(false)
        .build();
    let options = ShedderOptions::default()
        .with_window(Duration::from_millis(100))
        .with_buckets(10)
        .with_cpu_threshold(0);
    let shedder = AdaptiveShedder::new(&ctx, options).unwrap();
    let totals = Totals::default();

    // Saturate before the callers start. Admission only looks at the smoothed
    // count, which moves on release, so all 300 get in. Releasing 50 lifts it
    // well past the empty-window max_flight of 1 * 100 * 1000ms / 1000 = 100,
    // so at least the first concurrent call is shed.
    let mut held: Vec<_> = (0..300).map(|_| shedder.allow().unwrap()).collect();
    for p in held.drain(..50) {
        p.fail();
    }
    assert!(shedder.avg_flying() > 100.0);

    thread::scope(|s| {
        for caller in 0..CALLERS {
            let shedder = &shedder;
            let totals = &totals;
            s.spawn(move || {
                for cycle in 0..CYCLES {
                    totals.calls.fetch_add(1, Ordering::Relaxed);
                    match shedder.allow() {
                        Ok(promise) => {
                            if (caller + cycle) % 3 == 0 {
                                totals.fails.fetch_add(1, Ordering::Relaxed);
                                promise.fail();
                            } else {
                                thread::sleep(Duration::from_micros(200));
                                totals.passes.fetch_add(1, Ordering::Relaxed);
                                promise.pass();
                            }
                        }
                        Err(e) => {
                            assert!(e.is_overloaded());
                            totals.drops.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            });
        }
    });

    let calls = totals.calls.load(Ordering::Relaxed);
    let drops = totals.drops.load(Ordering::Relaxed);
    let passes = totals.passes.load(Ordering::Relaxed);
    let fails = totals.fails.load(Ordering::Relaxed);

    assert_eq!(calls, CALLERS * CYCLES);
    assert_eq!(drops + passes + fails, calls);
    assert!(drops > 0, "no call was shed under saturation");

    assert_eq!(shedder.flying(), 250);
    drop(held);
    assert_eq!(shedder.flying(), 0);
    assert!(shedder.avg_flying() >= 0.0);
}
