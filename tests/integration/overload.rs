//! Overload detection through the public shedder API.

use std::time::Duration;

use tokio_shedder::shedder::COOL_OFF_DURATION;
use tokio_shedder::{AdaptiveShedder, Error, Promise, Shedder};

use crate::helpers::*;

fn hold(shedder: &AdaptiveShedder, n: usize) -> Vec<Promise> {
    (0..n)
        .map(|i| {
            shedder
                .allow()
                .unwrap_or_else(|e| panic!("request {} rejected: {}", i, e))
        })
        .collect()
}

/// Fill up 50 requests, release 10 so the smoothed count catches up, then
/// turn the CPU hot.
fn overloaded(env: &TestEnv) -> (AdaptiveShedder, Vec<Promise>) {
    let shedder = AdaptiveShedder::new(&env.ctx, fast_options()).unwrap();
    let mut held = hold(&shedder, 50);
    for p in held.drain(..10) {
        p.fail();
    }
    assert_eq!(shedder.flying(), 40);
    // Empty windows give max_flight = 1 * 10 * 1000ms / 1000 = 10
    assert!(shedder.avg_flying() > 10.0);
    (shedder, held)
}

#[test]
fn test_admits_everything_while_cpu_is_low() {
    let env = TestEnv::new(100);
    let (shedder, held) = overloaded(&env);

    let extra = shedder.allow().expect("low CPU never sheds");
    extra.pass();
    assert_eq!(env.alerts.count(), 0);
    drop(held);
    assert_eq!(shedder.flying(), 0);
}

#[test]
fn test_sheds_when_hot_and_busy() {
    let env = TestEnv::new(100);
    let (shedder, held) = overloaded(&env);

    env.cpu.set(950);
    let err = shedder.allow().unwrap_err();
    assert_eq!(err, Error::ServiceOverloaded);
    assert_eq!(shedder.flying(), 40, "a drop takes no slot");

    let alert = env.alerts.last().expect("drop raises an alert");
    assert_eq!(alert.reason, "dropreq");
    assert_eq!(alert.cpu, 950);
    assert_eq!(alert.flying, 40);
    assert!(!alert.hot);

    drop(held);
}

#[test]
fn test_cool_off_keeps_shedding_then_recovers() {
    let env = TestEnv::new(100);
    let (shedder, held) = overloaded(&env);

    env.cpu.set(950);
    assert!(shedder.allow().is_err());

    // CPU recovered but the last drop is recent
    env.cpu.set(100);
    env.advance(Duration::from_millis(500));
    assert!(shedder.allow().is_err());
    assert!(env.alerts.last().unwrap().hot);

    // Each drop restarts the cool-off
    env.advance(COOL_OFF_DURATION - Duration::from_millis(1));
    assert!(shedder.allow().is_err());

    env.advance(COOL_OFF_DURATION);
    let admitted = shedder.allow().expect("cool-off expired");
    assert_eq!(shedder.flying(), 41);

    admitted.pass();
    drop(held);
    assert_eq!(shedder.flying(), 0);
}

#[test]
fn test_hot_cpu_alone_does_not_shed() {
    let env = TestEnv::new(1000);
    let shedder = AdaptiveShedder::new(&env.ctx, fast_options()).unwrap();

    for _ in 0..100 {
        let p = shedder.allow().expect("idle service is never shed");
        env.advance(Duration::from_millis(5));
        p.pass();
    }
    assert_eq!(env.alerts.count(), 0);
}

#[test]
fn test_disabled_context_never_sheds() {
    let env = TestEnv::new(1000);
    env.ctx.disable();
    let shedder = env.ctx.new_shedder(fast_options()).unwrap();
    assert!(shedder.is_noop());

    let held: Vec<_> = (0..500).map(|_| shedder.allow().unwrap()).collect();
    drop(held);
    assert_eq!(env.alerts.count(), 0);
}
