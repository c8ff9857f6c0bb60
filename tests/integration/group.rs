//! Keyed shedders sharing one context.

use std::sync::Arc;
use std::thread;

use tokio_shedder::{ShedderGroup, ShedderOptions};

use crate::helpers::*;

#[test]
fn test_same_key_same_shedder() {
    let env = TestEnv::new(0);
    let group = ShedderGroup::new(env.ctx.clone(), fast_options()).unwrap();

    let a = group.get_shedder("orders").unwrap();
    let b = group.get_shedder("orders").unwrap();
    let c = group.get_shedder("payments").unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(group.len(), 2);
}

#[test]
fn test_keys_are_isolated() {
    let env = TestEnv::new(950);
    let group = ShedderGroup::new(env.ctx.clone(), fast_options()).unwrap();
    let busy = group.get_shedder("busy").unwrap();
    let quiet = group.get_shedder("quiet").unwrap();

    // The smoothed count stays zero until the first release, so all 50 get in
    let mut held: Vec<_> = (0..50).map(|_| busy.allow().unwrap()).collect();
    for p in held.drain(..10) {
        p.fail();
    }
    assert!(busy.allow().is_err());
    assert!(quiet.allow().is_ok());
    drop(held);
}

#[test]
fn test_concurrent_first_access() {
    let env = TestEnv::new(0);
    let group = Arc::new(ShedderGroup::new(env.ctx.clone(), fast_options()).unwrap());

    let shedders: Vec<_> = (0..16)
        .map(|_| {
            let group = Arc::clone(&group);
            thread::spawn(move || group.get_shedder("shared").unwrap())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert_eq!(group.len(), 1);
    assert!(shedders.iter().all(|s| Arc::ptr_eq(s, &shedders[0])));
}

#[test]
fn test_invalid_options_rejected() {
    let env = TestEnv::new(0);
    assert!(ShedderGroup::new(env.ctx.clone(), ShedderOptions::default().with_buckets(0)).is_err());
}

#[test]
fn test_disabled_group_hands_out_noop() {
    let env = TestEnv::new(1000);
    env.ctx.disable();
    let group = ShedderGroup::new(env.ctx.clone(), fast_options()).unwrap();
    assert!(group.get_shedder("any").unwrap().is_noop());
}
