//! Shedder that admits everything.

use super::promise::Promise;
use super::Shedder;
use crate::error::Result;

/// Admits every request and records nothing.
///
/// Handed out once shedding has been disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopShedder;

impl Shedder for NopShedder {
    fn allow(&self) -> Result<Promise> {
        Ok(Promise::noop())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_always_allows() {
        let shedder = NopShedder;
        for i in 0..1000 {
            let promise = shedder.allow().unwrap();
            if i % 2 == 0 {
                promise.pass();
            } else {
                promise.fail();
            }
        }
        assert!(shedder.is_noop());
    }
}
