//! Keyed shedder registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::options::ShedderOptions;
use super::Shedder;
use crate::context::ShedderContext;
use crate::error::Result;

/// Lazily builds one shedder per key (route, priority class, ...).
///
/// Each key's shedder is constructed exactly once, even when the first
/// lookups race.
pub struct ShedderGroup {
    ctx: Arc<ShedderContext>,
    options: ShedderOptions,
    shedders: RwLock<HashMap<String, Arc<dyn Shedder>>>,
}

impl ShedderGroup {
    /// Create a group whose shedders share `options`.
    pub fn new(ctx: Arc<ShedderContext>, options: ShedderOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            ctx,
            options,
            shedders: RwLock::new(HashMap::new()),
        })
    }

    /// Shedder for `key`, built on first use.
    pub fn get_shedder(&self, key: &str) -> Result<Arc<dyn Shedder>> {
        // Fast path: read lock for existing shedders
        {
            let shedders = self.shedders.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(shedder) = shedders.get(key) {
                return Ok(Arc::clone(shedder));
            }
        }

        // Slow path: write lock, re-check, build
        let mut shedders = self.shedders.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(shedder) = shedders.get(key) {
            return Ok(Arc::clone(shedder));
        }

        let shedder = self.ctx.new_shedder(self.options)?;
        debug!(key, noop = shedder.is_noop(), "Shedder created for key");
        shedders.insert(key.to_string(), Arc::clone(&shedder));
        Ok(shedder)
    }

    /// Number of keys with a shedder.
    pub fn len(&self) -> usize {
        self.shedders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
