//! Correlator allocation
//!
//! A correlator names one broadcast transaction. Values come from a fixed
//! pool `[1, size)`; allocation scans round-robin starting after the last
//! value issued so a freshly released correlator is not handed out again
//! straight away.

use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IntfError, IntfResult};

/// Opaque transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Correlator(u32);

impl Correlator {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct PoolInner {
    in_use: Vec<bool>,
    last: u32,
    live: usize,
}

/// Fixed-size correlator pool
#[derive(Debug)]
pub struct CorrelatorPool {
    size: u32,
    inner: Mutex<PoolInner>,
}

impl CorrelatorPool {
    /// Smallest pool that still issues one value
    pub const MIN_SIZE: u32 = 2;

    /// Create a pool issuing values in `[1, size)`
    pub fn new(size: u32) -> Self {
        let size = size.max(Self::MIN_SIZE);
        debug!(size, "CorrelatorPool::new: called");
        Self {
            size,
            inner: Mutex::new(PoolInner {
                in_use: vec![false; size as usize],
                last: 0,
                live: 0,
            }),
        }
    }

    /// Issue the next free correlator
    pub fn allocate(&self) -> IntfResult<Correlator> {
        let mut inner = self.inner.lock();
        let start = inner.last + 1;
        let candidate = (start..self.size)
            .chain(1..start.min(self.size))
            .find(|value| !inner.in_use[*value as usize]);

        match candidate {
            Some(value) => {
                inner.in_use[value as usize] = true;
                inner.last = value;
                inner.live += 1;
                debug!(correlator = value, live = inner.live, "CorrelatorPool::allocate: issued");
                Ok(Correlator(value))
            }
            None => {
                warn!(size = self.size, "CorrelatorPool::allocate: pool exhausted");
                Err(IntfError::PoolExhausted { in_use: inner.live })
            }
        }
    }

    /// Return a correlator to the pool. Releasing a free value is a no-op.
    pub fn release(&self, correlator: Correlator) -> IntfResult<()> {
        let value = correlator.0;
        if value == 0 || value >= self.size {
            warn!(correlator = value, size = self.size, "CorrelatorPool::release: out of range");
            return Err(IntfError::CorrelatorOutOfRange { value, size: self.size });
        }

        let mut inner = self.inner.lock();
        if std::mem::replace(&mut inner.in_use[value as usize], false) {
            inner.live -= 1;
            debug!(correlator = value, live = inner.live, "CorrelatorPool::release: released");
        }
        Ok(())
    }

    /// Number of correlators currently issued
    pub fn in_use(&self) -> usize {
        self.inner.lock().live
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_allocate_round_robin() {
        let pool = CorrelatorPool::new(5);
        let a = pool.allocate().unwrap();
        let b = pool.allocate().unwrap();
        assert_eq!((a.value(), b.value()), (1, 2));

        pool.release(a).unwrap();
        // Scan continues after the last issued value before wrapping
        assert_eq!(pool.allocate().unwrap().value(), 3);
        assert_eq!(pool.allocate().unwrap().value(), 4);
        assert_eq!(pool.allocate().unwrap().value(), 1);
    }

    #[test]
    fn test_pool_exhausted() {
        let pool = CorrelatorPool::new(3);
        pool.allocate().unwrap();
        pool.allocate().unwrap();
        assert_eq!(pool.allocate(), Err(IntfError::PoolExhausted { in_use: 2 }));
    }

    #[test]
    fn test_release_idempotent_and_range_checked() {
        let pool = CorrelatorPool::new(4);
        let c = pool.allocate().unwrap();
        assert_eq!(pool.in_use(), 1);
        pool.release(c).unwrap();
        pool.release(c).unwrap();
        assert_eq!(pool.in_use(), 0);

        assert!(matches!(
            pool.release(Correlator::new(0)),
            Err(IntfError::CorrelatorOutOfRange { value: 0, size: 4 })
        ));
        assert!(matches!(
            pool.release(Correlator::new(4)),
            Err(IntfError::CorrelatorOutOfRange { value: 4, .. })
        ));
    }

    #[test]
    fn test_tiny_pool_is_clamped() {
        let pool = CorrelatorPool::new(0);
        assert_eq!(pool.allocate().unwrap().value(), 1);
        assert!(pool.allocate().is_err());
    }

    proptest! {
        #[test]
        fn test_allocate_never_returns_live_value(
            size in 2u32..40,
            ops in proptest::collection::vec(any::<(bool, u8)>(), 1..200),
        ) {
            let pool = CorrelatorPool::new(size);
            let mut live: Vec<Correlator> = Vec::new();

            for (alloc, pick) in ops {
                if alloc || live.is_empty() {
                    match pool.allocate() {
                        Ok(c) => {
                            prop_assert!(c.value() >= 1 && c.value() < size);
                            prop_assert!(!live.contains(&c));
                            live.push(c);
                        }
                        Err(_) => prop_assert_eq!(live.len() as u32, size - 1),
                    }
                } else {
                    let c = live.swap_remove(pick as usize % live.len());
                    pool.release(c).unwrap();
                }
                let unique: HashSet<_> = live.iter().collect();
                prop_assert_eq!(unique.len(), live.len());
                prop_assert_eq!(pool.in_use(), live.len());
            }
        }
    }
}
