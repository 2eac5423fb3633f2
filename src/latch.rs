//! Call-scoped re-entrancy latch.
//!
//! Metadata interception sits on every read and write of the host store, so
//! an interceptor that itself reads or writes metadata would re-enter itself.
//! A latch marks a key as "in progress" for the lifetime of a guard; a nested
//! attempt on the same key fails to acquire and passes through instead.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

#[derive(Debug)]
pub struct Latch<K: Eq + Hash> {
    held: RefCell<HashSet<K>>,
}

impl<K: Eq + Hash> Default for Latch<K> {
    fn default() -> Self {
        Self {
            held: RefCell::new(HashSet::new()),
        }
    }
}

impl<K: Eq + Hash + Clone + Debug> Latch<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when `key` is already held further up the call stack
    pub fn try_acquire(&self, key: K) -> Option<LatchGuard<'_, K>> {
        if !self.held.borrow_mut().insert(key.clone()) {
            return None;
        }
        Some(LatchGuard { latch: self, key })
    }

    pub fn is_held(&self, key: &K) -> bool {
        self.held.borrow().contains(key)
    }
}

/// Releases its key when dropped, on every exit path
#[derive(Debug)]
pub struct LatchGuard<'a, K: Eq + Hash + Clone + Debug> {
    latch: &'a Latch<K>,
    key: K,
}

impl<K: Eq + Hash + Clone + Debug> Drop for LatchGuard<'_, K> {
    fn drop(&mut self) {
        self.latch.held.borrow_mut().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_acquire_fails() {
        let latch: Latch<u32> = Latch::new();
        let guard = latch.try_acquire(1).unwrap();
        assert!(latch.try_acquire(1).is_none());
        assert!(latch.try_acquire(2).is_some());
        drop(guard);
        assert!(latch.try_acquire(1).is_some());
    }

    #[test]
    fn test_released_on_early_return() {
        fn work(latch: &Latch<()>, fail: bool) -> Result<(), String> {
            let _guard = latch.try_acquire(()).ok_or("busy")?;
            if fail {
                return Err("failed".to_string());
            }
            Ok(())
        }

        let latch = Latch::new();
        assert!(work(&latch, true).is_err());
        assert!(!latch.is_held(&()));
        assert!(work(&latch, false).is_ok());
    }

    #[test]
    fn test_keys_are_independent() {
        let latch: Latch<(u64, String)> = Latch::new();
        let _a = latch.try_acquire((1, "_a".to_string())).unwrap();
        assert!(latch.try_acquire((1, "_b".to_string())).is_some());
        assert!(latch.try_acquire((2, "_a".to_string())).is_some());
        assert!(latch.is_held(&(1, "_a".to_string())));
    }
}
