//! Optimistic latch: a versioned spinlock with invalidation and a small
//! inline payload.
//!
//! A single `AtomicU64` is partitioned, from the low bits up, into a version
//! counter, one exclusive-lock bit, and `PAYLOAD_BITS` payload bits. The
//! all-ones word is reserved as the *invalid* sentinel: once a node's owning
//! structure is retired, `invalidate` sets the whole word to `u64::MAX` and
//! every subsequent `read_version`/`validate`/`lock` call observes
//! [`Abort::Retry`] instead of spinning forever.
//!
//! There are no blocking waits here — every operation either succeeds, spins
//! on a transient lock bit, or aborts. Callers restart at the outermost
//! public operation.

use std::hint;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Abort, AbortResult};

const INVALID: u64 = u64::MAX;

/// A versioned spinlock carrying `PAYLOAD_BITS` of inline payload above the
/// lock bit and version counter. ART nodes use `PAYLOAD_BITS = 0`; the
/// `IndexEntry` leaf payload uses a wider instantiation.
pub struct OptimisticLatch<const PAYLOAD_BITS: u32> {
    word: AtomicU64,
}

impl<const PAYLOAD_BITS: u32> OptimisticLatch<PAYLOAD_BITS> {
    const VERSION_BITS: u32 = 63 - PAYLOAD_BITS;
    const VERSION_MASK: u64 = (1u64 << Self::VERSION_BITS) - 1;
    const LOCK_BIT: u64 = 1u64 << Self::VERSION_BITS;
    const PAYLOAD_SHIFT: u32 = Self::VERSION_BITS + 1;

    /// Construct an unlocked latch at version 0 with the given payload.
    pub fn new(payload: u64) -> Self {
        debug_assert!(payload < (1u64 << PAYLOAD_BITS).max(1) || PAYLOAD_BITS == 0);
        Self {
            word: AtomicU64::new(payload << Self::PAYLOAD_SHIFT),
        }
    }

    fn decode(word: u64) -> (u64, bool, u64) {
        let version = word & Self::VERSION_MASK;
        let locked = word & Self::LOCK_BIT != 0;
        let payload = word >> Self::PAYLOAD_SHIFT;
        (version, locked, payload)
    }

    /// Spin until the exclusive bit is clear, returning the version read.
    /// `Abort::Retry` if the latch was invalidated.
    pub fn read_version(&self) -> AbortResult<u64> {
        loop {
            let word = self.word.load(Ordering::Acquire);
            if word == INVALID {
                return Err(Abort::Retry);
            }
            let (version, locked, _payload) = Self::decode(word);
            if !locked {
                return Ok(version);
            }
            hint::spin_loop();
        }
    }

    /// Confirm that the version observed by an earlier `read_version` is
    /// still current (and the latch is still valid / unlocked).
    pub fn validate(&self, expected: u64) -> AbortResult<()> {
        let word = self.word.load(Ordering::Acquire);
        if word == INVALID {
            return Err(Abort::Retry);
        }
        let (version, locked, _payload) = Self::decode(word);
        if locked || version != expected {
            return Err(Abort::Retry);
        }
        Ok(())
    }

    /// CAS from `(version = expected, xlock = 0)` to `(version = expected,
    /// xlock = 1)`. Aborts on mismatch (including invalidation).
    pub fn upgrade(&self, expected: u64) -> AbortResult<()> {
        let word = self.word.load(Ordering::Acquire);
        if word == INVALID {
            return Err(Abort::Retry);
        }
        let (version, locked, _payload) = Self::decode(word);
        if locked || version != expected {
            return Err(Abort::Retry);
        }
        let desired = word | Self::LOCK_BIT;
        self.word
            .compare_exchange(word, desired, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Abort::Retry)
    }

    /// Acquire the exclusive bit unconditionally, spinning past transient
    /// contention. Aborts if the latch is invalid.
    pub fn lock(&self) -> AbortResult<()> {
        loop {
            let word = self.word.load(Ordering::Acquire);
            if word == INVALID {
                return Err(Abort::Retry);
            }
            let (_version, locked, _payload) = Self::decode(word);
            if locked {
                hint::spin_loop();
                continue;
            }
            let desired = word | Self::LOCK_BIT;
            if self
                .word
                .compare_exchange_weak(word, desired, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

    /// Release the exclusive bit and bump the version, invalidating
    /// outstanding optimistic readers.
    pub fn unlock(&self) {
        self.unlock_inner(true);
    }

    /// Release the exclusive bit *without* bumping the version ("phantom
    /// lock"). Used when a section holds exclusive access briefly
    /// without wanting to invalidate concurrent optimistic readers — the
    /// chunk-wide rebalancer's bookkeeping pass is the one caller of this.
    pub fn unlock_phantom(&self) {
        self.unlock_inner(false);
    }

    fn unlock_inner(&self, bump_version: bool) {
        let mut word = self.word.load(Ordering::Acquire);
        loop {
            debug_assert_ne!(word, INVALID, "unlocking an invalidated latch");
            let (version, _locked, payload) = Self::decode(word);
            let new_version = if bump_version {
                (version + 1) & Self::VERSION_MASK
            } else {
                version
            };
            let desired = (payload << Self::PAYLOAD_SHIFT) | new_version;
            match self
                .word
                .compare_exchange_weak(word, desired, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => word = actual,
            }
        }
    }

    /// Mark the latch permanently invalid. Every subsequent `read_version`,
    /// `validate`, `upgrade`, or `lock` call observes `Abort::Retry`.
    pub fn invalidate(&self) {
        self.word.store(INVALID, Ordering::Release);
    }

    /// True once `invalidate` has been called.
    pub fn is_invalid(&self) -> bool {
        self.word.load(Ordering::Acquire) == INVALID
    }

    /// Read the inline payload without any version/lock validation. Callers
    /// that need a consistent payload should pair this with
    /// `read_version`/`validate`.
    pub fn get_payload(&self) -> u64 {
        let word = self.word.load(Ordering::Acquire);
        if word == INVALID {
            return 0;
        }
        Self::decode(word).2
    }

    /// Overwrite the payload bits in place while holding the exclusive lock.
    /// Caller must already hold the lock (i.e. have called `lock` or
    /// `upgrade` successfully and not yet `unlock`ed).
    pub fn set_payload(&self, payload: u64) {
        let mut word = self.word.load(Ordering::Acquire);
        loop {
            let (version, locked, _old_payload) = Self::decode(word);
            debug_assert!(locked, "set_payload called without holding the latch");
            let desired = (payload << Self::PAYLOAD_SHIFT) | (version) | Self::LOCK_BIT;
            match self
                .word
                .compare_exchange_weak(word, desired, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => word = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_validate_roundtrip() {
        let latch = OptimisticLatch::<0>::new(0);
        let v = latch.read_version().unwrap();
        assert!(latch.validate(v).is_ok());
    }

    #[test]
    fn lock_unlock_bumps_version() {
        let latch = OptimisticLatch::<0>::new(0);
        let v0 = latch.read_version().unwrap();
        latch.lock().unwrap();
        latch.unlock();
        let v1 = latch.read_version().unwrap();
        assert_eq!(v1, v0 + 1);
    }

    #[test]
    fn phantom_unlock_preserves_version() {
        let latch = OptimisticLatch::<0>::new(0);
        let v0 = latch.read_version().unwrap();
        latch.lock().unwrap();
        latch.unlock_phantom();
        let v1 = latch.read_version().unwrap();
        assert_eq!(v1, v0);
    }

    #[test]
    fn validate_fails_after_concurrent_lock() {
        let latch = OptimisticLatch::<0>::new(0);
        let v = latch.read_version().unwrap();
        latch.lock().unwrap();
        latch.unlock();
        assert_eq!(latch.validate(v), Err(Abort::Retry));
    }

    #[test]
    fn invalidate_fails_everything() {
        let latch = OptimisticLatch::<0>::new(0);
        latch.invalidate();
        assert!(latch.is_invalid());
        assert_eq!(latch.read_version(), Err(Abort::Retry));
        assert_eq!(latch.lock(), Err(Abort::Retry));
    }

    #[test]
    fn payload_roundtrip() {
        let latch = OptimisticLatch::<16>::new(42);
        assert_eq!(latch.get_payload(), 42);
        latch.lock().unwrap();
        latch.set_payload(7);
        latch.unlock();
        assert_eq!(latch.get_payload(), 7);
    }
}
