//! Reader-biased reader/writer lock.
//!
//! The first reader to arrive takes the exclusivity flag on behalf of every
//! reader and the last one to leave hands it back, so a waiting writer only
//! gets in once the reader count drops to zero. While a writer holds the flag,
//! the first new reader blocks on it with the count mutex held, which in turn
//! parks every later reader.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use lock_api::{GuardSend, RawRwLock};

/// Reader-biased lock around a value. Guards release on every exit path,
/// including early returns through `?` and unwinding.
pub type ReadBiasedLock<T> = lock_api::RwLock<RawReadBiasedLock, T>;
pub type ReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawReadBiasedLock, T>;
pub type WriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawReadBiasedLock, T>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The bare locking protocol, without protected data.
///
/// Unlike a `MutexGuard`, the exclusivity flag may be released by a different
/// thread than the one that took it, which is what lets the last reader out
/// release on behalf of the first reader in.
#[derive(Debug, Default)]
pub struct RawReadBiasedLock {
    readers: Mutex<usize>,
    exclusive: Mutex<bool>,
    exclusive_released: Condvar,
}

impl RawReadBiasedLock {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            readers: Mutex::new(0),
            exclusive: Mutex::new(false),
            exclusive_released: Condvar::new(),
        }
    }

    pub fn acquire_read(&self) {
        let mut readers = lock(&self.readers);
        *readers += 1;
        if *readers == 1 {
            self.acquire_exclusive();
        }
    }

    /// # Panics
    /// Panics when called without a matching [`Self::acquire_read`].
    pub fn release_read(&self) {
        let mut readers = lock(&self.readers);
        assert!(
            *readers > 0,
            "release_read called without a matching acquire_read"
        );
        *readers -= 1;
        if *readers == 0 {
            self.release_exclusive();
        }
    }

    pub fn acquire_write(&self) {
        self.acquire_exclusive();
    }

    /// # Panics
    /// Panics when no writer holds the lock.
    pub fn release_write(&self) {
        self.release_exclusive();
    }

    /// Number of readers currently inside.
    #[must_use]
    pub fn readers(&self) -> usize {
        *lock(&self.readers)
    }

    fn try_acquire_read(&self) -> bool {
        let mut readers = lock(&self.readers);
        if *readers == 0 && !self.try_acquire_exclusive() {
            return false;
        }
        *readers += 1;
        true
    }

    fn acquire_exclusive(&self) {
        let mut held = lock(&self.exclusive);
        while *held {
            held = self
                .exclusive_released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    fn try_acquire_exclusive(&self) -> bool {
        let mut held = lock(&self.exclusive);
        if *held {
            return false;
        }
        *held = true;
        true
    }

    fn release_exclusive(&self) {
        let mut held = lock(&self.exclusive);
        assert!(*held, "exclusive access released while not held");
        *held = false;
        drop(held);
        self.exclusive_released.notify_one();
    }
}

// SAFETY: shared access is granted only while the exclusivity flag is held on
// behalf of the readers, and exclusive access only while a writer holds it
// alone, so shared and exclusive holders never coexist. Releases may come
// from any thread, which `GuardSend` allows.
unsafe impl RawRwLock for RawReadBiasedLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        self.acquire_read();
    }

    fn try_lock_shared(&self) -> bool {
        self.try_acquire_read()
    }

    unsafe fn unlock_shared(&self) {
        self.release_read();
    }

    fn lock_exclusive(&self) {
        self.acquire_write();
    }

    fn try_lock_exclusive(&self) -> bool {
        self.try_acquire_exclusive()
    }

    unsafe fn unlock_exclusive(&self) {
        self.release_write();
    }
}
