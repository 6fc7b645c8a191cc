//! Spin-based mutual exclusion for short critical sections.
//!
//! `Spinlock` is a test-then-exchange lock: contending threads busy-load the
//! flag until it reads free before attempting the exchange, which keeps the
//! cacheline in a shared state while the lock is held. It is only suitable
//! for critical sections that run a handful of instructions and never block;
//! the parking lot uses it to guard waiter-list linkage.
//!
//! # Examples
//!
//! ```
//! use taskpark::Spinlock;
//! use std::thread;
//!
//! let lock = Spinlock::new(0);
//!
//! thread::scope(|s| {
//!     for _ in 0..4 {
//!         s.spawn(|| {
//!             for _ in 0..1000 {
//!                 *lock.lock() += 1;
//!             }
//!         });
//!     }
//! });
//!
//! assert_eq!(*lock.lock(), 4000);
//! ```

use std::cell::UnsafeCell;
use std::hint;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// A test-then-exchange spinlock protecting a value of type `T`.
///
/// Unlike a sleeping mutex, a contending thread never yields to the OS; it
/// burns cycles until the holder releases. Hold times must stay short.
pub struct Spinlock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// The lock serializes all access to `value`, so sharing the lock only
// requires the value itself to be sendable between threads.
unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    /// Creates a new unlocked spinlock around `value`.
    pub const fn new(value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, spinning until it is available.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        loop {
            // read-only spin until the flag is observed free; the exchange
            // below is the only write issued while contended
            while self.locked.load(Ordering::Acquire) {
                hint::spin_loop();
            }

            // another thread may have taken the lock between our load and
            // the exchange, in which case we go back to spinning
            if !self.locked.swap(true, Ordering::Acquire) {
                return SpinlockGuard { lock: self };
            }
        }
    }
}

impl<T: Default> Default for Spinlock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// RAII guard granting access to the protected value; releases on drop.
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}
