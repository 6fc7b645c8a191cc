//! Parking lot: a wait-set threads register into to sleep until woken.
//!
//! A [`ParkingLot`] coordinates any number of parking threads against one or
//! more wakers. A thread parks by linking a stack-allocated waiter node into
//! the lot's intrusive list, then blocking on its own thread-local condition
//! variable; wakers pop nodes off the list and signal the owning thread.
//!
//! The primitive supports waiting on **two** lots at once: the same thread
//! links one node into each lot and learns on wake which of them released
//! it. The scheduler uses this so a thread awaiting a job can simultaneously
//! be woken by new work on its queue.
//!
//! Lost wakeups are ruled out by discipline rather than timeouts: the park
//! predicate is evaluated only *after* the nodes are linked, and every event
//! that can satisfy a predicate is followed by an unpark on the matching
//! lot. An event landing between linkage and the predicate check is
//! therefore observed either by the predicate or by the unpark, never by
//! neither.
//!
//! # Examples
//!
//! ```
//! use taskpark::ParkingLot;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::thread;
//!
//! let lot = ParkingLot::new();
//! let ready = AtomicBool::new(false);
//!
//! thread::scope(|s| {
//!     s.spawn(|| {
//!         lot.park_until(|| ready.load(Ordering::Acquire));
//!         // released by the predicate or by the unpark; either way the
//!         // store below is visible now
//!         assert!(ready.load(Ordering::Acquire));
//!     });
//!
//!     ready.store(true, Ordering::Release);
//!     lot.unpark_all();
//! });
//! ```

use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::spinlock::Spinlock;

// Thread status values. Transitions are idle -> parked -> woken-by-X -> idle;
// the woken value records which lot performed the unpark.
const IDLE: u8 = 0;
const PARKED: u8 = 1;
const WOKEN_FIRST: u8 = 2;
const WOKEN_SECOND: u8 = 3;

/// Which source released a parked thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The park predicate reported true before the thread went to sleep.
    Predicate,
    /// The lot `park_until` was invoked on performed the unpark.
    First,
    /// The second lot of a two-lot park performed the unpark.
    Second,
}

/// Per-thread blocking state: a status atomic plus the host mutex and
/// condition variable the thread actually sleeps on.
struct ThreadState {
    status: AtomicU8,
    lock: Mutex<()>,
    cond: Condvar,
}

thread_local! {
    static PARKER: ThreadState = const { ThreadState::new() };
}

impl ThreadState {
    const fn new() -> Self {
        Self {
            status: AtomicU8::new(IDLE),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Wakes the owning thread if it is still parked, tagging it with the
    /// waking lot's `token`. Returns whether this call performed the wake.
    fn unpark(&self, token: u8) -> bool {
        if self
            .status
            .compare_exchange(PARKED, token, Ordering::Release, Ordering::Relaxed)
            .is_err()
        {
            // someone else already claimed the wake, or the thread rolled
            // its park back on the predicate path
            return false;
        }

        // hold the mutex while signalling: the waiter is then either still
        // ahead of its status check (and will skip the sleep) or fully
        // blocked inside the wait, never in between
        let _held = self.lock.lock();
        self.cond.notify_one();
        true
    }

    /// Blocks until some lot unparks this thread, then reports which.
    fn wait(&self) -> Wake {
        {
            let mut held = self.lock.lock();
            while self.status.load(Ordering::Acquire) == PARKED {
                self.cond.wait(&mut held);
            }
        }

        match self.status.swap(IDLE, Ordering::Acquire) {
            WOKEN_SECOND => Wake::Second,
            _ => Wake::First,
        }
    }
}

/// One entry in a lot's waiter list. Lives on the parking thread's stack for
/// exactly the duration of one park call; `linked` tracks whether the node
/// is still reachable from the list and is only touched under the lot's
/// spinlock.
struct Waiter {
    thread: *const ThreadState,
    token: u8,
    linked: bool,
    prev: *mut Waiter,
    next: *mut Waiter,
}

impl Waiter {
    fn new(thread: &ThreadState, token: u8) -> Self {
        Self {
            thread,
            token,
            linked: false,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
        }
    }
}

/// Doubly-linked list of borrowed waiter nodes.
struct WaiterList {
    head: *mut Waiter,
    tail: *mut Waiter,
}

// Raw node pointers are only dereferenced under the owning lot's spinlock,
// while the parking threads they belong to are pinned inside their park
// calls.
unsafe impl Send for WaiterList {}

impl WaiterList {
    const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            tail: ptr::null_mut(),
        }
    }

    unsafe fn push_back(&mut self, node: *mut Waiter) {
        (*node).prev = self.tail;
        (*node).next = ptr::null_mut();
        (*node).linked = true;
        if self.tail.is_null() {
            self.head = node;
        } else {
            (*self.tail).next = node;
        }
        self.tail = node;
    }

    unsafe fn remove(&mut self, node: *mut Waiter) {
        let prev = (*node).prev;
        let next = (*node).next;
        if prev.is_null() {
            self.head = next;
        } else {
            (*prev).next = next;
        }
        if next.is_null() {
            self.tail = prev;
        } else {
            (*next).prev = prev;
        }
        (*node).linked = false;
    }

    unsafe fn pop_front(&mut self) -> Option<*mut Waiter> {
        let node = self.head;
        if node.is_null() {
            None
        } else {
            self.remove(node);
            Some(node)
        }
    }
}

/// A wait-set threads park in until an unpark or a satisfied predicate
/// releases them.
pub struct ParkingLot {
    waiters: Spinlock<WaiterList>,
}

impl ParkingLot {
    /// Creates an empty lot.
    pub const fn new() -> Self {
        Self {
            waiters: Spinlock::new(WaiterList::new()),
        }
    }

    /// Parks the current thread in this lot until an unpark arrives or
    /// `pred` reports true.
    ///
    /// The predicate is evaluated once, after the thread is linked into the
    /// lot; if it returns true the park rolls back without sleeping and
    /// [`Wake::Predicate`] is returned. Otherwise the thread sleeps until
    /// [`unpark_one`](Self::unpark_one) or
    /// [`unpark_all`](Self::unpark_all) releases it.
    ///
    /// A thread may occupy at most one park at a time; a nested call
    /// returns immediately.
    pub fn park_until(&self, pred: impl FnMut() -> bool) -> Wake {
        PARKER.with(|thread| self.park(thread, None, pred))
    }

    /// Parks the current thread in this lot *and* in `second`
    /// simultaneously.
    ///
    /// Whichever lot unparks the thread first is reported in the returned
    /// [`Wake`]; the node left behind in the other lot is unlinked before
    /// the call returns.
    pub fn park_until_either(&self, second: &ParkingLot, pred: impl FnMut() -> bool) -> Wake {
        PARKER.with(|thread| self.park(thread, Some(second), pred))
    }

    fn park(
        &self,
        thread: &ThreadState,
        second: Option<&ParkingLot>,
        mut pred: impl FnMut() -> bool,
    ) -> Wake {
        // a thread can occupy at most one park at a time
        if thread
            .status
            .compare_exchange(IDLE, PARKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Wake::Predicate;
        }

        let mut first_node = Waiter::new(thread, WOKEN_FIRST);
        let first_ptr: *mut Waiter = &mut first_node;
        self.link(first_ptr);

        let mut second_node = second.map(|_| Waiter::new(thread, WOKEN_SECOND));
        let second_ptr = second_node
            .as_mut()
            .map_or(ptr::null_mut(), |node| node as *mut Waiter);
        if let Some(lot) = second {
            lot.link(second_ptr);
        }

        // the predicate runs only now that we are linked: any event making
        // it true must also unpark this lot, so the wake cannot fall into
        // the gap between the check and the sleep
        if pred() {
            thread.status.store(IDLE, Ordering::Release);
            self.unlink(first_ptr);
            if let Some(lot) = second {
                lot.unlink(second_ptr);
            }
            return Wake::Predicate;
        }

        let wake = thread.wait();

        // at most one lot removed our node while waking us; the other still
        // holds a link to stack memory about to go away
        self.unlink(first_ptr);
        if let Some(lot) = second {
            lot.unlink(second_ptr);
        }
        wake
    }

    fn link(&self, node: *mut Waiter) {
        let mut list = self.waiters.lock();
        unsafe { list.push_back(node) };
    }

    fn unlink(&self, node: *mut Waiter) {
        let mut list = self.waiters.lock();
        unsafe {
            if (*node).linked {
                list.remove(node);
            }
        }
    }

    /// Wakes at most one currently-parked thread.
    ///
    /// Threads that another source has already unparked are skipped.
    /// Returns whether a wake actually occurred.
    pub fn unpark_one(&self) -> bool {
        let mut list = self.waiters.lock();
        // a node's thread may have been released by the other lot of a
        // two-lot park while it still sat in our list; keep popping until a
        // wake lands
        while let Some(node) = unsafe { list.pop_front() } {
            let woke = unsafe { (*(*node).thread).unpark((*node).token) };
            if woke {
                return true;
            }
        }
        false
    }

    /// Attempts to wake every currently-parked thread.
    pub fn unpark_all(&self) {
        let mut list = self.waiters.lock();
        while let Some(node) = unsafe { list.pop_front() } {
            unsafe {
                (*(*node).thread).unpark((*node).token);
            }
        }
    }
}

impl Default for ParkingLot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_unpark_one_on_empty_lot() {
        let lot = ParkingLot::new();
        assert!(!lot.unpark_one());
    }

    #[test]
    fn test_predicate_short_circuits_sleep() {
        let lot = ParkingLot::new();
        assert_eq!(lot.park_until(|| true), Wake::Predicate);
        // the rollback must leave the lot empty
        assert!(!lot.unpark_one());
    }

    #[test]
    fn test_unpark_one_releases_parked_thread() {
        let lot = ParkingLot::new();
        let released = AtomicBool::new(false);

        thread::scope(|s| {
            s.spawn(|| {
                let wake = lot.park_until(|| false);
                assert_eq!(wake, Wake::First);
                released.store(true, Ordering::Release);
            });

            while !lot.unpark_one() {
                thread::yield_now();
            }
        });

        assert!(released.load(Ordering::Acquire));
    }

    #[test]
    fn test_two_lot_park_reports_second_source() {
        let queue_lot = ParkingLot::new();
        let job_lot = ParkingLot::new();

        thread::scope(|s| {
            s.spawn(|| {
                let wake = queue_lot.park_until_either(&job_lot, || false);
                assert_eq!(wake, Wake::Second);
            });

            while !job_lot.unpark_one() {
                thread::yield_now();
            }
        });

        // the waiter unlinked from the lot that did not wake it
        assert!(!queue_lot.unpark_one());
        assert!(!job_lot.unpark_one());
    }

    #[test]
    fn test_unpark_all_releases_every_thread() {
        let lot = ParkingLot::new();
        let released = AtomicUsize::new(0);
        let parked = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    parked.fetch_add(1, Ordering::Release);
                    lot.park_until(|| false);
                    released.fetch_add(1, Ordering::Release);
                });
            }

            // wait until all four have at least reached the park call, then
            // sweep until each one has actually been woken
            while parked.load(Ordering::Acquire) != 4 {
                thread::yield_now();
            }
            while released.load(Ordering::Acquire) != 4 {
                lot.unpark_all();
                thread::sleep(Duration::from_millis(1));
            }
        });

        assert_eq!(released.load(Ordering::Acquire), 4);
    }
}
