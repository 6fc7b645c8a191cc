//! # taskpark
//!
//! A lightweight, embeddable, work-stealing-free task scheduler for
//! in-process parallelism.
//!
//! Units of work are spawned onto a [`Queue`], executed by any number of
//! worker threads (including the caller), and optionally grouped into
//! [`Job`]s that expose collective completion. Idle workers sleep in a
//! [`ParkingLot`] and are woken exactly when there is new work or a
//! completed job; the lot supports parking on two wake sources at once, so
//! a thread awaiting a job keeps reacting to work on its own queue.
//!
//! ## Modules
//!
//! - [`core`](crate::core) - the queue, jobs, and the spawn context
//! - [`delegate`] - fixed-size, move-only packaged callables
//! - [`park`] - the parking-lot wait/wake primitive
//! - [`spinlock`] - short-hold mutual exclusion for lot bookkeeping
//!
//! ## Examples
//!
//! ### Spawning and draining tasks
//!
//! ```
//! use taskpark::Queue;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let queue = Queue::new();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..8 {
//!     let counter = Arc::clone(&counter);
//!     queue
//!         .spawn_task(move || {
//!             counter.fetch_add(1, Ordering::Relaxed);
//!         })
//!         .unwrap();
//! }
//!
//! queue.work_all();
//! assert_eq!(counter.load(Ordering::Relaxed), 8);
//! ```
//!
//! ### Grouping tasks into a job and waiting on it
//!
//! ```
//! use taskpark::Queue;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let queue = Queue::new();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! let job = queue.create_job(|ctx| {
//!     for _ in 0..4 {
//!         let counter = Arc::clone(&counter);
//!         ctx.spawn_task(move || {
//!             counter.fetch_add(1, Ordering::Relaxed);
//!         })
//!         .unwrap();
//!     }
//! });
//!
//! // executes queued tasks while waiting for the job to complete
//! queue.wait_job_actively(&job);
//! assert!(job.complete());
//! assert_eq!(counter.load(Ordering::Relaxed), 4);
//! ```
//!
//! ### Dedicated worker threads
//!
//! ```
//! use taskpark::Queue;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::thread;
//!
//! let queue = Queue::new();
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! thread::scope(|s| {
//!     for _ in 0..2 {
//!         s.spawn(|| queue.work_forever());
//!     }
//!
//!     for _ in 0..100 {
//!         let counter = Arc::clone(&counter);
//!         queue
//!             .spawn_task(move || {
//!                 counter.fetch_add(1, Ordering::Relaxed);
//!             })
//!             .unwrap();
//!     }
//!
//!     while counter.load(Ordering::Relaxed) != 100 {
//!         queue.work_all();
//!     }
//!
//!     // releases both workers so the scope can join them
//!     queue.close();
//! });
//! ```

#![warn(clippy::all)]
#![deny(missing_docs)]

pub mod core;
pub mod delegate;
pub mod park;
pub mod spinlock;
pub mod util;

pub use crate::core::{Context, Job, Queue, SpawnError};
pub use delegate::{Delegate, IntoDelegate};
pub use park::{ParkingLot, Wake};
pub use spinlock::{Spinlock, SpinlockGuard};
