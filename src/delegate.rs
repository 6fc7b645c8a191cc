//! Fixed-size, move-only packaged callables.
//!
//! A [`Delegate`] erases a user callable into a small inline buffer plus a
//! pair of function-pointer thunks; no heap allocation takes place. Two
//! callable shapes are accepted: a nullary closure, and a closure taking a
//! [`Context`] reference for spawning follow-up work. The scheduler always
//! invokes with a context and the nullary wrapper simply drops it.
//!
//! Callables larger than [`MAX_SIZE`] bytes or aligned beyond
//! [`MAX_ALIGNMENT`] are rejected when the constructor is instantiated;
//! capture an `Arc`/`Box` of the data instead of the data itself.
//!
//! # Examples
//!
//! ```
//! use taskpark::Delegate;
//!
//! let empty = Delegate::new();
//! assert!(empty.is_empty());
//!
//! let hello = Delegate::from_fn(|| println!("hello"));
//! assert!(!hello.is_empty());
//! ```

use std::mem::{self, MaybeUninit};

use crate::core::Context;

/// Inline storage capacity of a [`Delegate`], in bytes.
pub const MAX_SIZE: usize = mem::size_of::<*const ()>() * 3;

/// Maximum alignment a packaged callable may require.
pub const MAX_ALIGNMENT: usize = 8;

type CallThunk = unsafe fn(*mut u8, &mut Context<'_>);
type DropThunk = unsafe fn(*mut u8);

#[repr(align(8))]
struct Storage([MaybeUninit<u8>; MAX_SIZE]);

/// A type-erased, move-only packaged callable with inline storage.
pub struct Delegate {
    call: Option<CallThunk>,
    drop: Option<DropThunk>,
    storage: Storage,
}

// Construction requires the erased callable to be Send, so the delegate may
// cross threads with the task that carries it.
unsafe impl Send for Delegate {}

impl Delegate {
    /// Creates an empty delegate holding no callable.
    pub const fn new() -> Self {
        Self {
            call: None,
            drop: None,
            storage: Storage([MaybeUninit::uninit(); MAX_SIZE]),
        }
    }

    /// Packages a nullary callable.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::with_thunk(func, invoke_nullary::<F>)
    }

    /// Packages a callable that receives the spawn context it runs under.
    pub fn from_context_fn<F>(func: F) -> Self
    where
        F: FnOnce(&mut Context) + Send + 'static,
    {
        Self::with_thunk(func, invoke_with_context::<F>)
    }

    fn with_thunk<F: Send + 'static>(func: F, call: CallThunk) -> Self {
        const {
            assert!(
                mem::size_of::<F>() <= MAX_SIZE,
                "callable too large for Delegate inline storage"
            );
            assert!(
                mem::align_of::<F>() <= MAX_ALIGNMENT,
                "callable over-aligned for Delegate inline storage"
            );
        }

        let mut delegate = Self {
            call: Some(call),
            drop: Some(drop_payload::<F>),
            storage: Storage([MaybeUninit::uninit(); MAX_SIZE]),
        };
        unsafe {
            delegate.storage.0.as_mut_ptr().cast::<F>().write(func);
        }
        delegate
    }

    /// Reports whether this delegate holds no callable.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.call.is_none()
    }

    /// Consumes the delegate, invoking the packaged callable. Invoking an
    /// empty delegate does nothing.
    pub(crate) fn invoke(mut self, ctx: &mut Context<'_>) {
        if let Some(call) = self.call.take() {
            // the call thunk reads the payload out of storage, so the drop
            // thunk must not run again on these bytes
            self.drop = None;
            unsafe { call(self.storage.0.as_mut_ptr().cast::<u8>(), ctx) };
        }
    }
}

impl Default for Delegate {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Delegate {
    fn drop(&mut self) {
        if let Some(drop_fn) = self.drop.take() {
            unsafe { drop_fn(self.storage.0.as_mut_ptr().cast::<u8>()) };
        }
    }
}

impl std::fmt::Debug for Delegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delegate")
            .field("empty", &self.is_empty())
            .finish()
    }
}

unsafe fn invoke_nullary<F: FnOnce()>(storage: *mut u8, _ctx: &mut Context<'_>) {
    let func = storage.cast::<F>().read();
    func();
}

unsafe fn invoke_with_context<F>(storage: *mut u8, ctx: &mut Context<'_>)
where
    F: FnOnce(&mut Context),
{
    let func = storage.cast::<F>().read();
    func(ctx);
}

unsafe fn drop_payload<F>(storage: *mut u8) {
    storage.cast::<F>().drop_in_place();
}

/// Conversion of user callables into [`Delegate`]s.
///
/// The `Marker` parameter distinguishes the accepted callable shapes so the
/// blanket impls below do not overlap; it is inferred at the call site and
/// never named by users.
pub trait IntoDelegate<Marker>: Sized {
    /// Packages `self` as a delegate.
    fn into_delegate(self) -> Delegate;
}

#[doc(hidden)]
pub struct NullaryShape;

#[doc(hidden)]
pub struct ContextShape;

#[doc(hidden)]
pub struct ErasedShape;

impl<F> IntoDelegate<NullaryShape> for F
where
    F: FnOnce() + Send + 'static,
{
    fn into_delegate(self) -> Delegate {
        Delegate::from_fn(self)
    }
}

impl<F> IntoDelegate<ContextShape> for F
where
    F: FnOnce(&mut Context) + Send + 'static,
{
    fn into_delegate(self) -> Delegate {
        Delegate::from_context_fn(self)
    }
}

impl IntoDelegate<ErasedShape> for Delegate {
    fn into_delegate(self) -> Delegate {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Queue;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_empty_delegate() {
        assert!(Delegate::new().is_empty());
        assert!(Delegate::default().is_empty());
    }

    #[test]
    fn test_invoke_nullary() {
        let fired = Arc::new(AtomicBool::new(false));
        let delegate = Delegate::from_fn({
            let fired = Arc::clone(&fired);
            move || fired.store(true, Ordering::Release)
        });
        assert!(!delegate.is_empty());

        let queue = Queue::new();
        let mut ctx = Context::new(&queue, None);
        delegate.invoke(&mut ctx);
        assert!(fired.load(Ordering::Acquire));
    }

    #[test]
    fn test_invoke_with_context_spawns() {
        let queue = Queue::new();
        let fired = Arc::new(AtomicBool::new(false));

        let delegate = Delegate::from_context_fn({
            let fired = Arc::clone(&fired);
            move |ctx: &mut Context| {
                let fired = Arc::clone(&fired);
                ctx.spawn_task(move || fired.store(true, Ordering::Release))
                    .unwrap();
            }
        });

        let mut ctx = Context::new(&queue, None);
        delegate.invoke(&mut ctx);
        assert!(!fired.load(Ordering::Acquire));
        queue.work_all();
        assert!(fired.load(Ordering::Acquire));
    }

    #[test]
    fn test_uninvoked_delegate_drops_payload() {
        let payload = Arc::new(());
        let observer = Arc::downgrade(&payload);

        let delegate = Delegate::from_fn(move || drop(payload));
        assert_eq!(observer.strong_count(), 1);
        drop(delegate);
        assert_eq!(observer.strong_count(), 0);
    }
}
