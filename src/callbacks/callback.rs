//! # Callback abstraction and function-backed implementation.
//!
//! [`Callback`] is the unit of keeper logic the runtime schedules: block
//! handlers receive the [`Block`](crate::Block), periodic tasks receive `()`,
//! hooks receive a [`LifecycleHandle`](crate::LifecycleHandle).
//!
//! [`CallbackFn`] wraps a closure `F: Fn(T) -> Fut`, producing a fresh future per
//! call. Shared state goes into the closure explicitly (`Arc<...>`).
//!
//! ## Example
//! ```rust
//! use keepervisor::{Block, CallbackError, CallbackFn, CallbackRef};
//!
//! let handler: CallbackRef<Block> = CallbackFn::arc(|block: Block| async move {
//!     if block.number == 0 {
//!         return Err(CallbackError::fail("genesis"));
//!     }
//!     Ok(())
//! });
//! # let _ = handler;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::CallbackError;

/// Boxed future returned by a [`Callback`].
pub type BoxCallbackFuture = Pin<Box<dyn Future<Output = Result<(), CallbackError>> + Send + 'static>>;

/// Shared reference to a callback.
pub type CallbackRef<T> = Arc<dyn Callback<T>>;

/// # Asynchronous unit of keeper logic.
///
/// Implement it on a struct when the logic carries state; use [`CallbackFn`]
/// for closures.
///
/// # Example
/// ```
/// use std::sync::atomic::{AtomicU64, Ordering};
/// use keepervisor::{Block, BoxCallbackFuture, Callback};
///
/// #[derive(Default)]
/// struct Auctions { seen: AtomicU64 }
///
/// impl Callback<Block> for Auctions {
///     fn call(&self, block: Block) -> BoxCallbackFuture {
///         self.seen.store(block.number, Ordering::Relaxed);
///         Box::pin(async { Ok(()) })
///     }
/// }
/// ```
pub trait Callback<T>: Send + Sync + 'static {
    /// Starts one invocation.
    fn call(&self, input: T) -> BoxCallbackFuture;
}

/// Function-backed callback.
pub struct CallbackFn<F> {
    f: F,
}

impl<F> CallbackFn<F> {
    /// Creates a new function-backed callback.
    ///
    /// Prefer [`CallbackFn::arc`] when you immediately need a [`CallbackRef`].
    pub fn new<T, Fut>(f: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        Self { f }
    }

    /// Creates the callback and returns it as a shared handle.
    pub fn arc<T, Fut>(f: F) -> Arc<Self>
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
    {
        Arc::new(Self::new(f))
    }
}

impl<T, F, Fut> Callback<T> for CallbackFn<F>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    fn call(&self, input: T) -> BoxCallbackFuture {
        Box::pin((self.f)(input))
    }
}
