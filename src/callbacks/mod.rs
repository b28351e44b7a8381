//! # Callback abstractions.
//!
//! - [`Callback`] trait for keeper logic (blocks, periodic tasks, hooks)
//! - [`CallbackFn`] closure-backed implementation
//! - [`CallbackRef`] shared reference (`Arc<dyn Callback<T>>`)
//! - [`AsyncCallback`] single-flight wrapper used for block handlers

mod async_callback;
mod callback;

pub use async_callback::AsyncCallback;
pub use callback::{BoxCallbackFuture, Callback, CallbackFn, CallbackRef};
