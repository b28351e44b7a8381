//! Runtime core: orchestration and lifecycle.
//!
//! The public API from this module is [`Lifecycle`] (built with
//! [`LifecycleBuilder`]), the [`LifecycleHandle`] given to keeper code,
//! [`Config`] and the final [`Outcome`].
//!
//! Internal modules:
//! - [`supervisor`]: startup checks, supervisory loop, ordered shutdown;
//! - [`handle`]: registration surface and the state shared with handles;
//! - [`watcher`]: new-block stream filtering and single-flight dispatch;
//! - [`periodic`]: fixed-interval tasks that survive failures;
//! - [`registry`]: supervised watches, liveness and stop-all;
//! - [`shutdown`]: cross-platform signal listener;
//! - [`state`]: termination flags and last-block timestamp.

mod builder;
mod config;
mod handle;
mod outcome;
mod periodic;
mod registry;
mod shutdown;
mod state;
mod supervisor;
mod watcher;

pub use builder::LifecycleBuilder;
pub use config::Config;
pub use handle::LifecycleHandle;
pub use outcome::Outcome;
pub use supervisor::Lifecycle;
