#![forbid(unsafe_code)]

//! Core: visibility watcher capability, observation manager, and scoped
//! subscription surface.
//!
//! The [`WatcherManager`](manager::WatcherManager) owns at most one live
//! watcher, the ordered set of observed elements, and the configuration the
//! next watcher will be built from. [`VisibilityScope`](scope::VisibilityScope)
//! wraps it in shared storage and hands out stable `observe` / `unobserve` /
//! `update` bindings for a host framework's render cycle.

pub mod error;
mod gate;
pub mod logging;
pub mod manager;
pub mod options;
pub mod scope;
#[cfg(any(test, feature = "test-helpers"))]
pub mod testing;
pub mod watcher;

pub use error::{ObserveError, OptionsError, Result};
pub use manager::{ObservationStats, WatcherManager};
pub use options::{MarginLength, ObserverOptions, RootMargin, Thresholds};
pub use scope::{ObserverBindings, VisibilityScope};
pub use watcher::{Delivery, VisibilityWatcher, WatcherFactory};
