#![forbid(unsafe_code)]

//! Browser backend: [`WatcherFactory`](sightline_core::WatcherFactory) over
//! the platform `IntersectionObserver`.
//!
//! Only `wasm32` builds carry the factory; other targets compile the error
//! type so that shared code can name it.
//!
//! # Usage
//!
//! ```ignore
//! use sightline_core::{ObserverOptions, VisibilityScope};
//! use sightline_web::{IntersectionFactory, WebObserverConfig};
//!
//! let scope = VisibilityScope::new(
//!     IntersectionFactory,
//!     |entries: Vec<web_sys::IntersectionObserverEntry>| {
//!         for entry in entries {
//!             web_sys::console::log_1(&entry.is_intersecting().into());
//!         }
//!     },
//!     WebObserverConfig::from(ObserverOptions::new().with_threshold(0.5)?),
//! );
//! scope.observe(&element)?;
//! // Dropping `scope` disconnects the observer.
//! ```

mod error;
#[cfg(target_arch = "wasm32")]
mod observer;

pub use error::WebWatcherError;
#[cfg(target_arch = "wasm32")]
pub use observer::{IntersectionFactory, IntersectionWatcher, WebObserverConfig};
