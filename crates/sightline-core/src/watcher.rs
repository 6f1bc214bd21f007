#![forbid(unsafe_code)]

//! The visibility watcher capability consumed by the manager.
//!
//! A [`WatcherFactory`] builds one [`VisibilityWatcher`] per configuration.
//! The watcher decides when elements become visible; this crate only tracks
//! which elements it should be watching and which instance is current.
//!
//! # Contract
//!
//! 1. `register` and `unregister` are idempotent.
//! 2. After `release`, the watcher delivers nothing further through the
//!    callback it was created with.
//! 3. `create` either returns a live watcher or fails synchronously.

use std::rc::Rc;

/// Delivery callback handed to each watcher instance.
///
/// Shared so that every instance forwards to the same host callback.
pub type Delivery<N> = Rc<dyn Fn(N)>;

/// A live watcher bound to one configuration and one delivery callback.
pub trait VisibilityWatcher {
    type Element;

    /// Begin monitoring `element`.
    fn register(&mut self, element: &Self::Element);

    /// Stop monitoring `element`.
    fn unregister(&mut self, element: &Self::Element);

    /// Stop all monitoring. No delivery may follow.
    fn release(&mut self);
}

/// Builds watchers.
pub trait WatcherFactory {
    /// Element reference. `PartialEq` must compare identity, not content.
    type Element: Clone + PartialEq;
    /// Opaque configuration, forwarded untouched to [`create`](Self::create).
    type Config;
    /// Change-notification payload, forwarded untouched to the host callback.
    type Notification: 'static;
    type Watcher: VisibilityWatcher<Element = Self::Element>;
    type Error: std::error::Error + 'static;

    /// Construct a watcher that reports changes through `callback`.
    fn create(
        &self,
        callback: Delivery<Self::Notification>,
        config: &Self::Config,
    ) -> Result<Self::Watcher, Self::Error>;

    /// Whether `element` can be watched at all (e.g. it is a renderable
    /// element). Elements that fail this check are ignored by the manager.
    fn accepts(&self, _element: &Self::Element) -> bool {
        true
    }
}
