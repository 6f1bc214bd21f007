#![forbid(unsafe_code)]

//! The observation manager.
//!
//! [`WatcherManager`] owns three pieces of state for one subscription
//! session: the configuration the next watcher is built from, the ordered
//! set of observed elements, and at most one live watcher.
//!
//! # Invariants
//!
//! 1. While a watcher exists, exactly the elements in the observed set are
//!    registered with it.
//! 2. The observed set holds each element (by identity) at most once.
//! 3. At most one watcher exists; a replaced watcher is released before the
//!    new one starts receiving elements, and its deliveries are discarded.
//! 4. After teardown the set is empty, no watcher exists, and nothing more
//!    reaches the host callback.
//!
//! # Failure Modes
//!
//! - **Factory rejects the config**: the error is returned as
//!   [`ObserveError::Factory`]; the current watcher, set and config are left
//!   untouched.
//! - **Element not accepted by the factory**: ignored without error.
//! - **Use after teardown**: every operation returns
//!   [`ObserveError::TornDown`]. Teardown itself is idempotent.

use std::fmt;
use std::rc::Rc;

use crate::error::{ObserveError, Result};
use crate::gate::DeliveryGate;
use crate::watcher::{Delivery, VisibilityWatcher, WatcherFactory};

#[cfg(feature = "tracing")]
use crate::logging::{debug, warn};
#[cfg(not(feature = "tracing"))]
use crate::{debug, warn};

/// Lifetime counters for one manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ObservationStats {
    pub watchers_created: u64,
    pub watchers_released: u64,
    /// Notifications passed through to the host callback.
    pub deliveries_forwarded: u64,
    /// Notifications from replaced or released watchers that were discarded.
    pub deliveries_dropped: u64,
}

/// Coordinates one lazily created watcher over a deduplicated element set.
///
/// Not thread-safe (`!Send`): all operations must come from the thread that
/// owns the host UI.
pub struct WatcherManager<F: WatcherFactory> {
    factory: F,
    callback: Delivery<F::Notification>,
    /// `None` only after teardown.
    config: Option<F::Config>,
    watcher: Option<F::Watcher>,
    observed: Vec<F::Element>,
    gate: DeliveryGate,
    watchers_created: u64,
    watchers_released: u64,
    torn_down: bool,
}

impl<F: WatcherFactory> fmt::Debug for WatcherManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherManager")
            .field("observed", &self.observed.len())
            .field("has_watcher", &self.watcher.is_some())
            .field("generation", &self.gate.current())
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

impl<F: WatcherFactory> WatcherManager<F> {
    /// Create a manager. No watcher is created until one is needed.
    pub fn new(factory: F, callback: impl Fn(F::Notification) + 'static, config: F::Config) -> Self {
        Self::with_delivery(factory, Rc::new(callback), config)
    }

    /// Create a manager from an already shared delivery callback.
    pub fn with_delivery(factory: F, callback: Delivery<F::Notification>, config: F::Config) -> Self {
        Self {
            factory,
            callback,
            config: Some(config),
            watcher: None,
            observed: Vec::new(),
            gate: DeliveryGate::new(),
            watchers_created: 0,
            watchers_released: 0,
            torn_down: false,
        }
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Replace the watcher with one built from `config`, carrying every
    /// observed element over to it.
    ///
    /// On factory failure nothing changes and the error is returned.
    pub fn reconfigure(&mut self, config: F::Config) -> Result<(), F::Error> {
        self.ensure_live("reconfigure")?;

        #[cfg(feature = "tracing")]
        let span = tracing::debug_span!(
            "observe.reconfigure",
            elements = self.observed.len(),
            generation = tracing::field::Empty
        );
        #[cfg(feature = "tracing")]
        let _guard = span.enter();

        let mut next = self.spawn_watcher(&config)?;
        self.watchers_created += 1;

        if let Some(previous) = self.watcher.take() {
            self.release_watcher(previous);
        }
        for element in &self.observed {
            next.register(element);
        }
        self.watcher = Some(next);
        self.config = Some(config);

        #[cfg(feature = "tracing")]
        span.record("generation", self.gate.current());
        Ok(())
    }

    /// Start observing `element`.
    ///
    /// Creates the watcher from the stored config on first use. Observing an
    /// element twice is a no-op; an element the factory does not accept is
    /// ignored.
    pub fn observe(&mut self, element: &F::Element) -> Result<(), F::Error> {
        self.ensure_live("observe")?;

        if self.watcher.is_none() {
            let config = self.config.as_ref().ok_or(ObserveError::TornDown)?;
            let watcher = self.spawn_watcher(config)?;
            self.watchers_created += 1;
            self.watcher = Some(watcher);
        }

        if !self.factory.accepts(element) {
            debug!(message = "observe.element.ignored", observed = self.observed.len());
            return Ok(());
        }
        if self.observed.contains(element) {
            return Ok(());
        }
        if let Some(watcher) = self.watcher.as_mut() {
            watcher.register(element);
        }
        self.observed.push(element.clone());
        Ok(())
    }

    /// Stop observing `element`. Absent elements are a no-op.
    ///
    /// Never creates a watcher, and never drops the watcher when the set
    /// becomes empty.
    pub fn unobserve(&mut self, element: &F::Element) -> Result<(), F::Error> {
        self.ensure_live("unobserve")?;

        let before = self.observed.len();
        self.observed.retain(|observed| observed != element);
        if self.observed.len() < before {
            if let Some(watcher) = self.watcher.as_mut() {
                watcher.unregister(element);
            }
        }
        Ok(())
    }

    /// Clear the set, drop the config and release the watcher.
    ///
    /// Idempotent. Runs automatically on drop.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.gate.close();
        self.observed.clear();
        self.config = None;
        if let Some(watcher) = self.watcher.take() {
            self.release_watcher(watcher);
        }
        debug!(
            message = "observe.teardown",
            watchers_created = self.watchers_created
        );
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Observed elements in insertion order.
    #[must_use]
    pub fn observed(&self) -> &[F::Element] {
        &self.observed
    }

    #[must_use]
    pub fn is_observing(&self, element: &F::Element) -> bool {
        self.observed.contains(element)
    }

    #[must_use]
    pub fn has_watcher(&self) -> bool {
        self.watcher.is_some()
    }

    /// The live watcher, if one has been created.
    #[must_use]
    pub fn watcher(&self) -> Option<&F::Watcher> {
        self.watcher.as_ref()
    }

    /// Config the next watcher would be built from. `None` after teardown.
    #[must_use]
    pub fn config(&self) -> Option<&F::Config> {
        self.config.as_ref()
    }

    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Generation of the current watcher; 0 before the first is created.
    ///
    /// Numbers are never reused, so a failed `create` leaves a gap.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.gate.current()
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    #[must_use]
    pub fn stats(&self) -> ObservationStats {
        ObservationStats {
            watchers_created: self.watchers_created,
            watchers_released: self.watchers_released,
            deliveries_forwarded: self.gate.forwarded(),
            deliveries_dropped: self.gate.dropped(),
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn ensure_live(&self, op: &'static str) -> Result<(), F::Error> {
        if self.torn_down {
            warn!(message = "observe.use_after_teardown", op);
            return Err(ObserveError::TornDown);
        }
        Ok(())
    }

    /// Build a watcher for the next generation and make it current.
    ///
    /// The generation is committed only after `create` succeeds, so a
    /// rejected config leaves the previous watcher's deliveries flowing.
    /// A callback kept by a failed `create` holds a generation that is
    /// never committed and stays silent.
    fn spawn_watcher(&self, config: &F::Config) -> Result<F::Watcher, F::Error> {
        let generation = self.gate.next();
        let delivery = self.gate.wrap(generation, Rc::clone(&self.callback));
        let watcher = self
            .factory
            .create(delivery, config)
            .map_err(ObserveError::Factory)?;
        self.gate.commit(generation);
        debug!(message = "observe.watcher.create", generation);
        Ok(watcher)
    }

    fn release_watcher(&mut self, mut watcher: F::Watcher) {
        watcher.release();
        self.watchers_released += 1;
        debug!(
            message = "observe.watcher.release",
            released = self.watchers_released
        );
    }
}

impl<F: WatcherFactory> Drop for WatcherManager<F> {
    fn drop(&mut self) {
        self.teardown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
