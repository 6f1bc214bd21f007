#![forbid(unsafe_code)]

//! `IntersectionObserver`-backed watcher.
//!
//! One [`IntersectionWatcher`] wraps one platform observer plus the JS
//! closure it calls. The closure is owned by the watcher, so it lives exactly
//! as long as the observer can still call it.

use js_sys::{Array, Reflect};
use sightline_core::{Delivery, ObserverOptions, VisibilityWatcher, WatcherFactory};
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen::prelude::Closure;
use web_sys::{
    Element, HtmlElement, IntersectionObserver, IntersectionObserverEntry,
    IntersectionObserverInit,
};

use crate::error::WebWatcherError;

type EntriesClosure = Closure<dyn FnMut(Array, IntersectionObserver)>;

/// Config for one platform observer: an optional root plus the options.
///
/// `root: None` observes against the top-level viewport.
#[derive(Debug, Clone, Default)]
pub struct WebObserverConfig {
    pub root: Option<Element>,
    pub options: ObserverOptions,
}

impl WebObserverConfig {
    #[must_use]
    pub fn with_root(mut self, root: Element) -> Self {
        self.root = Some(root);
        self
    }

    fn to_init(&self) -> Result<IntersectionObserverInit, WebWatcherError> {
        let init = IntersectionObserverInit::new();
        if let Some(root) = &self.root {
            // `root` is typed `Element or Document` and its generated setter
            // signature has changed between web-sys releases.
            Reflect::set(&init, &JsValue::from_str("root"), root)?;
        }
        init.set_root_margin(&self.options.root_margin().to_string());
        let thresholds: Array = self
            .options
            .thresholds()
            .iter()
            .map(|&t| JsValue::from_f64(t))
            .collect();
        init.set_threshold(&thresholds);
        Ok(init)
    }
}

impl From<ObserverOptions> for WebObserverConfig {
    fn from(options: ObserverOptions) -> Self {
        Self {
            root: None,
            options,
        }
    }
}

/// Builds [`IntersectionWatcher`]s.
///
/// Only `HTMLElement`s are accepted; SVG and other non-HTML elements are
/// ignored by the manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntersectionFactory;

impl WatcherFactory for IntersectionFactory {
    type Element = Element;
    type Config = WebObserverConfig;
    type Notification = Vec<IntersectionObserverEntry>;
    type Watcher = IntersectionWatcher;
    type Error = WebWatcherError;

    fn create(
        &self,
        callback: Delivery<Self::Notification>,
        config: &WebObserverConfig,
    ) -> Result<IntersectionWatcher, WebWatcherError> {
        let closure: EntriesClosure = Closure::new(move |entries: Array, _: IntersectionObserver| {
            let entries = entries
                .iter()
                .map(|value| value.unchecked_into::<IntersectionObserverEntry>())
                .collect();
            callback(entries);
        });
        let init = config.to_init()?;
        let observer =
            IntersectionObserver::new_with_options(closure.as_ref().unchecked_ref(), &init)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            message = "web.observer.create",
            root_margin = %config.options.root_margin(),
            thresholds = config.options.thresholds().len()
        );

        Ok(IntersectionWatcher {
            observer,
            _closure: closure,
            released: false,
        })
    }

    fn accepts(&self, element: &Element) -> bool {
        element.is_instance_of::<HtmlElement>()
    }
}

/// A live platform `IntersectionObserver`.
pub struct IntersectionWatcher {
    observer: IntersectionObserver,
    _closure: EntriesClosure,
    released: bool,
}

impl std::fmt::Debug for IntersectionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntersectionWatcher")
            .field("released", &self.released)
            .finish()
    }
}

impl IntersectionWatcher {
    /// The underlying platform observer.
    #[must_use]
    pub fn observer(&self) -> &IntersectionObserver {
        &self.observer
    }
}

impl VisibilityWatcher for IntersectionWatcher {
    type Element = Element;

    fn register(&mut self, element: &Element) {
        self.observer.observe(element);
    }

    fn unregister(&mut self, element: &Element) {
        self.observer.unobserve(element);
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // Drain queued entries so no pending task calls into the closure
        // after it is dropped.
        let pending = self.observer.take_records().length();
        self.observer.disconnect();

        #[cfg(feature = "tracing")]
        tracing::debug!(message = "web.observer.disconnect", pending);
        #[cfg(not(feature = "tracing"))]
        let _ = pending;
    }
}

impl Drop for IntersectionWatcher {
    fn drop(&mut self) {
        self.release();
    }
}
