#![forbid(unsafe_code)]

//! Deterministic in-memory watchers for tests.
//!
//! [`RecordingFactory`] hands out [`RecordingWatcher`]s and keeps a
//! [`WatcherProbe`] for each one, so a test can inspect what was registered
//! and fire notifications after the watcher has moved into a manager.
//!
//! Cloning a `RecordingFactory` shares its state: keep one clone in the test
//! and move the other into the manager.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::options::ObserverOptions;
use crate::watcher::{Delivery, VisibilityWatcher, WatcherFactory};

/// Element stand-in with identity by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestNode {
    id: u32,
    renderable: bool,
}

impl TestNode {
    /// A renderable node.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self {
            id,
            renderable: true,
        }
    }

    /// A node the factory will refuse to watch.
    #[must_use]
    pub const fn detached(id: u32) -> Self {
        Self {
            id,
            renderable: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub const fn is_renderable(&self) -> bool {
        self.renderable
    }
}

/// Notification payload used with [`TestFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestEntry {
    pub target: TestNode,
    pub visible: bool,
}

impl TestEntry {
    #[must_use]
    pub const fn new(target: TestNode, visible: bool) -> Self {
        Self { target, visible }
    }
}

/// The factory most tests want.
pub type TestFactory = RecordingFactory<TestNode, ObserverOptions, TestEntry>;

/// One recorded call on a watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherCall<T> {
    Register(T),
    Unregister(T),
    Release,
}

/// Injected factory failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("recording factory rejected configuration (attempt {attempt})")]
pub struct RecordingError {
    pub attempt: u64,
}

// ── Probe ────────────────────────────────────────────────────────────────

struct ProbeState<T, C, N> {
    index: usize,
    config: C,
    delivery: Delivery<N>,
    calls: Vec<WatcherCall<T>>,
    registered: Vec<T>,
    released: bool,
}

/// Test-side view of one created watcher.
pub struct WatcherProbe<T, C, N> {
    inner: Rc<RefCell<ProbeState<T, C, N>>>,
}

impl<T, C, N> Clone for WatcherProbe<T, C, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug, C, N> fmt::Debug for WatcherProbe<T, C, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("WatcherProbe")
            .field("index", &inner.index)
            .field("registered", &inner.registered)
            .field("released", &inner.released)
            .finish()
    }
}

impl<T: Clone + PartialEq, C: Clone, N> WatcherProbe<T, C, N> {
    /// Creation order, starting at 0.
    #[must_use]
    pub fn index(&self) -> usize {
        self.inner.borrow().index
    }

    /// Config the watcher was created with.
    #[must_use]
    pub fn config(&self) -> C {
        self.inner.borrow().config.clone()
    }

    #[must_use]
    pub fn calls(&self) -> Vec<WatcherCall<T>> {
        self.inner.borrow().calls.clone()
    }

    /// Currently registered elements, in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<T> {
        self.inner.borrow().registered.clone()
    }

    #[must_use]
    pub fn is_registered(&self, element: &T) -> bool {
        self.inner.borrow().registered.contains(element)
    }

    /// How many times `register` was called for `element`.
    #[must_use]
    pub fn register_count(&self, element: &T) -> usize {
        self.inner
            .borrow()
            .calls
            .iter()
            .filter(|call| matches!(call, WatcherCall::Register(e) if e == element))
            .count()
    }

    #[must_use]
    pub fn is_released(&self) -> bool {
        self.inner.borrow().released
    }

    /// Invoke the delivery callback unconditionally, as a faulty platform
    /// watcher might after release.
    pub fn trigger(&self, notification: N) {
        let delivery = Rc::clone(&self.inner.borrow().delivery);
        delivery(notification);
    }
}

impl<C: Clone> WatcherProbe<TestNode, C, TestEntry> {
    /// Report a visibility change the way a conforming watcher does: only
    /// for registered elements and only before release.
    ///
    /// Returns whether a notification was emitted.
    pub fn notify(&self, element: &TestNode, visible: bool) -> bool {
        let delivery = {
            let inner = self.inner.borrow();
            if inner.released || !inner.registered.contains(element) {
                return false;
            }
            Rc::clone(&inner.delivery)
        };
        delivery(TestEntry::new(element.clone(), visible));
        true
    }
}

// ── Watcher ──────────────────────────────────────────────────────────────

/// Watcher handed to the manager by [`RecordingFactory`].
pub struct RecordingWatcher<T, C, N> {
    probe: WatcherProbe<T, C, N>,
}

impl<T, C, N> RecordingWatcher<T, C, N> {
    #[must_use]
    pub fn probe(&self) -> WatcherProbe<T, C, N> {
        self.probe.clone()
    }
}

impl<T: Clone + PartialEq, C, N> VisibilityWatcher for RecordingWatcher<T, C, N> {
    type Element = T;

    fn register(&mut self, element: &T) {
        let mut inner = self.probe.inner.borrow_mut();
        inner.calls.push(WatcherCall::Register(element.clone()));
        if !inner.registered.contains(element) {
            inner.registered.push(element.clone());
        }
    }

    fn unregister(&mut self, element: &T) {
        let mut inner = self.probe.inner.borrow_mut();
        inner.calls.push(WatcherCall::Unregister(element.clone()));
        inner.registered.retain(|e| e != element);
    }

    fn release(&mut self) {
        let mut inner = self.probe.inner.borrow_mut();
        inner.calls.push(WatcherCall::Release);
        inner.registered.clear();
        inner.released = true;
    }
}

// ── Factory ──────────────────────────────────────────────────────────────

type Acceptor<T> = Rc<dyn Fn(&T) -> bool>;

struct FactoryState<T, C, N> {
    probes: Vec<WatcherProbe<T, C, N>>,
    attempts: Cell<u64>,
    fail_next: Cell<bool>,
    /// Callbacks passed to `create` calls that were then failed.
    rejected: Vec<Delivery<N>>,
    acceptor: Option<Acceptor<T>>,
}

/// Factory that records every watcher it creates.
pub struct RecordingFactory<T, C, N> {
    state: Rc<RefCell<FactoryState<T, C, N>>>,
}

impl<T, C, N> Clone for RecordingFactory<T, C, N> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T, C, N> fmt::Debug for RecordingFactory<T, C, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("RecordingFactory")
            .field("created", &state.probes.len())
            .field("attempts", &state.attempts.get())
            .finish()
    }
}

impl<T, C, N> Default for RecordingFactory<T, C, N> {
    fn default() -> Self {
        Self {
            state: Rc::new(RefCell::new(FactoryState {
                probes: Vec::new(),
                attempts: Cell::new(0),
                fail_next: Cell::new(false),
                rejected: Vec::new(),
                acceptor: None,
            })),
        }
    }
}

impl<T, C, N> RecordingFactory<T, C, N> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept elements matching `accept`.
    #[must_use]
    pub fn with_acceptor(self, accept: impl Fn(&T) -> bool + 'static) -> Self {
        self.state.borrow_mut().acceptor = Some(Rc::new(accept));
        self
    }

    /// Make the next `create` call fail.
    pub fn fail_next(&self) {
        self.state.borrow().fail_next.set(true);
    }

    /// Number of watchers successfully created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.state.borrow().probes.len()
    }

    /// Number of `create` calls, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.state.borrow().attempts.get()
    }

    /// The callback handed to the `index`-th failed `create` call.
    ///
    /// Kept so tests can fire it after the fact, like a backend that
    /// leaks its callback on an error path.
    #[must_use]
    pub fn rejected_delivery(&self, index: usize) -> Option<Delivery<N>> {
        self.state.borrow().rejected.get(index).cloned()
    }

    #[must_use]
    pub fn probe(&self, index: usize) -> Option<WatcherProbe<T, C, N>> {
        self.state.borrow().probes.get(index).cloned()
    }

    /// The most recently created watcher.
    #[must_use]
    pub fn latest(&self) -> Option<WatcherProbe<T, C, N>> {
        self.state.borrow().probes.last().cloned()
    }

    /// Watchers that have not been released.
    #[must_use]
    pub fn live(&self) -> usize {
        self.state
            .borrow()
            .probes
            .iter()
            .filter(|probe| !probe.inner.borrow().released)
            .count()
    }
}

impl<C> RecordingFactory<TestNode, C, TestEntry> {
    /// Factory accepting only renderable [`TestNode`]s.
    #[must_use]
    pub fn for_nodes() -> Self {
        Self::new().with_acceptor(TestNode::is_renderable)
    }
}

impl<T, C, N> WatcherFactory for RecordingFactory<T, C, N>
where
    T: Clone + PartialEq + 'static,
    C: Clone + 'static,
    N: 'static,
{
    type Element = T;
    type Config = C;
    type Notification = N;
    type Watcher = RecordingWatcher<T, C, N>;
    type Error = RecordingError;

    fn create(&self, callback: Delivery<N>, config: &C) -> Result<Self::Watcher, RecordingError> {
        let mut state = self.state.borrow_mut();
        let attempt = state.attempts.get() + 1;
        state.attempts.set(attempt);
        if state.fail_next.replace(false) {
            state.rejected.push(callback);
            return Err(RecordingError { attempt });
        }
        let probe = WatcherProbe {
            inner: Rc::new(RefCell::new(ProbeState {
                index: state.probes.len(),
                config: config.clone(),
                delivery: callback,
                calls: Vec::new(),
                registered: Vec::new(),
                released: false,
            })),
        };
        state.probes.push(probe.clone());
        Ok(RecordingWatcher { probe })
    }

    fn accepts(&self, element: &T) -> bool {
        let acceptor = self.state.borrow().acceptor.clone();
        acceptor.is_none_or(|accept| accept(element))
    }
}
