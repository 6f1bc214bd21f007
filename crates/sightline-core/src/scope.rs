#![forbid(unsafe_code)]

//! Scoped subscription surface for a host UI framework.
//!
//! A [`VisibilityScope`] is created once per component instance and dropped
//! when the component unmounts. It hands out [`ObserverBindings`]: three
//! reference-counted functions whose identity never changes for the life of
//! the scope, so they can sit in a render cycle's dependency list without
//! triggering re-subscription.
//!
//! # Invariants
//!
//! 1. `bindings()` returns clones of the same three `Rc`s every time.
//! 2. Dropping the scope tears the manager down, releasing its watcher.
//! 3. Bindings outliving the scope return [`ObserveError::TornDown`].
//! 4. A binding called while another operation on the same scope is in
//!    progress returns [`ObserveError::Busy`] instead of panicking.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{ObserveError, Result};
use crate::manager::WatcherManager;
use crate::watcher::WatcherFactory;

/// Binding that swaps in a new watcher configuration.
pub type UpdateFn<C, E> = Rc<dyn Fn(C) -> Result<(), E>>;
/// Binding that adds or removes one element.
pub type ElementFn<T, E> = Rc<dyn Fn(&T) -> Result<(), E>>;

/// The `update` / `observe` / `unobserve` triple handed to the host.
pub struct ObserverBindings<T, C, E> {
    pub update: UpdateFn<C, E>,
    pub observe: ElementFn<T, E>,
    pub unobserve: ElementFn<T, E>,
}

impl<T, C, E> Clone for ObserverBindings<T, C, E> {
    fn clone(&self) -> Self {
        Self {
            update: Rc::clone(&self.update),
            observe: Rc::clone(&self.observe),
            unobserve: Rc::clone(&self.unobserve),
        }
    }
}

impl<T, C, E> fmt::Debug for ObserverBindings<T, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverBindings")
            .field("update", &Rc::as_ptr(&self.update).cast::<()>())
            .field("observe", &Rc::as_ptr(&self.observe).cast::<()>())
            .field("unobserve", &Rc::as_ptr(&self.unobserve).cast::<()>())
            .finish()
    }
}

impl<T, C, E> ObserverBindings<T, C, E> {
    /// Whether both triples are the same functions.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.update, &other.update)
            && Rc::ptr_eq(&self.observe, &other.observe)
            && Rc::ptr_eq(&self.unobserve, &other.unobserve)
    }
}

type SharedManager<F> = Rc<RefCell<WatcherManager<F>>>;

/// Owns one [`WatcherManager`] for the lifetime of a host component.
pub struct VisibilityScope<F: WatcherFactory> {
    manager: SharedManager<F>,
    bindings: ObserverBindings<F::Element, F::Config, F::Error>,
}

impl<F: WatcherFactory> fmt::Debug for VisibilityScope<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.manager.try_borrow() {
            Ok(manager) => f.debug_tuple("VisibilityScope").field(&*manager).finish(),
            Err(_) => f.write_str("VisibilityScope(<busy>)"),
        }
    }
}

impl<F> VisibilityScope<F>
where
    F: WatcherFactory + 'static,
{
    /// Create the scope. No watcher exists until the first `observe` or
    /// `update`.
    pub fn new(
        factory: F,
        callback: impl Fn(F::Notification) + 'static,
        config: F::Config,
    ) -> Self {
        let manager = Rc::new(RefCell::new(WatcherManager::new(factory, callback, config)));
        let bindings = ObserverBindings {
            update: {
                let weak = Rc::downgrade(&manager);
                Rc::new(move |config: F::Config| {
                    with_manager(&weak, |m| m.reconfigure(config))
                })
            },
            observe: {
                let weak = Rc::downgrade(&manager);
                Rc::new(move |element: &F::Element| with_manager(&weak, |m| m.observe(element)))
            },
            unobserve: {
                let weak = Rc::downgrade(&manager);
                Rc::new(move |element: &F::Element| {
                    with_manager(&weak, |m| m.unobserve(element))
                })
            },
        };
        Self { manager, bindings }
    }

    /// The stable binding triple.
    #[must_use]
    pub fn bindings(&self) -> ObserverBindings<F::Element, F::Config, F::Error> {
        self.bindings.clone()
    }

    pub fn update(&self, config: F::Config) -> Result<(), F::Error> {
        (self.bindings.update)(config)
    }

    pub fn observe(&self, element: &F::Element) -> Result<(), F::Error> {
        (self.bindings.observe)(element)
    }

    pub fn unobserve(&self, element: &F::Element) -> Result<(), F::Error> {
        (self.bindings.unobserve)(element)
    }

    /// Read the manager state.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an operation on this scope.
    pub fn inspect<R>(&self, f: impl FnOnce(&WatcherManager<F>) -> R) -> R {
        f(&*self.manager.borrow())
    }

    /// End the scope now instead of at drop.
    pub fn close(self) {
        drop(self);
    }
}

impl<F: WatcherFactory> Drop for VisibilityScope<F> {
    fn drop(&mut self) {
        // If a binding is mid-call the manager is torn down when that
        // call's temporary strong reference goes away.
        if let Ok(mut manager) = self.manager.try_borrow_mut() {
            manager.teardown();
        }
    }
}

fn with_manager<F, R>(
    weak: &Weak<RefCell<WatcherManager<F>>>,
    op: impl FnOnce(&mut WatcherManager<F>) -> Result<R, F::Error>,
) -> Result<R, F::Error>
where
    F: WatcherFactory,
{
    let Some(manager) = weak.upgrade() else {
        return Err(ObserveError::TornDown);
    };
    let Ok(mut guard) = manager.try_borrow_mut() else {
        return Err(ObserveError::Busy);
    };
    op(&mut *guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ObserverOptions;
    use crate::testing::{RecordingError, TestEntry, TestFactory, TestNode};
    use std::cell::Cell;

    fn scope(factory: &TestFactory) -> (VisibilityScope<TestFactory>, Rc<Cell<usize>>) {
        let count = Rc::new(Cell::new(0));
        let count_clone = Rc::clone(&count);
        let scope = VisibilityScope::new(
            factory.clone(),
            move |_entry: TestEntry| count_clone.set(count_clone.get() + 1),
            ObserverOptions::default(),
        );
        (scope, count)
    }

    #[test]
    fn bindings_keep_identity() {
        let factory = TestFactory::for_nodes();
        let (scope, _) = scope(&factory);
        let first = scope.bindings();
        scope.observe(&TestNode::new(1)).unwrap();
        scope
            .update(ObserverOptions::new().with_threshold(0.5).unwrap())
            .unwrap();
        let second = scope.bindings();
        assert!(first.same_identity(&second));
    }

    #[test]
    fn bindings_drive_the_manager() {
        let factory = TestFactory::for_nodes();
        let (scope, count) = scope(&factory);
        let bindings = scope.bindings();
        let a = TestNode::new(1);

        (bindings.observe)(&a).unwrap();
        assert!(scope.inspect(|m| m.is_observing(&a)));

        assert!(factory.latest().unwrap().notify(&a, true));
        assert_eq!(count.get(), 1);

        (bindings.unobserve)(&a).unwrap();
        assert!(scope.inspect(|m| m.observed().is_empty()));
    }

    #[test]
    fn drop_tears_down() {
        let factory = TestFactory::for_nodes();
        let (scope, count) = scope(&factory);
        let bindings = scope.bindings();
        let a = TestNode::new(1);
        scope.observe(&a).unwrap();
        let probe = factory.latest().unwrap();

        scope.close();

        assert!(probe.is_released());
        probe.trigger(TestEntry::new(a.clone(), true));
        assert_eq!(count.get(), 0);
        assert!((bindings.observe)(&a).unwrap_err().is_torn_down());
        assert!((bindings.unobserve)(&a).unwrap_err().is_torn_down());
        assert!(
            (bindings.update)(ObserverOptions::default())
                .unwrap_err()
                .is_torn_down()
        );
        assert_eq!(factory.created(), 1);
    }

    #[test]
    fn binding_inside_delivery_is_allowed() {
        let factory = TestFactory::for_nodes();
        let slot: Rc<RefCell<Option<ObserverBindings<TestNode, ObserverOptions, RecordingError>>>> =
            Rc::new(RefCell::new(None));
        let slot_clone = Rc::clone(&slot);
        let scope = VisibilityScope::new(
            factory.clone(),
            move |entry: TestEntry| {
                // Stop watching once the element has been seen.
                if let Some(bindings) = slot_clone.borrow().as_ref() {
                    (bindings.unobserve)(&entry.target).unwrap();
                }
            },
            ObserverOptions::default(),
        );
        *slot.borrow_mut() = Some(scope.bindings());

        let a = TestNode::new(1);
        scope.observe(&a).unwrap();
        assert!(factory.latest().unwrap().notify(&a, true));
        assert!(scope.inspect(|m| m.observed().is_empty()));
    }

    #[test]
    fn reentrant_call_during_operation_is_busy() {
        // A watcher that delivers synchronously from `register`.
        struct EagerFactory;
        struct EagerWatcher(crate::watcher::Delivery<u32>);

        impl crate::watcher::VisibilityWatcher for EagerWatcher {
            type Element = u32;
            fn register(&mut self, element: &u32) {
                (self.0)(*element);
            }
            fn unregister(&mut self, _element: &u32) {}
            fn release(&mut self) {}
        }

        impl WatcherFactory for EagerFactory {
            type Element = u32;
            type Config = ();
            type Notification = u32;
            type Watcher = EagerWatcher;
            type Error = std::convert::Infallible;

            fn create(
                &self,
                callback: crate::watcher::Delivery<u32>,
                _config: &(),
            ) -> std::result::Result<EagerWatcher, Self::Error> {
                Ok(EagerWatcher(callback))
            }
        }

        let outcome: Rc<RefCell<Option<bool>>> = Rc::new(RefCell::new(None));
        let outcome_clone = Rc::clone(&outcome);
        let slot: Rc<RefCell<Option<ObserverBindings<u32, (), std::convert::Infallible>>>> =
            Rc::new(RefCell::new(None));
        let slot_clone = Rc::clone(&slot);
        let scope = VisibilityScope::new(
            EagerFactory,
            move |element: u32| {
                if let Some(bindings) = slot_clone.borrow().as_ref() {
                    let busy = matches!((bindings.unobserve)(&element), Err(ObserveError::Busy));
                    *outcome_clone.borrow_mut() = Some(busy);
                }
            },
            (),
        );
        *slot.borrow_mut() = Some(scope.bindings());

        scope.observe(&7).unwrap();
        assert_eq!(*outcome.borrow(), Some(true));
        assert!(scope.inspect(|m| m.is_observing(&7)));
    }

    #[test]
    fn update_moves_elements_through_bindings() {
        let factory = TestFactory::for_nodes();
        let (scope, _) = scope(&factory);
        let a = TestNode::new(1);
        let b = TestNode::new(2);
        scope.observe(&a).unwrap();
        scope.observe(&b).unwrap();
        let first = factory.latest().unwrap();

        scope
            .update(ObserverOptions::new().with_threshold(1.0).unwrap())
            .unwrap();

        let active = factory.latest().unwrap();
        assert_ne!(active.index(), first.index());
        assert!(active.is_registered(&a));
        assert!(active.is_registered(&b));
        assert_eq!(factory.live(), 1);
    }

    #[test]
    fn scope_dropped_during_delivery_tears_down_after_unwind() {
        // Delivers synchronously from `register` and records `release`.
        struct EagerFactory {
            released: Rc<Cell<bool>>,
        }
        struct EagerWatcher {
            delivery: crate::watcher::Delivery<u32>,
            released: Rc<Cell<bool>>,
        }

        impl crate::watcher::VisibilityWatcher for EagerWatcher {
            type Element = u32;
            fn register(&mut self, element: &u32) {
                (self.delivery)(*element);
            }
            fn unregister(&mut self, _element: &u32) {}
            fn release(&mut self) {
                self.released.set(true);
            }
        }

        impl WatcherFactory for EagerFactory {
            type Element = u32;
            type Config = ();
            type Notification = u32;
            type Watcher = EagerWatcher;
            type Error = std::convert::Infallible;

            fn create(
                &self,
                callback: crate::watcher::Delivery<u32>,
                _config: &(),
            ) -> std::result::Result<EagerWatcher, Self::Error> {
                Ok(EagerWatcher {
                    delivery: callback,
                    released: Rc::clone(&self.released),
                })
            }
        }

        let released = Rc::new(Cell::new(false));
        let slot: Rc<RefCell<Option<VisibilityScope<EagerFactory>>>> = Rc::new(RefCell::new(None));
        let slot_clone = Rc::clone(&slot);
        let dropped_while_busy = Rc::new(Cell::new(false));
        let dropped_clone = Rc::clone(&dropped_while_busy);
        let released_clone = Rc::clone(&released);
        let scope = VisibilityScope::new(
            EagerFactory {
                released: Rc::clone(&released),
            },
            move |_element: u32| {
                // The host unmounts in response to the first notification.
                let taken = slot_clone.borrow_mut().take();
                dropped_clone.set(taken.is_some());
                drop(taken);
                assert!(!released_clone.get());
            },
            (),
        );
        let bindings = scope.bindings();
        *slot.borrow_mut() = Some(scope);

        (bindings.observe)(&7).unwrap();

        assert!(dropped_while_busy.get());
        assert!(slot.borrow().is_none());
        assert!(released.get());
        assert!((bindings.observe)(&8).unwrap_err().is_torn_down());
    }

    #[test]
    fn debug_format() {
        let factory = TestFactory::for_nodes();
        let (scope, _) = scope(&factory);
        let dbg = format!("{scope:?}");
        assert!(dbg.contains("VisibilityScope"));
        assert!(dbg.contains("WatcherManager"));
    }
}
