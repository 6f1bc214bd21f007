#![forbid(unsafe_code)]

//! Generation gate between watcher instances and the host callback.
//!
//! Each watcher gets its own wrapper around the host callback, stamped with
//! the generation it was created for. A wrapper forwards only while its
//! generation is current and the gate is open, so a replaced or released
//! watcher that still fires is swallowed here instead of reaching the host.

use std::cell::Cell;
use std::rc::Rc;

use crate::watcher::Delivery;

#[cfg(feature = "tracing")]
use crate::logging::trace;
#[cfg(not(feature = "tracing"))]
use crate::trace;

#[derive(Debug)]
struct GateState {
    /// Generation of the current watcher. 0 until the first one is committed.
    current: Cell<u64>,
    /// Last generation handed out. Never reissued, even if its watcher
    /// was never built.
    issued: Cell<u64>,
    open: Cell<bool>,
    forwarded: Cell<u64>,
    dropped: Cell<u64>,
}

#[derive(Debug, Clone)]
pub(crate) struct DeliveryGate {
    state: Rc<GateState>,
}

impl DeliveryGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Rc::new(GateState {
                current: Cell::new(0),
                issued: Cell::new(0),
                open: Cell::new(true),
                forwarded: Cell::new(0),
                dropped: Cell::new(0),
            }),
        }
    }

    /// Generation of the current watcher.
    pub(crate) fn current(&self) -> u64 {
        self.state.current.get()
    }

    /// Issue a fresh generation for a watcher about to be built.
    pub(crate) fn next(&self) -> u64 {
        let generation = self.state.issued.get() + 1;
        self.state.issued.set(generation);
        generation
    }

    /// Make `generation` current. Wrappers of earlier generations go silent.
    pub(crate) fn commit(&self, generation: u64) {
        debug_assert!(generation > self.state.current.get());
        self.state.current.set(generation);
    }

    /// Close permanently. Nothing is forwarded afterwards.
    pub(crate) fn close(&self) {
        self.state.open.set(false);
    }

    pub(crate) fn forwarded(&self) -> u64 {
        self.state.forwarded.get()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.state.dropped.get()
    }

    /// Wrap `sink` for the watcher of `generation`.
    pub(crate) fn wrap<N: 'static>(&self, generation: u64, sink: Delivery<N>) -> Delivery<N> {
        let state = Rc::clone(&self.state);
        Rc::new(move |notification: N| {
            if state.open.get() && state.current.get() == generation {
                state.forwarded.set(state.forwarded.get() + 1);
                sink(notification);
            } else {
                state.dropped.set(state.dropped.get() + 1);
                trace!(
                    message = "observe.delivery.dropped",
                    generation,
                    current = state.current.get(),
                    open = state.open.get()
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recording_sink() -> (Delivery<u32>, Rc<RefCell<Vec<u32>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = Rc::clone(&seen);
        let sink: Delivery<u32> = Rc::new(move |n| seen_clone.borrow_mut().push(n));
        (sink, seen)
    }

    #[test]
    fn current_generation_forwards() {
        let gate = DeliveryGate::new();
        let (sink, seen) = recording_sink();
        let generation = gate.next();
        let wrapped = gate.wrap(generation, sink);
        gate.commit(generation);

        wrapped(7);
        assert_eq!(*seen.borrow(), vec![7]);
        assert_eq!(gate.forwarded(), 1);
        assert_eq!(gate.dropped(), 0);
    }

    #[test]
    fn uncommitted_generation_is_silent() {
        let gate = DeliveryGate::new();
        let (sink, seen) = recording_sink();
        let wrapped = gate.wrap(gate.next(), sink);

        wrapped(1);
        assert!(seen.borrow().is_empty());
        assert_eq!(gate.dropped(), 1);
    }

    #[test]
    fn superseded_generation_is_silent() {
        let gate = DeliveryGate::new();
        let (sink, seen) = recording_sink();

        let first = gate.wrap(1, Rc::clone(&sink));
        gate.commit(1);
        let second = gate.wrap(2, sink);
        gate.commit(2);

        first(1);
        second(2);
        assert_eq!(*seen.borrow(), vec![2]);
        assert_eq!(gate.forwarded(), 1);
        assert_eq!(gate.dropped(), 1);
    }

    #[test]
    fn abandoned_generation_is_never_reissued() {
        let gate = DeliveryGate::new();
        let (sink, seen) = recording_sink();

        // Wrapper handed to a watcher that was never committed.
        let abandoned = gate.wrap(gate.next(), Rc::clone(&sink));
        let generation = gate.next();
        assert_eq!(generation, 2);
        let live = gate.wrap(generation, sink);
        gate.commit(generation);

        abandoned(1);
        live(2);
        assert_eq!(*seen.borrow(), vec![2]);
        assert_eq!(gate.current(), 2);
        assert_eq!(gate.dropped(), 1);
    }

    #[test]
    fn closed_gate_drops_everything() {
        let gate = DeliveryGate::new();
        let (sink, seen) = recording_sink();
        let wrapped = gate.wrap(1, sink);
        gate.commit(1);
        gate.close();

        wrapped(3);
        wrapped(4);
        assert!(seen.borrow().is_empty());
        assert_eq!(gate.dropped(), 2);
    }
}
