//! Synchronous signals for pipeline notifications.
//!
//! A [`Signal`] is the callback fan-out used wherever a node needs to tell
//! application code that something happened: output may resume, a flush
//! completed, encoded data is ready. Slots fire synchronously, on the calling
//! thread, in the order they were connected.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Handle returned by [`Signal::connect`], used to disconnect a slot later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

type Slot<A> = Rc<dyn Fn(&A)>;

/// A list of callbacks invoked with a borrowed argument.
///
/// Emission works on a snapshot of the connected slots, so a slot may connect
/// or disconnect other slots (or itself) while the signal is firing. Slots
/// connected during an emission are not called until the next one.
///
/// # Example
///
/// ```
/// use audio_pipe::Signal;
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let signal: Signal<usize> = Signal::new();
/// let total = Rc::new(Cell::new(0));
/// let sum = total.clone();
/// signal.connect(move |n| sum.set(sum.get() + n));
///
/// signal.emit(&3);
/// signal.emit(&4);
/// assert_eq!(total.get(), 7);
/// ```
pub struct Signal<A> {
    slots: RefCell<Vec<(SlotId, Slot<A>)>>,
    next_id: Cell<u64>,
}

impl<A> Signal<A> {
    /// Creates a signal with no slots connected.
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    /// Connects a slot. It will be called on every subsequent emission.
    pub fn connect<F>(&self, slot: F) -> SlotId
    where
        F: Fn(&A) + 'static,
    {
        let id = SlotId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.slots.borrow_mut().push((id, Rc::new(slot)));
        id
    }

    /// Disconnects a slot. Returns `false` if it was not connected.
    pub fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|(slot_id, _)| *slot_id != id);
        slots.len() != before
    }

    /// Disconnects every slot.
    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
    }

    /// Number of connected slots.
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Returns `true` if no slot is connected.
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Calls every connected slot with `arg`.
    pub fn emit(&self, arg: &A) {
        let snapshot: Vec<Slot<A>> = self
            .slots
            .borrow()
            .iter()
            .map(|(_, slot)| Rc::clone(slot))
            .collect();
        for slot in snapshot {
            slot(arg);
        }
    }
}

impl<A> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_calls_slots_in_order() {
        let signal: Signal<u32> = Signal::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = log.clone();
        signal.connect(move |v| first.borrow_mut().push(("first", *v)));
        let second = log.clone();
        signal.connect(move |v| second.borrow_mut().push(("second", *v)));

        signal.emit(&7);
        assert_eq!(*log.borrow(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_signal_disconnect() {
        let signal: Signal<()> = Signal::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let id = signal.connect(move |_| c.set(c.get() + 1));

        signal.emit(&());
        assert!(signal.disconnect(id));
        assert!(!signal.disconnect(id));
        signal.emit(&());

        assert_eq!(count.get(), 1);
        assert!(signal.is_empty());
    }

    #[test]
    fn test_signal_reentrant_connect() {
        let signal: Rc<Signal<()>> = Rc::new(Signal::new());
        let count = Rc::new(Cell::new(0));

        let sig = Rc::downgrade(&signal);
        let c = count.clone();
        signal.connect(move |_| {
            c.set(c.get() + 1);
            if let Some(sig) = sig.upgrade() {
                let inner = c.clone();
                sig.connect(move |_| inner.set(inner.get() + 100));
            }
        });

        // The slot connected during emission is not called this round
        signal.emit(&());
        assert_eq!(count.get(), 1);
        assert_eq!(signal.len(), 2);
    }

    #[test]
    fn test_signal_debug() {
        let signal: Signal<()> = Signal::default();
        signal.connect(|_| {});
        assert!(format!("{signal:?}").contains("slots: 1"));
    }
}
