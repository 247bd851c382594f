//! Wakeup path from the USB receive interrupt to a task in
//! [`StdioPort::read_byte_async`](crate::StdioPort::read_byte_async).
//!
//! There is exactly one reader per adapter, so a single slot is enough. The reader
//! registers before checking the receive buffer, and the driver wakes after pushing, so a
//! byte delivered between the two is never missed.

use core::{cell::UnsafeCell, task::Waker};

/// The waker of the task blocked on an empty receive buffer, if any.
pub(crate) struct AtomicWaker {
    waker: UnsafeCell<Option<Waker>>,
}

// SAFETY: The `UnsafeCell` is only accessed inside critical sections.
unsafe impl Send for AtomicWaker {}
// SAFETY: The `UnsafeCell` is only accessed inside critical sections.
unsafe impl Sync for AtomicWaker {}

impl AtomicWaker {
    pub(crate) const fn new() -> Self {
        Self {
            waker: UnsafeCell::new(None),
        }
    }

    /// Called by the reader on every poll that may find the receive buffer empty.
    ///
    /// Re-polling from the same task keeps the stored waker instead of cloning it again.
    pub(crate) fn register(&self, waker: &Waker) {
        critical_section::with(|_| {
            // SAFETY: Inside a critical section, and `slot` does not escape it.
            let slot = unsafe { &mut *self.waker.get() };
            match slot {
                Some(current) if current.will_wake(waker) => {}
                _ => *slot = Some(waker.clone()),
            }
        });
    }

    /// Called by the driver after bytes were pushed into the receive buffer.
    ///
    /// The slot is emptied, so a burst of received bytes wakes the reader once. The waker
    /// itself runs outside the critical section.
    pub(crate) fn wake(&self) {
        // SAFETY: Inside a critical section, and the reference does not escape it.
        if let Some(w) = critical_section::with(|_| unsafe { &mut *self.waker.get() }.take()) {
            w.wake();
        }
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        task::Wake,
    };

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn wake_without_reader_is_a_no_op() {
        AtomicWaker::new().wake();
    }

    #[test]
    fn reader_is_woken_once_per_registration() {
        let count = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(count.clone());
        let slot = AtomicWaker::new();

        slot.register(&waker);
        slot.register(&waker);
        slot.wake();
        slot.wake();
        assert_eq!(count.0.load(Ordering::Relaxed), 1);

        slot.register(&waker);
        slot.wake();
        assert_eq!(count.0.load(Ordering::Relaxed), 2);
    }
}
