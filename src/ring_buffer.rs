//! A single-producer, single-consumer (SPSC) lock-free byte queue.

use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicUsize, Ordering},
};

/// A fixed-capacity SPSC circular buffer holding up to `N` bytes.
///
/// `N` must be a power of two, so wraparound is a mask instead of a division.
/// Both indices run freely and are only masked when a slot is addressed,
/// which means `write - read` is the occupancy and all `N` slots are usable.
///
/// The producer only ever stores `write` and the consumer only ever stores
/// `read`. Only plain atomic loads and stores are used, so the buffer also
/// works on targets without compare-and-swap (e.g. `thumbv6m`).
pub struct CircularBuffer<const N: usize> {
    /// Where the next pop starts, not masked.
    read: AtomicUsize,
    /// Where the next push goes, not masked.
    ///
    /// The buffer always guarantees `write - read <= N`.
    write: AtomicUsize,
    buf: [UnsafeCell<MaybeUninit<u8>>; N],
}

// SAFETY: Slots are only accessed through the producer and consumer roles:
// - The producer writes a slot only while it is outside `read..write`, and publishes it with a
//   Release store to `write`.
// - The consumer reads a slot only while it is inside `read..write`, and hands it back with a
//   Release store to `read`.
// The safe API enforces a single owner per role (`split` takes `&mut self`), and the unchecked
// API pushes that obligation onto the caller.
unsafe impl<const N: usize> Sync for CircularBuffer<N> {}

/// Writes bytes into a [`CircularBuffer`].
pub struct Producer<'a, const N: usize> {
    ring: &'a CircularBuffer<N>,
}

/// Reads bytes previously written to a [`CircularBuffer`].
pub struct Consumer<'a, const N: usize> {
    ring: &'a CircularBuffer<N>,
}

impl<const N: usize> Default for CircularBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> CircularBuffer<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "capacity must be a power of two");
        assert!(N <= usize::MAX / 2, "capacity too large");
        N - 1
    };

    /// Creates an empty buffer. Usable in a `static` initializer.
    pub const fn new() -> Self {
        let _ = Self::MASK;
        CircularBuffer {
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            buf: [const { UnsafeCell::new(MaybeUninit::uninit()) }; N],
        }
    }

    /// Splits the buffer into its producer and consumer halves.
    #[inline]
    pub const fn split(&mut self) -> (Producer<'_, N>, Consumer<'_, N>) {
        let ring: &Self = self;
        (Producer { ring }, Consumer { ring })
    }

    /// Returns a producer without borrowing the buffer mutably.
    ///
    /// # Safety
    ///
    /// No other producer for this buffer may be alive, and the returned one must not be used
    /// from two contexts at once.
    #[inline]
    pub(crate) const unsafe fn producer_unchecked(&self) -> Producer<'_, N> {
        Producer { ring: self }
    }

    /// Returns a consumer without borrowing the buffer mutably.
    ///
    /// # Safety
    ///
    /// No other consumer for this buffer may be alive, and the returned one must not be used
    /// from two contexts at once.
    #[inline]
    pub(crate) const unsafe fn consumer_unchecked(&self) -> Consumer<'_, N> {
        Consumer { ring: self }
    }

    /// Total number of bytes the buffer can hold.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of bytes currently queued.
    ///
    /// When observed from outside both roles the value may be stale, but it is
    /// always within `0..=N`.
    #[inline]
    pub fn len(&self) -> usize {
        // `read` is loaded first: `write` can only move away from it, so the
        // difference never underflows.
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.wrapping_sub(read).min(N)
    }

    /// Returns `true` if no bytes are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if no more bytes can be pushed.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == N
    }

    /// Pushes one byte.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer of this buffer for the duration of the call.
    #[inline]
    pub(crate) unsafe fn push_unchecked(&self, byte: u8) -> bool {
        // Relaxed: the producer owns `write`.
        let write = self.write.load(Ordering::Relaxed);
        // Acquire: synchronizes with the consumer's Release store, so the slot we are about to
        // overwrite has been fully read.
        let read = self.read.load(Ordering::Acquire);
        if write.wrapping_sub(read) >= N {
            return false;
        }

        // SAFETY:
        // - `write & MASK < N`, so the slot is in bounds.
        // - The slot is outside `read..write`, so the consumer does not access it until the
        //   Release store below publishes it.
        // - The caller guarantees there is no other producer.
        unsafe { self.buf[write & Self::MASK].get().write(MaybeUninit::new(byte)) };

        self.write.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Pops one byte.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer of this buffer for the duration of the call.
    #[inline]
    pub(crate) unsafe fn pop_unchecked(&self) -> Option<u8> {
        // Relaxed: the consumer owns `read`.
        let read = self.read.load(Ordering::Relaxed);
        // Acquire: synchronizes with the producer's Release store, ensuring we see the written
        // byte.
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }

        // SAFETY:
        // - `read & MASK < N`, so the slot is in bounds.
        // - The slot is inside `read..write`, so it has been initialized by the producer and
        //   will not be touched by it until `read` moves past it.
        let byte = unsafe { self.buf[read & Self::MASK].get().read().assume_init() };

        self.read.store(read.wrapping_add(1), Ordering::Release);
        Some(byte)
    }

    /// Pops up to `out.len()` bytes, publishing the new read index once.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer of this buffer for the duration of the call.
    #[inline]
    pub(crate) unsafe fn pop_bulk_unchecked(&self, out: &mut [u8]) -> usize {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        let count = write.wrapping_sub(read).min(out.len());

        for (i, slot) in out[..count].iter_mut().enumerate() {
            // SAFETY: `read + i` lies inside `read..write`, see `pop_unchecked`.
            *slot = unsafe {
                self.buf[read.wrapping_add(i) & Self::MASK]
                    .get()
                    .read()
                    .assume_init()
            };
        }

        if count > 0 {
            self.read.store(read.wrapping_add(count), Ordering::Release);
        }
        count
    }
}

impl<const N: usize> Producer<'_, N> {
    /// Appends `byte` to the buffer.
    ///
    /// Returns `false`, leaving the queued data untouched, if the buffer is full.
    #[inline]
    pub fn push(&mut self, byte: u8) -> bool {
        // SAFETY: `&mut self` and the single-producer construction guarantee exclusivity.
        unsafe { self.ring.push_unchecked(byte) }
    }

    /// Returns `true` if no more bytes can be pushed.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.ring.is_full()
    }

    /// Number of bytes currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` if no bytes are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<const N: usize> Consumer<'_, N> {
    /// Removes the oldest byte, or returns `None` if the buffer is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<u8> {
        // SAFETY: `&mut self` and the single-consumer construction guarantee exclusivity.
        unsafe { self.ring.pop_unchecked() }
    }

    /// Drains up to `out.len()` bytes in FIFO order into `out`.
    ///
    /// Returns how many bytes were written to `out`; stops early if the buffer empties.
    #[inline]
    pub fn pop_bulk(&mut self, out: &mut [u8]) -> usize {
        // SAFETY: `&mut self` and the single-consumer construction guarantee exclusivity.
        unsafe { self.ring.pop_bulk_unchecked(out) }
    }

    /// Returns `true` if there is no data available to read.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Number of bytes currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.ring.len()
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;

    const BUF_SIZE: usize = 4;

    #[test]
    fn fifo_order() {
        let mut b = CircularBuffer::<BUF_SIZE>::new();
        let (mut p, mut c) = b.split();
        assert!(p.push(1));
        assert!(p.push(2));
        assert!(p.push(3));

        assert_eq!(c.pop(), Some(1));
        assert_eq!(c.pop(), Some(2));
        assert_eq!(c.pop(), Some(3));
        assert_eq!(c.pop(), None);
    }

    #[test]
    fn full_rejects_without_overwrite() {
        let mut b = CircularBuffer::<BUF_SIZE>::new();
        let (mut p, mut c) = b.split();
        for i in 0..BUF_SIZE as u8 {
            assert!(p.push(i));
        }
        assert!(p.is_full());
        assert!(!p.push(0xFF));
        assert_eq!(p.len(), BUF_SIZE);

        for i in 0..BUF_SIZE as u8 {
            assert_eq!(c.pop(), Some(i));
        }
        assert!(c.is_empty());
    }

    #[test]
    fn wraps_around_end() {
        let mut b = CircularBuffer::<BUF_SIZE>::new();
        let (mut p, mut c) = b.split();
        // Move both indices close to the end so later pushes cross it.
        for _ in 0..3 {
            assert!(p.push(0));
            assert_eq!(c.pop(), Some(0));
        }
        for i in 10..14 {
            assert!(p.push(i));
        }
        assert!(!p.push(99));
        assert_eq!(c.pop(), Some(10));
        assert!(p.push(14));
        let mut out = [0; 8];
        assert_eq!(c.pop_bulk(&mut out), 4);
        assert_eq!(&out[..4], &[11, 12, 13, 14]);
    }

    #[test]
    fn pop_bulk_stops_when_empty() {
        let mut b = CircularBuffer::<BUF_SIZE>::new();
        let (mut p, mut c) = b.split();
        p.push(7);
        p.push(8);

        let mut out = [0; 3];
        assert_eq!(c.pop_bulk(&mut out), 2);
        assert_eq!(&out[..2], &[7, 8]);
        assert!(c.is_empty());
        assert_eq!(c.pop_bulk(&mut out), 0);
    }

    #[test]
    fn pop_bulk_respects_max() {
        let mut b = CircularBuffer::<BUF_SIZE>::new();
        let (mut p, mut c) = b.split();
        for i in 0..4 {
            p.push(i);
        }

        let mut out = [0; 3];
        assert_eq!(c.pop_bulk(&mut out), 3);
        assert_eq!(out, [0, 1, 2]);
        assert_eq!(c.len(), 1);
        assert_eq!(c.pop(), Some(3));
    }

    #[test]
    fn pop_bulk_zero_len() {
        let mut b = CircularBuffer::<BUF_SIZE>::new();
        let (mut p, mut c) = b.split();
        p.push(1);
        assert_eq!(c.pop_bulk(&mut []), 0);
        assert_eq!(c.len(), 1);
    }

    #[test]
    fn occupancy_queries() {
        let mut b = CircularBuffer::<BUF_SIZE>::new();
        assert_eq!(b.capacity(), BUF_SIZE);
        assert!(b.is_empty());
        {
            let (mut p, _c) = b.split();
            p.push(1);
            p.push(2);
        }
        assert_eq!(b.len(), 2);
        assert!(!b.is_empty());
        assert!(!b.is_full());
    }

    #[test]
    fn index_wrap_of_counters() {
        let b = CircularBuffer::<BUF_SIZE>::new();
        // Start the free-running counters right before `usize` overflows.
        b.read.store(usize::MAX - 1, Ordering::Relaxed);
        b.write.store(usize::MAX - 1, Ordering::Relaxed);
        // SAFETY: single-threaded test, one producer and one consumer.
        let (mut p, mut c) = unsafe { (b.producer_unchecked(), b.consumer_unchecked()) };
        for i in 0..4 {
            assert!(p.push(i));
        }
        assert!(!p.push(4));
        assert_eq!(c.len(), 4);
        for i in 0..4 {
            assert_eq!(c.pop(), Some(i));
        }
        assert_eq!(c.pop(), None);
    }

    #[test]
    fn concurrent_producer_consumer() {
        const TOTAL: usize = 10_000;
        let mut b = CircularBuffer::<16>::new();
        let (mut p, mut c) = b.split();

        std::thread::scope(|s| {
            s.spawn(move || {
                let mut next = 0usize;
                while next < TOTAL {
                    if p.push(next as u8) {
                        next += 1;
                    } else {
                        core::hint::spin_loop();
                    }
                }
            });

            let mut expected = 0usize;
            while expected < TOTAL {
                if let Some(byte) = c.pop() {
                    assert_eq!(byte, expected as u8);
                    expected += 1;
                } else {
                    core::hint::spin_loop();
                }
            }
        });
    }
}
