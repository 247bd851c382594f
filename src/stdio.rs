//! Character stream redirection onto a receive and a transmit [`CircularBuffer`].
//!
//! The application side ([`StdioPort`]) writes with `\n` → `\r\n` translation and reads with
//! an optional busy-wait. The transport side ([`StdioDriver`]) is called from the USB CDC
//! interrupt to deliver received bytes and to fetch bytes for the wire.

use core::{
    fmt, hint,
    sync::atomic::{AtomicBool, Ordering},
};
use critical_section::CriticalSection;

#[cfg(feature = "async-await")]
use crate::atomic_waker::AtomicWaker;
use crate::{
    InitError,
    logger::{self, Console, ConsoleState, Output},
    ring_buffer::{CircularBuffer, Consumer, Producer},
    trace::Sink,
};

/// Owns the receive (`RX` bytes) and transmit (`TX` bytes) buffers.
///
/// Both capacities must be powers of two. Meant to live in a `static`:
///
/// ```ignore
/// static STDIO: Stdio<256, 1024> = Stdio::new();
/// ```
pub struct Stdio<const RX: usize, const TX: usize> {
    rx: CircularBuffer<RX>,
    tx: CircularBuffer<TX>,
    /// Set once the handles have been given out.
    taken: AtomicBool,
    #[cfg(feature = "async-await")]
    rx_waker: AtomicWaker,
}

impl<const RX: usize, const TX: usize> Default for Stdio<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const RX: usize, const TX: usize> Stdio<RX, TX> {
    /// Creates the adapter with both buffers empty.
    pub const fn new() -> Self {
        Stdio {
            rx: CircularBuffer::new(),
            tx: CircularBuffer::new(),
            taken: AtomicBool::new(false),
            #[cfg(feature = "async-await")]
            rx_waker: AtomicWaker::new(),
        }
    }

    /// Hands out the application and driver handles.
    ///
    /// # Errors
    ///
    /// [`InitError::AlreadySplit`] if this or [`init`](Self::init) was called before.
    pub fn split(&self) -> Result<(StdioPort<'_, RX, TX>, StdioDriver<'_, RX, TX>), InitError> {
        critical_section::with(|cs| self.take(cs))?;

        // SAFETY: `take` succeeds at most once, so these are the only handles for either role
        // of either buffer.
        let port = StdioPort {
            rx: unsafe { self.rx.consumer_unchecked() },
            tx: unsafe { self.tx.producer_unchecked() },
            #[cfg(feature = "async-await")]
            rx_waker: &self.rx_waker,
        };
        Ok((port, self.driver()))
    }

    /// Installs this adapter as the process console and returns the driver handle.
    ///
    /// Afterwards [`print!`](crate::print), [`println!`](crate::println), the log macros and
    /// [`logger::get_char`] go through this adapter.
    ///
    /// # Errors
    ///
    /// - [`InitError::AlreadyInitialized`]: another console is installed.
    /// - [`InitError::AlreadySplit`]: the handles of this adapter were already taken.
    pub fn init(&'static self) -> Result<StdioDriver<'static, RX, TX>, InitError> {
        self.install_into(&logger::STATE)
    }

    pub(crate) fn install_into(
        &'static self,
        console: &ConsoleState,
    ) -> Result<StdioDriver<'static, RX, TX>, InitError> {
        critical_section::with(|cs| {
            console.ensure_vacant(cs)?;
            self.take(cs)?;
            console.install(cs, Output::Stdio(self));
            Ok(())
        })?;

        Ok(self.driver())
    }

    /// Number of received bytes not read yet.
    pub fn rx_len(&self) -> usize {
        self.rx.len()
    }

    /// Number of bytes waiting for the transport.
    pub fn tx_len(&self) -> usize {
        self.tx.len()
    }

    fn take(&self, _cs: CriticalSection<'_>) -> Result<(), InitError> {
        if self.taken.load(Ordering::Relaxed) {
            return Err(InitError::AlreadySplit);
        }
        self.taken.store(true, Ordering::Relaxed);
        Ok(())
    }

    /// Must only be called once, after a successful `take`.
    fn driver(&self) -> StdioDriver<'_, RX, TX> {
        StdioDriver {
            // SAFETY: Called once after `take`, so this is the only RX producer and TX consumer.
            rx: unsafe { self.rx.producer_unchecked() },
            // SAFETY: See above.
            tx: unsafe { self.tx.consumer_unchecked() },
            #[cfg(feature = "async-await")]
            rx_waker: &self.rx_waker,
        }
    }
}

impl<const RX: usize, const TX: usize> Console for Stdio<RX, TX> {
    unsafe fn put_char(&self, byte: u8) {
        // SAFETY: The caller is the only TX producer.
        translate_newline(byte, |b| unsafe { self.tx.push_unchecked(b) });
    }

    unsafe fn read_byte(&self) -> Option<u8> {
        // SAFETY: The caller is the only RX consumer.
        unsafe { self.rx.pop_unchecked() }
    }
}

/// Enqueues `byte`, preceded by `\r` if it is a line feed.
///
/// Each half is pushed independently; whatever does not fit is dropped.
fn translate_newline(byte: u8, mut push: impl FnMut(u8) -> bool) {
    if byte == b'\n' {
        let _ = push(b'\r');
    }
    let _ = push(byte);
}

/// Application side: reads received bytes, writes bytes for transmission.
pub struct StdioPort<'a, const RX: usize, const TX: usize> {
    rx: Consumer<'a, RX>,
    tx: Producer<'a, TX>,
    #[cfg(feature = "async-await")]
    rx_waker: &'a AtomicWaker,
}

impl<const RX: usize, const TX: usize> StdioPort<'_, RX, TX> {
    /// Queues `byte` for transmission, turning `\n` into `\r\n`.
    ///
    /// Never blocks and never fails: bytes that do not fit in the transmit buffer are
    /// dropped. If only one slot is free for a line feed, only the `\r` is queued.
    ///
    /// There is no status to return, since the result would always be success. Use
    /// [`write_byte`](Self::write_byte) or [`tx_free`](Self::tx_free) to detect drops.
    pub fn put_char(&mut self, byte: u8) {
        translate_newline(byte, |b| self.tx.push(b));
    }

    /// [`put_char`](Self::put_char) for every byte of `s`.
    pub fn put_str(&mut self, s: &str) {
        for byte in s.bytes() {
            self.put_char(byte);
        }
    }

    /// Blocks until a byte has been received and returns it.
    ///
    /// This busy-waits with interrupts enabled, since the receive interrupt is what fills the
    /// buffer. There is no timeout; see [`get_char_timeout`](Self::get_char_timeout) and
    /// [`read_byte`](Self::read_byte) for bounded alternatives.
    pub fn get_char(&mut self) -> u8 {
        loop {
            if let Some(byte) = self.rx.pop() {
                return byte;
            }
            hint::spin_loop();
        }
    }

    /// Like [`get_char`](Self::get_char), but gives up after polling `max_polls` times.
    pub fn get_char_timeout(&mut self, max_polls: u32) -> Option<u8> {
        for _ in 0..max_polls {
            if let Some(byte) = self.rx.pop() {
                return Some(byte);
            }
            hint::spin_loop();
        }
        None
    }

    /// Returns the next received byte, or `None` if nothing is buffered.
    pub fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop()
    }

    /// Queues `byte` without translation. Returns `false` if the transmit buffer is full.
    pub fn write_byte(&mut self, byte: u8) -> bool {
        self.tx.push(byte)
    }

    /// Number of received bytes not read yet.
    pub fn rx_pending(&self) -> usize {
        self.rx.len()
    }

    /// Number of free slots in the transmit buffer.
    pub fn tx_free(&self) -> usize {
        TX - self.tx.len()
    }

    /// Waits for the next received byte.
    ///
    /// The task is woken by [`StdioDriver::on_rx_byte`] and [`StdioDriver::on_rx_bytes`].
    #[cfg(feature = "async-await")]
    pub async fn read_byte_async(&mut self) -> u8 {
        core::future::poll_fn(|cx| {
            self.rx_waker.register(cx.waker());

            match self.rx.pop() {
                Some(byte) => core::task::Poll::Ready(byte),
                None => core::task::Poll::Pending,
            }
        })
        .await
    }
}

impl<const RX: usize, const TX: usize> fmt::Write for StdioPort<'_, RX, TX> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.put_str(s);
        Ok(())
    }
}

impl<const RX: usize, const TX: usize> Sink for StdioPort<'_, RX, TX> {
    fn put_char(&mut self, byte: u8) {
        StdioPort::put_char(self, byte);
    }
}

/// Transport side, called from the USB CDC driver's interrupt context.
pub struct StdioDriver<'a, const RX: usize, const TX: usize> {
    rx: Producer<'a, RX>,
    tx: Consumer<'a, TX>,
    #[cfg(feature = "async-await")]
    rx_waker: &'a AtomicWaker,
}

impl<const RX: usize, const TX: usize> StdioDriver<'_, RX, TX> {
    /// Buffers one received byte, dropping it if the receive buffer is full.
    pub fn on_rx_byte(&mut self, byte: u8) {
        let _ = self.rx.push(byte);
        #[cfg(feature = "async-await")]
        self.rx_waker.wake();
    }

    /// Buffers received bytes in order.
    ///
    /// Under backpressure the bytes that do not fit are lost; the ones before them are kept.
    pub fn on_rx_bytes(&mut self, data: &[u8]) {
        for &byte in data {
            let _ = self.rx.push(byte);
        }
        #[cfg(feature = "async-await")]
        self.rx_waker.wake();
    }

    /// Next byte to send, or `None` if nothing is queued.
    pub fn get_tx_byte(&mut self) -> Option<u8> {
        self.tx.pop()
    }

    /// Moves up to `out.len()` queued bytes into `out` and returns how many were moved.
    pub fn get_tx_bytes(&mut self, out: &mut [u8]) -> usize {
        self.tx.pop_bulk(out)
    }

    /// Number of bytes waiting to be sent.
    pub fn tx_pending(&self) -> usize {
        self.tx.len()
    }
}
