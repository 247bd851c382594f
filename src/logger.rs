//! The process console behind [`print!`](crate::print), [`println!`](crate::println) and the
//! log macros.
//!
//! A console is installed once, either with [`Stdio::init`](crate::Stdio::init) or with
//! [`init_with_output`]. Until then all output is discarded and nothing can be read.
//!
//! All emission runs inside a critical section with the shared scratch buffer, so a log line
//! from an interrupt never interleaves with one from mainline code. Output attempted while
//! the console is already in use by the same call chain (an NMI or HardFault during logging,
//! or a panic inside a `Display` impl) is silently dropped.

use core::{
    cell::UnsafeCell,
    fmt, hint,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use critical_section::CriticalSection;

use crate::{
    InitError,
    trace::{Level, Sink, SinkWriter, TimestampFn, Tracer},
};

/// Scratch capacity of the process console; longer messages are truncated.
pub const SCRATCH_LEN: usize = 128;

type ConsoleTracer = Tracer<Output, Option<TimestampFn>, SCRATCH_LEN>;

/// Application side of an adapter that can be installed as the console.
pub(crate) trait Console: Sync {
    /// Queues `byte` with newline translation.
    ///
    /// # Safety
    ///
    /// The caller must be the only producer of the adapter's transmit buffer.
    unsafe fn put_char(&self, byte: u8);

    /// Takes the next received byte.
    ///
    /// # Safety
    ///
    /// The caller must be the only consumer of the adapter's receive buffer.
    unsafe fn read_byte(&self) -> Option<u8>;
}

/// Where the console writes to.
#[derive(Clone, Copy)]
pub(crate) enum Output {
    None,
    Stdio(&'static dyn Console),
    Custom(fn(u8)),
}

impl Sink for Output {
    fn put_char(&mut self, byte: u8) {
        match *self {
            Output::None => {}
            // SAFETY: An `Output` only lives inside `ConsoleState`, which is the sole user of
            // the installed adapter's application side and only touches it under its lock.
            Output::Stdio(console) => unsafe { console.put_char(byte) },
            Output::Custom(put_char) => put_char(byte),
        }
    }
}

pub(crate) struct ConsoleState {
    tracer: UnsafeCell<ConsoleTracer>,
    initialized: AtomicBool,
    /// 0 = idle, 1 = in use. Only changed inside a critical section.
    depth: AtomicUsize,
}

// SAFETY: `tracer` is only accessed inside a critical section while `depth` is 0 → 1, so at
// most one `&mut` exists at any time. `initialized` is only set with Release after the output
// has been written.
unsafe impl Sync for ConsoleState {}

pub(crate) static STATE: ConsoleState = ConsoleState::new();

impl ConsoleState {
    pub(crate) const fn new() -> Self {
        ConsoleState {
            tracer: UnsafeCell::new(Tracer::from_parts(Output::None, None, Level::Info)),
            initialized: AtomicBool::new(false),
            depth: AtomicUsize::new(0),
        }
    }

    pub(crate) fn ensure_vacant(&self, _cs: CriticalSection<'_>) -> Result<(), InitError> {
        if self.initialized.load(Ordering::Relaxed) {
            Err(InitError::AlreadyInitialized)
        } else {
            Ok(())
        }
    }

    /// Callers must check [`ensure_vacant`](Self::ensure_vacant) within the same critical
    /// section first.
    pub(crate) fn install(&self, _cs: CriticalSection<'_>, output: Output) {
        // SAFETY: We're in a critical section and not yet initialized, so nothing else holds a
        // reference into `tracer`.
        unsafe { *(*self.tracer.get()).sink_mut() = output };
        // Release: ensures the write to `tracer` is visible before `initialized` becomes true.
        self.initialized.store(true, Ordering::Release);
    }

    fn install_custom(&self, put_char: fn(u8)) -> Result<(), InitError> {
        critical_section::with(|cs| {
            self.ensure_vacant(cs)?;
            self.install(cs, Output::Custom(put_char));
            Ok(())
        })
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Runs `f` with exclusive access to the console tracer.
    ///
    /// Returns `None` without running `f` on reentrant use.
    fn lock<R>(&self, f: impl FnOnce(&mut ConsoleTracer) -> R) -> Option<R> {
        critical_section::with(|_| {
            if self.depth.load(Ordering::Relaxed) != 0 {
                return None;
            }
            self.depth.store(1, Ordering::Relaxed);

            // SAFETY: We're in a critical section and `depth` was 0, so no other reference
            // into `tracer` exists.
            let result = f(unsafe { &mut *self.tracer.get() });

            self.depth.store(0, Ordering::Relaxed);
            Some(result)
        })
    }

    /// Like [`lock`](Self::lock), but skips the work entirely while nothing is installed.
    fn emit(&self, f: impl FnOnce(&mut ConsoleTracer)) {
        if self.is_initialized() {
            let _ = self.lock(f);
        }
    }

    fn set_level(&self, level: Level) {
        let _ = self.lock(|t| t.set_level(level));
    }

    fn set_timestamp(&self, timestamp: Option<TimestampFn>) {
        let _ = self.lock(|t| t.set_timestamp(timestamp));
    }

    fn log(&self, level: Level, source: &str, line: u32, args: fmt::Arguments<'_>) {
        self.emit(|t| t.log(level, source, line, args));
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        self.emit(|t| t.trace(args));
    }

    fn print(&self, args: fmt::Arguments<'_>, newline: bool) {
        self.emit(|t| {
            let _ = fmt::write(&mut SinkWriter(t.sink_mut()), args);
            if newline {
                t.sink_mut().put_char(b'\n');
            }
        });
    }

    fn put_str(&self, s: &str) {
        self.emit(|t| t.put_str(s));
    }

    fn trace_data(&self, data: &[u8]) {
        self.emit(|t| t.trace_data(data));
    }

    fn trace_hexdump(&self, data: &[u8]) {
        self.emit(|t| t.trace_hexdump(data));
    }

    fn read_byte(&self) -> Option<u8> {
        self.lock(|t| match *t.sink() {
            // SAFETY: The console is the only reader of the installed adapter, and we hold the
            // lock.
            Output::Stdio(console) => unsafe { console.read_byte() },
            Output::None | Output::Custom(_) => None,
        })
        .flatten()
    }

    fn get_char(&self) -> u8 {
        // The critical section is only held per poll; the receive interrupt must get through.
        loop {
            if let Some(byte) = self.read_byte() {
                return byte;
            }
            hint::spin_loop();
        }
    }
}

/// Installs `put_char` as the console output, bypassing any [`Stdio`](crate::Stdio) adapter.
///
/// Nothing can be read from such a console: [`get_char`] never returns.
///
/// # Errors
///
/// [`InitError::AlreadyInitialized`] if a console is already installed.
pub fn init_with_output(put_char: fn(u8)) -> Result<(), InitError> {
    STATE.install_custom(put_char)
}

/// Whether a console has been installed.
pub fn is_initialized() -> bool {
    STATE.is_initialized()
}

/// Only emit log lines at `level` or above. May be called before a console is installed.
pub fn set_level(level: Level) {
    STATE.set_level(level);
}

/// Prints `timestamp` after the severity tag of every log line; `None` disables it.
pub fn set_timestamp(timestamp: Option<TimestampFn>) {
    STATE.set_timestamp(timestamp);
}

/// Writes one byte; `\n` goes out as `\r\n` on a [`Stdio`](crate::Stdio) console.
pub fn put_char(byte: u8) {
    STATE.emit(|t| t.sink_mut().put_char(byte));
}

/// Writes a string without formatting.
pub fn write_str(s: &str) {
    STATE.put_str(s);
}

/// Blocks until the console has received a byte.
///
/// Interrupts stay enabled while waiting.
pub fn get_char() -> u8 {
    STATE.get_char()
}

/// Takes a received byte if one is buffered.
pub fn read_byte() -> Option<u8> {
    STATE.read_byte()
}

/// Writes each byte of `data` as `"XX "`.
pub fn trace_data(data: &[u8]) {
    STATE.trace_data(data);
}

/// Writes a hex dump of `data`, 16 bytes per row.
pub fn trace_hexdump(data: &[u8]) {
    STATE.trace_hexdump(data);
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    STATE.print(args, false);
}

#[doc(hidden)]
pub fn _println(args: fmt::Arguments<'_>) {
    STATE.print(args, true);
}

#[doc(hidden)]
pub fn _trace(args: fmt::Arguments<'_>) {
    STATE.trace(args);
}

#[doc(hidden)]
pub fn _log(level: Level, source: &str, line: u32, args: fmt::Arguments<'_>) {
    STATE.log(level, source, line, args);
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use crate::Stdio;
    use std::{sync::Mutex, vec::Vec};

    fn drain<const RX: usize, const TX: usize>(
        driver: &mut crate::StdioDriver<'_, RX, TX>,
    ) -> Vec<u8> {
        let mut out = [0; 256];
        let n = driver.get_tx_bytes(&mut out);
        out[..n].to_vec()
    }

    #[test]
    fn output_before_install_is_discarded() {
        let state = ConsoleState::new();
        state.log(Level::Error, "a", 1, format_args!("lost"));
        state.put_str("lost");
        assert_eq!(state.read_byte(), None);
        assert!(!state.is_initialized());
    }

    #[test]
    fn custom_output_receives_raw_bytes() {
        static OUT: Mutex<Vec<u8>> = Mutex::new(Vec::new());
        fn capture(byte: u8) {
            OUT.lock().unwrap().push(byte);
        }

        let state = ConsoleState::new();
        state.install_custom(capture).unwrap();
        state.log(Level::Info, "main.rs", 10, format_args!("up {}", 1));
        state.print(format_args!("ok"), true);
        state.trace_data(&[0xBE, 0xEF]);
        assert_eq!(
            OUT.lock().unwrap().as_slice(),
            b"I main.rs 10 : up 1\nok\nBE EF "
        );
        assert_eq!(state.read_byte(), None);
    }

    #[test]
    fn second_install_fails() {
        fn discard(_: u8) {}
        let state = ConsoleState::new();
        state.install_custom(discard).unwrap();
        assert_eq!(
            state.install_custom(discard),
            Err(InitError::AlreadyInitialized)
        );
    }

    #[test]
    fn level_and_timestamp_apply() {
        static OUT: Mutex<Vec<u8>> = Mutex::new(Vec::new());
        fn capture(byte: u8) {
            OUT.lock().unwrap().push(byte);
        }
        fn uptime(out: &mut dyn fmt::Write) -> fmt::Result {
            out.write_str("12.5")
        }

        let state = ConsoleState::new();
        state.set_level(Level::Warn);
        state.set_timestamp(Some(uptime));
        state.install_custom(capture).unwrap();
        state.log(Level::Info, "x", 1, format_args!("hidden"));
        state.log(Level::Warn, "x", 2, format_args!("shown"));
        assert_eq!(OUT.lock().unwrap().as_slice(), b"W 12.5 x 2 : shown\n");
    }

    #[test]
    fn reentrant_use_is_dropped() {
        let state = ConsoleState::new();
        let inner = state.lock(|_| state.lock(|_| ()).is_none());
        assert_eq!(inner, Some(true));
        // The console is usable again afterwards.
        assert!(state.lock(|_| ()).is_some());
    }

    #[test]
    fn stdio_console_translates_and_reads() {
        static STDIO: Stdio<16, 256> = Stdio::new();

        let state = ConsoleState::new();
        let mut driver = STDIO.install_into(&state).unwrap();

        state.print(format_args!("a\nb"), true);
        state.trace_hexdump(b"hi");
        let mut expected = Vec::new();
        expected.extend_from_slice(b"a\r\nb\r\n");
        expected.extend_from_slice(b"68 69 ");
        expected.extend_from_slice(&[b' '; 3 * 14 + 3]);
        expected.extend_from_slice(b"hi");
        expected.extend_from_slice(&[b' '; 14]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(drain(&mut driver), expected);

        driver.on_rx_bytes(b"ok");
        assert_eq!(state.get_char(), b'o');
        assert_eq!(state.read_byte(), Some(b'k'));
        assert_eq!(state.read_byte(), None);
    }

    #[test]
    fn stdio_init_installs_global_console() {
        static STDIO: Stdio<16, 64> = Stdio::new();
        static OTHER: Stdio<16, 64> = Stdio::new();

        let mut driver = STDIO.init().unwrap();
        assert!(is_initialized());
        assert!(matches!(STDIO.init(), Err(InitError::AlreadyInitialized)));
        assert!(matches!(OTHER.init(), Err(InitError::AlreadyInitialized)));
        // A failed install leaves the other adapter untouched.
        assert!(OTHER.split().is_ok());

        crate::println!("v{}", 2);
        crate::log_err!("boom");
        let out = drain(&mut driver);
        let expected = std::format!("v2\r\nE src/logger.rs {} : boom\r\n", line!() - 2);
        assert_eq!(out, expected.as_bytes());
    }
}
