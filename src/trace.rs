//! Leveled diagnostic tracing over a byte sink.
//!
//! Every formatted message is first rendered into a fixed-size [`ScratchBuffer`] and then
//! streamed to the [`Sink`] one byte at a time, so the output of a single call is bounded by
//! the scratch capacity no matter what the format arguments expand to.

use core::fmt::{self, Write};

/// Scratch capacity used when [`Tracer`] is named without one.
pub const DEFAULT_SCRATCH_LEN: usize = 64;

const BYTES_PER_ROW: usize = 16;
const BYTES_PER_GROUP: usize = 4;
/// A blank line separates every block of this many rows in a hex dump.
const ROWS_PER_BLOCK: usize = 4;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, defmt::Format)]
pub enum Level {
    /// Informational.
    Info,
    /// Something unexpected, but recoverable.
    Warn,
    /// Something failed.
    Error,
}

impl Level {
    /// The one-character tag that starts a log line.
    pub const fn tag(self) -> u8 {
        match self {
            Level::Info => b'I',
            Level::Warn => b'W',
            Level::Error => b'E',
        }
    }
}

/// Byte-oriented output used by the tracer.
///
/// Implementations must not block on a full transport; dropping bytes is acceptable.
pub trait Sink {
    /// Writes one byte.
    fn put_char(&mut self, byte: u8);

    /// Writes all bytes in order.
    fn put_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.put_char(byte);
        }
    }
}

impl Sink for fn(u8) {
    fn put_char(&mut self, byte: u8) {
        self(byte)
    }
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn put_char(&mut self, byte: u8) {
        (**self).put_char(byte)
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        (**self).put_bytes(bytes)
    }
}

/// Adapts a [`Sink`] to [`core::fmt::Write`] without any intermediate buffer.
pub struct SinkWriter<'a, S: ?Sized>(pub &'a mut S);

impl<S: Sink + ?Sized> Write for SinkWriter<'_, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.put_bytes(s.as_bytes());
        Ok(())
    }
}

/// Supplies the timestamp printed after the severity tag.
pub trait Timestamp {
    /// Whether a timestamp (and its trailing space) is printed at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Writes the current time. Output beyond the scratch capacity is truncated.
    fn write_timestamp(&mut self, out: &mut dyn Write) -> fmt::Result;
}

/// No timestamp; log lines go straight from the tag to the source location.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTimestamp;

impl Timestamp for NoTimestamp {
    fn is_enabled(&self) -> bool {
        false
    }

    fn write_timestamp(&mut self, _out: &mut dyn Write) -> fmt::Result {
        Ok(())
    }
}

/// A plain function used as timestamp provider.
pub type TimestampFn = fn(&mut dyn Write) -> fmt::Result;

impl Timestamp for TimestampFn {
    fn write_timestamp(&mut self, out: &mut dyn Write) -> fmt::Result {
        self(out)
    }
}

impl<T: Timestamp> Timestamp for Option<T> {
    fn is_enabled(&self) -> bool {
        self.as_ref().is_some_and(|t| t.is_enabled())
    }

    fn write_timestamp(&mut self, out: &mut dyn Write) -> fmt::Result {
        match self {
            Some(t) => t.write_timestamp(out),
            None => Ok(()),
        }
    }
}

/// Fixed-size render buffer with silent truncation.
///
/// Holds at most `N - 1` bytes of content; the slot after the content, and always the last
/// slot, hold a `0` terminator.
pub struct ScratchBuffer<const N: usize> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> Default for ScratchBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ScratchBuffer<N> {
    const CONTENT_CAPACITY: usize = {
        assert!(N > 0, "scratch buffer needs room for the terminator");
        N - 1
    };

    /// Creates an empty buffer.
    pub const fn new() -> Self {
        let _ = Self::CONTENT_CAPACITY;
        ScratchBuffer {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    /// Maximum number of content bytes.
    pub const fn capacity(&self) -> usize {
        Self::CONTENT_CAPACITY
    }

    /// Discards the content.
    pub fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
        self.buf[0] = 0;
    }

    /// Renders `args` into the buffer, replacing previous content.
    pub fn render(&mut self, args: fmt::Arguments<'_>) -> &[u8] {
        self.render_with(|w| w.write_fmt(args))
    }

    /// Clears the buffer, lets `f` write into it, then terminates it.
    ///
    /// Errors from `f` are ignored, whatever it managed to write is kept.
    pub fn render_with(&mut self, f: impl FnOnce(&mut Self) -> fmt::Result) -> &[u8] {
        self.clear();
        let _ = f(self);
        self.terminate();
        self.as_bytes()
    }

    fn terminate(&mut self) {
        self.buf[self.len] = 0;
        self.buf[N - 1] = 0;
    }

    /// Rendered content, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Rendered content including the terminator.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf[..=self.len]
    }

    /// Whether the last render did not fit.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl<const N: usize> Write for ScratchBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = Self::CONTENT_CAPACITY - self.len;
        let n = s.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        if n < s.len() {
            self.truncated = true;
        }
        // Keep formatting going; the surplus is dropped.
        Ok(())
    }
}

/// Formats log lines, traces and hex dumps into a [`Sink`].
///
/// ```text
/// I main.rs 42 : message
/// W 12:00:01 main.rs 43 : message   (with a timestamp provider)
/// ```
pub struct Tracer<S, T = NoTimestamp, const N: usize = DEFAULT_SCRATCH_LEN> {
    sink: S,
    timestamp: T,
    level: Level,
    scratch: ScratchBuffer<N>,
}

impl<S: Sink, const N: usize> Tracer<S, NoTimestamp, N> {
    /// Creates a tracer that emits every level and prints no timestamp.
    pub const fn new(sink: S) -> Self {
        Tracer {
            sink,
            timestamp: NoTimestamp,
            level: Level::Info,
            scratch: ScratchBuffer::new(),
        }
    }
}

impl<S: Sink, T: Timestamp, const N: usize> Tracer<S, T, N> {
    pub(crate) const fn from_parts(sink: S, timestamp: T, level: Level) -> Self {
        Tracer {
            sink,
            timestamp,
            level,
            scratch: ScratchBuffer::new(),
        }
    }

    /// Only emit log lines at `level` or above.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Print a timestamp from `timestamp` on every log line.
    pub fn with_timestamp<U: Timestamp>(self, timestamp: U) -> Tracer<S, U, N> {
        Tracer {
            sink: self.sink,
            timestamp,
            level: self.level,
            scratch: self.scratch,
        }
    }

    /// Changes the minimum emitted level.
    pub fn set_level(&mut self, level: Level) {
        self.level = level;
    }

    /// The minimum emitted level.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Replaces the timestamp provider, keeping its type.
    pub fn set_timestamp(&mut self, timestamp: T) {
        self.timestamp = timestamp;
    }

    /// Whether log lines at `level` are emitted.
    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    /// The output sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The output sink, e.g. to read from a [`StdioPort`](crate::StdioPort) it wraps.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Consumes the tracer, returning the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Emits `"<tag> [<timestamp> ]<source> <line> : <message>\n"`.
    pub fn log(&mut self, level: Level, source: &str, line: u32, args: fmt::Arguments<'_>) {
        if !self.is_enabled(level) {
            return;
        }
        self.log_prefix(level, source, line);
        self.trace(args);
        self.sink.put_char(b'\n');
    }

    /// [`log`](Self::log) at [`Level::Info`].
    pub fn log_info(&mut self, source: &str, line: u32, args: fmt::Arguments<'_>) {
        self.log(Level::Info, source, line, args);
    }

    /// [`log`](Self::log) at [`Level::Warn`].
    pub fn log_warn(&mut self, source: &str, line: u32, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, source, line, args);
    }

    /// [`log`](Self::log) at [`Level::Error`].
    pub fn log_err(&mut self, source: &str, line: u32, args: fmt::Arguments<'_>) {
        self.log(Level::Error, source, line, args);
    }

    /// Emits a formatted message with no prefix and no line terminator.
    pub fn trace(&mut self, args: fmt::Arguments<'_>) {
        let rendered = self.scratch.render(args);
        self.sink.put_bytes(rendered);
    }

    /// Emits an unformatted string.
    pub fn put_str(&mut self, s: &str) {
        self.sink.put_bytes(s.as_bytes());
    }

    /// Emits each byte as two uppercase hex digits followed by a space.
    pub fn trace_data(&mut self, data: &[u8]) {
        for &byte in data {
            self.put_hex(byte);
        }
    }

    /// Emits a 16-bytes-per-row hex dump with an ASCII column.
    ///
    /// Hex values are grouped by four; missing values in the last row are padded with spaces
    /// so the ASCII column stays aligned. A blank line separates every 64 bytes.
    pub fn trace_hexdump(&mut self, data: &[u8]) {
        for (index, row) in data.chunks(BYTES_PER_ROW).enumerate() {
            if index != 0 && index % ROWS_PER_BLOCK == 0 {
                self.sink.put_char(b'\n');
            }

            for column in 0..BYTES_PER_ROW {
                if column != 0 && column % BYTES_PER_GROUP == 0 {
                    self.sink.put_char(b' ');
                }
                match row.get(column) {
                    Some(&byte) => self.put_hex(byte),
                    None => self.sink.put_bytes(b"   "),
                }
            }

            for column in 0..BYTES_PER_ROW {
                let c = match row.get(column) {
                    Some(&byte @ 32..=127) => byte,
                    Some(_) => b'.',
                    None => b' ',
                };
                self.sink.put_char(c);
            }
            self.sink.put_char(b'\n');
        }
    }

    fn put_hex(&mut self, byte: u8) {
        self.sink.put_char(HEX[usize::from(byte >> 4)]);
        self.sink.put_char(HEX[usize::from(byte & 0x0F)]);
        self.sink.put_char(b' ');
    }

    fn log_prefix(&mut self, level: Level, source: &str, line: u32) {
        self.sink.put_char(level.tag());
        self.sink.put_char(b' ');

        if self.timestamp.is_enabled() {
            let timestamp = &mut self.timestamp;
            let rendered = self.scratch.render_with(|w| timestamp.write_timestamp(w));
            self.sink.put_bytes(rendered);
            self.sink.put_char(b' ');
        }

        let rendered = self.scratch.render(format_args!("{source} {line} : "));
        self.sink.put_bytes(rendered);
    }
}

#[cfg(test)]
mod test {
    extern crate std;

    use super::*;
    use std::{string::String, vec::Vec};

    impl Sink for Vec<u8> {
        fn put_char(&mut self, byte: u8) {
            self.push(byte);
        }
    }

    fn text(t: &Tracer<Vec<u8>, impl Timestamp, { DEFAULT_SCRATCH_LEN }>) -> &str {
        core::str::from_utf8(t.sink()).unwrap()
    }

    #[test]
    fn log_line_layout() {
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.log_info("main.rs", 42, format_args!("hello {}", 7));
        assert_eq!(text(&t), "I main.rs 42 : hello 7\n");
    }

    #[test]
    fn level_tags() {
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.log_warn("a", 1, format_args!("w"));
        t.log_err("b", 2, format_args!("e"));
        assert_eq!(text(&t), "W a 1 : w\nE b 2 : e\n");
    }

    #[test]
    fn below_threshold_is_skipped() {
        let mut t: Tracer<_> = Tracer::new(Vec::new()).with_level(Level::Warn);
        t.log_info("a", 1, format_args!("dropped"));
        t.log_warn("a", 2, format_args!("kept"));
        assert!(!t.is_enabled(Level::Info));
        assert_eq!(text(&t), "W a 2 : kept\n");
    }

    #[test]
    fn level_can_change_after_construction() {
        let mut t: Tracer<Vec<u8>> = Tracer::new(Vec::new());
        assert_eq!(t.level(), Level::Info);
        t.set_level(Level::Error);
        assert_eq!(t.level(), Level::Error);
        t.log_warn("a", 1, format_args!("dropped"));
        t.log_err("a", 2, format_args!("kept"));
        assert_eq!(t.into_sink(), b"E a 2 : kept\n");
    }

    #[test]
    fn timestamp_after_tag() {
        fn now(out: &mut dyn Write) -> fmt::Result {
            out.write_str("00:01.250")
        }
        let mut t: Tracer<_, TimestampFn> =
            Tracer::new(Vec::new()).with_timestamp(now as TimestampFn);
        t.log_info("x.rs", 3, format_args!("tick"));
        assert_eq!(text(&t), "I 00:01.250 x.rs 3 : tick\n");
    }

    #[test]
    fn disabled_optional_timestamp() {
        let mut t: Tracer<_, Option<TimestampFn>> = Tracer::new(Vec::new()).with_timestamp(None);
        t.log_info("x.rs", 3, format_args!("tick"));
        assert_eq!(text(&t), "I x.rs 3 : tick\n");
    }

    #[test]
    fn trace_has_no_trailer() {
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.trace(format_args!("{}-{}", 1, 2));
        t.trace(format_args!("!"));
        assert_eq!(text(&t), "1-2!");
    }

    #[test]
    fn oversize_message_is_truncated() {
        let mut t: Tracer<Vec<u8>, NoTimestamp, 8> = Tracer::new(Vec::new());
        t.log_info("m", 1, format_args!("{}", "0123456789"));
        assert_eq!(t.sink().as_slice(), b"I m 1 : 0123456\n");
        assert!(t.scratch.is_truncated());
        assert_eq!(t.scratch.as_bytes_with_nul(), b"0123456\0");
    }

    #[test]
    fn scratch_terminator_always_present() {
        let mut s = ScratchBuffer::<4>::new();
        assert_eq!(s.capacity(), 3);
        assert_eq!(s.render(format_args!("ab")), b"ab");
        assert!(!s.is_truncated());
        assert_eq!(s.as_bytes_with_nul(), b"ab\0");

        assert_eq!(s.render(format_args!("{}{}", "abc", "def")), b"abc");
        assert!(s.is_truncated());
        assert_eq!(s.buf, *b"abc\0");
    }

    #[test]
    fn trace_data_hex() {
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.trace_data(&[0x00, 0xAB, 0x7F, 0x10]);
        assert_eq!(text(&t), "00 AB 7F 10 ");
    }

    #[test]
    fn hexdump_partial_row_padding() {
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.trace_hexdump(b"ABCDEFGHIJKLMNOPQRST");

        let mut expected = String::new();
        expected.push_str("41 42 43 44  45 46 47 48  49 4A 4B 4C  4D 4E 4F 50 ");
        expected.push_str("ABCDEFGHIJKLMNOP\n");
        expected.push_str("51 52 53 54 ");
        expected.push_str(&" ".repeat(39));
        expected.push_str("QRST");
        expected.push_str(&" ".repeat(12));
        expected.push('\n');
        assert_eq!(text(&t), expected);
    }

    #[test]
    fn hexdump_blank_line_every_64_bytes() {
        let data: Vec<u8> = (0..65).collect();
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.trace_hexdump(&data);

        let lines: Vec<&str> = text(&t).split('\n').collect();
        // 4 full rows, blank line, last row, and the empty remainder after the final newline.
        assert_eq!(lines.len(), 7);
        assert!(lines[0].starts_with("00 01 02 03  04"));
        assert!(lines[1..4].iter().all(|l| !l.is_empty()));
        assert_eq!(lines[4], "");
        assert!(lines[5].starts_with("40    "));
        assert_eq!(lines[6], "");
    }

    #[test]
    fn hexdump_exact_block_has_no_trailing_blank() {
        let data = [0u8; 64];
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.trace_hexdump(&data);
        assert_eq!(text(&t).matches('\n').count(), 4);
    }

    #[test]
    fn hexdump_ascii_column() {
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.trace_hexdump(&[0x1F, b' ', b'~', 0x7F, 0x80, 0xFF]);
        let out = text(&t);
        let ascii = &out[out.len() - 17..out.len() - 1];
        assert_eq!(ascii, std::format!(". ~\u{7f}..{}", " ".repeat(10)));
    }

    #[test]
    fn empty_hexdump_emits_nothing() {
        let mut t: Tracer<_> = Tracer::new(Vec::new());
        t.trace_hexdump(&[]);
        assert!(t.sink().is_empty());
    }

    #[test]
    fn fn_pointer_sink() {
        use core::sync::atomic::{AtomicUsize, Ordering};
        static COUNT: AtomicUsize = AtomicUsize::new(0);
        fn count(_: u8) {
            COUNT.fetch_add(1, Ordering::Relaxed);
        }

        let mut t: Tracer<fn(u8)> = Tracer::new(count as fn(u8));
        t.log_err("f", 9, format_args!("x"));
        assert_eq!(COUNT.load(Ordering::Relaxed), "E f 9 : x\n".len());
    }
}
