#![no_std]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub use ring_buffer::{CircularBuffer, Consumer, Producer};
pub use stdio::{Stdio, StdioDriver, StdioPort};
pub use trace::{
    DEFAULT_SCRATCH_LEN, Level, NoTimestamp, ScratchBuffer, Sink, SinkWriter, Timestamp,
    TimestampFn, Tracer,
};

#[cfg(feature = "async-await")]
pub(crate) mod atomic_waker;
pub mod logger;
mod ring_buffer;
mod stdio;
mod trace;

/// Error returned when setting up an adapter or the process console fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum InitError {
    /// The handles of this [`Stdio`] were already handed out by [`Stdio::split`] or
    /// [`Stdio::init`].
    AlreadySplit,
    /// A process console is already installed.
    AlreadyInitialized,
}

/// Writes formatted text to the process console.
///
/// Unlike the log macros the text is not bounded by the scratch buffer.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::logger::_print(::core::format_args!($($arg)*))
    };
}

/// Writes formatted text and a line feed to the process console.
#[macro_export]
macro_rules! println {
    () => {
        $crate::logger::put_char(b'\n')
    };
    ($($arg:tt)*) => {
        $crate::logger::_println(::core::format_args!($($arg)*))
    };
}

/// Writes a formatted message with no prefix and no line feed.
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::logger::_trace(::core::format_args!($($arg)*))
    };
}

/// Logs an info line tagged with the calling file and line.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::_log(
            $crate::Level::Info,
            ::core::file!(),
            ::core::line!(),
            ::core::format_args!($($arg)*),
        )
    };
}

/// Logs a warning line tagged with the calling file and line.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::_log(
            $crate::Level::Warn,
            ::core::file!(),
            ::core::line!(),
            ::core::format_args!($($arg)*),
        )
    };
}

/// Logs an error line tagged with the calling file and line.
#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::_log(
            $crate::Level::Error,
            ::core::file!(),
            ::core::line!(),
            ::core::format_args!($($arg)*),
        )
    };
}
