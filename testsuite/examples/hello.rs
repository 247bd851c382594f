//! Global console: plain printing, level threshold and raw traces.
//!
//! Log lines are emitted through a `Tracer` with fixed source names so the
//! expected output does not depend on where this file lives.

#![no_std]
#![no_main]

use cdc_stdio::{Level, Stdio, Tracer, logger, log_info, print, println, trace};
use testsuite::{drain_to_uart, entry, exit_failure, exit_success};

static STDIO: Stdio<16, 512> = Stdio::new();

#[entry]
fn main() -> ! {
    let Ok(mut driver) = STDIO.init() else {
        exit_failure();
    };
    if logger::is_initialized() && STDIO.init().is_ok() {
        exit_failure();
    }

    println!("hello from cdc-stdio");
    print!("{}+{}=", 2, 2);
    println!("{}", 2 + 2);
    println!();
    drain_to_uart(&mut driver);

    // Below the threshold: nothing reaches the TX buffer.
    logger::set_level(Level::Warn);
    log_info!("not shown");
    if driver.tx_pending() != 0 {
        exit_failure();
    }
    logger::set_level(Level::Info);

    trace!("raw {:02x}", 0xa5u8);
    logger::trace_data(&[0xde, 0xad]);
    logger::put_char(b'\n');
    drain_to_uart(&mut driver);

    let mut tracer: Tracer<_> = Tracer::new(Console);
    tracer.log_info("main.rs", 10, format_args!("boot #{}", 1));
    tracer.log_warn("usb.rs", 200, format_args!("suspend"));
    tracer.log_err("usb.rs", 201, format_args!("stall on ep{}", 2));
    drain_to_uart(&mut driver);

    exit_success();
}

/// Routes a local tracer through the global console.
struct Console;

impl cdc_stdio::Sink for Console {
    fn put_char(&mut self, byte: u8) {
        logger::put_char(byte);
    }
}
