//! Hexdump layout through the global console.

#![no_std]
#![no_main]

use cdc_stdio::{Stdio, logger};
use testsuite::{drain_to_uart, entry, exit_failure, exit_success};

static STDIO: Stdio<16, 1024> = Stdio::new();

#[entry]
fn main() -> ! {
    let Ok(mut driver) = STDIO.init() else {
        exit_failure();
    };

    let mut data = [0u8; 70];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i as u8).wrapping_mul(7).wrapping_add(0x20);
    }

    logger::trace_hexdump(&data);
    logger::write_str("--\n");
    logger::trace_hexdump(b"cdc\x00\x7f\x80");
    drain_to_uart(&mut driver);

    exit_success();
}
