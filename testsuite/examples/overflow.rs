//! Full buffers drop data silently, including half of a translated line feed.

#![no_std]
#![no_main]

use core::fmt::Write;

use cdc_stdio::Stdio;
use testsuite::{drain_to_uart, entry, exit_failure, exit_success};

static STDIO: Stdio<16, 16> = Stdio::new();

#[entry]
fn main() -> ! {
    let Ok((mut port, mut driver)) = STDIO.split() else {
        exit_failure();
    };

    // Only the first 16 bytes fit.
    port.put_str("0123456789abcdef-lost");
    if port.tx_free() != 0 {
        exit_failure();
    }
    drain_to_uart(&mut driver);

    // One slot left for the line feed: only the `\r` survives.
    port.put_str("abcdefghijklmno\n");
    drain_to_uart(&mut driver);

    // 20 bytes arrive, 16 are kept.
    driver.on_rx_bytes(b"ABCDEFGHIJKLMNOPQRST");
    let mut received = [0u8; 20];
    let mut n = 0;
    while let Some(byte) = port.read_byte() {
        received[n] = byte;
        n += 1;
    }
    let Ok(text) = core::str::from_utf8(&received[..n]) else {
        exit_failure();
    };
    let _ = writeln!(port, "\nrx {n}");
    drain_to_uart(&mut driver);
    port.put_str(text);
    drain_to_uart(&mut driver);
    port.put_char(b'\n');
    drain_to_uart(&mut driver);

    exit_success();
}
