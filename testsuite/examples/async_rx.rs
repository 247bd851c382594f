//! `read_byte_async` is woken by bytes arriving from the SysTick exception.

#![no_std]
#![no_main]

use core::cell::RefCell;
use core::fmt::Write;

use cdc_stdio::{Stdio, StdioDriver};
use critical_section::Mutex;
use testsuite::{
    block_on, drain_to_uart, entry, exception, exit_failure, exit_success, start_systick,
};

const INPUT: &[&[u8]] = &[b"po", b"ng", b"\n"];

static STDIO: Stdio<16, 64> = Stdio::new();
static DRIVER: Mutex<RefCell<Option<StdioDriver<'static, 16, 64>>>> =
    Mutex::new(RefCell::new(None));
static PACKETS: Mutex<RefCell<&[&[u8]]>> = Mutex::new(RefCell::new(INPUT));

#[entry]
fn main() -> ! {
    let Ok((mut port, driver)) = STDIO.split() else {
        exit_failure();
    };
    critical_section::with(|cs| DRIVER.borrow_ref_mut(cs).replace(driver));
    start_systick(10_000);

    let mut line = [0u8; 8];
    let len = block_on(async {
        let mut len = 0;
        loop {
            let byte = port.read_byte_async().await;
            if byte == b'\n' || len == line.len() {
                break len;
            }
            line[len] = byte;
            len += 1;
        }
    });

    let Ok(text) = core::str::from_utf8(&line[..len]) else {
        exit_failure();
    };
    let _ = writeln!(port, "async: {text} ({len})");

    critical_section::with(|cs| {
        if let Some(driver) = DRIVER.borrow_ref_mut(cs).as_mut() {
            drain_to_uart(driver);
        }
    });

    exit_success();
}

#[exception]
fn SysTick() {
    critical_section::with(|cs| {
        let mut packets = PACKETS.borrow_ref_mut(cs);
        let pending: &'static [&'static [u8]] = *packets;
        let Some((&first, rest)) = pending.split_first() else {
            return;
        };
        if let Some(driver) = DRIVER.borrow_ref_mut(cs).as_mut() {
            driver.on_rx_bytes(first);
            *packets = rest;
        }
    });
}
