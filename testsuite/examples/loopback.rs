//! Split handles: SysTick plays the USB OUT endpoint and feeds received bytes,
//! the main loop blocks in `get_char` and echoes them upper-cased.

#![no_std]
#![no_main]

use core::cell::RefCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use cdc_stdio::{Stdio, StdioDriver};
use critical_section::Mutex;
use testsuite::{drain_to_uart, entry, exception, exit_failure, exit_success, start_systick};

const INPUT: &[u8] = b"ping\n";

static STDIO: Stdio<16, 64> = Stdio::new();
static DRIVER: Mutex<RefCell<Option<StdioDriver<'static, 16, 64>>>> =
    Mutex::new(RefCell::new(None));
static FED: AtomicUsize = AtomicUsize::new(0);

#[entry]
fn main() -> ! {
    let Ok((mut port, driver)) = STDIO.split() else {
        exit_failure();
    };
    if STDIO.split().is_ok() {
        exit_failure();
    }
    critical_section::with(|cs| DRIVER.borrow_ref_mut(cs).replace(driver));

    if port.read_byte().is_some() || port.get_char_timeout(1000).is_some() {
        exit_failure();
    }

    start_systick(10_000);

    loop {
        let c = port.get_char();
        port.put_char(c.to_ascii_uppercase());
        if c == b'\n' {
            break;
        }
    }
    port.put_str("done\n");

    critical_section::with(|cs| {
        if let Some(driver) = DRIVER.borrow_ref_mut(cs).as_mut() {
            drain_to_uart(driver);
        }
    });

    exit_success();
}

#[exception]
fn SysTick() {
    let i = FED.load(Ordering::Relaxed);
    let Some(&byte) = INPUT.get(i) else {
        return;
    };
    critical_section::with(|cs| {
        if let Some(driver) = DRIVER.borrow_ref_mut(cs).as_mut() {
            driver.on_rx_byte(byte);
            FED.store(i + 1, Ordering::Relaxed);
        }
    });
}
