#![no_std]

pub mod uart;

use core::future::Future;
use core::pin::pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use cdc_stdio::StdioDriver;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m_semihosting::debug::{self, EXIT_FAILURE, EXIT_SUCCESS};
use panic_semihosting as _;

pub use cortex_m_rt::{entry, exception};

/// Packet size of a full-speed CDC bulk endpoint.
pub const PACKET_SIZE: usize = 64;

pub fn exit_success() -> ! {
    debug::exit(EXIT_SUCCESS);
    #[allow(clippy::empty_loop)]
    loop {}
}

pub fn exit_failure() -> ! {
    debug::exit(EXIT_FAILURE);
    #[allow(clippy::empty_loop)]
    loop {}
}

/// Move everything queued for transmission to UART0, one packet at a time.
///
/// This is what a CDC class driver does when its IN endpoint becomes ready.
pub fn drain_to_uart<const RX: usize, const TX: usize>(driver: &mut StdioDriver<'_, RX, TX>) {
    let mut packet = [0u8; PACKET_SIZE];
    loop {
        let n = driver.get_tx_bytes(&mut packet);
        if n == 0 {
            break;
        }
        uart::write_bytes(&packet[..n]);
    }
}

/// Start SysTick so that the `SysTick` exception fires every `reload` core cycles.
pub fn start_systick(reload: u32) {
    let Some(mut peripherals) = cortex_m::Peripherals::take() else {
        exit_failure();
    };
    let syst = &mut peripherals.SYST;
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(reload);
    syst.clear_current();
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Minimal block_on executor for testing.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);

    // Create a no-op waker.
    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        |_| RawWaker::new(core::ptr::null(), &VTABLE),
        |_| {},
        |_| {},
        |_| {},
    );
    let raw_waker = RawWaker::new(core::ptr::null(), &VTABLE);
    let waker = unsafe { Waker::from_raw(raw_waker) };
    let mut cx = Context::from_waker(&waker);

    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(val) => return val,
            Poll::Pending => {
                cortex_m::asm::nop();
            }
        }
    }
}
