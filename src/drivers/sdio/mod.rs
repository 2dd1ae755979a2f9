//! SDIO host driver for an SDMMC class controller
//!
//! The handle [`Sdio`] owns one controller instance. Blocking calls spin on
//! the controller flags with a millisecond deadline; DMA calls return once
//! the engine is armed and finish through [`Sdio::irq_handler`].

mod card;
mod cmd;
mod config;
mod direct;
mod dlyb;
mod error;
mod extended;
mod handle;
mod hal;
mod identify;
mod io_function;
mod irq;
mod registers;

#[cfg(test)]
pub(crate) mod sim;

pub use card::{Cccr, Fbr, FbrFlags};
pub use cmd::{BlockMode, DirectCmd, Direction, ExtendedCmd, Function, OpCode};
pub use config::{BusWidth, ClockConfig, ClockEdge, Config, SpeedMode, Transceiver};
pub use dlyb::{DelayBlock, DelayConfig, DelayControl};
pub use error::{ErrorCodes, SdioError, SdioResult};
pub use extended::Phase;
pub use handle::{
    Context, DmaBuffer, DmaTransfer, IdentifyFn, IoCallback, NoCallbacks, Sdio, SdioCallbacks,
    State, XferEvent,
};
pub use hal::{
    Command, CommandPath, DataPath, FlagControl, Idma, KernelClock, Response, SdmmcPort, Timer,
};
pub use irq::Action;
pub use registers::{ClockControl, DataControl, DataPathConfig, Status};

/// Millisecond deadline measured on a [`Timer`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    start: u32,
    timeout_ms: u32,
}

impl Deadline {
    pub fn after<T: Timer>(timer: &T, timeout_ms: u32) -> Self {
        Self {
            start: timer.now_ms(),
            timeout_ms,
        }
    }

    pub fn expired<T: Timer>(&self, timer: &T) -> bool {
        timer.now_ms().wrapping_sub(self.start) >= self.timeout_ms
    }
}

/// Spin until `$cond` holds, giving up with `SdioError::Timeout` once the
/// deadline passes
macro_rules! wait_for {
    ($cond:expr, $timer:expr, $deadline:expr) => {{
        let mut result: $crate::drivers::sdio::SdioResult = Ok(());
        while !$cond {
            if $deadline.expired($timer) {
                result = Err($crate::drivers::sdio::SdioError::Timeout);
                break;
            }
            core::hint::spin_loop();
        }
        result
    }};
}
pub(crate) use wait_for;

pub(crate) fn poll_until<T: Timer>(
    timer: &T,
    deadline: Deadline,
    mut pred: impl FnMut() -> bool,
) -> SdioResult {
    wait_for!(pred(), timer, deadline)
}

#[cfg(test)]
mod tests {
    use super::sim::MockTimer;
    use super::*;

    #[test]
    fn poll_until_gives_up() {
        let timer = MockTimer::new();
        let deadline = Deadline::after(&timer, 10);
        assert_eq!(poll_until(&timer, deadline, || false), Err(SdioError::Timeout));
        assert!(timer.now_ms() <= 12);
    }

    #[test]
    fn poll_until_returns_once_true() {
        let timer = MockTimer::new();
        let deadline = Deadline::after(&timer, 10);
        let mut polls = 0;
        let result = poll_until(&timer, deadline, || {
            polls += 1;
            polls == 3
        });
        assert_eq!(result, Ok(()));
        assert_eq!(polls, 3);
    }
}
