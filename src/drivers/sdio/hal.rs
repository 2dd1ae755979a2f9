//! Collaborators the SDIO driver runs on top of
//!
//! A board support layer implements these for one SDMMC instance: the
//! clock tree, the command and data state machines, the status flags and
//! the internal DMA. The driver itself never touches a register directly.

use super::error::ErrorCodes;
use super::registers::{ClockControl, DataControl, DataPathConfig, Status};

/// Response shape the command path has to wait for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    None,
    Short,
    /// R4 carries no valid CRC
    ShortNoCrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub index: u8,
    pub arg: u32,
    pub response: Response,
}

impl Command {
    pub const fn new(index: u8, arg: u32, response: Response) -> Self {
        Self {
            index,
            arg,
            response,
        }
    }
}

pub trait KernelClock {
    /// Controller input clock, 0 when not configured
    fn kernel_clock_hz(&self) -> u32;
}

pub trait CommandPath {
    /// Issue `cmd` and wait for the command path to settle.
    ///
    /// Returns RESP1. Failures of the command phase come back as
    /// `CMD_RSP_TIMEOUT`, `CMD_CRC_FAIL` (including a response index
    /// mismatch) or `TIMEOUT`, with the command flags already cleared.
    fn send_command(&mut self, cmd: Command) -> Result<u32, ErrorCodes>;
}

pub trait DataPath {
    fn power_on(&mut self);
    fn power_off(&mut self);

    fn clock_control(&self) -> ClockControl;
    fn set_clock_control(&mut self, clkcr: ClockControl);

    fn data_control(&self) -> DataControl;
    fn set_data_control(&mut self, dctrl: DataControl);
    /// Program DTIMER, DLENR and DCTRL in that order
    fn config_data(&mut self, cfg: DataPathConfig);
    /// CMDTRANS, marks the next command as the one starting the data phase
    fn set_cmd_trans(&mut self, enable: bool);

    fn read_fifo(&mut self) -> u32;
    fn write_fifo(&mut self, word: u32);
}

pub trait FlagControl {
    fn status(&self) -> Status;
    fn clear_flags(&mut self, flags: Status);
    fn enable_interrupts(&mut self, flags: Status);
    fn disable_interrupts(&mut self, flags: Status);
}

/// Internal DMA in single buffer mode
pub trait Idma {
    fn idma_start(&mut self, base: usize);
    /// Disable the engine and drop the programmed data length
    fn idma_stop(&mut self);
}

/// Everything one controller instance has to provide
pub trait SdmmcPort: KernelClock + CommandPath + DataPath + FlagControl + Idma {
    fn is_active(&self, flags: Status) -> bool {
        self.status().intersects(flags)
    }
}

impl<T: KernelClock + CommandPath + DataPath + FlagControl + Idma> SdmmcPort for T {}

/// Monotonic millisecond tick
pub trait Timer {
    fn now_ms(&self) -> u32;
    fn delay_ms(&mut self, ms: u32);
}
