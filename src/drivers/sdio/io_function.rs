//! IO function control through the CCCR

use log::debug;

use crate::consts::sdio::{
    ASYNC_INT_ENABLE, CCCR_FUNCTION_SELECT, CCCR_INT_ENABLE, CCCR_INT_EXTENSION, CCCR_IO_ABORT,
    CCCR_IO_ENABLE, CCCR_IO_READY, CMD_TIMEOUT_MS, INT_MASTER_ENABLE,
};

use super::cmd::{DirectCmd, Direction, Function};
use super::error::{SdioError, SdioResult};
use super::handle::{Context, Sdio};
use super::hal::{SdmmcPort, Timer};
use super::registers::Status;
use super::{wait_for, Deadline};

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    /// Write back a CCCR byte and have the card return the new content
    fn write_cccr_raw(&mut self, address: u32, value: u8) -> SdioResult<u8> {
        let cmd = DirectCmd::new(Function::F0, address).with_read_after_write();
        self.io_direct(Direction::Write, &cmd, value)
    }

    pub fn enable_io_function_interrupt(&mut self, function: Function) -> SdioResult {
        Self::io_slot(function)?;
        self.run(Context::Direct, |sdio| {
            let enabled = sdio.read_cccr(CCCR_INT_ENABLE)?;
            if enabled & function.bit() != 0 {
                return Ok(());
            }
            sdio.write_cccr(CCCR_INT_ENABLE, enabled | function.bit() | INT_MASTER_ENABLE)?;
            sdio.io_interrupt_nbr += 1;
            sdio.io_function_enabled_mask |= function.bit();
            sdio.port.enable_interrupts(Status::SDIOIT);
            let dctrl = sdio.port.data_control().with_sdioen(true);
            sdio.port.set_data_control(dctrl);
            debug!("sdio{}: {:?} interrupt on", sdio.instance, function);
            Ok(())
        })
    }

    pub fn disable_io_function_interrupt(&mut self, function: Function) -> SdioResult {
        Self::io_slot(function)?;
        self.run(Context::Direct, |sdio| {
            let enabled = sdio.read_cccr(CCCR_INT_ENABLE)?;
            if enabled & function.bit() == 0 {
                return Ok(());
            }
            sdio.write_cccr_raw(CCCR_INT_ENABLE, enabled & !function.bit())?;
            sdio.io_function_enabled_mask &= !function.bit();
            sdio.io_interrupt_nbr = sdio.io_interrupt_nbr.saturating_sub(1);
            if sdio.io_interrupt_nbr == 0 {
                sdio.port.disable_interrupts(Status::SDIOIT);
            }
            Ok(())
        })
    }

    /// Enable `function` and wait for the card to report it ready
    pub fn enable_io_function(&mut self, function: Function) -> SdioResult {
        Self::io_slot(function)?;
        self.run(Context::Direct, |sdio| {
            let enabled = sdio.read_cccr(CCCR_IO_ENABLE)?;
            if enabled & function.bit() != 0 {
                return Ok(());
            }
            sdio.write_cccr_raw(CCCR_IO_ENABLE, enabled | function.bit())?;
            let deadline = Deadline::after(&sdio.timer, CMD_TIMEOUT_MS);
            wait_for!(
                sdio.read_cccr(CCCR_IO_READY)? & function.bit() != 0,
                &sdio.timer,
                deadline
            )
            .map_err(|_| SdioError::NotReady)
        })
    }

    pub fn disable_io_function(&mut self, function: Function) -> SdioResult {
        Self::io_slot(function)?;
        self.run(Context::Direct, |sdio| {
            let enabled = sdio.read_cccr(CCCR_IO_ENABLE)?;
            if enabled & function.bit() != 0 {
                sdio.write_cccr_raw(CCCR_IO_ENABLE, enabled & !function.bit())?;
            }
            Ok(())
        })
    }

    pub fn select_io_function(&mut self, function: Function) -> SdioResult {
        self.run(Context::Direct, |sdio| {
            sdio.write_cccr_raw(CCCR_FUNCTION_SELECT, function.index()).map(|_| ())
        })
    }

    /// Ask the card to abort the transfer running on `function`
    pub fn abort_io_function(&mut self, function: Function) -> SdioResult {
        self.run(Context::Direct, |sdio| {
            sdio.write_cccr_raw(CCCR_IO_ABORT, function.index()).map(|_| ())
        })
    }

    pub fn enable_io_async_interrupt(&mut self) -> SdioResult {
        self.update_int_extension(true)
    }

    pub fn disable_io_async_interrupt(&mut self) -> SdioResult {
        self.update_int_extension(false)
    }

    fn update_int_extension(&mut self, enable: bool) -> SdioResult {
        self.run(Context::Direct, |sdio| {
            let current = sdio.read_cccr(CCCR_INT_EXTENSION)?;
            let wanted = if enable {
                current | ASYNC_INT_ENABLE
            } else {
                current & !ASYNC_INT_ENABLE
            };
            if wanted != current {
                sdio.write_cccr_raw(CCCR_INT_EXTENSION, wanted)?;
            }
            Ok(())
        })
    }
}
