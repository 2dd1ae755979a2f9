//! Copyright (c) 2023 MankorOS EastonMan
//!
//! Interrupt handling of the SDIO handle
//!

use core::mem;

use log::{debug, error, warn};

use crate::consts::sdio::CCCR_INT_PENDING;

use super::cmd::{Direction, Function};
use super::error::ErrorCodes;
use super::extended::Phase;
use super::handle::{Context, DmaBuffer, Sdio, State, XferEvent};
use super::hal::{SdmmcPort, Timer};
use super::registers::Status;

/// Outcome of a data complete interrupt
#[derive(Debug)]
pub enum Action {
    /// The next phase is armed, the transfer goes on
    Continue(Phase),
    /// Every phase landed, the handle is Idle again
    Done(XferEvent, DmaBuffer),
    /// Arming the next phase failed, the handle is Idle again
    Abort(ErrorCodes, DmaBuffer),
    /// No DMA transfer was outstanding
    Spurious,
}

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    /// Entry point for the controller interrupt vector.
    ///
    /// Never blocks. Every flag it consumes is cleared before a callback
    /// runs, so callbacks may start the next operation.
    pub fn irq_handler(&mut self) {
        let status = self.port.status();
        let card_interrupt = status.contains(Status::SDIOIT);
        if card_interrupt {
            self.port.clear_flags(Status::SDIOIT);
        }

        if status.intersects(Status::DATA_ERRORS | Status::IDMATE) {
            self.on_data_error(status);
        } else if status.contains(Status::DATAEND) {
            match self.on_data_complete() {
                Action::Done(event, buffer) => self.callbacks.transfer_complete(event, buffer),
                Action::Abort(codes, buffer) => self.callbacks.error(codes, Some(buffer)),
                Action::Continue(_) | Action::Spurious => {}
            }
        }

        if card_interrupt {
            self.dispatch_io_interrupt();
        }
    }

    /// Retire the phase that just finished and either chain the next one
    /// or close the transfer
    pub fn on_data_complete(&mut self) -> Action {
        self.port.clear_flags(Status::DATAEND);
        self.port.disable_interrupts(Status::DATA_IT);
        self.port.set_cmd_trans(false);

        let mut xfer = match mem::take(&mut self.context) {
            Context::Dma(xfer) => xfer,
            other => {
                self.context = other;
                debug!("sdio{}: data end outside a dma transfer", self.instance);
                return Action::Spurious;
            }
        };
        self.port.idma_stop();
        self.reset_data_path();

        if xfer.remaining() == 0 {
            let event = match xfer.direction() {
                Direction::Read => XferEvent::RxComplete,
                Direction::Write => XferEvent::TxComplete,
            };
            debug!("sdio{}: dma done after {} phase(s)", self.instance, xfer.phases());
            self.release();
            return Action::Done(event, xfer.buffer);
        }

        match self.arm_dma_phase(&mut xfer) {
            Ok(()) => {
                let phase = xfer.phase;
                self.context = Context::Dma(xfer);
                Action::Continue(phase)
            }
            Err(err) => {
                error!("sdio{}: continuation failed: {:?}", self.instance, err);
                self.release();
                Action::Abort(self.error_codes, xfer.buffer)
            }
        }
    }

    fn on_data_error(&mut self, status: Status) {
        let mut codes = ErrorCodes::from_data_status(status);
        if status.contains(Status::IDMATE) {
            codes |= ErrorCodes::DMA;
        }
        self.port.clear_flags(Status::STATIC_DATA);
        self.port.disable_interrupts(Status::DATA_IT);
        self.port.set_cmd_trans(false);
        if self.state != State::Active {
            debug!("sdio{}: data error outside a transfer: {:?}", self.instance, codes);
            return;
        }

        let buffer = match mem::take(&mut self.context) {
            Context::Dma(xfer) => {
                self.port.idma_stop();
                Some(xfer.buffer)
            }
            _ => None,
        };
        self.reset_data_path();
        self.error_codes |= codes;
        self.release();
        error!("sdio{}: transfer aborted: {:?}", self.instance, codes);
        self.callbacks.error(codes, buffer);
    }

    /// Fan a card interrupt out to the enabled functions
    fn dispatch_io_interrupt(&mut self) {
        match self.io_interrupt_nbr {
            0 => warn!("sdio{}: card interrupt with no function enabled", self.instance),
            1 => {
                let index = self.io_function_enabled_mask.trailing_zeros() as u8;
                if let Some(function) = Function::from_index(index) {
                    self.call_io(function);
                }
            }
            _ => {
                let mut pending = match self.read_cccr(CCCR_INT_PENDING) {
                    Ok(pending) => pending & 0xFE,
                    Err(err) => {
                        warn!("sdio{}: pending interrupts unreadable: {:?}", self.instance, err);
                        return;
                    }
                };
                while pending != 0 {
                    let index = pending.trailing_zeros() as u8;
                    pending &= !(1 << index);
                    if let Some(function) = Function::from_index(index) {
                        self.call_io(function);
                    }
                }
            }
        }
    }

    fn call_io(&mut self, function: Function) {
        let callback = Self::io_slot(function)
            .ok()
            .and_then(|slot| self.io_callbacks[slot]);
        match callback {
            Some(callback) => callback(self, function),
            None => warn!("sdio{}: no handler for {:?}", self.instance, function),
        }
    }
}
