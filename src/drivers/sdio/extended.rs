//! Multi byte transfers, CMD53
//!
//! A request is cut into phases that each fit one command: whole blocks
//! while block mode was asked for and at least one block is left, byte mode
//! chunks of up to 512 bytes otherwise. Polling calls run every phase in
//! place, DMA calls arm the first one and let the interrupt handler chain
//! the rest.

use byte_slice_cast::{AsByteSlice, AsMutByteSlice};
use log::{debug, error};

use crate::consts::sdio::{
    BLOCK_MODE_MAX_BLOCKS, BYTE_MODE_WINDOW, CMD_IO_RW_EXTENDED, FIFO_BURST_BYTES,
};

use super::cmd::{check_r5, extended_arg, BlockMode, Direction, ExtendedCmd, OpCode};
use super::error::{ErrorCodes, SdioError, SdioResult};
use super::handle::{Context, DmaBuffer, DmaTransfer, Sdio};
use super::hal::{Command, Response, SdmmcPort, Timer};
use super::registers::{DataControl, DataPathConfig, Status};
use super::Deadline;

/// One CMD53 worth of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Phase {
    pub block_mode: BlockMode,
    /// Blocks in block mode, bytes in byte mode
    pub count: u32,
    /// Bytes moved by this phase
    pub len: usize,
}

/// Whole blocks in `size`, 0 when `block_size` is not a power of two
pub(super) fn compute_nbr_of_blocks(size: usize, block_size: u32) -> usize {
    if !block_size.is_power_of_two() {
        return 0;
    }
    size >> block_size.trailing_zeros()
}

pub(super) fn plan_phase(remaining: usize, block_size: u32, mode: BlockMode) -> Phase {
    if mode == BlockMode::Block {
        let blocks = compute_nbr_of_blocks(remaining, block_size).min(BLOCK_MODE_MAX_BLOCKS);
        if blocks > 0 {
            return Phase {
                block_mode: BlockMode::Block,
                count: blocks as u32,
                len: blocks * block_size as usize,
            };
        }
    }
    let len = remaining.min(BYTE_MODE_WINDOW);
    Phase {
        block_mode: BlockMode::Byte,
        count: len as u32,
        len,
    }
}

/// Register address the phase after a `len` byte phase starts at
fn next_address(cmd: &ExtendedCmd, len: usize) -> u32 {
    match cmd.op_code {
        OpCode::Increment => cmd.address.wrapping_add(len as u32) & 0x1_FFFF,
        OpCode::Fixed => cmd.address,
    }
}

/// Caller memory of a polling transfer
pub(super) enum PollBuffer<'a> {
    Rx(&'a mut [u8]),
    Tx(&'a [u8]),
}

impl PollBuffer<'_> {
    fn len(&self) -> usize {
        match self {
            PollBuffer::Rx(buf) => buf.len(),
            PollBuffer::Tx(buf) => buf.len(),
        }
    }

    fn direction(&self) -> Direction {
        match self {
            PollBuffer::Rx(_) => Direction::Read,
            PollBuffer::Tx(_) => Direction::Write,
        }
    }
}

fn data_it(dir: Direction) -> Status {
    let overrun = match dir {
        Direction::Read => Status::RXOVERR,
        Direction::Write => Status::TXUNDERR,
    };
    Status::DCRCFAIL | Status::DTIMEOUT | Status::DATAEND | overrun
}

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    pub fn read_extended(
        &mut self,
        cmd: &ExtendedCmd,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> SdioResult {
        self.run(Context::Polling(Direction::Read), |sdio| {
            sdio.transfer_polling(cmd, PollBuffer::Rx(buf), timeout_ms)
        })
    }

    pub fn write_extended(&mut self, cmd: &ExtendedCmd, buf: &[u8], timeout_ms: u32) -> SdioResult {
        self.run(Context::Polling(Direction::Write), |sdio| {
            sdio.transfer_polling(cmd, PollBuffer::Tx(buf), timeout_ms)
        })
    }

    /// Start a DMA read, `SdioCallbacks::transfer_complete` hands the
    /// buffer back once every phase landed
    pub fn read_extended_dma(&mut self, cmd: &ExtendedCmd, buf: &'static mut [u8]) -> SdioResult {
        self.start_dma(cmd, DmaBuffer::Rx(buf))
    }

    pub fn write_extended_dma(&mut self, cmd: &ExtendedCmd, buf: &'static [u8]) -> SdioResult {
        self.start_dma(cmd, DmaBuffer::Tx(buf))
    }

    fn validate(&self, cmd: &ExtendedCmd, len: usize) -> SdioResult {
        if len == 0 {
            return Err(SdioError::InvalidParam);
        }
        if cmd.block_mode == BlockMode::Block && compute_nbr_of_blocks(len, self.block_size) == 0 {
            // no block size programmed or the buffer is smaller than one block
            return Err(SdioError::InvalidParam);
        }
        Ok(())
    }

    pub(super) fn transfer_polling(
        &mut self,
        cmd: &ExtendedCmd,
        mut buf: PollBuffer<'_>,
        timeout_ms: u32,
    ) -> SdioResult {
        self.validate(cmd, buf.len())?;
        let dir = buf.direction();
        let deadline = Deadline::after(&self.timer, timeout_ms);
        let mut phase_cmd = *cmd;
        let mut offset = 0;
        while offset < buf.len() {
            let phase = plan_phase(buf.len() - offset, self.block_size, cmd.block_mode);
            debug!(
                "sdio{}: {:?} phase at {:#x}, {} bytes",
                self.instance, dir, phase_cmd.address, phase.len
            );
            self.arm_data_path(dir, phase);
            self.issue_extended(dir, &phase_cmd, phase)?;
            self.pump_fifo(&mut buf, offset, phase.len, deadline)?;
            offset += phase.len;
            phase_cmd.address = next_address(&phase_cmd, phase.len);
        }
        Ok(())
    }

    /// Keep SDIOEN, drop everything else of DCTRL
    pub(super) fn reset_data_path(&mut self) {
        let sdioen = self.port.data_control().sdioen();
        self.port.set_data_control(DataControl::new().with_sdioen(sdioen));
    }

    fn arm_data_path(&mut self, dir: Direction, phase: Phase) {
        self.reset_data_path();
        let (dtmode, dblocksize) = match phase.block_mode {
            BlockMode::Block => (DataControl::MODE_BLOCK, self.block_size.trailing_zeros() as u8),
            BlockMode::Byte => (DataControl::MODE_SDIO, 0),
        };
        let control = self
            .port
            .data_control()
            .with_dtdir(dir == Direction::Read)
            .with_dtmode(dtmode)
            .with_dblocksize(dblocksize);
        self.port.config_data(DataPathConfig {
            timeout_cycles: self.data_timeout,
            length: phase.len as u32,
            control,
        });
        self.port.set_cmd_trans(true);
    }

    fn issue_extended(&mut self, dir: Direction, cmd: &ExtendedCmd, phase: Phase) -> SdioResult {
        let arg = extended_arg(
            dir,
            &ExtendedCmd {
                block_mode: phase.block_mode,
                ..*cmd
            },
            phase.count,
        );
        let result = self
            .send_command(Command::new(CMD_IO_RW_EXTENDED, arg, Response::Short))
            .and_then(|resp| check_r5(resp).map_err(|codes| self.record(codes)));
        if result.is_err() {
            self.port.set_cmd_trans(false);
            self.port.clear_flags(Status::STATIC);
        }
        result.map(|_| ())
    }

    /// Move `len` bytes starting at `start` through the FIFO
    fn pump_fifo(
        &mut self,
        buf: &mut PollBuffer<'_>,
        start: usize,
        len: usize,
        deadline: Deadline,
    ) -> SdioResult {
        let dir = buf.direction();
        let (burst_ready, word_blocked) = match dir {
            Direction::Read => (Status::RXFIFOHF, Status::RXFIFOE),
            Direction::Write => (Status::TXFIFOHE, Status::TXFIFOF),
        };
        let end = start + len;
        let mut pos = start;
        while !self.port.is_active(data_it(dir)) {
            let status = self.port.status();
            let left = end - pos;
            if left >= FIFO_BURST_BYTES {
                if status.contains(burst_ready) {
                    self.fifo_burst(buf, pos);
                    pos += FIFO_BURST_BYTES;
                }
            } else if left > 0 && !status.contains(word_blocked) {
                pos += self.fifo_word(buf, pos, left);
            }
            if deadline.expired(&self.timer) {
                self.port.set_cmd_trans(false);
                self.port.clear_flags(Status::STATIC);
                error!("sdio{}: {:?} timed out with {} bytes left", self.instance, dir, end - pos);
                self.error_codes |= ErrorCodes::TIMEOUT;
                return Err(SdioError::Timeout);
            }
        }
        self.port.set_cmd_trans(false);

        let status = self.port.status();
        let codes = if status.contains(Status::DTIMEOUT) {
            ErrorCodes::DATA_TIMEOUT
        } else if status.contains(Status::DCRCFAIL) {
            ErrorCodes::DATA_CRC_FAIL
        } else if status.contains(Status::RXOVERR) {
            ErrorCodes::RX_OVERRUN
        } else if status.contains(Status::TXUNDERR) {
            ErrorCodes::TX_UNDERRUN
        } else {
            self.port.clear_flags(Status::STATIC_DATA);
            return Ok(());
        };
        self.port.clear_flags(Status::STATIC);
        error!("sdio{}: {:?} failed: {:?}", self.instance, dir, codes);
        Err(self.record(codes))
    }

    fn fifo_burst(&mut self, buf: &mut PollBuffer<'_>, pos: usize) {
        let mut words = [0u32; FIFO_BURST_BYTES / 4];
        match buf {
            PollBuffer::Rx(data) => {
                for word in words.iter_mut() {
                    *word = self.port.read_fifo().to_le();
                }
                data[pos..pos + FIFO_BURST_BYTES].copy_from_slice(words.as_byte_slice());
            }
            PollBuffer::Tx(data) => {
                words
                    .as_mut_byte_slice()
                    .copy_from_slice(&data[pos..pos + FIFO_BURST_BYTES]);
                for word in words {
                    self.port.write_fifo(u32::from_le(word));
                }
            }
        }
    }

    /// One FIFO word, the last one of a transfer may be partly used
    fn fifo_word(&mut self, buf: &mut PollBuffer<'_>, pos: usize, left: usize) -> usize {
        let n = left.min(4);
        match buf {
            PollBuffer::Rx(data) => {
                let word = self.port.read_fifo().to_le_bytes();
                data[pos..pos + n].copy_from_slice(&word[..n]);
            }
            PollBuffer::Tx(data) => {
                let mut word = [0u8; 4];
                word[..n].copy_from_slice(&data[pos..pos + n]);
                self.port.write_fifo(u32::from_le_bytes(word));
            }
        }
        n
    }

    fn start_dma(&mut self, cmd: &ExtendedCmd, buffer: DmaBuffer) -> SdioResult {
        self.activate(Context::None)?;
        if let Err(err) = self.validate(cmd, buffer.len()) {
            self.release();
            return Err(err);
        }
        let phase = plan_phase(buffer.len(), self.block_size, cmd.block_mode);
        let mut xfer = DmaTransfer {
            buffer,
            cmd: *cmd,
            offset: 0,
            phase,
            phases: 0,
        };
        match self.arm_dma_phase(&mut xfer) {
            Ok(()) => {
                self.context = Context::Dma(xfer);
                Ok(())
            }
            Err(err) => {
                self.release();
                Err(err)
            }
        }
    }

    /// Point the DMA at the next uncovered part of `xfer` and issue its
    /// command
    pub(super) fn arm_dma_phase(&mut self, xfer: &mut DmaTransfer) -> SdioResult {
        let dir = xfer.direction();
        let phase = plan_phase(xfer.remaining(), self.block_size, xfer.cmd.block_mode);
        debug!(
            "sdio{}: dma phase {} at {:#x}, {} bytes",
            self.instance,
            xfer.phases + 1,
            xfer.cmd.address,
            phase.len
        );
        self.port.idma_start(xfer.buffer.address_of(xfer.offset));
        self.arm_data_path(dir, phase);
        if let Err(err) = self.issue_extended(dir, &xfer.cmd, phase) {
            self.port.idma_stop();
            return Err(err);
        }
        xfer.phase = phase;
        xfer.phases += 1;
        xfer.offset += phase.len;
        xfer.cmd.address = next_address(&xfer.cmd, phase.len);
        self.port.enable_interrupts(data_it(dir));
        Ok(())
    }
}
