//! Copyright (c) 2023 MankorOS EastonMan
//!
//! The SDIO handle and its state machine
//!

use alloc::boxed::Box;
use log::{debug, warn};

use crate::consts::sdio::{DATA_MAX_TIMEOUT, MAX_IO_NUMBER};

use super::cmd::{Direction, ExtendedCmd, Function};
use super::config::{Config, Transceiver};
use super::dlyb::DelayBlock;
use super::error::{ErrorCodes, SdioError, SdioResult};
use super::extended::Phase;
use super::hal::{Command, SdmmcPort, Timer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not initialized or de-initialized
    Reset,
    /// Bound to an instance, no configuration applied yet
    Init,
    /// Configured and ready for an operation
    Idle,
    /// An operation is in progress
    Active,
    /// Identification failed or the card was pulled
    CardRemoved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferEvent {
    TxComplete = 1,
    RxComplete = 2,
}

/// Memory handed to the internal DMA for the whole transfer
#[derive(Debug)]
pub enum DmaBuffer {
    Rx(&'static mut [u8]),
    Tx(&'static [u8]),
}

impl DmaBuffer {
    pub fn len(&self) -> usize {
        match self {
            DmaBuffer::Rx(buf) => buf.len(),
            DmaBuffer::Tx(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn direction(&self) -> Direction {
        match self {
            DmaBuffer::Rx(_) => Direction::Read,
            DmaBuffer::Tx(_) => Direction::Write,
        }
    }

    /// Bus address of byte `offset`
    pub(super) fn address_of(&self, offset: usize) -> usize {
        let base = match self {
            DmaBuffer::Rx(buf) => buf.as_ptr() as usize,
            DmaBuffer::Tx(buf) => buf.as_ptr() as usize,
        };
        base + offset
    }
}

/// A DMA transfer that may span several CMD53 phases
#[derive(Debug)]
pub struct DmaTransfer {
    pub(super) buffer: DmaBuffer,
    /// Caller's descriptor, `address` tracks the register of the next phase
    pub(super) cmd: ExtendedCmd,
    /// Bytes covered by the phases issued so far
    pub(super) offset: usize,
    pub(super) phase: Phase,
    pub(super) phases: u32,
}

impl DmaTransfer {
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.offset
    }

    pub fn phases(&self) -> u32 {
        self.phases
    }

    pub fn direction(&self) -> Direction {
        self.buffer.direction()
    }

    pub fn next_reg_addr(&self) -> u32 {
        self.cmd.address
    }
}

/// What the handle is doing while `Active`
#[derive(Debug, Default)]
pub enum Context {
    #[default]
    None,
    Direct,
    Polling(Direction),
    Dma(DmaTransfer),
}

impl Context {
    pub fn is_none(&self) -> bool {
        matches!(self, Context::None)
    }
}

/// Completion events of the handle
///
/// Every method defaults to doing nothing, override the ones of interest
/// and install the object with [`Sdio::register_callbacks`].
pub trait SdioCallbacks {
    /// A DMA transfer finished, the buffer is handed back
    fn transfer_complete(&mut self, event: XferEvent, buffer: DmaBuffer) {
        let _ = (event, buffer);
    }

    /// A transfer driven by the interrupt handler failed
    fn error(&mut self, codes: ErrorCodes, buffer: Option<DmaBuffer>) {
        let _ = (codes, buffer);
    }

    /// Switch the external level shifter to 1.8V signalling
    fn drive_transceiver_1v8(&mut self, enable: bool) {
        let _ = enable;
    }
}

pub struct NoCallbacks;

impl SdioCallbacks for NoCallbacks {}

/// Card interrupt handler of one IO function
pub type IoCallback<P, T> = fn(&mut Sdio<P, T>, Function);

/// Replacement for the built-in card identification
pub type IdentifyFn<P, T> = fn(&mut Sdio<P, T>) -> SdioResult;

pub struct Sdio<P: SdmmcPort, T: Timer> {
    pub(super) port: P,
    pub(super) timer: T,
    pub(super) instance: usize,
    pub(super) state: State,
    pub(super) context: Context,
    pub(super) config: Config,
    pub(super) block_size: u32,
    pub(super) data_timeout: u32,
    pub(super) transceiver: Transceiver,
    pub(super) error_codes: ErrorCodes,
    pub(super) io_callbacks: [Option<IoCallback<P, T>>; MAX_IO_NUMBER],
    /// Functions with their card interrupt enabled
    pub(super) io_interrupt_nbr: u8,
    pub(super) io_function_enabled_mask: u8,
    pub(super) callbacks: Box<dyn SdioCallbacks + Send>,
    pub(super) identify: Option<IdentifyFn<P, T>>,
    pub(super) delay_block: Option<Box<dyn DelayBlock + Send>>,
}

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    /// Bind a controller instance, the handle starts in `Init`
    pub fn init(instance: usize, port: P, timer: T) -> Self {
        debug!("sdio{}: init", instance);
        Self {
            port,
            timer,
            instance,
            state: State::Init,
            context: Context::None,
            config: Config::default(),
            block_size: 0,
            data_timeout: DATA_MAX_TIMEOUT,
            transceiver: Transceiver::Absent,
            error_codes: ErrorCodes::empty(),
            io_callbacks: [None; MAX_IO_NUMBER],
            io_interrupt_nbr: 0,
            io_function_enabled_mask: 0,
            callbacks: Box::new(NoCallbacks),
            identify: None,
            delay_block: None,
        }
    }

    /// Power the bus off and go back to `Reset`, safe to call repeatedly
    pub fn deinit(&mut self) {
        self.port.power_off();
        self.context = Context::None;
        self.state = State::Reset;
    }

    pub fn instance(&self) -> usize {
        self.instance
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Codes observed by the last public operation
    pub fn last_error_codes(&self) -> ErrorCodes {
        self.error_codes
    }

    /// Bytes of the DMA transfer in flight not yet covered by a phase
    pub fn remaining_data(&self) -> usize {
        match &self.context {
            Context::Dma(xfer) => xfer.remaining(),
            _ => 0,
        }
    }

    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn register_callbacks(&mut self, callbacks: Box<dyn SdioCallbacks + Send>) {
        self.callbacks = callbacks;
    }

    pub fn register_io_callback(
        &mut self,
        function: Function,
        callback: IoCallback<P, T>,
    ) -> SdioResult {
        let slot = Self::io_slot(function)?;
        self.io_callbacks[slot] = Some(callback);
        Ok(())
    }

    pub fn unregister_io_callback(&mut self, function: Function) -> SdioResult {
        let slot = Self::io_slot(function)?;
        self.io_callbacks[slot] = None;
        Ok(())
    }

    pub fn attach_delay_block(&mut self, dlyb: Box<dyn DelayBlock + Send>) {
        self.delay_block = Some(dlyb);
    }

    pub(super) fn io_slot(function: Function) -> SdioResult<usize> {
        match function {
            Function::F0 => Err(SdioError::InvalidParam),
            f => Ok(f.index() as usize - 1),
        }
    }

    /// Fails unless the handle is in one of `allowed`, then starts a fresh
    /// error record
    pub(super) fn enter(&mut self, allowed: &[State]) -> SdioResult {
        if !allowed.contains(&self.state) {
            warn!("sdio{}: rejected in state {:?}", self.instance, self.state);
            return Err(SdioError::BadState(self.state));
        }
        self.error_codes = ErrorCodes::empty();
        Ok(())
    }

    /// Idle -> Active
    pub(super) fn activate(&mut self, context: Context) -> SdioResult {
        self.enter(&[State::Idle])?;
        self.state = State::Active;
        self.context = context;
        Ok(())
    }

    /// Run `op` as one Idle -> Active -> Idle operation
    pub(super) fn run<R>(
        &mut self,
        context: Context,
        op: impl FnOnce(&mut Self) -> SdioResult<R>,
    ) -> SdioResult<R> {
        self.activate(context)?;
        let result = op(self);
        self.release();
        result
    }

    /// Back to Idle with nothing outstanding
    pub(super) fn release(&mut self) {
        self.context = Context::None;
        self.state = State::Idle;
    }

    pub(super) fn record(&mut self, codes: ErrorCodes) -> SdioError {
        self.error_codes |= codes;
        SdioError::Transfer(codes)
    }

    /// Issue one command, recording any command path failure.
    ///
    /// Meant for identification hooks, regular traffic goes through the
    /// direct and extended transfer calls.
    pub fn send_command(&mut self, cmd: Command) -> SdioResult<u32> {
        debug!("sdio{}: CMD{} arg {:#010x}", self.instance, cmd.index, cmd.arg);
        self.port.send_command(cmd).map_err(|codes| self.record(codes))
    }
}

#[cfg(test)]
mod tests {
    use super::super::sim::{MockTimer, SimPort};
    use super::*;

    #[test]
    fn deinit_is_idempotent() {
        let mut sdio = Sdio::init(0, SimPort::new(), MockTimer::new());
        sdio.deinit();
        sdio.deinit();
        assert_eq!(sdio.state(), State::Reset);
        assert!(sdio.context().is_none());
        assert!(!sdio.port().powered);
    }

    #[test]
    fn function_zero_has_no_callback_slot() {
        fn noop(_: &mut Sdio<SimPort, MockTimer>, _: Function) {}
        let mut sdio = Sdio::init(0, SimPort::new(), MockTimer::new());
        assert_eq!(sdio.register_io_callback(Function::F0, noop), Err(SdioError::InvalidParam));
        assert_eq!(sdio.register_io_callback(Function::F7, noop), Ok(()));
        assert!(sdio.io_callbacks[6].is_some());
    }

    #[test]
    fn operations_need_idle() {
        let mut sdio = Sdio::init(0, SimPort::new(), MockTimer::new());
        assert_eq!(sdio.activate(Context::Direct), Err(SdioError::BadState(State::Init)));
        assert_eq!(sdio.state(), State::Init);
    }
}
