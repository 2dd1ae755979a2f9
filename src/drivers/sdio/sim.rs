//! Simulated controller, card and delay block for host tests

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::cell::Cell;
use core::mem;

use spin::Mutex;

use crate::consts::sdio::{
    CARD_RESET_DATA, CCCR_INT_PENDING, CCCR_IO_ABORT, CCCR_IO_ENABLE, CCCR_IO_READY, CCCR_REVISION,
    CMD_GO_IDLE_STATE, CMD_IO_RW_DIRECT, CMD_IO_RW_EXTENDED, CMD_IO_SEND_OP_COND,
    CMD_SEL_DESEL_CARD, CMD_SEND_REL_ADDR, CMD_VOLTAGE_SWITCH, FBR_SIZE, OCR_S18R,
};

use super::cmd::{DirectArg, ExtendedArg, Function, R4};
use super::config::Config;
use super::dlyb::{DelayBlock, DelayConfig, DelayControl};
use super::error::ErrorCodes;
use super::handle::Sdio;
use super::hal::{Command, CommandPath, DataPath, FlagControl, Idma, KernelClock, Response, Timer};
use super::registers::{ClockControl, DataControl, DataPathConfig, Status};

pub const KERNEL_HZ: u32 = 200_000_000;

/// Address space of one function
const SPACE: usize = 0x2_0000;
const R5_STATE_CMD: u32 = 1 << 12;
const R5_FUNCTION_NUMBER: u32 = 1 << 9;
const R6_ILLEGAL_CMD: u32 = 1 << 14;

/// Millisecond counter that moves on every read
pub struct MockTimer {
    now: Cell<u32>,
}

impl MockTimer {
    pub fn new() -> Self {
        Self { now: Cell::new(0) }
    }
}

impl Timer for MockTimer {
    fn now_ms(&self) -> u32 {
        let now = self.now.get();
        self.now.set(now.wrapping_add(1));
        now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.now.set(self.now.get().wrapping_add(ms));
    }
}

/// Misbehaviour of the data phase
#[derive(Debug, Clone, Copy)]
pub enum Stall {
    /// The card never moves any data
    NoData,
    /// The controller reports these flags instead of moving data
    Raise(Status),
}

pub struct SimCard {
    pub present: bool,
    pub functions: u8,
    pub accepts_1v8: bool,
    pub rca: u16,
    /// CMD3 attempts answered with illegal command
    pub rca_illegal_for: u32,
    rca_attempts: u32,
    pub f0: Vec<u8>,
    io: Vec<Vec<u8>>,
    pub pending: u8,
    pub pending_reads: u32,
    /// Functions that never report ready
    pub never_ready: u8,
    pub resets: u32,
    pub aborts: Vec<u8>,
    /// Bytes written to fixed address registers, in arrival order
    pub fixed_stream: Vec<u8>,
    pub stall: Option<Stall>,
}

impl SimCard {
    fn new() -> Self {
        let mut f0 = vec![0u8; SPACE];
        f0[0x00] = 0x43;
        f0[0x01] = 0x03;
        f0[0x08] = 0x17;
        f0[0x09..0x0C].copy_from_slice(&[0x00, 0x10, 0x00]);
        for n in 1..=7u32 {
            let base = (n * FBR_SIZE) as usize;
            let cis = n * 0x1000;
            f0[base] = 0x07;
            f0[base + 0x09..base + 0x0C].copy_from_slice(&cis.to_le_bytes()[..3]);
        }
        Self {
            present: true,
            functions: 7,
            accepts_1v8: false,
            rca: 0xB368,
            rca_illegal_for: 0,
            rca_attempts: 0,
            f0,
            io: vec![vec![0u8; SPACE]; 7],
            pending: 0,
            pending_reads: 0,
            never_ready: 0,
            resets: 0,
            aborts: Vec::new(),
            fixed_stream: Vec::new(),
            stall: None,
        }
    }

    fn space(&self, function: u8) -> &[u8] {
        match function {
            0 => &self.f0,
            f => &self.io[f as usize - 1],
        }
    }

    fn space_mut(&mut self, function: u8) -> &mut [u8] {
        match function {
            0 => &mut self.f0,
            f => &mut self.io[f as usize - 1],
        }
    }

    pub fn function_reg(&self, function: Function, address: u32) -> u8 {
        self.space(function.index())[address as usize]
    }

    pub fn function_range(&self, function: Function, address: u32, len: usize) -> &[u8] {
        let start = address as usize;
        &self.space(function.index())[start..start + len]
    }

    pub fn load(&mut self, function: Function, address: u32, data: &[u8]) {
        let start = address as usize;
        self.space_mut(function.index())[start..start + data.len()].copy_from_slice(data);
    }

    fn read_reg(&mut self, function: u8, address: usize) -> u8 {
        if function == 0 && address == CCCR_INT_PENDING as usize {
            self.pending_reads += 1;
            return self.pending;
        }
        self.space(function)[address]
    }

    fn write_reg(&mut self, function: u8, address: usize, value: u8) {
        if function != 0 {
            self.io[function as usize - 1][address] = value;
            return;
        }
        match address as u32 {
            CCCR_IO_ENABLE => {
                self.f0[address] = value;
                self.f0[CCCR_IO_READY as usize] = value & !self.never_ready;
            }
            CCCR_IO_ABORT => {
                if value & CARD_RESET_DATA != 0 {
                    self.resets += 1;
                } else {
                    self.aborts.push(value & 0x07);
                }
            }
            CCCR_REVISION | CCCR_IO_READY | CCCR_INT_PENDING => {}
            _ => self.f0[address] = value,
        }
    }

    fn direct(&mut self, arg: DirectArg) -> u32 {
        let function = arg.function();
        if function > self.functions {
            return R5_STATE_CMD | R5_FUNCTION_NUMBER;
        }
        let address = arg.address() as usize;
        if arg.write() {
            self.write_reg(function, address, arg.data());
        }
        R5_STATE_CMD | self.read_reg(function, address) as u32
    }

    fn read_bytes(&mut self, function: u8, address: u32, fixed: bool, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let offset = if fixed { 0 } else { i };
                self.read_reg(function, (address as usize + offset) % SPACE)
            })
            .collect()
    }

    fn write_bytes(&mut self, function: u8, address: u32, fixed: bool, data: &[u8]) {
        if fixed {
            self.fixed_stream.extend_from_slice(data);
        }
        for (i, byte) in data.iter().enumerate() {
            let offset = if fixed { 0 } else { i };
            self.write_reg(function, (address as usize + offset) % SPACE, *byte);
        }
    }
}

pub struct SimPort {
    pub card: SimCard,
    pub kernel_hz: u32,
    pub powered: bool,
    pub commands: Vec<Command>,
    /// Functions whose interrupt callback ran
    pub io_log: Vec<u8>,
    pub interrupt_mask: Status,
    pub idma_base: Option<usize>,
    flags: Status,
    clkcr: ClockControl,
    dctrl: DataControl,
    data: Option<DataPathConfig>,
    cmd_trans: bool,
    rx: VecDeque<u8>,
    rx_active: bool,
    tx: Vec<u8>,
    tx_expected: usize,
    tx_target: Option<(u8, u32, bool)>,
}

impl SimPort {
    pub fn new() -> Self {
        Self {
            card: SimCard::new(),
            kernel_hz: KERNEL_HZ,
            powered: false,
            commands: Vec::new(),
            io_log: Vec::new(),
            interrupt_mask: Status::empty(),
            idma_base: None,
            flags: Status::empty(),
            clkcr: ClockControl::new(),
            dctrl: DataControl::new(),
            data: None,
            cmd_trans: false,
            rx: VecDeque::new(),
            rx_active: false,
            tx: Vec::new(),
            tx_expected: 0,
            tx_target: None,
        }
    }

    /// Set controller flags as if the hardware raised them
    pub fn raise(&mut self, flags: Status) {
        self.flags |= flags;
    }

    fn extended(&mut self, arg: ExtendedArg) -> Result<u32, ErrorCodes> {
        let function = arg.function();
        if function > self.card.functions {
            return Ok(R5_STATE_CMD | R5_FUNCTION_NUMBER);
        }
        let data = self.data.unwrap_or(DataPathConfig {
            timeout_cycles: 0,
            length: 0,
            control: DataControl::new(),
        });
        let len = data.length as usize;
        let count = arg.count() as usize;
        let expected = if arg.block_mode() {
            count << data.control.dblocksize()
        } else if count == 0 {
            512
        } else {
            count
        };
        assert_eq!(expected, len, "CMD53 count disagrees with the data length");
        assert!(self.cmd_trans, "CMD53 issued without CMDTRANS");

        match self.card.stall {
            Some(Stall::NoData) => return Ok(R5_STATE_CMD),
            Some(Stall::Raise(flags)) => {
                self.flags |= flags;
                return Ok(R5_STATE_CMD);
            }
            None => {}
        }

        let fixed = !arg.increment();
        let address = arg.address();
        if arg.write() {
            match self.idma_base {
                Some(base) => {
                    // SAFETY: the driver points the DMA at a live buffer of at least `len` bytes
                    let bytes =
                        unsafe { core::slice::from_raw_parts(base as *const u8, len) }.to_vec();
                    self.card.write_bytes(function, address, fixed, &bytes);
                    self.flags |= Status::DATAEND;
                }
                None => {
                    self.tx.clear();
                    self.tx_expected = len;
                    self.tx_target = Some((function, address, fixed));
                }
            }
        } else {
            let bytes = self.card.read_bytes(function, address, fixed, len);
            match self.idma_base {
                Some(base) => {
                    // SAFETY: as above, the buffer is writable for `len` bytes
                    unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), base as *mut u8, len) };
                    self.flags |= Status::DATAEND;
                }
                None => {
                    self.rx.extend(bytes);
                    self.rx_active = true;
                }
            }
        }
        Ok(R5_STATE_CMD)
    }
}

impl KernelClock for SimPort {
    fn kernel_clock_hz(&self) -> u32 {
        self.kernel_hz
    }
}

impl CommandPath for SimPort {
    fn send_command(&mut self, cmd: Command) -> Result<u32, ErrorCodes> {
        self.commands.push(cmd);
        if !self.powered {
            return Err(ErrorCodes::CMD_RSP_TIMEOUT);
        }
        if cmd.response == Response::None {
            if cmd.index == CMD_GO_IDLE_STATE {
                self.card.rca_attempts = 0;
            }
            return Ok(0);
        }
        if !self.card.present {
            return Err(ErrorCodes::CMD_RSP_TIMEOUT);
        }
        match cmd.index {
            CMD_IO_SEND_OP_COND => {
                let r4 = R4::new()
                    .with_ready(true)
                    .with_functions(self.card.functions)
                    .with_ocr(0xFF_8000)
                    .with_s18a(cmd.arg & OCR_S18R != 0 && self.card.accepts_1v8);
                Ok(r4.into())
            }
            CMD_VOLTAGE_SWITCH => Ok(0),
            CMD_SEND_REL_ADDR => {
                self.card.rca_attempts += 1;
                if self.card.rca_attempts <= self.card.rca_illegal_for {
                    Ok(R6_ILLEGAL_CMD)
                } else {
                    Ok((self.card.rca as u32) << 16)
                }
            }
            CMD_SEL_DESEL_CARD if cmd.arg >> 16 == self.card.rca as u32 => Ok(0x0700),
            CMD_SEL_DESEL_CARD => Err(ErrorCodes::CMD_RSP_TIMEOUT),
            CMD_IO_RW_DIRECT => Ok(self.card.direct(DirectArg::from(cmd.arg))),
            CMD_IO_RW_EXTENDED => self.extended(ExtendedArg::from(cmd.arg)),
            _ => Err(ErrorCodes::CMD_CRC_FAIL),
        }
    }
}

impl DataPath for SimPort {
    fn power_on(&mut self) {
        self.powered = true;
    }

    fn power_off(&mut self) {
        self.powered = false;
    }

    fn clock_control(&self) -> ClockControl {
        self.clkcr
    }

    fn set_clock_control(&mut self, clkcr: ClockControl) {
        self.clkcr = clkcr;
    }

    fn data_control(&self) -> DataControl {
        self.dctrl
    }

    fn set_data_control(&mut self, dctrl: DataControl) {
        self.dctrl = dctrl;
    }

    fn config_data(&mut self, cfg: DataPathConfig) {
        self.dctrl = cfg.control;
        self.data = Some(cfg);
    }

    fn set_cmd_trans(&mut self, enable: bool) {
        self.cmd_trans = enable;
    }

    fn read_fifo(&mut self) -> u32 {
        let mut word = [0u8; 4];
        for byte in word.iter_mut() {
            *byte = self.rx.pop_front().unwrap_or(0);
        }
        if self.rx_active && self.rx.is_empty() {
            self.rx_active = false;
            self.flags |= Status::DATAEND;
        }
        u32::from_le_bytes(word)
    }

    fn write_fifo(&mut self, word: u32) {
        let Some((function, address, fixed)) = self.tx_target else {
            return;
        };
        let take = (self.tx_expected - self.tx.len()).min(4);
        self.tx.extend_from_slice(&word.to_le_bytes()[..take]);
        if self.tx.len() == self.tx_expected {
            let bytes = mem::take(&mut self.tx);
            self.card.write_bytes(function, address, fixed, &bytes);
            self.tx_target = None;
            self.flags |= Status::DATAEND;
        }
    }
}

impl FlagControl for SimPort {
    fn status(&self) -> Status {
        let mut status = self.flags;
        if self.rx.len() >= 32 {
            status |= Status::RXFIFOHF;
        }
        if self.rx.is_empty() {
            status |= Status::RXFIFOE;
        }
        if self.tx_target.is_some() {
            status |= Status::TXFIFOHE;
        }
        status
    }

    fn clear_flags(&mut self, flags: Status) {
        self.flags.remove(flags);
    }

    fn enable_interrupts(&mut self, flags: Status) {
        self.interrupt_mask.insert(flags);
    }

    fn disable_interrupts(&mut self, flags: Status) {
        self.interrupt_mask.remove(flags);
    }
}

impl Idma for SimPort {
    fn idma_start(&mut self, base: usize) {
        self.idma_base = Some(base);
    }

    fn idma_stop(&mut self) {
        self.idma_base = None;
        if let Some(data) = self.data.as_mut() {
            data.length = 0;
        }
    }
}

/// A handle that went through identification with the default settings
pub fn idle_handle() -> Sdio<SimPort, MockTimer> {
    let mut sdio = Sdio::init(0, SimPort::new(), MockTimer::new());
    sdio.set_config(&Config::default(), None).unwrap();
    sdio
}

#[derive(Debug, Clone, Copy)]
pub struct DlybRegs {
    pub cr: DelayControl,
    pub cfgr: DelayConfig,
}

/// Delay line that spans one clock period from `lock_unit` on
#[derive(Clone)]
pub struct SimDlyb {
    regs: Arc<Mutex<DlybRegs>>,
    lock_unit: Option<u8>,
}

impl SimDlyb {
    pub fn new(lock_unit: u8) -> Self {
        Self {
            regs: Arc::new(Mutex::new(DlybRegs {
                cr: DelayControl::empty(),
                cfgr: DelayConfig::new(),
            })),
            lock_unit: Some(lock_unit),
        }
    }

    /// A line whose length flag never comes up
    pub fn stuck() -> Self {
        Self {
            lock_unit: None,
            ..Self::new(0)
        }
    }

    pub fn regs(&self) -> DlybRegs {
        *self.regs.lock()
    }

    pub fn set_tuning(&self, unit: u8, sel: u8) {
        let mut regs = self.regs.lock();
        regs.cfgr = regs.cfgr.with_unit(unit).with_sel(sel);
    }
}

impl DelayBlock for SimDlyb {
    fn control(&self) -> DelayControl {
        self.regs.lock().cr
    }

    fn set_control(&mut self, cr: DelayControl) {
        self.regs.lock().cr = cr;
    }

    fn config(&self) -> DelayConfig {
        self.regs.lock().cfgr
    }

    fn set_config(&mut self, cfgr: DelayConfig) {
        let mut regs = self.regs.lock();
        let mut cfgr = cfgr.with_lng(0).with_lngf(false);
        if let (true, Some(lock)) = (regs.cr.contains(DelayControl::SEN), self.lock_unit) {
            let lng = if cfgr.unit() >= lock { 0x0FE } else { 0 };
            cfgr = cfgr.with_lng(lng).with_lngf(true);
        }
        regs.cfgr = cfgr;
    }
}
