//! Bus configuration of the handle
//!
//! Host side settings live in CLKCR, the card mirrors bus width and speed
//! mode in its CCCR. Both sides are always written together.

use core::mem;

use log::{info, warn};

use crate::consts::sdio::{
    CARD_RESET_DATA, CCCR_BUS_IF_CONTROL, CCCR_BUS_SPEED_SELECT, CCCR_IO_ABORT,
    CMD_TIMEOUT_MS, DATA_MAX_TIMEOUT, FBR_BLOCK_SIZE_OFFSET, INIT_FREQ_HZ,
};

use super::cmd::{BlockMode, DirectCmd, Direction, ExtendedCmd, Function, OpCode};
use super::error::{ErrorCodes, SdioError, SdioResult};
use super::handle::{Context, IdentifyFn, Sdio, State};
use super::hal::{SdmmcPort, Timer};
use super::registers::{ClockControl, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusWidth {
    #[default]
    One,
    Four,
    Eight,
}

impl BusWidth {
    fn widbus(self) -> u8 {
        match self {
            BusWidth::One => 0,
            BusWidth::Four => 1,
            BusWidth::Eight => 2,
        }
    }

    fn from_widbus(widbus: u8) -> BusWidth {
        match widbus {
            1 => BusWidth::Four,
            2 => BusWidth::Eight,
            _ => BusWidth::One,
        }
    }

    /// Bus width field of the CCCR bus interface control register
    fn cccr_value(self) -> u8 {
        match self {
            BusWidth::One => 0,
            BusWidth::Four => 2,
            BusWidth::Eight => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockEdge {
    #[default]
    Rising,
    Falling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    pub edge: ClockEdge,
    /// Stop the bus clock while the bus is idle
    pub power_save: bool,
    pub freq_hz: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            edge: ClockEdge::Rising,
            power_save: false,
            freq_hz: INIT_FREQ_HZ,
        }
    }
}

/// External 1.8V level shifter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transceiver {
    #[default]
    Absent,
    Present,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub clock: ClockConfig,
    pub bus_width: BusWidth,
    pub hw_flow_control: bool,
    pub transceiver: Transceiver,
    /// Data path timeout in bus clock cycles
    pub data_timeout_cycles: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            bus_width: BusWidth::One,
            hw_flow_control: false,
            transceiver: Transceiver::Absent,
            data_timeout_cycles: DATA_MAX_TIMEOUT,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedMode {
    Sdr12 = 0,
    Sdr25 = 2,
    Sdr50 = 4,
    Sdr104 = 6,
    Ddr50 = 8,
}

const CLKDIV_MAX: u32 = 0x3FF;

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    /// Apply `config`, identifying the card on the way.
    ///
    /// `identify` replaces the built-in identification sequence and is kept
    /// for later card insertions. Any failure leaves the handle in
    /// `CardRemoved`.
    pub fn set_config(
        &mut self,
        config: &Config,
        identify: Option<IdentifyFn<P, T>>,
    ) -> SdioResult {
        self.enter(&[State::Init, State::Idle])?;
        self.data_timeout = config.data_timeout_cycles;
        self.transceiver = config.transceiver;
        self.identify = identify;
        self.bring_up(config)
    }

    pub fn get_config(&self) -> SdioResult<Config> {
        if !matches!(self.state, State::Idle | State::Active | State::CardRemoved) {
            return Err(SdioError::BadState(self.state));
        }
        let clkcr = self.port.clock_control();
        Ok(Config {
            clock: ClockConfig {
                edge: if clkcr.negedge() {
                    ClockEdge::Falling
                } else {
                    ClockEdge::Rising
                },
                power_save: clkcr.pwrsav(),
                freq_hz: self.transfer_clock_freq(),
            },
            bus_width: BusWidth::from_widbus(clkcr.widbus()),
            hw_flow_control: clkcr.hwfc_en(),
            transceiver: self.transceiver,
            data_timeout_cycles: self.data_timeout,
        })
    }

    /// Fall back to identification settings and wait for a new card.
    ///
    /// An outstanding DMA transfer is dropped and its buffer goes back
    /// through [`SdioCallbacks::error`](super::handle::SdioCallbacks::error).
    pub fn notify_card_removal(&mut self) -> SdioResult {
        self.enter(&[State::Idle, State::Active])?;
        let abandoned = match mem::take(&mut self.context) {
            Context::Dma(xfer) => {
                self.port.idma_stop();
                self.port.disable_interrupts(Status::DATA_IT);
                self.port.clear_flags(Status::STATIC_DATA);
                self.port.set_cmd_trans(false);
                self.reset_data_path();
                Some(xfer.buffer)
            }
            _ => None,
        };
        let result = self.apply_default_config();
        self.state = State::CardRemoved;
        warn!("sdio{}: card removed", self.instance);
        if let Some(buffer) = abandoned {
            self.callbacks.error(ErrorCodes::DMA, Some(buffer));
        }
        result
    }

    pub fn notify_card_insertion(&mut self, config: &Config) -> SdioResult {
        self.enter(&[State::CardRemoved])?;
        self.bring_up(config)
    }

    /// Identify the card and apply the user settings, Idle on success
    fn bring_up(&mut self, config: &Config) -> SdioResult {
        let identify = self.identify.unwrap_or(Self::identify_card);
        let result = self
            .apply_default_config()
            .and_then(|_| identify(self))
            .and_then(|_| self.apply_config(config));
        match result {
            Ok(()) => {
                self.config = *config;
                self.context = Context::None;
                self.state = State::Idle;
                info!(
                    "sdio{}: ready at {} Hz, {:?} bus",
                    self.instance,
                    self.transfer_clock_freq(),
                    config.bus_width
                );
                Ok(())
            }
            Err(err) => {
                warn!("sdio{}: bring up failed: {:?}", self.instance, err);
                self.context = Context::None;
                self.state = State::CardRemoved;
                Err(err)
            }
        }
    }

    /// 400 kHz, 1 bit, no flow control
    pub(super) fn apply_default_config(&mut self) -> SdioResult {
        self.program_clock(&Config::default())
    }

    fn apply_config(&mut self, config: &Config) -> SdioResult {
        self.program_clock(config)?;
        self.write_cccr(CCCR_BUS_IF_CONTROL, config.bus_width.cccr_value())?;
        Ok(())
    }

    fn program_clock(&mut self, config: &Config) -> SdioResult {
        let clkdiv = self.clock_divider(config.clock.freq_hz)?;
        let clkcr = self
            .port
            .clock_control()
            .with_clkdiv(clkdiv)
            .with_negedge(config.clock.edge == ClockEdge::Falling)
            .with_pwrsav(config.clock.power_save)
            .with_widbus(config.bus_width.widbus())
            .with_hwfc_en(config.hw_flow_control);
        self.port.set_clock_control(clkcr);
        Ok(())
    }

    /// kernel / (2 * freq), capped to the CLKDIV field
    fn clock_divider(&self, freq_hz: u32) -> SdioResult<u16> {
        let kernel = self.clock_freq();
        if kernel == 0 {
            return Err(SdioError::NoClock);
        }
        if freq_hz == 0 {
            return Err(SdioError::InvalidParam);
        }
        let div = kernel / freq_hz.saturating_mul(2);
        Ok(div.min(CLKDIV_MAX) as u16)
    }

    pub(super) fn write_cccr(&mut self, address: u32, value: u8) -> SdioResult {
        let cmd = DirectCmd::new(Function::F0, address);
        self.io_direct(Direction::Write, &cmd, value).map(|_| ())
    }

    pub(super) fn read_cccr(&mut self, address: u32) -> SdioResult<u8> {
        let cmd = DirectCmd::new(Function::F0, address);
        self.io_direct(Direction::Read, &cmd, 0)
    }

    fn modify_clock(&mut self, f: impl FnOnce(ClockControl) -> ClockControl) {
        let clkcr = f(self.port.clock_control());
        self.port.set_clock_control(clkcr);
    }

    pub fn set_data_bus_width(&mut self, width: BusWidth) -> SdioResult {
        self.run(Context::Direct, |sdio| {
            sdio.modify_clock(|c| c.with_widbus(width.widbus()));
            sdio.config.bus_width = width;
            sdio.write_cccr(CCCR_BUS_IF_CONTROL, width.cccr_value())
        })
    }

    pub fn data_bus_width(&self) -> BusWidth {
        BusWidth::from_widbus(self.port.clock_control().widbus())
    }

    pub fn set_transfer_clock_freq(&mut self, freq_hz: u32) -> SdioResult {
        self.run(Context::None, |sdio| {
            let clkdiv = sdio.clock_divider(freq_hz)?;
            sdio.modify_clock(|c| c.with_clkdiv(clkdiv));
            sdio.config.clock.freq_hz = freq_hz;
            Ok(())
        })
    }

    /// Bus clock currently driven, the kernel clock when undivided
    pub fn transfer_clock_freq(&self) -> u32 {
        let kernel = self.clock_freq();
        match self.port.clock_control().clkdiv() as u32 {
            0 => kernel,
            div => kernel / (2 * div),
        }
    }

    /// Kernel clock feeding the controller
    pub fn clock_freq(&self) -> u32 {
        self.port.kernel_clock_hz()
    }

    /// Program the block size of `function` in its FBR
    pub fn set_block_size(&mut self, function: Function, block_size: u16) -> SdioResult {
        if !block_size.is_power_of_two() || block_size > 2048 {
            return Err(SdioError::InvalidParam);
        }
        let cmd = ExtendedCmd {
            function: Function::F0,
            address: function.fbr_base() + FBR_BLOCK_SIZE_OFFSET,
            block_mode: BlockMode::Byte,
            op_code: OpCode::Increment,
        };
        let bytes = block_size.to_le_bytes();
        self.run(Context::Polling(Direction::Write), |sdio| {
            sdio.transfer_polling(&cmd, super::extended::PollBuffer::Tx(&bytes), CMD_TIMEOUT_MS)
        })?;
        self.block_size = block_size as u32;
        Ok(())
    }

    pub fn set_speed_mode(&mut self, mode: SpeedMode) -> SdioResult {
        self.run(Context::Direct, |sdio| {
            match mode {
                SpeedMode::Sdr12 | SpeedMode::Sdr25 => {}
                SpeedMode::Sdr50 | SpeedMode::Sdr104 => {
                    sdio.modify_clock(|c| c.with_busspeed(true))
                }
                SpeedMode::Ddr50 => sdio.modify_clock(|c| c.with_busspeed(true).with_ddr(true)),
            }
            sdio.write_cccr(CCCR_BUS_SPEED_SELECT, mode as u8)
        })
    }

    /// Reset the IO portion of the card
    pub fn reset_card(&mut self) -> SdioResult {
        self.run(Context::Direct, |sdio| sdio.write_cccr(CCCR_IO_ABORT, CARD_RESET_DATA))
    }

    pub fn set_data_timeout(&mut self, cycles: u32) -> SdioResult {
        self.enter(&[State::Idle])?;
        self.data_timeout = cycles;
        self.config.data_timeout_cycles = cycles;
        Ok(())
    }

    pub fn data_timeout(&self) -> u32 {
        self.data_timeout
    }
}
