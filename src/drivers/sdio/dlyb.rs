//! Delay block tuning the sampling phase of the bus clock
//!
//! The delay line is a chain of unit cells. Calibration looks for the
//! smallest unit delay for which the line spans one input clock period,
//! the output phase then selects a tap on that line.

use bitfield_struct::bitfield;
use bitflags::bitflags;
use log::{debug, warn};

use super::error::{SdioError, SdioResult};
use super::handle::{Context, Sdio, State};
use super::hal::{SdmmcPort, Timer};
use super::{poll_until, Deadline};

bitflags! {
    // CR
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DelayControl: u32 {
        const DEN = 1 << 0; // delay block enable
        const SEN = 1 << 1; // sampler length enable
    }
}

/// CFGR
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct DelayConfig {
    /// Output clock phase
    #[bits(4)]
    pub sel: u8,
    #[bits(4)]
    __: u8,
    /// Unit cell delay
    #[bits(7)]
    pub unit: u8,
    __: bool,
    /// Which taps saw a clock transition
    #[bits(12)]
    pub lng: u16,
    #[bits(3)]
    __: u8,
    /// `lng` is valid
    pub lngf: bool,
}

/// Register access to one delay block instance
pub trait DelayBlock {
    fn control(&self) -> DelayControl;
    fn set_control(&mut self, cr: DelayControl);
    fn config(&self) -> DelayConfig;
    fn set_config(&mut self, cfgr: DelayConfig);
}

const MAX_UNIT_DELAY_CELL: u8 = 128;
/// Tap used while measuring the line length
const MAX_TUNING_PHASE: u8 = 12;
const MAX_USED_PHASE: u8 = 10;
const LENGTH_TIMEOUT_MS: u32 = 255;

fn modify_control(dlyb: &mut dyn DelayBlock, f: impl FnOnce(DelayControl) -> DelayControl) {
    let cr = f(dlyb.control());
    dlyb.set_control(cr);
}

/// Search the unit delay for which the line spans one clock period
fn configure_unit_delay<T: Timer>(dlyb: &mut dyn DelayBlock, timer: &T) -> SdioResult {
    let deadline = Deadline::after(timer, LENGTH_TIMEOUT_MS);
    modify_control(dlyb, |cr| cr | DelayControl::SEN);
    for unit in 0..MAX_UNIT_DELAY_CELL {
        let cfgr = dlyb.config().with_sel(MAX_TUNING_PHASE).with_unit(unit);
        dlyb.set_config(cfgr);
        if poll_until(timer, deadline, || dlyb.config().lngf()).is_err() {
            modify_control(dlyb, |cr| cr - DelayControl::SEN);
            warn!("dlyb: no line length at unit {}", unit);
            return Err(SdioError::DelayLine);
        }
        let lng = dlyb.config().lng();
        if lng & 0x7FF != 0 && lng & 0xC00 != 0xC00 {
            debug!("dlyb: unit delay {}, length {:#x}", unit, lng);
            break;
        }
    }
    modify_control(dlyb, |cr| cr - DelayControl::SEN);
    Ok(())
}

/// Number of phases spanning one input clock period
fn max_output_clock_phase(dlyb: &mut dyn DelayBlock) -> u8 {
    let len = dlyb.config().lng();
    let mut max = MAX_USED_PHASE;
    modify_control(dlyb, |cr| cr | DelayControl::SEN);
    while max > 0 && (len >> max) == 0 {
        max -= 1;
    }
    modify_control(dlyb, |cr| cr - DelayControl::SEN);
    max
}

fn set_output_clock_phase(dlyb: &mut dyn DelayBlock, phase: u8) {
    modify_control(dlyb, |cr| cr | DelayControl::SEN);
    let cfgr = dlyb.config().with_sel(phase);
    dlyb.set_config(cfgr);
    modify_control(dlyb, |cr| cr - DelayControl::SEN);
}

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    fn dlyb(&mut self) -> SdioResult<&mut (dyn DelayBlock + Send + 'static)> {
        self.delay_block.as_deref_mut().ok_or(SdioError::InvalidParam)
    }

    /// Calibrate the line and select `phase`, the enable state is kept
    pub fn set_config_dlyb_delay(&mut self, phase: u8) -> SdioResult {
        if phase > MAX_TUNING_PHASE {
            return Err(SdioError::InvalidParam);
        }
        self.enter(&[State::Idle])?;
        let dlyb: &mut dyn DelayBlock = self
            .delay_block
            .as_deref_mut()
            .ok_or(SdioError::InvalidParam)?;
        let was = dlyb.control();
        modify_control(dlyb, |cr| cr | DelayControl::DEN);
        let result = configure_unit_delay(dlyb, &self.timer);
        if result.is_ok() {
            set_output_clock_phase(dlyb, phase);
        }
        if !was.contains(DelayControl::DEN) {
            modify_control(dlyb, |cr| cr - DelayControl::DEN);
        }
        result
    }

    pub fn dlyb_output_clock_phase(&mut self) -> SdioResult<u8> {
        if !matches!(self.state, State::Idle | State::Active) {
            return Err(SdioError::BadState(self.state));
        }
        Ok(self.dlyb()?.config().sel())
    }

    /// Measure the line and report how many phases fit one clock period,
    /// the previous unit and phase are put back afterwards
    pub fn calculate_dlyb_max_clock_phase(&mut self) -> SdioResult<u8> {
        if self.delay_block.is_none() {
            return Err(SdioError::InvalidParam);
        }
        self.run(Context::None, |sdio| {
            let dlyb: &mut dyn DelayBlock = sdio
                .delay_block
                .as_deref_mut()
                .ok_or(SdioError::InvalidParam)?;
            let was = dlyb.control();
            let saved = dlyb.config();
            modify_control(dlyb, |cr| cr | DelayControl::DEN);
            let result =
                configure_unit_delay(dlyb, &sdio.timer).map(|_| max_output_clock_phase(dlyb));
            let cfgr = dlyb.config().with_unit(saved.unit()).with_sel(saved.sel());
            dlyb.set_config(cfgr);
            if !was.contains(DelayControl::DEN) {
                modify_control(dlyb, |cr| cr - DelayControl::DEN);
            }
            result
        })
    }

    pub fn enable_dlyb(&mut self) -> SdioResult {
        self.enter(&[State::Idle])?;
        modify_control(self.dlyb()?, |cr| cr | DelayControl::DEN);
        Ok(())
    }

    pub fn disable_dlyb(&mut self) -> SdioResult {
        self.enter(&[State::Idle])?;
        modify_control(self.dlyb()?, |cr| cr - DelayControl::DEN);
        Ok(())
    }

    pub fn is_enabled_dlyb(&mut self) -> SdioResult<bool> {
        Ok(self.dlyb()?.control().contains(DelayControl::DEN))
    }
}

#[cfg(test)]
mod tests {
    use alloc::boxed::Box;

    use super::super::sim::{idle_handle, SimDlyb};
    use super::*;

    #[test]
    fn config_layout() {
        let cfgr = DelayConfig::new().with_sel(12).with_unit(0x7F).with_lng(0xABC).with_lngf(true);
        assert_eq!(u32::from(cfgr), 12 | 0x7F << 8 | 0xABC << 16 | 1 << 31);
    }

    #[test]
    fn calibration_selects_phase_and_keeps_enable_state() {
        let mut sdio = idle_handle();
        let dlyb = SimDlyb::new(5);
        sdio.attach_delay_block(Box::new(dlyb.clone()));
        sdio.set_config_dlyb_delay(3).unwrap();
        assert_eq!(sdio.dlyb_output_clock_phase(), Ok(3));
        assert_eq!(sdio.is_enabled_dlyb(), Ok(false));
        let regs = dlyb.regs();
        assert_eq!(regs.cfgr.unit(), 5);
        assert!(!regs.cr.contains(DelayControl::SEN));
    }

    #[test]
    fn max_phase_restores_previous_tuning() {
        let mut sdio = idle_handle();
        let dlyb = SimDlyb::new(9);
        dlyb.set_tuning(2, 4);
        sdio.attach_delay_block(Box::new(dlyb.clone()));
        sdio.enable_dlyb().unwrap();
        // the model reports a length of 0xFE once locked
        assert_eq!(sdio.calculate_dlyb_max_clock_phase(), Ok(7));
        let regs = dlyb.regs();
        assert_eq!((regs.cfgr.unit(), regs.cfgr.sel()), (2, 4));
        assert_eq!(sdio.is_enabled_dlyb(), Ok(true));
        assert_eq!(sdio.state(), State::Idle);
    }

    #[test]
    fn silent_line_times_out() {
        let mut sdio = idle_handle();
        let dlyb = SimDlyb::stuck();
        sdio.attach_delay_block(Box::new(dlyb.clone()));
        assert_eq!(sdio.set_config_dlyb_delay(1), Err(SdioError::DelayLine));
        assert!(!dlyb.regs().cr.contains(DelayControl::SEN));
    }

    #[test]
    fn missing_delay_block() {
        let mut sdio = idle_handle();
        assert_eq!(sdio.enable_dlyb(), Err(SdioError::InvalidParam));
        assert_eq!(sdio.calculate_dlyb_max_clock_phase(), Err(SdioError::InvalidParam));
        assert_eq!(sdio.set_config_dlyb_delay(13), Err(SdioError::InvalidParam));
    }
}
