//! Card identification
//!
//! PowerOff -> VoltageNegotiated -> AddressAssigned -> Selected, one
//! blocking command per step.

use log::{debug, info, warn};

use crate::consts::sdio::{
    CMD_GO_IDLE_STATE, CMD_IO_SEND_OP_COND, CMD_SEL_DESEL_CARD, CMD_SEND_REL_ADDR,
    CMD_VOLTAGE_SWITCH, INIT_FREQ_HZ, OCR_S18R, RCA_RETRY_BOUND,
};

use super::cmd::{check_r1, check_r6, R4};
use super::config::Transceiver;
use super::error::{ErrorCodes, SdioError, SdioResult};
use super::handle::Sdio;
use super::hal::{Command, Response, SdmmcPort, Timer};

/// Settle time after power up, 74 bus cycles at the identification clock
const POWER_UP_DELAY_MS: u32 = 1 + 74 * 1000 / INIT_FREQ_HZ;

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    /// Built-in identification sequence
    pub fn identify_card(&mut self) -> SdioResult {
        self.run_identification().map_err(|err| match err {
            SdioError::Transfer(codes) => SdioError::Identify(codes),
            other => other,
        })
    }

    fn run_identification(&mut self) -> SdioResult {
        self.negotiate_voltage()?;
        let rca = self.assign_address()?;
        self.select_card(rca)
    }

    fn negotiate_voltage(&mut self) -> SdioResult {
        self.port.power_on();
        if self.clock_freq() == 0 {
            return Err(SdioError::NoClock);
        }
        self.timer.delay_ms(POWER_UP_DELAY_MS);

        self.send_command(Command::new(CMD_GO_IDLE_STATE, 0, Response::None))?;

        let op_cond = Command::new(CMD_IO_SEND_OP_COND, 0, Response::ShortNoCrc);
        let r4 = R4::from(self.send_command(op_cond)?);
        debug!("sdio{}: {} io function(s)", self.instance, r4.functions());
        if r4.functions() == 0 {
            return Ok(());
        }

        let r4 = R4::from(self.send_command(Command::new(
            CMD_IO_SEND_OP_COND,
            OCR_S18R,
            Response::ShortNoCrc,
        ))?);
        if r4.ready() && r4.s18a() {
            let resp = self.send_command(Command::new(CMD_VOLTAGE_SWITCH, 0, Response::Short))?;
            check_r1(resp).map_err(|codes| self.record(codes))?;
            info!("sdio{}: switched to 1.8V signalling", self.instance);
            if self.transceiver == Transceiver::Present {
                self.callbacks.drive_transceiver_1v8(true);
            }
        }
        Ok(())
    }

    /// Some cards reject the first CMD3 after the CMD0 above
    fn assign_address(&mut self) -> SdioResult<u16> {
        for attempt in 1..=RCA_RETRY_BOUND {
            let result = self
                .send_command(Command::new(CMD_SEND_REL_ADDR, 0, Response::Short))
                .and_then(|resp| check_r6(resp).map_err(|codes| self.record(codes)));
            self.timer.delay_ms(1);
            match result {
                Ok(rca) => {
                    debug!("sdio{}: rca {:#06x} after {} attempt(s)", self.instance, rca, attempt);
                    return Ok(rca);
                }
                Err(SdioError::Transfer(codes)) if codes == ErrorCodes::ILLEGAL_CMD => continue,
                Err(err) => return Err(err),
            }
        }
        warn!("sdio{}: card never published an address", self.instance);
        Err(self.record(ErrorCodes::TIMEOUT))
    }

    fn select_card(&mut self, rca: u16) -> SdioResult {
        let select = Command::new(CMD_SEL_DESEL_CARD, (rca as u32) << 16, Response::Short);
        let resp = self.send_command(select)?;
        check_r1(resp).map_err(|codes| self.record(codes))
    }
}
