//! Error reporting of the SDIO driver
//!

use bitflags::bitflags;

use super::handle::State;
use super::registers::Status;

bitflags! {
    // Accumulated per public operation, see `Sdio::last_error_codes`
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct ErrorCodes: u32 {
        const CMD_CRC_FAIL = 0x0000_0001; // command response crc failed
        const DATA_CRC_FAIL = 0x0000_0002; // data block crc failed
        const CMD_RSP_TIMEOUT = 0x0000_0004; // no command response
        const DATA_TIMEOUT = 0x0000_0008;
        const TX_UNDERRUN = 0x0000_0010;
        const RX_OVERRUN = 0x0000_0020;
        const COM_CRC_FAILED = 0x0000_1000; // card saw a bad crc on the previous command
        const ILLEGAL_CMD = 0x0000_2000;
        const GENERAL_UNKNOWN = 0x0001_0000;
        const ADDR_OUT_OF_RANGE = 0x0200_0000;
        const INVALID_PARAMETER = 0x0800_0000;
        const BUSY = 0x2000_0000;
        const DMA = 0x4000_0000;
        const TIMEOUT = 0x8000_0000; // software timeout
    }
}

impl ErrorCodes {
    /// Data path errors carried by the status register.
    ///
    /// Every raised bit maps to its own code, the hardware may report
    /// several at once.
    pub fn from_data_status(status: Status) -> ErrorCodes {
        let mut codes = ErrorCodes::empty();
        if status.contains(Status::DCRCFAIL) {
            codes |= ErrorCodes::DATA_CRC_FAIL;
        }
        if status.contains(Status::DTIMEOUT) {
            codes |= ErrorCodes::DATA_TIMEOUT;
        }
        if status.contains(Status::RXOVERR) {
            codes |= ErrorCodes::RX_OVERRUN;
        }
        if status.contains(Status::TXUNDERR) {
            codes |= ErrorCodes::TX_UNDERRUN;
        }
        codes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdioError {
    /// The handle is not in a state that allows the operation.
    BadState(State),
    /// Invalid parameter/argument.
    InvalidParam,
    /// Command or data phase reported an error.
    Transfer(ErrorCodes),
    /// A polling loop ran past its deadline.
    Timeout,
    /// The controller kernel clock is not running.
    NoClock,
    /// The card never reported the function ready.
    NotReady,
    /// Card identification failed, the card is considered removed.
    Identify(ErrorCodes),
    /// The delay line could not lock on the input clock.
    DelayLine,
}

pub type SdioResult<T = ()> = Result<T, SdioError>;
