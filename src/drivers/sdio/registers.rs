//! Copyright (c) 2023 MankorOS EastonMan
//!
//! SDMMC host controller register layouts used by the SDIO driver
//!

use bitfield_struct::bitfield;
use bitflags::bitflags;

bitflags! {
    // STAR / ICR / MASKR share this layout
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Status: u32 {
        const CCRCFAIL = 1 << 0; // command response crc failed
        const DCRCFAIL = 1 << 1; // data block crc failed
        const CTIMEOUT = 1 << 2; // command response timeout
        const DTIMEOUT = 1 << 3; // data timeout
        const TXUNDERR = 1 << 4; // transmit fifo underrun
        const RXOVERR = 1 << 5; // receive fifo overrun
        const CMDREND = 1 << 6; // command response received
        const CMDSENT = 1 << 7; // command sent, no response
        const DATAEND = 1 << 8; // data transfer ended
        const DHOLD = 1 << 9;
        const DBCKEND = 1 << 10; // data block sent/received
        const DABORT = 1 << 11;
        const DPSMACT = 1 << 12; // data path state machine active
        const CPSMACT = 1 << 13; // command path state machine active
        const TXFIFOHE = 1 << 14; // transmit fifo half empty
        const RXFIFOHF = 1 << 15; // receive fifo half full
        const TXFIFOF = 1 << 16;
        const RXFIFOF = 1 << 17;
        const TXFIFOE = 1 << 18; // transmit fifo empty
        const RXFIFOE = 1 << 19; // receive fifo empty
        const BUSYD0 = 1 << 20;
        const BUSYD0END = 1 << 21;
        const SDIOIT = 1 << 22; // card asserted an io interrupt
        const ACKFAIL = 1 << 23;
        const ACKTIMEOUT = 1 << 24;
        const VSWEND = 1 << 25; // voltage switch critical timing section done
        const CKSTOP = 1 << 26;
        const IDMATE = 1 << 27; // internal dma transfer error
        const IDMABTC = 1 << 28; // internal dma buffer transfer complete
    }
}

impl Status {
    /// Flags that stay set until software clears them
    pub const STATIC: Status = Status::CCRCFAIL
        .union(Status::DCRCFAIL)
        .union(Status::CTIMEOUT)
        .union(Status::DTIMEOUT)
        .union(Status::TXUNDERR)
        .union(Status::RXOVERR)
        .union(Status::CMDREND)
        .union(Status::CMDSENT)
        .union(Status::DATAEND)
        .union(Status::DHOLD)
        .union(Status::DBCKEND)
        .union(Status::DABORT)
        .union(Status::BUSYD0END)
        .union(Status::SDIOIT)
        .union(Status::ACKFAIL)
        .union(Status::ACKTIMEOUT)
        .union(Status::VSWEND)
        .union(Status::CKSTOP)
        .union(Status::IDMATE)
        .union(Status::IDMABTC);

    pub const STATIC_DATA: Status = Status::DCRCFAIL
        .union(Status::DTIMEOUT)
        .union(Status::TXUNDERR)
        .union(Status::RXOVERR)
        .union(Status::DATAEND)
        .union(Status::DHOLD)
        .union(Status::DBCKEND)
        .union(Status::DABORT)
        .union(Status::IDMATE)
        .union(Status::IDMABTC);

    /// Data path errors that terminate a transfer
    pub const DATA_ERRORS: Status = Status::DCRCFAIL
        .union(Status::DTIMEOUT)
        .union(Status::TXUNDERR)
        .union(Status::RXOVERR);

    /// Every data path interrupt the driver may have unmasked
    pub const DATA_IT: Status = Status::DATA_ERRORS
        .union(Status::DATAEND)
        .union(Status::TXFIFOHE)
        .union(Status::RXFIFOHF)
        .union(Status::IDMABTC);
}

/// CLKCR
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct ClockControl {
    /// Output clock is kernel / (2 * clkdiv), or kernel when 0
    #[bits(10)]
    pub clkdiv: u16,
    #[bits(2)]
    __: u8,
    pub pwrsav: bool,
    __: bool,
    /// 0: 1 bit, 1: 4 bit, 2: 8 bit
    #[bits(2)]
    pub widbus: u8,
    pub negedge: bool,
    pub hwfc_en: bool,
    pub ddr: bool,
    pub busspeed: bool,
    #[bits(2)]
    pub selclkrx: u8,
    #[bits(10)]
    __: u16,
}

/// DCTRL
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct DataControl {
    pub dten: bool,
    /// Set when data flows card to host
    pub dtdir: bool,
    /// 0: block, 1: sdio multibyte
    #[bits(2)]
    pub dtmode: u8,
    /// log2 of the block size
    #[bits(4)]
    pub dblocksize: u8,
    pub rwstart: bool,
    pub rwstop: bool,
    pub rwmod: bool,
    /// SDIO operation enable, survives data path resets
    pub sdioen: bool,
    pub bootacken: bool,
    pub fiforst: bool,
    #[bits(18)]
    __: u32,
}

impl DataControl {
    pub const MODE_BLOCK: u8 = 0;
    pub const MODE_SDIO: u8 = 1;
}

/// Everything the data path state machine needs before a CMD53 goes out
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataPathConfig {
    pub timeout_cycles: u32,
    pub length: u32,
    pub control: DataControl,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_control_layout() {
        let clkcr = ClockControl::new()
            .with_clkdiv(0x3FF)
            .with_widbus(1)
            .with_busspeed(true);
        assert_eq!(u32::from(clkcr), 0x3FF | (1 << 14) | (1 << 19));
        let back = ClockControl::from(u32::from(clkcr));
        assert_eq!(back.clkdiv(), 0x3FF);
        assert!(!back.ddr());
    }

    #[test]
    fn data_control_layout() {
        let dctrl = DataControl::new()
            .with_dtdir(true)
            .with_dtmode(DataControl::MODE_SDIO)
            .with_dblocksize(9)
            .with_sdioen(true);
        assert_eq!(u32::from(dctrl), (1 << 1) | (1 << 2) | (9 << 4) | (1 << 11));
    }

    #[test]
    fn static_flags_exclude_fifo_levels() {
        assert!(!Status::STATIC.contains(Status::RXFIFOHF));
        assert!(!Status::STATIC.contains(Status::CPSMACT));
        assert!(Status::STATIC.contains(Status::STATIC_DATA));
    }
}
