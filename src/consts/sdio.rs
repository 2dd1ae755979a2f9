//! SDIO protocol constants
//!
//! Card register addresses follow the SDIO Simplified Specification,
//! CCCR (function 0, 0x00..0xFF) and FBR (function n, n * 0x100).

use super::const_register::register_const;

register_const!(
    /// Clock used during card identification
    INIT_FREQ_HZ,
    u32,
    400_000
);
register_const!(
    /// Attempts of CMD3 before giving up, one per millisecond
    RCA_RETRY_BOUND,
    u32,
    1000
);
register_const!(
    /// Command path timeout
    CMD_TIMEOUT_MS,
    u32,
    100
);
register_const!(DATA_MAX_TIMEOUT, u32, 0xFFFF_FFFF);
register_const!(
    /// Application functions, 1..=7
    MAX_IO_NUMBER,
    usize,
    7
);
register_const!(CCCR_REG_NUMBER, usize, 22);
register_const!(FBR_SIZE, u32, 0x100);
register_const!(
    /// Largest byte-mode CMD53, a count field of 0 means 512
    BYTE_MODE_WINDOW,
    usize,
    512
);
register_const!(
    /// Largest block count a single CMD53 can carry
    BLOCK_MODE_MAX_BLOCKS,
    usize,
    511
);
register_const!(
    /// Bytes moved per FIFO burst, 8 words
    FIFO_BURST_BYTES,
    usize,
    32
);

// CCCR, function 0
register_const!(CCCR_REVISION, u32, 0x00);
register_const!(CCCR_IO_ENABLE, u32, 0x02);
register_const!(CCCR_IO_READY, u32, 0x03);
register_const!(CCCR_INT_ENABLE, u32, 0x04);
register_const!(CCCR_INT_PENDING, u32, 0x05);
register_const!(CCCR_IO_ABORT, u32, 0x06);
register_const!(CCCR_BUS_IF_CONTROL, u32, 0x07);
register_const!(CCCR_FUNCTION_SELECT, u32, 0x0D);
register_const!(CCCR_BUS_SPEED_SELECT, u32, 0x13);
register_const!(CCCR_INT_EXTENSION, u32, 0x16);

// FBR, function n lives at n * FBR_SIZE
register_const!(FBR_BLOCK_SIZE_OFFSET, u32, 0x10);

register_const!(
    /// RES bit of the I/O abort register
    CARD_RESET_DATA,
    u8,
    0x08
);
register_const!(
    /// EAI bit of the interrupt extension register
    ASYNC_INT_ENABLE,
    u8,
    0x02
);
register_const!(
    /// IENM bit of the interrupt enable register
    INT_MASTER_ENABLE,
    u8,
    0x01
);
register_const!(
    /// S18R in the CMD5 argument
    OCR_S18R,
    u32,
    1 << 24
);

// Command indices
register_const!(CMD_GO_IDLE_STATE, u8, 0);
register_const!(CMD_SEND_REL_ADDR, u8, 3);
register_const!(CMD_IO_SEND_OP_COND, u8, 5);
register_const!(CMD_SEL_DESEL_CARD, u8, 7);
register_const!(CMD_VOLTAGE_SWITCH, u8, 11);
register_const!(CMD_IO_RW_DIRECT, u8, 52);
register_const!(CMD_IO_RW_EXTENDED, u8, 53);
