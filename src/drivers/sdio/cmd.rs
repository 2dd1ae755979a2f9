//! SDIO command arguments and responses
//!
//! CMD52 and CMD53 pack direction, function, address and payload into one
//! argument word; CMD5, CMD52/53 and CMD3 answer with R4, R5 and R6.

use bitfield_struct::bitfield;

use super::error::ErrorCodes;

/// IO function number
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Function {
    F0 = 0, // common control function
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
}

impl Function {
    pub const IO: [Function; 7] = [
        Function::F1,
        Function::F2,
        Function::F3,
        Function::F4,
        Function::F5,
        Function::F6,
        Function::F7,
    ];

    pub const fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Function> {
        match index {
            0 => Some(Function::F0),
            1..=7 => Some(Function::IO[index as usize - 1]),
            _ => None,
        }
    }

    pub(crate) const fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Base of this function's FBR in the function 0 address space
    pub const fn fbr_base(self) -> u32 {
        self as u32 * crate::consts::sdio::FBR_SIZE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockMode {
    Byte,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    /// Every byte goes to the same register
    Fixed,
    /// Register address increments with each byte
    Increment,
}

/// One CMD52
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectCmd {
    pub function: Function,
    pub address: u32,
    /// Card returns the register content after the write
    pub read_after_write: bool,
}

impl DirectCmd {
    pub const fn new(function: Function, address: u32) -> Self {
        Self {
            function,
            address,
            read_after_write: false,
        }
    }

    pub const fn with_read_after_write(mut self) -> Self {
        self.read_after_write = true;
        self
    }
}

/// One CMD53
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedCmd {
    pub function: Function,
    pub address: u32,
    pub block_mode: BlockMode,
    pub op_code: OpCode,
}

/// CMD52 argument
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct DirectArg {
    pub data: u8,
    __: bool,
    #[bits(17)]
    pub address: u32,
    __: bool,
    pub raw: bool,
    #[bits(3)]
    pub function: u8,
    pub write: bool,
}

/// CMD53 argument
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct ExtendedArg {
    /// Bytes in byte mode (0 means 512), blocks in block mode
    #[bits(9)]
    pub count: u16,
    #[bits(17)]
    pub address: u32,
    pub increment: bool,
    pub block_mode: bool,
    #[bits(3)]
    pub function: u8,
    pub write: bool,
}

const ADDRESS_MASK: u32 = 0x1_FFFF;
const COUNT_MASK: u32 = 0x1FF;

pub fn direct_arg(dir: Direction, cmd: &DirectCmd, data: u8) -> u32 {
    let arg = DirectArg::new()
        .with_write(dir == Direction::Write)
        .with_function(cmd.function.index())
        .with_raw(cmd.read_after_write)
        .with_address(cmd.address & ADDRESS_MASK)
        .with_data(match dir {
            Direction::Write => data,
            Direction::Read => 0,
        });
    arg.into()
}

pub fn extended_arg(dir: Direction, cmd: &ExtendedCmd, count: u32) -> u32 {
    let arg = ExtendedArg::new()
        .with_write(dir == Direction::Write)
        .with_function(cmd.function.index())
        .with_block_mode(cmd.block_mode == BlockMode::Block)
        .with_increment(cmd.op_code == OpCode::Increment)
        .with_address(cmd.address & ADDRESS_MASK)
        .with_count((count & COUNT_MASK) as u16);
    arg.into()
}

/// CMD5 response
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct R4 {
    #[bits(24)]
    pub ocr: u32,
    /// Card accepted the 1.8V switch request
    pub s18a: bool,
    #[bits(2)]
    __: u8,
    pub memory_present: bool,
    #[bits(3)]
    pub functions: u8,
    pub ready: bool,
}

const R5_OUT_OF_RANGE: u32 = 1 << 8;
const R5_FUNCTION_NUMBER: u32 = 1 << 9;
const R5_ERROR: u32 = 1 << 11;
const R5_ILLEGAL_CMD: u32 = 1 << 14;
const R5_COM_CRC_ERROR: u32 = 1 << 15;
const R5_ERROR_BITS: u32 =
    R5_OUT_OF_RANGE | R5_FUNCTION_NUMBER | R5_ERROR | R5_ILLEGAL_CMD | R5_COM_CRC_ERROR;

/// Check an R5 and hand back its data byte
pub fn check_r5(resp: u32) -> Result<u8, ErrorCodes> {
    if resp & R5_ERROR_BITS == 0 {
        Ok((resp & 0xFF) as u8)
    } else if resp & R5_OUT_OF_RANGE != 0 {
        Err(ErrorCodes::ADDR_OUT_OF_RANGE)
    } else if resp & R5_FUNCTION_NUMBER != 0 {
        Err(ErrorCodes::INVALID_PARAMETER)
    } else if resp & R5_ILLEGAL_CMD != 0 {
        Err(ErrorCodes::ILLEGAL_CMD)
    } else if resp & R5_COM_CRC_ERROR != 0 {
        Err(ErrorCodes::COM_CRC_FAILED)
    } else {
        Err(ErrorCodes::GENERAL_UNKNOWN)
    }
}

const R6_GENERAL_UNKNOWN: u32 = 1 << 13;
const R6_ILLEGAL_CMD: u32 = 1 << 14;
const R6_COM_CRC_FAILED: u32 = 1 << 15;

/// Check an R6 and hand back the published relative card address
pub fn check_r6(resp: u32) -> Result<u16, ErrorCodes> {
    if resp & (R6_GENERAL_UNKNOWN | R6_ILLEGAL_CMD | R6_COM_CRC_FAILED) == 0 {
        Ok((resp >> 16) as u16)
    } else if resp & R6_ILLEGAL_CMD != 0 {
        Err(ErrorCodes::ILLEGAL_CMD)
    } else if resp & R6_COM_CRC_FAILED != 0 {
        Err(ErrorCodes::COM_CRC_FAILED)
    } else {
        Err(ErrorCodes::GENERAL_UNKNOWN)
    }
}

const R1_ERROR_BITS: u32 = 0xFDFF_E008;
const R1_OUT_OF_RANGE: u32 = 1 << 31;
const R1_COM_CRC_FAILED: u32 = 1 << 23;
const R1_ILLEGAL_CMD: u32 = 1 << 22;

pub fn check_r1(resp: u32) -> Result<(), ErrorCodes> {
    if resp & R1_ERROR_BITS == 0 {
        Ok(())
    } else if resp & R1_OUT_OF_RANGE != 0 {
        Err(ErrorCodes::ADDR_OUT_OF_RANGE)
    } else if resp & R1_COM_CRC_FAILED != 0 {
        Err(ErrorCodes::COM_CRC_FAILED)
    } else if resp & R1_ILLEGAL_CMD != 0 {
        Err(ErrorCodes::ILLEGAL_CMD)
    } else {
        Err(ErrorCodes::GENERAL_UNKNOWN)
    }
}
