//! Card metadata snapshots, CCCR and FBR

use bitflags::bitflags;

use crate::consts::sdio::{CCCR_REG_NUMBER, MAX_IO_NUMBER};

use super::cmd::Function;
use super::error::SdioResult;
use super::handle::{Context, Sdio};
use super::hal::{SdmmcPort, Timer};

/// FBR bytes the snapshot is built from, up to the CSA pointer
const FBR_REG_NUMBER: usize = 15;

/// Card common control registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cccr {
    pub cccr_revision: u8,
    pub sdio_revision: u8,
    pub sd_spec_revision: u8,
    pub bus_width_8bit: bool,
    pub card_capability: u8,
    pub common_cis_pointer: u32,
}

impl Cccr {
    pub fn parse(raw: &[u8; CCCR_REG_NUMBER]) -> Self {
        Self {
            cccr_revision: raw[0x00] & 0x0F,
            sdio_revision: raw[0x00] >> 4,
            sd_spec_revision: raw[0x01] & 0x0F,
            bus_width_8bit: raw[0x07] & 0x04 != 0,
            card_capability: raw[0x08] & 0xDF,
            common_cis_pointer: pointer24(&raw[0x09..0x0C]),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FbrFlags: u8 {
        const POWER_SELECTION = 1 << 0;
        const CSA = 1 << 1; // code storage area
    }
}

/// Function basic registers of one IO function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Fbr {
    pub std_function_code: u8,
    pub ext_function_code: u8,
    pub cis_pointer: u32,
    pub csa_pointer: u32,
    pub flags: FbrFlags,
}

impl Fbr {
    pub fn parse(raw: &[u8; FBR_REG_NUMBER]) -> Self {
        let mut flags = FbrFlags::empty();
        if raw[0x02] & 0x01 != 0 {
            flags |= FbrFlags::POWER_SELECTION;
        }
        if raw[0x00] & 0x40 != 0 {
            flags |= FbrFlags::CSA;
        }
        Self {
            std_function_code: raw[0x00] & 0x0F,
            ext_function_code: raw[0x01],
            cis_pointer: pointer24(&raw[0x09..0x0C]),
            csa_pointer: pointer24(&raw[0x0C..0x0F]),
            flags,
        }
    }
}

fn pointer24(bytes: &[u8]) -> u32 {
    bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16
}

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    pub fn card_common_control_register(&mut self) -> SdioResult<Cccr> {
        self.run(Context::Direct, |sdio| {
            let mut raw = [0u8; CCCR_REG_NUMBER];
            sdio.read_f0_range(0, &mut raw)?;
            Ok(Cccr::parse(&raw))
        })
    }

    /// FBRs of functions 1 to 7, in that order
    pub fn card_function_basic_register(&mut self) -> SdioResult<[Fbr; MAX_IO_NUMBER]> {
        self.run(Context::Direct, |sdio| {
            let mut fbrs = [Fbr::default(); MAX_IO_NUMBER];
            for (fbr, function) in fbrs.iter_mut().zip(Function::IO) {
                let mut raw = [0u8; FBR_REG_NUMBER];
                sdio.read_f0_range(function.fbr_base(), &mut raw)?;
                *fbr = Fbr::parse(&raw);
            }
            Ok(fbrs)
        })
    }

    fn read_f0_range(&mut self, base: u32, out: &mut [u8]) -> SdioResult {
        for (offset, byte) in out.iter_mut().enumerate() {
            *byte = self.read_cccr(base + offset as u32)?;
        }
        Ok(())
    }
}
