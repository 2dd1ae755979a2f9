//! Single byte register access, CMD52

use crate::consts::sdio::CMD_IO_RW_DIRECT;

use super::cmd::{check_r5, direct_arg, DirectCmd, Direction};
use super::error::SdioResult;
use super::handle::{Context, Sdio};
use super::hal::{Command, Response, SdmmcPort, Timer};

impl<P: SdmmcPort, T: Timer> Sdio<P, T> {
    pub fn read_direct(&mut self, cmd: &DirectCmd) -> SdioResult<u8> {
        self.run(Context::Direct, |sdio| sdio.io_direct(Direction::Read, cmd, 0))
    }

    pub fn write_direct(&mut self, cmd: &DirectCmd, data: u8) -> SdioResult {
        self.run(Context::Direct, |sdio| {
            sdio.io_direct(Direction::Write, cmd, data).map(|_| ())
        })
    }

    /// One CMD52 without any state bookkeeping, the R5 data byte on success
    pub(super) fn io_direct(
        &mut self,
        dir: Direction,
        cmd: &DirectCmd,
        data: u8,
    ) -> SdioResult<u8> {
        let arg = direct_arg(dir, cmd, data);
        let resp = self.send_command(Command::new(CMD_IO_RW_DIRECT, arg, Response::Short))?;
        check_r5(resp).map_err(|codes| self.record(codes))
    }
}
