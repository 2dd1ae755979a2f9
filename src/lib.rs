//! Copyright (c) 2023 MankorOS EastonMan
//!
//! Host-side driver for SDIO cards behind an SDMMC class controller.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod consts;
pub mod drivers;
pub mod logging;
