// Copyright (c) 2023 Easton Man
// Copyright (c) 2020 rCore
// Copyright (c) 2023 rCore/AcreOS
//
// Adapted from rCore https://github.com/rcore-os/rCore/blob/13ad2d19058901e6401a978d4e20acf7f5610666/kernel/src/logging.rs
// And AcreOS/modules/axlog/src/lib.rs

//! Optional `log` backend for boards without one
//!
//! The driver only talks to the `log` facade. Boards that have no logger
//! of their own can route records to a console through [`init`].

use core::fmt;
use core::str::FromStr;

use log::{self, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

macro_rules! with_color {
    ($color_code:expr, $($arg:tt)*) => {{
        format_args!("\u{1B}[{}m{}\u{1B}[m", $color_code as u8, format_args!($($arg)*))
    }};
}

#[repr(u8)]
#[allow(dead_code)]
enum ColorCode {
    Red = 31,
    Green = 32,
    Yellow = 33,
    Cyan = 36,
    White = 37,
    BrightBlack = 90,
    BrightRed = 91,
    BrightGreen = 92,
    BrightYellow = 93,
    BrightBlue = 94,
    BrightCyan = 96,
}

/// Where formatted records end up, usually a UART print
pub type Sink = fn(fmt::Arguments);

static SINK: Once<Sink> = Once::new();

cfg_if::cfg_if! {
    if #[cfg(debug_assertions)] {
        const LOG_LEVEL: &str = "debug";
    } else {
        const LOG_LEVEL: &str = "warn";
    }
}

/// Install the logger. The first sink wins.
pub fn init(sink: Sink) -> Result<(), SetLoggerError> {
    static LOGGER: SimpleLogger = SimpleLogger;
    SINK.call_once(|| sink);
    log::set_logger(&LOGGER)?;
    set_max_level(LOG_LEVEL);
    Ok(())
}

pub fn set_max_level(level: &str) {
    let lf = LevelFilter::from_str(level).unwrap_or(LevelFilter::Off);
    log::set_max_level(lf);
}

struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        SINK.is_completed()
    }

    fn log(&self, record: &Record) {
        let Some(sink) = SINK.get() else {
            return;
        };
        let level = record.level();
        let line = record.line().unwrap_or(0);
        let target = record.file().unwrap_or("");
        let level_color = match level {
            Level::Error => ColorCode::BrightRed,
            Level::Warn => ColorCode::BrightYellow,
            Level::Info => ColorCode::BrightGreen,
            Level::Debug => ColorCode::BrightCyan,
            Level::Trace => ColorCode::BrightBlack,
        };
        let args_color = match level {
            Level::Error => ColorCode::Red,
            Level::Warn => ColorCode::Yellow,
            Level::Info => ColorCode::Green,
            Level::Debug => ColorCode::Cyan,
            Level::Trace => ColorCode::BrightBlack,
        };
        sink(with_color!(
            ColorCode::White,
            "[{} {} {}\n",
            with_color!(level_color, "{:<5}", level),
            with_color!(ColorCode::BrightBlue, "{:>40}:{:<4}]", target, line),
            with_color!(args_color, "{}", record.args()),
        ));
    }

    fn flush(&self) {}
}
