//! Renderer error type

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Vga16Error {
    #[error("could not open '{}': {source}", path.display())]
    DeviceOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not open terminal: {0}")]
    TerminalOpen(#[source] io::Error),

    #[error("terminal is not a VT")]
    NotAVirtualTerminal,

    #[error("could not read screen info: {0}")]
    ScreenInfo(#[source] io::Error),

    /// The device is not driven by vga16fb. Not a hardware fault.
    #[error(
        "doesn't look like vga16fb (type {kind}, aux {aux}, visual {visual}, {bits_per_pixel} bpp)"
    )]
    UnsupportedMode {
        kind: u32,
        aux: u32,
        visual: u32,
        bits_per_pixel: u32,
    },

    #[error("could not obtain permission to write to VGA regs: {0}")]
    PortPermission(#[source] io::Error),

    #[error("could not map VGA memory: {0}")]
    Map(#[source] io::Error),

    #[error("device is not open")]
    DeviceNotOpen,

    #[error("terminal is not open")]
    TerminalNotOpen,

    #[error("head has not been initialized by a device query")]
    HeadNotInitialized,

    #[error("head does not belong to this backend")]
    InvalidHead,

    #[error("input source does not belong to this backend")]
    InvalidInputSource,
}

pub type Result<T> = std::result::Result<T, Vga16Error>;
