//! # VGA Planar Writer
//!
//! Drives the VGA graphics controller and sequencer so that a single byte
//! write into video memory sets up to 8 pixels to one of 16 colors.
//!
//! ## Write Path
//!
//! ```text
//! Enable Set/Reset = 0xF   every plane takes its bit from Set/Reset
//! Set/Reset        = c     the color to latch into all 4 planes
//! Bit Mask         = m     which of the 8 pixels in the byte change
//!        │
//!        ▼
//! read byte   (loads the plane latches)
//! write byte  (commits: masked bits ← c, others ← latches)
//! ```
//!
//! ## Registers
//!
//! | Port  | Register index | Name             |
//! |-------|----------------|------------------|
//! | 0x3C4 | 0x02           | Map Mask         |
//! | 0x3CE | 0x00           | Set/Reset        |
//! | 0x3CE | 0x01           | Enable Set/Reset |
//! | 0x3CE | 0x03           | Data Rotate      |
//! | 0x3CE | 0x05           | Mode             |
//! | 0x3CE | 0x08           | Bit Mask         |

use std::io;

use crate::devices::framebuffer::VideoMemory;

/// First port of the register block user space needs access to
pub const VGA_REGS_BASE: u16 = 0x3C0;
pub const VGA_REGS_LEN: u16 = 0x10;

pub const VGA_SEQ_INDEX: u16 = 0x3C4;
pub const VGA_GC_INDEX: u16 = 0x3CE;

pub const VGA_SEQ_MAP_MASK: u8 = 0x02;

pub const VGA_GC_SET_RESET: u8 = 0x00;
pub const VGA_GC_ENABLE_SET_RESET: u8 = 0x01;
pub const VGA_GC_DATA_ROTATE: u8 = 0x03;
pub const VGA_GC_MODE: u8 = 0x05;
pub const VGA_GC_BIT_MASK: u8 = 0x08;

/// Index/data register pair access
pub trait VgaPorts {
    /// Select register `index` at `port` and write `value` to it
    fn write_indexed(&mut self, port: u16, index: u8, value: u8);
}

/// Real port I/O. Only valid after `request_port_access` succeeded.
#[derive(Debug)]
pub struct PortIo {
    _granted: (),
}

impl VgaPorts for PortIo {
    fn write_indexed(&mut self, port: u16, index: u8, value: u8) {
        // One 16-bit out: index in the low byte, data in the high byte.
        #[cfg(target_arch = "x86_64")]
        unsafe {
            use x86_64::instructions::port::Port;
            Port::<u16>::new(port).write(((value as u16) << 8) | index as u16);
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = (port, index, value);
    }
}

/// Ask the kernel for access to the VGA register block
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub fn request_port_access() -> io::Result<PortIo> {
    let result = unsafe {
        libc::syscall(
            libc::SYS_ioperm,
            VGA_REGS_BASE as libc::c_long,
            VGA_REGS_LEN as libc::c_long,
            1 as libc::c_long,
        )
    };
    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(PortIo { _granted: () })
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
pub fn request_port_access() -> io::Result<PortIo> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "VGA port I/O needs Linux on x86_64",
    ))
}

pub struct PlanarWriter<P> {
    ports: P,
}

impl<P: VgaPorts> PlanarWriter<P> {
    pub fn new(ports: P) -> Self {
        Self { ports }
    }

    fn gfx_out(&mut self, index: u8, value: u8) {
        self.ports.write_indexed(VGA_GC_INDEX, index, value);
    }

    fn seq_out(&mut self, index: u8, value: u8) {
        self.ports.write_indexed(VGA_SEQ_INDEX, index, value);
    }

    pub fn set_reset(&mut self, color: u8) {
        self.gfx_out(VGA_GC_SET_RESET, color);
    }

    pub fn enable_set_reset(&mut self, planes: u8) {
        self.gfx_out(VGA_GC_ENABLE_SET_RESET, planes);
    }

    pub fn mode(&mut self, mode: u8) {
        self.gfx_out(VGA_GC_MODE, mode);
    }

    pub fn data_rotate(&mut self, rotate: u8) {
        self.gfx_out(VGA_GC_DATA_ROTATE, rotate);
    }

    pub fn map_mask(&mut self, planes: u8) {
        self.seq_out(VGA_SEQ_MAP_MASK, planes);
    }

    pub fn bit_mask(&mut self, mask: u8) {
        self.gfx_out(VGA_GC_BIT_MASK, mask);
    }

    /// Base state for masked color writes: Set/Reset drives all 4 planes,
    /// write mode 0, no rotation, every plane writable.
    pub fn reset(&mut self) {
        self.enable_set_reset(0x0F);
        self.mode(0);
        self.data_rotate(0);
        self.map_mask(0xFF);
    }

    /// Set the pixels selected by `mask` in byte `offset` to `color`
    pub fn write_masked<M>(&mut self, memory: &mut M, offset: usize, color: u8, mask: u8)
    where
        M: VideoMemory + ?Sized,
    {
        self.set_reset(color);
        self.bit_mask(mask);
        memory.latch_or(offset, 0x01);
    }
}
