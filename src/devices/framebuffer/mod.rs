//! # Linux Framebuffer Device
//!
//! Bindings for the fbdev character device (`/dev/fb*`) as used by a
//! vga16fb head.
//!
//! ## Modules
//!
//! - `color`: `Color` with packed ARGB conversion
//! - `palette`: the adaptive 16-entry color table
//!
//! ## Device Access
//!
//! | Operation          | ioctl / call          |
//! |--------------------|-----------------------|
//! | variable info      | `FBIOGET_VSCREENINFO` |
//! | fixed info         | `FBIOGET_FSCREENINFO` |
//! | color map upload   | `FBIOPUTCMAP`         |
//! | video memory       | `mmap(PROT_WRITE)`    |
//!
//! The device, the mapping and the register ports are separate resources
//! with separate lifetimes: the mapping only exists while a head is
//! mapped, the device for the whole open/close cycle.

pub mod color;
pub mod palette;

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::Path;
use std::ptr::{self, NonNull};

use libc::{c_char, c_ulong};

use palette::{Palette, PALETTE_CAPACITY};

pub const FBIOGET_VSCREENINFO: c_ulong = 0x4600;
pub const FBIOGET_FSCREENINFO: c_ulong = 0x4602;
pub const FBIOPUTCMAP: c_ulong = 0x4605;

pub const FB_TYPE_VGA_PLANES: u32 = 4;
pub const FB_AUX_VGA_PLANES_VGA4: u32 = 0;
pub const FB_VISUAL_PSEUDOCOLOR: u32 = 3;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FbBitfield {
    pub offset: u32,
    pub length: u32,
    pub msb_right: u32,
}

/// `struct fb_var_screeninfo`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarScreenInfo {
    pub xres: u32,
    pub yres: u32,
    pub xres_virtual: u32,
    pub yres_virtual: u32,
    pub xoffset: u32,
    pub yoffset: u32,
    pub bits_per_pixel: u32,
    pub grayscale: u32,
    pub red: FbBitfield,
    pub green: FbBitfield,
    pub blue: FbBitfield,
    pub transp: FbBitfield,
    pub nonstd: u32,
    pub activate: u32,
    pub height: u32,
    pub width: u32,
    pub accel_flags: u32,
    pub pixclock: u32,
    pub left_margin: u32,
    pub right_margin: u32,
    pub upper_margin: u32,
    pub lower_margin: u32,
    pub hsync_len: u32,
    pub vsync_len: u32,
    pub sync: u32,
    pub vmode: u32,
    pub rotate: u32,
    pub colorspace: u32,
    pub reserved: [u32; 4],
}

/// `struct fb_fix_screeninfo`
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixScreenInfo {
    pub id: [c_char; 16],
    pub smem_start: c_ulong,
    pub smem_len: u32,
    pub kind: u32,
    pub type_aux: u32,
    pub visual: u32,
    pub xpanstep: u16,
    pub ypanstep: u16,
    pub ywrapstep: u16,
    pub line_length: u32,
    pub mmio_start: c_ulong,
    pub mmio_len: u32,
    pub accel: u32,
    pub capabilities: u16,
    pub reserved: [u16; 2],
}

impl FixScreenInfo {
    /// vga16fb's planar mode: 4 VGA planes, pseudocolor
    pub fn is_vga16(&self, var: &VarScreenInfo) -> bool {
        self.kind == FB_TYPE_VGA_PLANES
            && self.type_aux == FB_AUX_VGA_PLANES_VGA4
            && self.visual == FB_VISUAL_PSEUDOCOLOR
            && var.bits_per_pixel == 4
    }
}

#[repr(C)]
struct FbCmap {
    start: u32,
    len: u32,
    red: *mut u16,
    green: *mut u16,
    blue: *mut u16,
    transp: *mut u16,
}

/// Screen-info queries and color-map upload on an open device
pub trait FramebufferDevice {
    fn variable_screen_info(&self) -> io::Result<VarScreenInfo>;
    fn fixed_screen_info(&self) -> io::Result<FixScreenInfo>;
    /// Upload entries `[0, palette.len())`
    fn put_color_map(&self, palette: &Palette) -> io::Result<()>;
}

/// Mapped VGA memory
pub trait VideoMemory {
    fn len(&self) -> usize;

    /// Read `offset` to load the VGA latches, then write back with `value`
    /// OR-ed in. Under Set/Reset the written data is ignored; the write
    /// itself commits the latched color through the bit mask.
    fn latch_or(&mut self, offset: usize, value: u8);
}

// =============================================================================
// LINUX IMPLEMENTATION
// =============================================================================

pub struct FbDevice {
    fd: OwnedFd,
}

impl FbDevice {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file: File = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { fd: file.into() })
    }

    /// Map `len` bytes of video memory for writing
    pub fn map(&self, len: usize) -> io::Result<MappedMemory> {
        if len == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty mapping"));
        }

        let address = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd.as_raw_fd(),
                0,
            )
        };
        if address == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(address.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
        Ok(MappedMemory { ptr, len })
    }

    fn ioctl<T>(&self, request: c_ulong, arg: *mut T) -> io::Result<()> {
        if unsafe { libc::ioctl(self.fd.as_raw_fd(), request as _, arg) } < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl AsRawFd for FbDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl FramebufferDevice for FbDevice {
    fn variable_screen_info(&self) -> io::Result<VarScreenInfo> {
        let mut info = VarScreenInfo::default();
        self.ioctl(FBIOGET_VSCREENINFO, &mut info)?;
        Ok(info)
    }

    fn fixed_screen_info(&self) -> io::Result<FixScreenInfo> {
        let mut info = FixScreenInfo::default();
        self.ioctl(FBIOGET_FSCREENINFO, &mut info)?;
        Ok(info)
    }

    fn put_color_map(&self, palette: &Palette) -> io::Result<()> {
        // The kernel only reads through these pointers.
        let mut red = [0u16; PALETTE_CAPACITY];
        let mut green = [0u16; PALETTE_CAPACITY];
        let mut blue = [0u16; PALETTE_CAPACITY];
        let len = palette.len();
        red[..len].copy_from_slice(palette.red());
        green[..len].copy_from_slice(palette.green());
        blue[..len].copy_from_slice(palette.blue());

        let mut cmap = FbCmap {
            start: 0,
            len: len as u32,
            red: red.as_mut_ptr(),
            green: green.as_mut_ptr(),
            blue: blue.as_mut_ptr(),
            transp: ptr::null_mut(),
        };
        self.ioctl(FBIOPUTCMAP, &mut cmap)
    }
}

/// A `MAP_SHARED` mapping of the device, unmapped on drop
pub struct MappedMemory {
    ptr: NonNull<u8>,
    len: usize,
}

impl VideoMemory for MappedMemory {
    fn len(&self) -> usize {
        self.len
    }

    fn latch_or(&mut self, offset: usize, value: u8) {
        if offset >= self.len {
            return;
        }
        unsafe {
            let byte = self.ptr.as_ptr().add(offset);
            let latched = ptr::read_volatile(byte);
            ptr::write_volatile(byte, latched | value);
        }
    }
}

impl Drop for MappedMemory {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}
