//! Device Subsystem
//!
//! Hardware and OS boundaries of the renderer:
//! - `framebuffer`: fbdev ioctls, video memory mapping, color and palette
//! - `vga`: VGA register programming for planar writes
//! - `terminal`: virtual terminal mode, focus and input settings
//!
//! `Hardware` bundles the three resources a head needs so the backend can
//! run against real devices or an emulation.

pub mod framebuffer;
pub mod terminal;
pub mod vga;

use std::io;
use std::path::Path;

use framebuffer::{FbDevice, FramebufferDevice, MappedMemory, VideoMemory};
use vga::{PortIo, VgaPorts};

pub trait Hardware: 'static {
    type Device: FramebufferDevice + 'static;
    type Memory: VideoMemory + 'static;
    type Ports: VgaPorts + 'static;

    fn open_device(&mut self, path: &Path) -> io::Result<Self::Device>;
    /// Gain write access to the VGA register block
    fn request_port_access(&mut self) -> io::Result<Self::Ports>;
    fn map(&mut self, device: &Self::Device, len: usize) -> io::Result<Self::Memory>;
}

/// `/dev/fb*`, `ioperm` and `mmap` on Linux
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxHardware;

impl Hardware for LinuxHardware {
    type Device = FbDevice;
    type Memory = MappedMemory;
    type Ports = PortIo;

    fn open_device(&mut self, path: &Path) -> io::Result<FbDevice> {
        FbDevice::open(path)
    }

    fn request_port_access(&mut self) -> io::Result<PortIo> {
        vga::request_port_access()
    }

    fn map(&mut self, device: &FbDevice, len: usize) -> io::Result<MappedMemory> {
        device.map(len)
    }
}
