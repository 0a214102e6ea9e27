//! Test doubles for the hardware, terminal and event loop boundaries

use std::cell::{Cell, RefCell};
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::devices::framebuffer::palette::Palette;
use crate::devices::framebuffer::{
    FixScreenInfo, FramebufferDevice, VarScreenInfo, VideoMemory, FB_AUX_VGA_PLANES_VGA4,
    FB_TYPE_VGA_PLANES, FB_VISUAL_PSEUDOCOLOR,
};
use crate::devices::terminal::{Terminal, TerminalMode, VtChangeHandler};
use crate::devices::vga::{
    VgaPorts, VGA_GC_BIT_MASK, VGA_GC_ENABLE_SET_RESET, VGA_GC_INDEX, VGA_GC_SET_RESET,
    VGA_SEQ_INDEX, VGA_SEQ_MAP_MASK,
};
use crate::devices::Hardware;
use crate::events::{EventLoop, FdHandler, WatchToken};

// =============================================================================
// EMULATED VGA
// =============================================================================

/// One committed video memory write with the registers that shaped it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanarWrite {
    pub offset: usize,
    pub color: u8,
    pub mask: u8,
}

struct VgaModel {
    planes: [Vec<u8>; 4],
    graphics: [u8; 9],
    map_mask: u8,
    port_log: Vec<(u16, u8, u8)>,
    planar_writes: Vec<PlanarWrite>,
}

/// Four bit planes behind the graphics controller, with Set/Reset and Bit
/// Mask applied the way write mode 0 does.
#[derive(Clone)]
pub struct EmulatedVga {
    model: Rc<RefCell<VgaModel>>,
    row_stride: usize,
    height: usize,
}

impl EmulatedVga {
    pub fn new(width: usize, height: usize) -> Self {
        let row_stride = width.div_ceil(8);
        let plane = vec![0u8; row_stride * height];
        Self {
            model: Rc::new(RefCell::new(VgaModel {
                planes: [plane.clone(), plane.clone(), plane.clone(), plane],
                graphics: [0; 9],
                map_mask: 0,
                port_log: Vec::new(),
                planar_writes: Vec::new(),
            })),
            row_stride,
            height,
        }
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn ports(&self) -> EmulatedPorts {
        EmulatedPorts {
            model: self.model.clone(),
        }
    }

    pub fn memory(&self) -> EmulatedMemory {
        EmulatedMemory {
            model: self.model.clone(),
            len: self.row_stride * self.height,
        }
    }

    /// Color index shown at `(x, y)`
    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        let model = self.model.borrow();
        let offset = y * self.row_stride + x / 8;
        let bit = 0x80u8 >> (x % 8);
        (0..4)
            .filter(|&plane| model.planes[plane][offset] & bit != 0)
            .fold(0, |color, plane| color | (1 << plane))
    }

    pub fn port_log(&self) -> Vec<(u16, u8, u8)> {
        self.model.borrow().port_log.clone()
    }

    pub fn planar_writes(&self) -> Vec<PlanarWrite> {
        self.model.borrow().planar_writes.clone()
    }

    pub fn memory_writes(&self) -> Vec<usize> {
        self.planar_writes().iter().map(|w| w.offset).collect()
    }

    pub fn clear_logs(&self) {
        let mut model = self.model.borrow_mut();
        model.port_log.clear();
        model.planar_writes.clear();
    }
}

pub struct EmulatedPorts {
    model: Rc<RefCell<VgaModel>>,
}

impl VgaPorts for EmulatedPorts {
    fn write_indexed(&mut self, port: u16, index: u8, value: u8) {
        let mut model = self.model.borrow_mut();
        model.port_log.push((port, index, value));
        match port {
            VGA_GC_INDEX => {
                if let Some(register) = model.graphics.get_mut(index as usize) {
                    *register = value;
                }
            }
            VGA_SEQ_INDEX if index == VGA_SEQ_MAP_MASK => model.map_mask = value,
            _ => {}
        }
    }
}

pub struct EmulatedMemory {
    model: Rc<RefCell<VgaModel>>,
    len: usize,
}

impl VideoMemory for EmulatedMemory {
    fn len(&self) -> usize {
        self.len
    }

    fn latch_or(&mut self, offset: usize, value: u8) {
        if offset >= self.len {
            return;
        }

        let mut model = self.model.borrow_mut();
        let set_reset = model.graphics[VGA_GC_SET_RESET as usize];
        let enable = model.graphics[VGA_GC_ENABLE_SET_RESET as usize];
        let bit_mask = model.graphics[VGA_GC_BIT_MASK as usize];
        let map_mask = model.map_mask;

        for (plane, bits) in model.planes.iter_mut().enumerate() {
            if map_mask & (1 << plane) == 0 {
                continue;
            }
            let latched = bits[offset];
            let source = if enable & (1 << plane) != 0 {
                if set_reset & (1 << plane) != 0 {
                    0xFF
                } else {
                    0x00
                }
            } else {
                value
            };
            bits[offset] = (source & bit_mask) | (latched & !bit_mask);
        }

        model.planar_writes.push(PlanarWrite {
            offset,
            color: set_reset,
            mask: bit_mask,
        });
    }
}

// =============================================================================
// FAKE FRAMEBUFFER HARDWARE
// =============================================================================

#[derive(Clone)]
pub struct FakeDevice {
    var: VarScreenInfo,
    fix: FixScreenInfo,
    uploads: Rc<RefCell<Vec<Palette>>>,
}

impl FakeDevice {
    /// A vga16fb device reporting `width`x`height`
    pub fn vga16(width: usize, height: usize) -> Self {
        let line_length = width.div_ceil(8) as u32;
        let var = VarScreenInfo {
            xres: width as u32,
            yres: height as u32,
            xres_virtual: width as u32,
            yres_virtual: height as u32,
            bits_per_pixel: 4,
            ..Default::default()
        };
        let fix = FixScreenInfo {
            smem_len: line_length * height as u32,
            kind: FB_TYPE_VGA_PLANES,
            type_aux: FB_AUX_VGA_PLANES_VGA4,
            visual: FB_VISUAL_PSEUDOCOLOR,
            line_length,
            ..Default::default()
        };
        Self {
            var,
            fix,
            uploads: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn uploaded_palettes(&self) -> Vec<Palette> {
        self.uploads.borrow().clone()
    }
}

impl FramebufferDevice for FakeDevice {
    fn variable_screen_info(&self) -> io::Result<VarScreenInfo> {
        Ok(self.var)
    }

    fn fixed_screen_info(&self) -> io::Result<FixScreenInfo> {
        Ok(self.fix)
    }

    fn put_color_map(&self, palette: &Palette) -> io::Result<()> {
        self.uploads.borrow_mut().push(palette.clone());
        Ok(())
    }
}

#[derive(Clone)]
pub struct FakeHardware {
    pub vga: EmulatedVga,
    pub device: FakeDevice,
    opened: Rc<RefCell<Vec<PathBuf>>>,
    mapped: Rc<RefCell<Vec<usize>>>,
    fail_open: Rc<Cell<bool>>,
    fail_ports: Rc<Cell<bool>>,
    fail_map: Rc<Cell<bool>>,
}

impl FakeHardware {
    pub fn vga16(width: usize, height: usize) -> Self {
        Self {
            vga: EmulatedVga::new(width, height),
            device: FakeDevice::vga16(width, height),
            opened: Rc::default(),
            mapped: Rc::default(),
            fail_open: Rc::default(),
            fail_ports: Rc::default(),
            fail_map: Rc::default(),
        }
    }

    pub fn with_mode(mut self, edit: impl FnOnce(&mut VarScreenInfo, &mut FixScreenInfo)) -> Self {
        edit(&mut self.device.var, &mut self.device.fix);
        self
    }

    pub fn fail_open(&self) {
        self.fail_open.set(true);
    }

    pub fn fail_ports(&self) {
        self.fail_ports.set(true);
    }

    pub fn fail_map(&self) {
        self.fail_map.set(true);
    }

    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.opened.borrow().clone()
    }

    pub fn mapped_lengths(&self) -> Vec<usize> {
        self.mapped.borrow().clone()
    }
}

impl Hardware for FakeHardware {
    type Device = FakeDevice;
    type Memory = EmulatedMemory;
    type Ports = EmulatedPorts;

    fn open_device(&mut self, path: &Path) -> io::Result<FakeDevice> {
        if self.fail_open.get() {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        self.opened.borrow_mut().push(path.to_path_buf());
        Ok(self.device.clone())
    }

    fn request_port_access(&mut self) -> io::Result<EmulatedPorts> {
        if self.fail_ports.get() {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(self.vga.ports())
    }

    fn map(&mut self, _device: &FakeDevice, len: usize) -> io::Result<EmulatedMemory> {
        if self.fail_map.get() {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        self.mapped.borrow_mut().push(len);
        Ok(self.vga.memory())
    }
}

// =============================================================================
// FAKE TERMINAL
// =============================================================================

pub struct FakeTerminal {
    open: Cell<bool>,
    vt: Cell<bool>,
    active: Cell<bool>,
    fail_open: Cell<bool>,
    fd: Cell<RawFd>,
    modes: RefCell<Vec<TerminalMode>>,
    unbuffered: Cell<usize>,
    activation_requests: Cell<usize>,
    handlers: RefCell<Vec<(WatchToken, Option<VtChangeHandler>)>>,
    next_watch: Cell<u64>,
}

impl FakeTerminal {
    /// A VT that is in the foreground
    pub fn vt() -> Self {
        Self {
            open: Cell::new(false),
            vt: Cell::new(true),
            active: Cell::new(true),
            fail_open: Cell::new(false),
            fd: Cell::new(0),
            modes: RefCell::new(Vec::new()),
            unbuffered: Cell::new(0),
            activation_requests: Cell::new(0),
            handlers: RefCell::new(Vec::new()),
            next_watch: Cell::new(1),
        }
    }

    pub fn set_vt(&self, vt: bool) {
        self.vt.set(vt);
    }

    pub fn set_active(&self, active: bool) {
        self.active.set(active);
    }

    pub fn set_fd(&self, fd: RawFd) {
        self.fd.set(fd);
    }

    pub fn fail_open(&self) {
        self.fail_open.set(true);
    }

    pub fn modes(&self) -> Vec<TerminalMode> {
        self.modes.borrow().clone()
    }

    pub fn unbuffered_count(&self) -> usize {
        self.unbuffered.get()
    }

    pub fn activation_requests(&self) -> usize {
        self.activation_requests.get()
    }

    pub fn watch_count(&self) -> usize {
        self.handlers.borrow().len()
    }

    /// Move VT focus and notify watchers
    pub fn switch_to(&self, active: bool) {
        self.active.set(active);

        let tokens: Vec<WatchToken> = self.handlers.borrow().iter().map(|(t, _)| *t).collect();
        for token in tokens {
            let handler = self
                .handlers
                .borrow_mut()
                .iter_mut()
                .find(|(t, _)| *t == token)
                .and_then(|(_, h)| h.take());
            let Some(mut handler) = handler else {
                continue;
            };
            handler();
            if let Some(slot) = self.handlers.borrow_mut().iter_mut().find(|(t, _)| *t == token) {
                slot.1 = Some(handler);
            }
        }
    }
}

impl Terminal for FakeTerminal {
    fn open(&self) -> io::Result<()> {
        if self.fail_open.get() {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        self.open.set(true);
        Ok(())
    }

    fn close(&self) {
        self.open.set(false);
    }

    fn is_open(&self) -> bool {
        self.open.get()
    }

    fn is_vt(&self) -> bool {
        self.open.get() && self.vt.get()
    }

    fn is_active(&self) -> bool {
        self.is_vt() && self.active.get()
    }

    fn activate_vt(&self) -> io::Result<()> {
        self.activation_requests.set(self.activation_requests.get() + 1);
        Ok(())
    }

    fn set_mode(&self, mode: TerminalMode) {
        self.modes.borrow_mut().push(mode);
    }

    fn set_unbuffered_input(&self) {
        self.unbuffered.set(self.unbuffered.get() + 1);
    }

    fn fd(&self) -> Option<RawFd> {
        self.open.get().then(|| self.fd.get())
    }

    fn watch_for_active_vt_change(&self, handler: VtChangeHandler) -> WatchToken {
        let token = WatchToken::new(self.next_watch.get());
        self.next_watch.set(token.id() + 1);
        self.handlers.borrow_mut().push((token, Some(handler)));
        token
    }

    fn stop_watching_for_active_vt_change(&self, watch: WatchToken) {
        self.handlers.borrow_mut().retain(|(t, _)| *t != watch);
    }
}

// =============================================================================
// FAKE EVENT LOOP
// =============================================================================

struct FakeWatch {
    token: WatchToken,
    fd: RawFd,
    on_data: Option<FdHandler>,
    on_disconnect: Option<FdHandler>,
}

/// Event loop driven by hand from tests
pub struct FakeEventLoop {
    watches: RefCell<Vec<FakeWatch>>,
    next_watch: Cell<u64>,
}

impl FakeEventLoop {
    pub fn new() -> Self {
        Self {
            watches: RefCell::new(Vec::new()),
            next_watch: Cell::new(1),
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.borrow().len()
    }

    pub fn watched_fds(&self) -> Vec<RawFd> {
        self.watches.borrow().iter().map(|w| w.fd).collect()
    }

    /// Run the data handler of the watch on `fd`
    pub fn deliver_data(&self, fd: RawFd) {
        let taken = self
            .watches
            .borrow_mut()
            .iter_mut()
            .find(|w| w.fd == fd)
            .and_then(|w| w.on_data.take().map(|handler| (w.token, handler)));
        let Some((token, mut handler)) = taken else {
            return;
        };

        handler(fd);

        if let Some(watch) = self.watches.borrow_mut().iter_mut().find(|w| w.token == token) {
            watch.on_data = Some(handler);
        }
    }

    /// Drop the watch on `fd`, then run its disconnect handler
    pub fn disconnect(&self, fd: RawFd) {
        let watch = {
            let mut watches = self.watches.borrow_mut();
            match watches.iter().position(|w| w.fd == fd) {
                Some(index) => watches.remove(index),
                None => return,
            }
        };
        if let Some(mut handler) = watch.on_disconnect {
            handler(fd);
        }
    }
}

impl EventLoop for FakeEventLoop {
    fn watch_fd(&self, fd: RawFd, on_data: FdHandler, on_disconnect: FdHandler) -> WatchToken {
        let token = WatchToken::new(self.next_watch.get());
        self.next_watch.set(token.id() + 1);
        self.watches.borrow_mut().push(FakeWatch {
            token,
            fd,
            on_data: Some(on_data),
            on_disconnect: Some(on_disconnect),
        });
        token
    }

    fn stop_watching_fd(&self, watch: WatchToken) {
        self.watches.borrow_mut().retain(|w| w.token != watch);
    }
}
