//! # vga16fb Renderer Backend
//!
//! Drives the 16-color planar VGA mode as a render target. One head, one
//! input source.
//!
//! ## Modules
//!
//! - `head`: geometry, surface, mapping and palette of the display
//! - `flush`: dirty rectangle to planar write conversion
//! - `input`: terminal keyboard stream
//! - `status`: `DeviceState` reporting
//!
//! ## Lifecycle
//!
//! ```text
//! create ─▶ open_device ─▶ query_device ─▶ map_to_device ─▶ flush_head ...
//!                                              │
//!                     VT focus ──▶ activate / deactivate
//!                                              │
//!            close_device ◀── unmap_from_device
//! ```
//!
//! Flushing only reaches the screen while the backend's VT is in front.
//! Regions drawn while in the background stay dirty and go out with the
//! full redraw on activation.
//!
//! ## Sharing
//!
//! Backend state lives in `Rc<RefCell<_>>`. Terminal and event loop
//! callbacks hold `Weak` references, so dropping the backend ends them.
//! Release any `buffer_for_head` borrow before calling back into the
//! backend.

pub mod flush;
pub mod head;
pub mod input;
pub mod status;

use std::cell::{Cell, RefCell, RefMut};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use log::{debug, trace, warn};

use crate::config::BackendConfig;
use crate::devices::framebuffer::palette::Palette;
use crate::devices::framebuffer::FramebufferDevice;
use crate::devices::terminal::{Terminal, TerminalMode, VtChangeHandler};
use crate::devices::vga::PlanarWriter;
use crate::devices::{Hardware, LinuxHardware};
use crate::error::{Result, Vga16Error};
use crate::events::{EventLoop, WatchToken};
use crate::framebuffer::PixelBuffer;

use flush::FlushTarget;
use head::Head;

pub use head::HeadId;
pub use input::{InputHandler, InputSourceId, KeyBuffer};
pub use status::DeviceState;

/// Operations a splash host drives a renderer through
pub trait RendererBackend {
    fn open_device(&mut self) -> Result<()>;
    fn close_device(&mut self);
    fn query_device(&mut self) -> Result<()>;
    fn map_to_device(&mut self) -> Result<()>;
    fn unmap_from_device(&mut self);
    fn activate(&mut self);
    fn deactivate(&mut self);
    fn flush_head(&mut self, head: HeadId) -> Result<()>;
    fn heads(&self) -> Vec<HeadId>;
    /// The head's surface; `None` for a foreign or uninitialized head
    fn buffer_for_head(&self, head: HeadId) -> Option<RefMut<'_, PixelBuffer>>;
    fn input_source(&self) -> InputSourceId;
    fn has_input_source(&self, source: InputSourceId) -> bool;
    fn open_input_source(&mut self, source: InputSourceId) -> Result<()>;
    fn set_handler_for_input_source(
        &mut self,
        source: InputSourceId,
        handler: InputHandler,
    ) -> Result<()>;
    fn close_input_source(&mut self, source: InputSourceId) -> Result<()>;
}

// =============================================================================
// DEVICE STATE
// =============================================================================

pub(crate) struct BackendState<H: Hardware> {
    hardware: H,
    device_path: PathBuf,
    device: Option<H::Device>,
    writer: Option<PlanarWriter<H::Ports>>,
    head: Head<H::Memory>,
    row_stride: usize,
    is_active: bool,
    terminal: Rc<dyn Terminal>,
    /// Set when a VT change arrived while the state was borrowed
    vt_change_pending: Rc<Cell<bool>>,
}

impl<H: Hardware> BackendState<H> {
    fn new(hardware: H, device_path: PathBuf, terminal: Rc<dyn Terminal>) -> Self {
        Self {
            hardware,
            device_path,
            device: None,
            writer: None,
            head: Head::new(),
            row_stride: 0,
            is_active: false,
            terminal,
            vt_change_pending: Rc::new(Cell::new(false)),
        }
    }

    fn device_state(&self) -> DeviceState {
        if self.device.is_none() {
            DeviceState::Closed
        } else if self.head.is_mapped() {
            DeviceState::Mapped
        } else if self.head.is_initialized() {
            DeviceState::Queried
        } else {
            DeviceState::Opened
        }
    }

    fn open_device(&mut self) -> Result<()> {
        let device = self
            .hardware
            .open_device(&self.device_path)
            .map_err(|source| Vga16Error::DeviceOpen {
                path: self.device_path.clone(),
                source,
            })?;
        self.device = Some(device);
        trace!("opened {}", self.device_path.display());

        self.terminal.open().map_err(Vga16Error::TerminalOpen)?;

        if !self.terminal.is_vt() {
            self.terminal.close();
            return Err(Vga16Error::NotAVirtualTerminal);
        }

        Ok(())
    }

    fn close_device(&mut self) {
        self.head.uninitialize();
        self.head.unmap();
        self.writer = None;

        if self.device.take().is_some() {
            trace!("closed {}", self.device_path.display());
        }

        self.head.area = Rectangle::zero();
        self.head.size = 0;
        self.row_stride = 0;
    }

    fn query_device(&mut self) -> Result<()> {
        let device = self.device.as_ref().ok_or(Vga16Error::DeviceNotOpen)?;
        let var = device
            .variable_screen_info()
            .map_err(Vga16Error::ScreenInfo)?;
        let fix = device.fixed_screen_info().map_err(Vga16Error::ScreenInfo)?;

        if !fix.is_vga16(&var) {
            debug!(
                "{} is not vga16fb: type {}, aux {}, visual {}, {} bpp",
                self.device_path.display(),
                fix.kind,
                fix.type_aux,
                fix.visual,
                var.bits_per_pixel
            );
            return Err(Vga16Error::UnsupportedMode {
                kind: fix.kind,
                aux: fix.type_aux,
                visual: fix.visual,
                bits_per_pixel: var.bits_per_pixel,
            });
        }

        self.head.area = Rectangle::new(
            Point::new(var.xoffset as i32, var.yoffset as i32),
            Size::new(var.xres, var.yres),
        );
        self.row_stride = fix.line_length as usize;
        self.head.size = var.yres as usize * self.row_stride;
        self.head.initialize();

        debug!(
            "vga16fb head {}x{} at ({}, {}), {} bytes per row",
            var.xres, var.yres, var.xoffset, var.yoffset, self.row_stride
        );
        Ok(())
    }

    fn map_to_device(&mut self) -> Result<()> {
        let Some(device) = self.device.as_ref() else {
            return Err(Vga16Error::DeviceNotOpen);
        };
        if !self.head.is_initialized() {
            return Err(Vga16Error::HeadNotInitialized);
        }

        let ports = self
            .hardware
            .request_port_access()
            .map_err(Vga16Error::PortPermission)?;
        let mapping = self
            .hardware
            .map(device, self.head.size)
            .map_err(Vga16Error::Map)?;

        self.writer = Some(PlanarWriter::new(ports));
        self.head.mapping = Some(mapping);
        trace!("mapped {} bytes of video memory", self.head.size);

        if self.terminal.is_active() {
            self.activate();
        } else if let Err(err) = self.terminal.activate_vt() {
            warn!("could not switch to the splash VT: {}", err);
        }

        Ok(())
    }

    fn activate(&mut self) {
        self.is_active = true;
        if self.head.is_mapped() {
            self.redraw();
        }
    }

    fn deactivate(&mut self) {
        self.is_active = false;
    }

    fn on_active_vt_changed(&mut self) {
        if self.terminal.is_active() {
            trace!("VT became active, activating");
            self.activate();
        } else {
            trace!("VT became inactive, deactivating");
            self.deactivate();
        }
    }

    fn apply_pending_vt_change(&mut self) {
        if self.vt_change_pending.take() {
            trace!("applying deferred VT change");
            self.on_active_vt_changed();
        }
    }

    /// Mark the whole surface dirty and flush it. The surface starts at
    /// the origin even when the mode is panned, so its bounds are used
    /// rather than the head area.
    fn redraw(&mut self) {
        if let Some(buffer) = self.head.pixel_buffer.as_mut() {
            let bounds = buffer.bounds();
            buffer.updated_areas_mut().add_rectangle(&bounds);
        }
        self.flush_head();
    }

    fn flush_head(&mut self) {
        self.apply_pending_vt_change();
        if !self.is_active {
            return;
        }

        let head = &mut self.head;
        let (Some(buffer), Some(memory), Some(writer)) = (
            head.pixel_buffer.as_mut(),
            head.mapping.as_mut(),
            self.writer.as_mut(),
        ) else {
            trace!("head is not mapped, nothing to flush");
            return;
        };

        self.terminal.set_mode(TerminalMode::Graphics);
        self.terminal.set_unbuffered_input();

        let mut target = FlushTarget {
            device: self.device.as_ref(),
            palette: &mut head.palette,
            writer,
            memory,
            row_stride: self.row_stride,
        };
        target.flush_updated_areas(buffer);
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// Renderer for a vga16fb framebuffer
pub struct Vga16Backend<H: Hardware = LinuxHardware> {
    state: Rc<RefCell<BackendState<H>>>,
    input: input::InputSource,
    terminal: Rc<dyn Terminal>,
    event_loop: Rc<dyn EventLoop>,
    vt_watch: Option<WatchToken>,
}

impl Vga16Backend<LinuxHardware> {
    /// `device_name` overrides `FRAMEBUFFER` and `/dev/fb0`
    pub fn new(
        device_name: Option<&Path>,
        terminal: Rc<dyn Terminal>,
        event_loop: Rc<dyn EventLoop>,
    ) -> Self {
        Self::with_hardware(
            LinuxHardware,
            BackendConfig::from_env(device_name),
            terminal,
            event_loop,
        )
    }
}

impl<H: Hardware> Vga16Backend<H> {
    pub fn with_hardware(
        hardware: H,
        config: BackendConfig,
        terminal: Rc<dyn Terminal>,
        event_loop: Rc<dyn EventLoop>,
    ) -> Self {
        trace!("creating renderer backend for {}", config.device_path.display());
        Self {
            state: Rc::new(RefCell::new(BackendState::new(
                hardware,
                config.device_path,
                terminal.clone(),
            ))),
            input: input::InputSource::new(),
            terminal,
            event_loop,
            vt_watch: None,
        }
    }

    pub fn destroy(self) {
        drop(self);
    }

    pub fn device_path(&self) -> PathBuf {
        self.state.borrow().device_path.clone()
    }

    pub fn state(&self) -> DeviceState {
        self.state.borrow().device_state()
    }

    pub fn is_active(&self) -> bool {
        let mut state = self.state.borrow_mut();
        state.apply_pending_vt_change();
        state.is_active
    }

    pub fn head_area(&self) -> Rectangle {
        self.state.borrow().head.area()
    }

    pub fn palette(&self) -> Palette {
        self.state.borrow().head.palette().clone()
    }

    pub fn row_stride(&self) -> usize {
        self.state.borrow().row_stride
    }

    fn head_id(&self) -> HeadId {
        HeadId(Rc::as_ptr(&self.state) as *const () as usize)
    }

    fn check_head(&self, head: HeadId) -> Result<()> {
        if head != self.head_id() {
            return Err(Vga16Error::InvalidHead);
        }
        Ok(())
    }

    fn check_input_source(&self, source: InputSourceId) -> Result<()> {
        if !self.has_input_source(source) {
            return Err(Vga16Error::InvalidInputSource);
        }
        Ok(())
    }

    fn watch_for_active_vt_change(&mut self) {
        self.stop_watching_for_active_vt_change();

        let pending = self.state.borrow().vt_change_pending.clone();
        let state = Rc::downgrade(&self.state);
        let handler: VtChangeHandler = Box::new(move || {
            let Some(state) = state.upgrade() else {
                return;
            };
            let Ok(mut state) = state.try_borrow_mut() else {
                debug!("VT change while the backend is busy, deferring");
                pending.set(true);
                return;
            };
            state.vt_change_pending.set(false);
            state.on_active_vt_changed();
        });
        self.vt_watch = Some(self.terminal.watch_for_active_vt_change(handler));
    }

    fn stop_watching_for_active_vt_change(&mut self) {
        if let Some(watch) = self.vt_watch.take() {
            self.terminal.stop_watching_for_active_vt_change(watch);
        }
    }
}

impl<H: Hardware> RendererBackend for Vga16Backend<H> {
    fn open_device(&mut self) -> Result<()> {
        self.state.borrow_mut().open_device()?;
        self.watch_for_active_vt_change();
        Ok(())
    }

    fn close_device(&mut self) {
        self.stop_watching_for_active_vt_change();
        self.state.borrow_mut().close_device();
    }

    fn query_device(&mut self) -> Result<()> {
        self.state.borrow_mut().query_device()
    }

    fn map_to_device(&mut self) -> Result<()> {
        self.state.borrow_mut().map_to_device()
    }

    fn unmap_from_device(&mut self) {
        self.state.borrow_mut().head.unmap();
    }

    fn activate(&mut self) {
        let mut state = self.state.borrow_mut();
        state.vt_change_pending.set(false);
        state.activate();
    }

    fn deactivate(&mut self) {
        let mut state = self.state.borrow_mut();
        state.vt_change_pending.set(false);
        state.deactivate();
    }

    fn flush_head(&mut self, head: HeadId) -> Result<()> {
        self.check_head(head)?;
        self.state.borrow_mut().flush_head();
        Ok(())
    }

    fn heads(&self) -> Vec<HeadId> {
        if self.state.borrow().head.is_initialized() {
            vec![self.head_id()]
        } else {
            Vec::new()
        }
    }

    fn buffer_for_head(&self, head: HeadId) -> Option<RefMut<'_, PixelBuffer>> {
        if head != self.head_id() {
            return None;
        }
        RefMut::filter_map(self.state.borrow_mut(), |state| {
            state.head.pixel_buffer.as_mut()
        })
        .ok()
    }

    fn input_source(&self) -> InputSourceId {
        self.input.id()
    }

    fn has_input_source(&self, source: InputSourceId) -> bool {
        source == self.input.id()
    }

    fn open_input_source(&mut self, source: InputSourceId) -> Result<()> {
        self.check_input_source(source)?;
        let fd = self.terminal.fd().ok_or(Vga16Error::TerminalNotOpen)?;
        self.input.open(&self.event_loop, fd);
        trace!("watching terminal fd {} for input", fd);
        Ok(())
    }

    fn set_handler_for_input_source(
        &mut self,
        source: InputSourceId,
        handler: InputHandler,
    ) -> Result<()> {
        self.check_input_source(source)?;
        self.input.set_handler(handler);
        Ok(())
    }

    fn close_input_source(&mut self, source: InputSourceId) -> Result<()> {
        self.check_input_source(source)?;
        self.input.close(&*self.event_loop);
        Ok(())
    }
}

impl<H: Hardware> Drop for Vga16Backend<H> {
    fn drop(&mut self) {
        trace!("destroying renderer backend");
        self.stop_watching_for_active_vt_change();
        self.input.close(&*self.event_loop);

        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.head.uninitialize();
            state.head.unmap();
        }
    }
}

/// Create a backend for the Linux vga16fb device
pub fn create_backend(
    device_name: Option<&Path>,
    terminal: Rc<dyn Terminal>,
    event_loop: Rc<dyn EventLoop>,
) -> Vga16Backend {
    Vga16Backend::new(device_name, terminal, event_loop)
}
