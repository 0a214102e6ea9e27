//! # vga16fb
//!
//! Renderer backend for the Linux `vga16fb` framebuffer: 640x480 (or
//! similar) in 16 colors, 4 bit planes, driven through the VGA graphics
//! controller.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ host: draws into the head's PixelBuffer, calls flush_head    │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │ RendererBackend
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │ backend: lifecycle, palette assignment, planar flush, input  │
//! └──────┬──────────────────┬──────────────────────┬─────────────┘
//!        │                  │                      │
//! ┌──────▼───────┐  ┌───────▼────────┐   ┌─────────▼──────────┐
//! │ framebuffer  │  │ devices        │   │ events             │
//! │ PixelBuffer  │  │ fbdev, VGA     │   │ fd watches         │
//! │ Region       │  │ ports, VT      │   │ poll(2) loop       │
//! └──────────────┘  └────────────────┘   └────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use std::rc::Rc;
//! use vga16fb::{create_backend, PollEventLoop, RendererBackend, VirtualTerminal};
//!
//! let terminal = Rc::new(VirtualTerminal::new("/dev/tty1"));
//! let event_loop = Rc::new(PollEventLoop::new());
//! let mut backend = create_backend(None, terminal, event_loop);
//!
//! backend.open_device()?;
//! backend.query_device()?;
//! backend.map_to_device()?;
//!
//! let head = backend.heads()[0];
//! if let Some(mut buffer) = backend.buffer_for_head(head) {
//!     buffer.fill_with_color(None, 0.0, 0.0, 0.5, 1.0);
//! }
//! backend.flush_head(head)?;
//! # Ok::<(), vga16fb::Vga16Error>(())
//! ```

pub mod backend;
pub mod config;
pub mod devices;
pub mod error;
pub mod events;
pub mod framebuffer;
pub mod splash;

#[cfg(test)]
mod testing;

pub use backend::{
    create_backend, DeviceState, HeadId, InputHandler, InputSourceId, KeyBuffer, RendererBackend,
    Vga16Backend,
};
pub use config::BackendConfig;
pub use devices::terminal::{Terminal, TerminalMode, VirtualTerminal};
pub use devices::{Hardware, LinuxHardware};
pub use error::{Result, Vga16Error};
pub use events::{EventLoop, PollEventLoop, WatchToken};
pub use framebuffer::{PixelBuffer, Region};
