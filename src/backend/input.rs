//! # Terminal Input
//!
//! The backend exposes exactly one input source: the keyboard byte stream
//! of its terminal.
//!
//! ```text
//! terminal fd ──readable──▶ KeyBuffer::append_from_fd ──▶ caller handler
//!      │
//!      └──hangup──▶ watch dropped by the loop ──▶ watch registered again
//! ```
//!
//! Handlers receive the buffer and consume what they understand; bytes
//! left behind are still there on the next event.

use std::cell::RefCell;
use std::io;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

use log::{debug, trace, warn};

use crate::events::{EventLoop, FdHandler, WatchToken};

const READ_CHUNK: usize = 4096;

/// Bytes read from the terminal and not yet consumed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBuffer {
    bytes: Vec<u8>,
}

impl KeyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Read whatever is available on `fd`, up to one chunk.
    /// Returns the number of bytes appended.
    pub fn append_from_fd(&mut self, fd: RawFd) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = unsafe { libc::read(fd, chunk.as_mut_ptr().cast(), chunk.len()) };
        if read < 0 {
            return Err(io::Error::last_os_error());
        }

        let read = read as usize;
        self.bytes.extend_from_slice(&chunk[..read]);
        Ok(read)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Drop the first `count` bytes (all of them if fewer are buffered)
    pub fn remove_front(&mut self, count: usize) {
        let count = count.min(self.bytes.len());
        self.bytes.drain(..count);
    }
}

/// Handle the host uses to name the input source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputSourceId(pub(crate) usize);

pub type InputHandler = Box<dyn FnMut(&mut KeyBuffer)>;

#[derive(Default)]
pub(crate) struct InputState {
    key_buffer: KeyBuffer,
    handler: Option<InputHandler>,
    watch: Option<WatchToken>,
}

pub(crate) struct InputSource {
    state: Rc<RefCell<InputState>>,
}

impl InputSource {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(InputState::default())),
        }
    }

    pub fn id(&self) -> InputSourceId {
        InputSourceId(Rc::as_ptr(&self.state) as *const () as usize)
    }

    pub fn is_open(&self) -> bool {
        self.state.borrow().watch.is_some()
    }

    pub fn set_handler(&self, handler: InputHandler) {
        self.state.borrow_mut().handler = Some(handler);
    }

    pub fn buffered(&self) -> usize {
        self.state.borrow().key_buffer.len()
    }

    /// Start delivering bytes from `fd`; an existing watch is replaced
    pub fn open(&self, event_loop: &Rc<dyn EventLoop>, fd: RawFd) {
        if let Some(watch) = self.state.borrow_mut().watch.take() {
            event_loop.stop_watching_fd(watch);
        }
        watch_terminal_input(&self.state, event_loop, fd);
    }

    pub fn close(&self, event_loop: &dyn EventLoop) {
        let watch = self.state.borrow_mut().watch.take();
        if let Some(watch) = watch {
            event_loop.stop_watching_fd(watch);
            trace!("stopped watching terminal input");
        }
    }
}

fn watch_terminal_input(state: &Rc<RefCell<InputState>>, event_loop: &Rc<dyn EventLoop>, fd: RawFd) {
    let on_data: FdHandler = {
        let state = Rc::downgrade(state);
        Box::new(move |fd| {
            if let Some(state) = state.upgrade() {
                on_key_event(&state, fd);
            }
        })
    };

    let on_disconnect: FdHandler = {
        let state = Rc::downgrade(state);
        let event_loop: Weak<dyn EventLoop> = Rc::downgrade(event_loop);
        Box::new(move |fd| {
            let (Some(state), Some(event_loop)) = (state.upgrade(), event_loop.upgrade()) else {
                return;
            };
            debug!("terminal input disconnected, watching fd {} again", fd);
            state.borrow_mut().watch = None;
            watch_terminal_input(&state, &event_loop, fd);
        })
    };

    let watch = event_loop.watch_fd(fd, on_data, on_disconnect);
    state.borrow_mut().watch = Some(watch);
}

fn on_key_event(state: &Rc<RefCell<InputState>>, fd: RawFd) {
    let taken = {
        let mut input = state.borrow_mut();
        if let Err(err) = input.key_buffer.append_from_fd(fd) {
            if err.kind() != io::ErrorKind::WouldBlock {
                warn!("could not read terminal input: {}", err);
            }
        }

        match input.handler.take() {
            Some(handler) => Some((handler, std::mem::take(&mut input.key_buffer))),
            None => None,
        }
    };
    let Some((mut handler, mut key_buffer)) = taken else {
        return;
    };

    // No borrow is held here: the handler may reach back into the backend.
    handler(&mut key_buffer);

    let mut input = state.borrow_mut();
    key_buffer.append_bytes(input.key_buffer.bytes());
    input.key_buffer = key_buffer;
    if input.handler.is_none() {
        input.handler = Some(handler);
    }
}
