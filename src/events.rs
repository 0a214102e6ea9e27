//! # Event Subscriptions
//!
//! Cooperative, single-threaded callback registration.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  watch_fd(fd, on_data, on_disconnect)  ┌───────────┐
//! │  Renderer    │───────────────────────────────────────▶│ EventLoop │
//! │  (input)     │◀──────────── WatchToken ───────────────│           │
//! └──────────────┘                                        └─────┬─────┘
//!        ▲                                                      │ poll(2)
//!        └──────────── on_data(fd) / on_disconnect(fd) ─────────┘
//! ```
//!
//! Callbacks run synchronously on the loop's thread. A token cancels its
//! watch; a disconnect drops the watch before its handler runs, so the
//! handler may register a fresh one.

use std::cell::{Cell, RefCell};
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use log::trace;

/// Identifies one registration; used to cancel it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(u64);

impl WatchToken {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

pub type FdHandler = Box<dyn FnMut(RawFd)>;

/// Readable-fd watch registration
pub trait EventLoop {
    fn watch_fd(&self, fd: RawFd, on_data: FdHandler, on_disconnect: FdHandler) -> WatchToken;
    fn stop_watching_fd(&self, watch: WatchToken);
}

struct FdWatch {
    token: WatchToken,
    fd: RawFd,
    on_data: Option<FdHandler>,
    on_disconnect: Option<FdHandler>,
}

/// `poll(2)`-based event loop
pub struct PollEventLoop {
    watches: RefCell<Vec<FdWatch>>,
    next_id: Cell<u64>,
}

impl PollEventLoop {
    pub const fn new() -> Self {
        Self {
            watches: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    pub fn watch_count(&self) -> usize {
        self.watches.borrow().len()
    }

    /// Wait up to `timeout` (forever if `None`) and dispatch whatever became
    /// ready. Returns the number of handlers run.
    pub fn run_once(&self, timeout: Option<Duration>) -> io::Result<usize> {
        let (tokens, mut pollfds): (Vec<WatchToken>, Vec<libc::pollfd>) = self
            .watches
            .borrow()
            .iter()
            .map(|watch| {
                let pollfd = libc::pollfd {
                    fd: watch.fd,
                    events: libc::POLLIN,
                    revents: 0,
                };
                (watch.token, pollfd)
            })
            .unzip();

        let timeout_ms = timeout
            .map(|t| t.as_millis().min(libc::c_int::MAX as u128) as libc::c_int)
            .unwrap_or(-1);

        let ready = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }

        let mut dispatched = 0;
        for (token, pollfd) in tokens.into_iter().zip(pollfds) {
            if pollfd.revents & libc::POLLIN != 0 && self.dispatch_data(token, pollfd.fd) {
                dispatched += 1;
            }
            if pollfd.revents & (libc::POLLHUP | libc::POLLERR | libc::POLLNVAL) != 0
                && self.dispatch_disconnect(token, pollfd.fd)
            {
                dispatched += 1;
            }
        }
        Ok(dispatched)
    }

    fn dispatch_data(&self, token: WatchToken, fd: RawFd) -> bool {
        let handler = self
            .watches
            .borrow_mut()
            .iter_mut()
            .find(|w| w.token == token)
            .and_then(|w| w.on_data.take());
        let Some(mut handler) = handler else {
            return false;
        };

        handler(fd);

        // The handler may have cancelled its own watch.
        if let Some(watch) = self.watches.borrow_mut().iter_mut().find(|w| w.token == token) {
            watch.on_data = Some(handler);
        }
        true
    }

    fn dispatch_disconnect(&self, token: WatchToken, fd: RawFd) -> bool {
        let watch = {
            let mut watches = self.watches.borrow_mut();
            match watches.iter().position(|w| w.token == token) {
                Some(index) => watches.remove(index),
                None => return false,
            }
        };

        trace!("fd {} disconnected", fd);
        match watch.on_disconnect {
            Some(mut handler) => {
                handler(fd);
                true
            }
            None => false,
        }
    }
}

impl Default for PollEventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop for PollEventLoop {
    fn watch_fd(&self, fd: RawFd, on_data: FdHandler, on_disconnect: FdHandler) -> WatchToken {
        let token = WatchToken::new(self.next_id.get());
        self.next_id.set(token.id() + 1);

        self.watches.borrow_mut().push(FdWatch {
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
