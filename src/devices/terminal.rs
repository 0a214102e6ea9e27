//! # Virtual Terminal Control
//!
//! The renderer needs a few things from the console it draws over: to know
//! whether its VT is in the foreground, to switch the VT into graphics mode
//! so the kernel stops drawing text, unbuffered keyboard input, and a
//! notification when VT focus moves.
//!
//! ## VT Focus
//!
//! ```text
//! VT_GETSTATE ──▶ v_active == our VT ? ──▶ changed since last poll?
//!                                               │ yes
//!                                               ▼
//!                                      run watch handlers
//! ```
//!
//! `VirtualTerminal` samples focus in `poll_active_vt`, which the host
//! calls from its loop.

use std::cell::{Cell, RefCell};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use libc::{c_int, c_ulong};
use log::{trace, warn};

use crate::events::WatchToken;

const KDSETMODE: c_ulong = 0x4B3A;
const KDGETMODE: c_ulong = 0x4B3B;
const KD_TEXT: c_int = 0x00;
const KD_GRAPHICS: c_int = 0x01;

const VT_GETSTATE: c_ulong = 0x5603;
const VT_ACTIVATE: c_ulong = 0x5606;

const TTY_MAJOR: u64 = 4;
const MAX_VT_MINOR: u64 = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    Text,
    Graphics,
}

pub type VtChangeHandler = Box<dyn FnMut()>;

/// Console control used by the renderer. Methods take `&self`: the
/// terminal is shared with the host.
pub trait Terminal {
    fn open(&self) -> io::Result<()>;
    fn close(&self);
    fn is_open(&self) -> bool;
    fn is_vt(&self) -> bool;
    /// Whether this terminal's VT is the foreground one
    fn is_active(&self) -> bool;
    /// Request a switch to this terminal's VT
    fn activate_vt(&self) -> io::Result<()>;
    fn set_mode(&self, mode: TerminalMode);
    fn set_unbuffered_input(&self);
    fn fd(&self) -> Option<RawFd>;
    fn watch_for_active_vt_change(&self, handler: VtChangeHandler) -> WatchToken;
    fn stop_watching_for_active_vt_change(&self, watch: WatchToken);
}

#[repr(C)]
#[derive(Default)]
struct VtStat {
    v_active: u16,
    v_signal: u16,
    v_state: u16,
}

struct Tty {
    file: File,
    vt_number: Option<u16>,
    saved_termios: Option<libc::termios>,
    saved_mode: c_int,
}

pub struct VirtualTerminal {
    path: PathBuf,
    tty: RefCell<Option<Tty>>,
    mode: Cell<Option<TerminalMode>>,
    last_active: Cell<Option<bool>>,
    handlers: RefCell<Vec<(WatchToken, Option<VtChangeHandler>)>>,
    next_watch: Cell<u64>,
}

impl VirtualTerminal {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            tty: RefCell::new(None),
            mode: Cell::new(None),
            last_active: Cell::new(None),
            handlers: RefCell::new(Vec::new()),
            next_watch: Cell::new(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample VT focus and run the watch handlers if it moved
    pub fn poll_active_vt(&self) {
        let active = self.is_active();
        let previous = self.last_active.replace(Some(active));
        if previous.is_none() || previous == Some(active) {
            return;
        }

        trace!("active VT changed, {} is now {}", self.path.display(),
            if active { "active" } else { "inactive" });

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

    fn raw_fd(&self) -> Option<RawFd> {
        self.tty.borrow().as_ref().map(|tty| tty.file.as_raw_fd())
    }

    fn vt_number(&self) -> Option<u16> {
        self.tty.borrow().as_ref().and_then(|tty| tty.vt_number)
    }

    fn active_vt(fd: RawFd) -> io::Result<u16> {
        let mut state = VtStat::default();
        ioctl_ptr(fd, VT_GETSTATE, &mut state)?;
        Ok(state.v_active)
    }
}

fn ioctl_ptr<T>(fd: RawFd, request: c_ulong, arg: *mut T) -> io::Result<()> {
    if unsafe { libc::ioctl(fd, request as _, arg) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn ioctl_value(fd: RawFd, request: c_ulong, value: c_int) -> io::Result<()> {
    if unsafe { libc::ioctl(fd, request as _, value as libc::c_long) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn dev_major(rdev: u64) -> u64 {
    ((rdev >> 8) & 0xFFF) | ((rdev >> 32) & !0xFFF)
}

fn dev_minor(rdev: u64) -> u64 {
    (rdev & 0xFF) | ((rdev >> 12) & !0xFF)
}

impl Terminal for VirtualTerminal {
    fn open(&self) -> io::Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(&self.path)?;
        let fd = file.as_raw_fd();

        let rdev = file.metadata()?.rdev();
        let vt_number = if dev_major(rdev) == TTY_MAJOR && dev_minor(rdev) <= MAX_VT_MINOR {
            match dev_minor(rdev) {
                // tty0 follows whichever VT is in front
                0 => Self::active_vt(fd).ok(),
                minor => Some(minor as u16),
            }
        } else {
            None
        };

        let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
        let saved_termios = if unsafe { libc::tcgetattr(fd, &mut termios) } == 0 {
            Some(termios)
        } else {
            None
        };

        let mut saved_mode: c_int = KD_TEXT;
        if vt_number.is_some() {
            if let Err(err) = ioctl_ptr(fd, KDGETMODE, &mut saved_mode) {
                warn!("could not read KD mode of {}: {}", self.path.display(), err);
            }
        }

        trace!("opened terminal {} (vt {:?})", self.path.display(), vt_number);
        *self.tty.borrow_mut() = Some(Tty {
            file,
            vt_number,
            saved_termios,
            saved_mode,
        });
        self.last_active.set(None);
        self.poll_active_vt();
        Ok(())
    }

    fn close(&self) {
        let Some(tty) = self.tty.borrow_mut().take() else {
            return;
        };
        let fd = tty.file.as_raw_fd();

        if tty.vt_number.is_some() {
            if let Err(err) = ioctl_value(fd, KDSETMODE, tty.saved_mode) {
                warn!("could not restore KD mode: {}", err);
            }
        }
        if let Some(termios) = tty.saved_termios {
            unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
        }

        self.mode.set(None);
        self.last_active.set(None);
        trace!("closed terminal {}", self.path.display());
    }

    fn is_open(&self) -> bool {
        self.tty.borrow().is_some()
    }

    fn is_vt(&self) -> bool {
        self.vt_number().is_some()
    }

    fn is_active(&self) -> bool {
        let (Some(fd), Some(vt)) = (self.raw_fd(), self.vt_number()) else {
            return false;
        };
        Self::active_vt(fd).map(|active| active == vt).unwrap_or(false)
    }

    fn activate_vt(&self) -> io::Result<()> {
        let (Some(fd), Some(vt)) = (self.raw_fd(), self.vt_number()) else {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "terminal is not an open VT"));
        };
        ioctl_value(fd, VT_ACTIVATE, vt as c_int)
    }

    fn set_mode(&self, mode: TerminalMode) {
        if self.mode.get() == Some(mode) {
            return;
        }
        let Some(fd) = self.raw_fd().filter(|_| self.is_vt()) else {
            return;
        };

        let value = match mode {
            TerminalMode::Text => KD_TEXT,
            TerminalMode::Graphics => KD_GRAPHICS,
        };
        match ioctl_value(fd, KDSETMODE, value) {
            Ok(()) => self.mode.set(Some(mode)),
            Err(err) => warn!("could not set terminal mode {:?}: {}", mode, err),
        }
    }

    fn set_unbuffered_input(&self) {
        let Some(fd) = self.raw_fd() else {
            return;
        };

        let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
        if unsafe { libc::tcgetattr(fd, &mut termios) } != 0 {
            return;
        }
        unsafe { libc::cfmakeraw(&mut termios) };
        // Keep output post-processing so newlines still return the carriage.
        termios.c_oflag |= libc::OPOST;
        termios.c_cc[libc::VMIN] = 1;
        termios.c_cc[libc::VTIME] = 0;

        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
            warn!("could not set unbuffered input: {}", io::Error::last_os_error());
        }
    }

    fn fd(&self) -> Option<RawFd> {
        self.raw_fd()
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

impl Drop for VirtualTerminal {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_number_split() {
        // /dev/tty1 is 4:1, /dev/ttyS0 is 4:64
        assert_eq!((dev_major(0x0401), dev_minor(0x0401)), (4, 1));
        assert_eq!((dev_major(0x0440), dev_minor(0x0440)), (4, 64));
        // /dev/pts/300 is 136:300 in the extended encoding
        let rdev = (136 << 8) | (300 & 0xFF) | ((300 & !0xFF) << 12);
        assert_eq!((dev_major(rdev), dev_minor(rdev)), (136, 300));
    }

    #[test]
    fn regular_file_is_not_a_vt() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        let terminal = VirtualTerminal::new(file.path());
        terminal.open().expect("open");

        assert!(terminal.is_open());
        assert!(!terminal.is_vt());
        assert!(!terminal.is_active());
        assert!(terminal.activate_vt().is_err());

        terminal.close();
        assert!(!terminal.is_open());
        assert_eq!(terminal.fd(), None);
    }

    #[test]
    fn missing_terminal_fails_to_open() {
        let terminal = VirtualTerminal::new("/nonexistent/tty1");
        assert!(terminal.open().is_err());
        assert!(!terminal.is_open());
    }

    #[test]
    fn cancelled_handlers_are_dropped() {
        let terminal = VirtualTerminal::new("/dev/null");
        let first = terminal.watch_for_active_vt_change(Box::new(|| {}));
        let second = terminal.watch_for_active_vt_change(Box::new(|| {}));
        assert_ne!(first, second);

        terminal.stop_watching_for_active_vt_change(first);
        assert_eq!(terminal.handlers.borrow().len(), 1);
    }
}
