//! Local terminal control
//!
//! Puts the local terminal into raw mode for the lifetime of a TTY session
//! and makes sure the previous mode is put back exactly once, whichever
//! exit path gets there first.

use crate::{DocksideError, Result};
use nix::sys::termios::{cfmakeraw, tcgetattr, tcsetattr, SetArg, Termios};
use std::io::IsTerminal;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::{Arc, Mutex, Once};

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl TerminalSize {
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// A 0x0 size means the size is unknown
    pub fn is_empty(&self) -> bool {
        self.rows == 0 && self.cols == 0
    }
}

/// Borrow a raw descriptor for the duration of a call
fn borrow_fd(fd: RawFd) -> BorrowedFd<'static> {
    // SAFETY: only used with the process's standard descriptors, which stay
    // open for the whole life of the process.
    unsafe { BorrowedFd::borrow_raw(fd) }
}

/// Whether a descriptor refers to a terminal
pub fn is_terminal(fd: RawFd) -> bool {
    borrow_fd(fd).is_terminal()
}

/// Query the window size of a terminal
pub fn terminal_size(fd: RawFd) -> Option<TerminalSize> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    // SAFETY: TIOCGWINSZ writes a `winsize` into the pointer we pass.
    let ret = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) };
    if ret != 0 {
        return None;
    }

    let size = TerminalSize::new(ws.ws_row, ws.ws_col);
    if size.is_empty() {
        None
    } else {
        Some(size)
    }
}

/// Refuse a TTY session whose input is not a terminal.
///
/// Piping or redirecting stdin is incompatible with `-t` when stdin is
/// attached.
pub fn check_tty_input(attach_stdin: bool, tty: bool, stdin_is_terminal: bool) -> Result<()> {
    if tty && attach_stdin && !stdin_is_terminal {
        return Err(DocksideError::Terminal(
            "cannot enable tty mode on non tty input".to_string(),
        ));
    }
    Ok(())
}

/// Switching the local terminal in and out of raw mode
pub trait TerminalControl: Send + Sync {
    /// Enter raw mode, remembering the current mode
    fn set_raw(&self) -> Result<()>;

    /// Return to the remembered mode; a no-op if nothing was remembered
    fn restore(&self) -> Result<()>;
}

/// Raw mode on a real terminal descriptor
pub struct RawTerminal {
    fd: RawFd,
    saved: Mutex<Option<Termios>>,
}

impl RawTerminal {
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            saved: Mutex::new(None),
        }
    }

    /// Raw mode on the process's stdin
    pub fn stdin() -> Self {
        Self::new(libc::STDIN_FILENO)
    }
}

impl TerminalControl for RawTerminal {
    fn set_raw(&self) -> Result<()> {
        let fd = borrow_fd(self.fd);
        let original = tcgetattr(fd)
            .map_err(|e| DocksideError::Terminal(format!("failed to read terminal mode: {}", e)))?;

        let mut raw = original.clone();
        cfmakeraw(&mut raw);
        tcsetattr(fd, SetArg::TCSANOW, &raw)
            .map_err(|e| DocksideError::Terminal(format!("failed to set raw mode: {}", e)))?;

        let mut saved = self
            .saved
            .lock()
            .map_err(|_| DocksideError::Terminal("terminal state lock poisoned".to_string()))?;
        if saved.is_none() {
            *saved = Some(original);
        }
        tracing::debug!("Terminal {} set to raw mode", self.fd);
        Ok(())
    }

    fn restore(&self) -> Result<()> {
        let original = self
            .saved
            .lock()
            .map_err(|_| DocksideError::Terminal("terminal state lock poisoned".to_string()))?
            .take();

        if let Some(original) = original {
            tcsetattr(borrow_fd(self.fd), SetArg::TCSANOW, &original).map_err(|e| {
                DocksideError::Terminal(format!("failed to restore terminal: {}", e))
            })?;
            tracing::debug!("Terminal {} restored", self.fd);
        }
        Ok(())
    }
}

/// Restores a terminal at most once across any number of callers
pub struct RestoreOnce {
    terminal: Arc<dyn TerminalControl>,
    once: Once,
}

impl RestoreOnce {
    pub fn new(terminal: Arc<dyn TerminalControl>) -> Self {
        Self {
            terminal,
            once: Once::new(),
        }
    }

    pub fn restore(&self) {
        self.once.call_once(|| {
            if let Err(e) = self.terminal.restore() {
                tracing::debug!("Error restoring terminal: {}", e);
            }
        });
    }
}

/// Restores the terminal when dropped
pub struct RestoreGuard(pub Arc<RestoreOnce>);

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        self.0.restore();
    }
}
