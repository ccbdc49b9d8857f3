//! Controlling terminal access
//!
//! The shell touches its terminal through the [`Terminal`] trait: attribute
//! get/set (`tcgetattr`/`tcsetattr`) and foreground process group get/set
//! (`tcgetpgrp`/`tcsetpgrp`). [`Tty`] is the real device; tests substitute an
//! in-memory terminal so several sessions can run side by side.

use nix::errno::Errno;
use nix::sys::termios::{self, SetArg, Termios};
use nix::unistd::{self, Pid};
use std::fmt;
use std::io::{self, IsTerminal};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

/// Which terminal primitive failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOp {
    GetAttributes,
    SetAttributes,
    GetForeground,
    SetForeground,
}

impl fmt::Display for TerminalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminalOp::GetAttributes => "tcgetattr",
            TerminalOp::SetAttributes => "tcsetattr",
            TerminalOp::GetForeground => "tcgetpgrp",
            TerminalOp::SetForeground => "tcsetpgrp",
        })
    }
}

/// A terminal syscall failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalError {
    pub op: TerminalOp,
    pub errno: Errno,
}

impl TerminalError {
    pub fn new(op: TerminalOp, errno: Errno) -> Self {
        Self { op, errno }
    }
}

impl fmt::Display for TerminalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.op, self.errno)
    }
}

impl std::error::Error for TerminalError {}

/// The shell's controlling terminal.
pub trait Terminal {
    /// Full attribute set of the device, captured byte for byte.
    type Attributes: Clone + fmt::Debug;

    fn attributes(&self) -> Result<Self::Attributes, TerminalError>;

    fn set_attributes(&self, attrs: &Self::Attributes) -> Result<(), TerminalError>;

    fn foreground_group(&self) -> Result<Pid, TerminalError>;

    fn set_foreground_group(&self, pgid: Pid) -> Result<(), TerminalError>;

    /// Descriptor a child can use before `exec` to claim the terminal.
    /// `None` for terminals that are not backed by a real device.
    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}

/// The real controlling terminal, reached through a private duplicate of
/// stdin so redirections of fd 0 never affect it.
#[derive(Debug)]
pub struct Tty {
    fd: OwnedFd,
}

impl Tty {
    /// Open the terminal on stdin, or `None` when stdin is not a terminal
    /// (the shell is then non-interactive).
    pub fn from_stdin() -> io::Result<Option<Self>> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(None);
        }
        // try_clone_to_owned sets FD_CLOEXEC, so jobs never inherit it.
        let fd = stdin.as_fd().try_clone_to_owned()?;
        Ok(Some(Self { fd }))
    }
}

impl Terminal for Tty {
    type Attributes = Termios;

    fn attributes(&self) -> Result<Termios, TerminalError> {
        termios::tcgetattr(&self.fd).map_err(|e| TerminalError::new(TerminalOp::GetAttributes, e))
    }

    fn set_attributes(&self, attrs: &Termios) -> Result<(), TerminalError> {
        termios::tcsetattr(&self.fd, SetArg::TCSADRAIN, attrs)
            .map_err(|e| TerminalError::new(TerminalOp::SetAttributes, e))
    }

    fn foreground_group(&self) -> Result<Pid, TerminalError> {
        unistd::tcgetpgrp(&self.fd).map_err(|e| TerminalError::new(TerminalOp::GetForeground, e))
    }

    fn set_foreground_group(&self, pgid: Pid) -> Result<(), TerminalError> {
        unistd::tcsetpgrp(&self.fd, pgid)
            .map_err(|e| TerminalError::new(TerminalOp::SetForeground, e))
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.fd.as_raw_fd())
    }
}
