//! Child-state-change notifications
//!
//! The SIGCHLD handler only raises a flag. Reaping with `waitpid` and
//! everything that follows from it happens in the main loop.

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering};

static CHILD_STATE_CHANGED: AtomicBool = AtomicBool::new(false);

extern "C" fn sigchld_handler(_: libc::c_int) {
    CHILD_STATE_CHANGED.store(true, Ordering::SeqCst);
}

/// Install the flag-raising SIGCHLD handler.
pub fn install_sigchld_handler() -> nix::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(sigchld_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe { signal::sigaction(Signal::SIGCHLD, &action) }?;
    Ok(())
}

/// Consume the pending-change flag.
pub fn take_pending() -> bool {
    CHILD_STATE_CHANGED.swap(false, Ordering::SeqCst)
}

/// Keeps SIGCHLD blocked while alive, so notifications for a job being
/// launched or waited on cannot interleave with the main loop's own reaping.
#[derive(Debug)]
pub struct SigchldBlock {
    previous: SigSet,
}

impl SigchldBlock {
    pub fn new() -> nix::Result<Self> {
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        let mut previous = SigSet::empty();
        signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut previous))?;
        Ok(Self { previous })
    }
}

impl Drop for SigchldBlock {
    fn drop(&mut self) {
        if let Err(e) = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.previous), None) {
            tracing::error!("failed to restore signal mask: {}", e);
        }
    }
}

/// Source of raw child status changes.
pub trait Reaper {
    /// Next status change of any child. With `block == false`,
    /// `Ok(WaitStatus::StillAlive)` means nothing is pending.
    /// `Err(Errno::ECHILD)` means there are no children at all.
    fn next_change(&mut self, block: bool) -> nix::Result<WaitStatus>;

    /// Whether changes may be waiting to be reaped. Consumes the notice.
    fn take_pending(&mut self) -> bool {
        true
    }
}

/// `waitpid(-1, WUNTRACED | WCONTINUED)` on the real process table.
#[derive(Debug, Default)]
pub struct SystemReaper {
    drained_once: bool,
}

impl Reaper for SystemReaper {
    /// The SIGCHLD flag, plus once at start-up for children that changed
    /// state before the handler was installed.
    fn take_pending(&mut self) -> bool {
        let first = !std::mem::replace(&mut self.drained_once, true);
        take_pending() || first
    }

    fn next_change(&mut self, block: bool) -> nix::Result<WaitStatus> {
        let mut flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        if !block {
            flags |= WaitPidFlag::WNOHANG;
        }
        loop {
            match waitpid(Pid::from_raw(-1), Some(flags)) {
                Err(Errno::EINTR) => continue,
                other => return other,
            }
        }
    }
}
