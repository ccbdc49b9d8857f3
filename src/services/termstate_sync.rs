//! Terminal state synchronizer
//!
//! Runs once each time the foreground job leaves the foreground, after the
//! shell has reclaimed the terminal and before the next prompt. An orderly
//! departure (normal exit or stop) samples the terminal into the store; a
//! job killed by an uncaught signal never gets sampled and the store's
//! snapshot is written back instead. Exactly one attribute syscall happens
//! per event.

use super::termstate::{TermStateStore, TerminalSnapshot};
use super::tty::{Terminal, TerminalError};
use crate::model::job::JobStatus;
use nix::sys::signal::Signal;

/// How the foreground job left the foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForegroundExit {
    Exited(i32),
    Stopped(Signal),
    Signaled(Signal),
}

impl ForegroundExit {
    /// `None` while the job is still running in the foreground.
    pub fn from_status(status: JobStatus) -> Option<Self> {
        match status {
            JobStatus::Exited(code) => Some(ForegroundExit::Exited(code)),
            JobStatus::Stopped(signal) => Some(ForegroundExit::Stopped(signal)),
            JobStatus::Signaled(signal) => Some(ForegroundExit::Signaled(signal)),
            JobStatus::Running | JobStatus::Continued => None,
        }
    }

    pub fn action(&self) -> SyncAction {
        match self {
            ForegroundExit::Exited(_) | ForegroundExit::Stopped(_) => SyncAction::Capture,
            ForegroundExit::Signaled(_) => SyncAction::Restore,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Capture,
    Restore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome<A> {
    /// The terminal was sampled; this is the new snapshot.
    Captured(TerminalSnapshot<A>),
    /// The stored snapshot was written back.
    Restored,
    /// Restore was due but nothing had ever been captured.
    NothingToRestore,
    /// The syscall failed; the store is unchanged.
    Failed(SyncAction, TerminalError),
}

/// Apply the capture-or-restore rule for one foreground exit event.
pub fn synchronize<T: Terminal>(
    store: &mut TermStateStore<T::Attributes>,
    tty: &T,
    exit: ForegroundExit,
) -> SyncOutcome<T::Attributes> {
    let action = exit.action();
    let outcome = match action {
        SyncAction::Capture => match store.capture(tty) {
            Ok(snapshot) => SyncOutcome::Captured(snapshot.clone()),
            Err(e) => SyncOutcome::Failed(action, e),
        },
        SyncAction::Restore => match store.restore(tty) {
            Ok(true) => SyncOutcome::Restored,
            Ok(false) => SyncOutcome::NothingToRestore,
            Err(e) => SyncOutcome::Failed(action, e),
        },
    };

    match &outcome {
        SyncOutcome::Failed(action, e) => {
            tracing::warn!(?exit, ?action, "terminal state sync skipped: {}", e);
        }
        SyncOutcome::Captured(_) => tracing::debug!(?exit, "sampled terminal state"),
        SyncOutcome::Restored => tracing::debug!(?exit, "restored terminal state"),
        SyncOutcome::NothingToRestore => {
            tracing::debug!(?exit, "no terminal snapshot to restore")
        }
    }
    outcome
}
