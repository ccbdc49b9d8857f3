//! Shell session: the terminal, its snapshot and the jobs
//!
//! A [`Session`] owns every process-wide resource the shell manages: the
//! controlling terminal, the single terminal-state snapshot and the job
//! list. All of it is mutated only from the main loop.
//!
//! # Foreground exit sequence
//!
//! Whenever the foreground job leaves the foreground, in this order:
//!
//! 1. the job status tracker reports why (exit, stop or signal),
//! 2. the process group controller hands the terminal back to the shell,
//! 3. the synchronizer samples or restores the terminal exactly once,
//! 4. a stopped job keeps the sampled modes for a later `fg`,
//! 5. a finished job is removed.

use crate::model::command::Pipeline;
use crate::model::job::{describe_signal, JobId, JobList, JobStatus, Placement};
use crate::services::child_status::{Reaper, SigchldBlock, SystemReaper};
use crate::services::job_tracker::JobTracker;
use crate::services::process_group::{LaunchError, ProcessGroupController};
use crate::services::termstate::{TermStateStore, TerminalSnapshot};
use crate::services::termstate_sync::{synchronize, ForegroundExit, SyncOutcome};
use crate::services::tty::Terminal;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::collections::HashMap;
use std::fmt;

/// Something the user should be told about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A background job was started.
    Launched { id: JobId, pid: Pid },
    /// The foreground job was stopped from the terminal.
    Suspended {
        id: JobId,
        status: JobStatus,
        command: String,
    },
    /// The foreground job was killed by a signal.
    Signaled(Signal),
    /// A background job stopped or finished.
    JobUpdate {
        id: JobId,
        status: JobStatus,
        command: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Launched { id, pid } => write!(f, "[{}] {}", id, pid),
            Notice::Suspended {
                id,
                status,
                command,
            } => write!(f, "\n[{}]\t{}\t\t{}", id, status, command),
            Notice::Signaled(signal) => f.write_str(&describe_signal(*signal)),
            Notice::JobUpdate {
                id,
                status,
                command,
            } => write!(f, "[{}]\t{}\t\t{}", id, status, command),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobControlError {
    NoSuchJob(JobId),
    Signal(Errno),
}

impl fmt::Display for JobControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobControlError::NoSuchJob(id) => write!(f, "{}: no such job", id),
            JobControlError::Signal(errno) => f.write_str(errno.desc()),
        }
    }
}

impl std::error::Error for JobControlError {}

pub struct Session<T: Terminal, R: Reaper = SystemReaper> {
    /// `None` when the shell runs without job control.
    tty: Option<T>,
    store: TermStateStore<T::Attributes>,
    tracker: JobTracker,
    controller: ProcessGroupController,
    reaper: R,
    /// Terminal modes of jobs stopped while in the foreground.
    stopped_modes: HashMap<JobId, TerminalSnapshot<T::Attributes>>,
    last_status: i32,
    report_signals: bool,
}

impl<T: Terminal, R: Reaper> Session<T, R> {
    /// Start a session. With a terminal, job control is on and the
    /// terminal-state store is seeded with the terminal's current modes.
    pub fn new(tty: Option<T>, shell_pgid: Pid, reaper: R, report_signals: bool) -> Self {
        let mut store = TermStateStore::new();
        if let Some(tty) = &tty {
            if let Err(e) = store.capture(tty) {
                tracing::warn!("could not take the initial terminal snapshot: {}", e);
            }
        }
        Self {
            controller: ProcessGroupController::new(shell_pgid, tty.is_some()),
            tty,
            store,
            tracker: JobTracker::new(),
            reaper,
            stopped_modes: HashMap::new(),
            last_status: 0,
            report_signals,
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.tty.is_some()
    }

    pub fn terminal(&self) -> Option<&T> {
        self.tty.as_ref()
    }

    pub fn store(&self) -> &TermStateStore<T::Attributes> {
        &self.store
    }

    pub fn jobs(&self) -> &JobList {
        self.tracker.jobs()
    }

    /// Exit code of the last foreground job, or 128 plus its signal.
    pub fn last_status(&self) -> i32 {
        self.last_status
    }

    pub fn set_last_status(&mut self, status: i32) {
        self.last_status = status;
    }

    /// The job `fg`/`bg` act on when given no argument: the newest one.
    pub fn current_job(&self) -> Option<JobId> {
        self.tracker.jobs().iter().last().map(|job| job.id)
    }

    /// Make sure the shell owns the terminal before it reads input.
    pub fn ensure_terminal_owned(&self) {
        let Some(tty) = &self.tty else {
            return;
        };
        let shell_pgid = self.controller.shell_pgid();
        match tty.foreground_group() {
            Ok(owner) if owner == shell_pgid => {}
            Ok(owner) => {
                tracing::warn!(%owner, %shell_pgid, "terminal not owned by the shell; reclaiming");
                self.controller.reclaim_foreground(tty);
            }
            Err(e) => tracing::warn!("could not check terminal ownership: {}", e),
        }
    }

    #[cfg(test)]
    pub(crate) fn tracker_mut(&mut self) -> &mut JobTracker {
        &mut self.tracker
    }

    #[cfg(test)]
    pub(crate) fn reaper_mut(&mut self) -> &mut R {
        &mut self.reaper
    }

    fn block_sigchld() -> Option<SigchldBlock> {
        SigchldBlock::new()
            .inspect_err(|e| tracing::warn!("could not block SIGCHLD: {}", e))
            .ok()
    }

    /// Launch a pipeline. A foreground pipeline is waited for, and
    /// everything that follows its exit happens before this returns.
    pub fn run_pipeline(&mut self, pipeline: &Pipeline) -> Result<Option<Notice>, LaunchError> {
        let _block = Self::block_sigchld();
        let launch = self.controller.launch(self.tty.as_ref(), pipeline)?;
        let placement = if pipeline.background {
            Placement::Background
        } else {
            Placement::Foreground
        };
        let id = self.tracker.jobs_mut().add(
            launch.pgid,
            &launch.pids,
            placement,
            pipeline.to_string(),
        );
        tracing::info!(job = %id, pgid = %launch.pgid, ?placement, "launched job");

        if pipeline.background {
            self.last_status = 0;
            let pid = launch.pids.last().copied().unwrap_or(launch.pgid);
            return Ok(Some(Notice::Launched { id, pid }));
        }
        Ok(self.wait_foreground(id))
    }

    fn wait_foreground(&mut self, id: JobId) -> Option<Notice> {
        let status = self.tracker.wait_for_job(id, &mut self.reaper)?;
        self.finish_foreground(id, status)
    }

    /// Steps 2 to 5 of the foreground exit sequence.
    fn finish_foreground(&mut self, id: JobId, status: JobStatus) -> Option<Notice> {
        let exit = ForegroundExit::from_status(status)?;

        if let Some(tty) = &self.tty {
            self.controller.reclaim_foreground(tty);
            let outcome = synchronize(&mut self.store, tty, exit);
            if let (ForegroundExit::Stopped(_), SyncOutcome::Captured(snapshot)) = (exit, outcome)
            {
                self.stopped_modes.insert(id, snapshot);
            }
        }
        self.last_status = status.exit_code().unwrap_or_else(|| match exit {
            ForegroundExit::Stopped(signal) => 128 + signal as i32,
            _ => 0,
        });

        match exit {
            ForegroundExit::Stopped(_) => {
                let jobs = self.tracker.jobs_mut();
                jobs.set_placement(id, Placement::Background);
                let job = jobs.get_mut(id)?;
                job.stop_reported = true;
                let command = job.command_line.clone();
                Some(Notice::Suspended {
                    id,
                    status,
                    command,
                })
            }
            ForegroundExit::Exited(_) => {
                self.forget(id);
                None
            }
            ForegroundExit::Signaled(signal) => {
                self.forget(id);
                let quiet = matches!(signal, Signal::SIGINT | Signal::SIGPIPE);
                (self.report_signals && !quiet).then_some(Notice::Signaled(signal))
            }
        }
    }

    fn forget(&mut self, id: JobId) {
        self.tracker.jobs_mut().remove(id);
        self.stopped_modes.remove(&id);
    }

    /// `fg`: bring a job to the foreground and wait for it.
    ///
    /// A job that was stopped in the foreground gets its own terminal modes
    /// back before it is continued.
    pub fn resume_foreground(&mut self, id: JobId) -> Result<Option<Notice>, JobControlError> {
        let _block = Self::block_sigchld();
        let job = self
            .tracker
            .jobs()
            .get(id)
            .ok_or(JobControlError::NoSuchJob(id))?;
        if job.status.is_finished() {
            // Already reaped: report it instead of handing the terminal to
            // a group that no longer exists.
            let notice = Notice::JobUpdate {
                id,
                status: job.status,
                command: job.command_line.clone(),
            };
            self.forget(id);
            return Ok(Some(notice));
        }
        let pgid = job.pgid;
        let stopped = job.status.is_stopped();

        let modes = self.stopped_modes.remove(&id);
        if let Some(tty) = &self.tty {
            let modes = modes.as_ref().map(TerminalSnapshot::attributes);
            if let Err(e) = self.controller.give_terminal_to(tty, pgid, modes) {
                tracing::warn!(job = %id, "could not hand terminal to job: {}", e);
            }
        }
        if stopped {
            if let Err(e) = self.continue_job(id) {
                if let Some(tty) = &self.tty {
                    self.controller.reclaim_foreground(tty);
                }
                return Err(e);
            }
        }
        self.tracker.jobs_mut().set_placement(id, Placement::Foreground);
        tracing::info!(job = %id, %pgid, "resumed in the foreground");
        Ok(self.wait_foreground(id))
    }

    /// `bg`: continue a stopped job in the background.
    pub fn resume_background(&mut self, id: JobId) -> Result<(), JobControlError> {
        let job = self
            .tracker
            .jobs()
            .get(id)
            .ok_or(JobControlError::NoSuchJob(id))?;
        if job.status.is_stopped() {
            self.continue_job(id)?;
        }
        self.tracker.jobs_mut().set_placement(id, Placement::Background);
        Ok(())
    }

    fn continue_job(&mut self, id: JobId) -> Result<(), JobControlError> {
        self.signal_job(id, Signal::SIGCONT)?;
        if let Some(job) = self.tracker.jobs_mut().get_mut(id) {
            job.mark_resumed();
        }
        Ok(())
    }

    /// `kill`: terminate a job, continuing it first if it is stopped so the
    /// signal is acted on.
    pub fn terminate_job(&mut self, id: JobId) -> Result<(), JobControlError> {
        self.signal_job(id, Signal::SIGTERM)?;
        let stopped = self
            .tracker
            .jobs()
            .get(id)
            .is_some_and(|job| job.status.is_stopped());
        if stopped {
            self.signal_job(id, Signal::SIGCONT)?;
        }
        Ok(())
    }

    /// `stop`: suspend a job.
    pub fn stop_job(&mut self, id: JobId) -> Result<(), JobControlError> {
        self.signal_job(id, Signal::SIGSTOP)
    }

    fn signal_job(&self, id: JobId, signal: Signal) -> Result<(), JobControlError> {
        let job = self
            .tracker
            .jobs()
            .get(id)
            .ok_or(JobControlError::NoSuchJob(id))?;
        match self.controller.signal_job(job, signal) {
            // The group is gone; the reaper will tell us how it ended.
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(JobControlError::Signal(e)),
        }
    }

    /// Collect what happened to background jobs since the last prompt.
    ///
    /// Pending child state changes are reaped first. A stopped background
    /// job is reported once per stop, wherever its change was reaped.
    /// Finished background jobs are reported once and removed.
    pub fn background_notices(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        if self.reaper.take_pending() {
            let _block = Self::block_sigchld();
            self.tracker.drain(&mut self.reaper);
        }
        for job in self.tracker.jobs_mut().iter_mut() {
            if job.is_foreground() || !job.status.is_stopped() || job.stop_reported {
                continue;
            }
            job.stop_reported = true;
            notices.push(Notice::JobUpdate {
                id: job.id,
                status: job.status,
                command: job.command_line.clone(),
            });
        }
        for job in self.tracker.jobs_mut().take_finished_background() {
            self.stopped_modes.remove(&job.id);
            tracing::debug!(job = %job.id, status = ?job.status, "background job finished");
            notices.push(Notice::JobUpdate {
                id: job.id,
                status: job.status,
                command: job.command_line,
            });
        }
        notices
    }
}
