//! Process group controller
//!
//! Launches pipelines into their own process groups and moves ownership of
//! the controlling terminal between the shell and a job.
//!
//! Every member of a pipeline joins the group led by the first member. Both
//! the parent and the child call `setpgid`, and for foreground jobs both make
//! the group the terminal's foreground group, so it does not matter which of
//! them runs first.

use super::tty::{Terminal, TerminalError};
use crate::model::command::{OutputRedirect, Pipeline};
use crate::model::job::Job;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{self, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{self, Pid};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Signals an interactive shell ignores and its jobs must get back.
const JOB_CONTROL_SIGNALS: [Signal; 6] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
    Signal::SIGCHLD,
];

#[derive(Debug)]
pub enum LaunchError {
    Pipe(Errno),
    Redirect { path: PathBuf, source: io::Error },
    Spawn { program: String, source: io::Error },
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::Pipe(errno) => write!(f, "pipe: {}", errno.desc()),
            LaunchError::Redirect { path, source } => write!(f, "{}: {}", path.display(), source),
            LaunchError::Spawn { program, source } => write!(f, "{}: {}", program, source),
        }
    }
}

impl std::error::Error for LaunchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LaunchError::Pipe(errno) => Some(errno),
            LaunchError::Redirect { source, .. } | LaunchError::Spawn { source, .. } => {
                Some(source)
            }
        }
    }
}

/// A pipeline whose members are all running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Launch {
    pub pgid: Pid,
    pub pids: Vec<Pid>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessGroupController {
    shell_pgid: Pid,
    job_control: bool,
}

impl ProcessGroupController {
    pub fn new(shell_pgid: Pid, job_control: bool) -> Self {
        Self {
            shell_pgid,
            job_control,
        }
    }

    pub fn shell_pgid(&self) -> Pid {
        self.shell_pgid
    }

    pub fn job_control(&self) -> bool {
        self.job_control
    }

    /// Spawn every member of `pipeline`.
    ///
    /// With job control, the members share a new process group, and a
    /// foreground job is made the terminal's foreground group before any
    /// member can read from it. If a member fails to start, the members
    /// already running are killed and reaped before the error is returned.
    pub fn launch<T: Terminal>(
        &self,
        tty: Option<&T>,
        pipeline: &Pipeline,
    ) -> Result<Launch, LaunchError> {
        let foreground = !pipeline.background;
        let mut pgid = None;
        let mut pids = Vec::with_capacity(pipeline.commands.len());

        match self.spawn_members(tty, pipeline, &mut pgid, &mut pids) {
            Ok(()) => match pgid {
                Some(pgid) => Ok(Launch { pgid, pids }),
                None => Err(LaunchError::Spawn {
                    program: String::new(),
                    source: io::Error::new(io::ErrorKind::InvalidInput, "empty pipeline"),
                }),
            },
            Err(e) => {
                if let Some(pgid) = pgid {
                    self.abort_partial(tty, pgid, &pids, foreground);
                }
                Err(e)
            }
        }
    }

    fn spawn_members<T: Terminal>(
        &self,
        tty: Option<&T>,
        pipeline: &Pipeline,
        pgid: &mut Option<Pid>,
        pids: &mut Vec<Pid>,
    ) -> Result<(), LaunchError> {
        let count = pipeline.commands.len();
        let foreground = !pipeline.background;
        let mut upstream: Option<OwnedFd> = None;

        for (i, cmd) in pipeline.commands.iter().enumerate() {
            let first = i == 0;
            let last = i + 1 == count;
            let mut command = Command::new(cmd.program());
            command.args(cmd.args());

            if let Some(read_end) = upstream.take() {
                command.stdin(Stdio::from(read_end));
            } else if let (true, Some(path)) = (first, &pipeline.input) {
                let file = File::open(path).map_err(|source| LaunchError::Redirect {
                    path: path.clone(),
                    source,
                })?;
                command.stdin(Stdio::from(file));
            }

            let stdout: Option<OwnedFd> = if !last {
                let (read_end, write_end) =
                    unistd::pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::Pipe)?;
                upstream = Some(read_end);
                Some(write_end)
            } else if let Some(redirect) = &pipeline.output {
                Some(open_output(redirect)?.into())
            } else {
                None
            };

            if cmd.stderr_to_stdout {
                let duplicate = match &stdout {
                    Some(fd) => fd.try_clone(),
                    None => io::stdout().as_fd().try_clone_to_owned(),
                };
                let stderr = duplicate.map_err(|source| LaunchError::Spawn {
                    program: cmd.program().to_string(),
                    source,
                })?;
                command.stderr(Stdio::from(stderr));
            }
            if let Some(fd) = stdout {
                command.stdout(Stdio::from(fd));
            }

            let claim_terminal = match tty {
                Some(tty) if self.job_control && first && foreground => tty.raw_fd(),
                _ => None,
            };
            if self.job_control {
                command.process_group(pgid.map_or(0, Pid::as_raw));
            }
            // SAFETY: the closure only makes async-signal-safe calls
            // (tcsetpgrp, getpgrp, sigaction, sigprocmask).
            unsafe {
                command.pre_exec(move || prepare_child(claim_terminal));
            }

            let child = command.spawn().map_err(|source| LaunchError::Spawn {
                program: cmd.program().to_string(),
                source,
            })?;
            // The job tracker reaps through waitpid; the handle is not needed.
            let pid = Pid::from_raw(child.id() as i32);
            let group = *pgid.get_or_insert(pid);
            pids.push(pid);
            tracing::debug!(%pid, pgid = %group, program = cmd.program(), "spawned");

            if self.job_control {
                match unistd::setpgid(pid, group) {
                    // EACCES: the child already exec'd, after joining itself.
                    Ok(()) | Err(Errno::EACCES) => {}
                    Err(e) => tracing::debug!(%pid, "setpgid failed: {}", e),
                }
                if first && foreground {
                    if let Some(tty) = tty {
                        if let Err(e) = tty.set_foreground_group(group) {
                            tracing::warn!(pgid = %group, "could not hand terminal to job: {}", e);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Kill and reap the members of a pipeline that failed half way.
    fn abort_partial<T: Terminal>(&self, tty: Option<&T>, pgid: Pid, pids: &[Pid], foreground: bool) {
        tracing::debug!(%pgid, members = pids.len(), "aborting partially launched pipeline");
        for &pid in pids {
            if let Err(e) = signal::kill(pid, Signal::SIGKILL) {
                tracing::debug!(%pid, "kill failed: {}", e);
            }
        }
        for &pid in pids {
            if let Err(e) = waitpid(pid, None) {
                tracing::debug!(%pid, "waitpid failed: {}", e);
            }
        }
        if let (true, true, Some(tty)) = (self.job_control, foreground, tty) {
            self.reclaim_foreground(tty);
        }
    }

    /// Make `pgid` the terminal's foreground group, first reinstating the
    /// terminal modes the job had when it stopped, if any.
    pub fn give_terminal_to<T: Terminal>(
        &self,
        tty: &T,
        pgid: Pid,
        modes: Option<&T::Attributes>,
    ) -> Result<(), TerminalError> {
        if let Some(modes) = modes {
            if let Err(e) = tty.set_attributes(modes) {
                tracing::warn!(%pgid, "could not reinstate job's terminal modes: {}", e);
            }
        }
        tty.set_foreground_group(pgid)
    }

    /// Make the shell's own group the foreground group again.
    ///
    /// A failure is logged and otherwise ignored; the shell carries on as if
    /// it owned the terminal, since the job it took it back from is gone.
    pub fn reclaim_foreground<T: Terminal>(&self, tty: &T) {
        if let Err(e) = tty.set_foreground_group(self.shell_pgid) {
            tracing::warn!(shell_pgid = %self.shell_pgid, "could not reclaim terminal: {}", e);
        }
    }

    /// Deliver `signal` to every process of `job`.
    pub fn signal_job(&self, job: &Job, signal: Signal) -> nix::Result<()> {
        if self.job_control {
            return signal::killpg(job.pgid, signal);
        }
        let mut result = Ok(());
        for process in job.processes.iter().filter(|p| !p.state.is_terminated()) {
            if let Err(e) = signal::kill(process.pid, signal) {
                result = Err(e);
            }
        }
        result
    }
}

fn open_output(redirect: &OutputRedirect) -> Result<File, LaunchError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o666);
    match redirect {
        OutputRedirect::Truncate(_) => options.truncate(true),
        OutputRedirect::Append(_) => options.append(true),
    };
    options
        .open(redirect.path())
        .map_err(|source| LaunchError::Redirect {
            path: redirect.path().clone(),
            source,
        })
}

/// Runs in the child between `fork` and `exec`.
fn prepare_child(claim_terminal: Option<RawFd>) -> io::Result<()> {
    if let Some(fd) = claim_terminal {
        // SAFETY: the descriptor is the shell's tty, open until exec.
        let tty = unsafe { BorrowedFd::borrow_raw(fd) };
        // SIGTTOU is still ignored here, so this cannot stop the child.
        // The parent makes the same call; either one succeeding is enough.
        let _ = unistd::tcsetpgrp(tty, unistd::getpgrp());
    }
    for signal in JOB_CONTROL_SIGNALS {
        // SAFETY: restoring the default disposition runs no handler code.
        unsafe { signal::signal(signal, SigHandler::SigDfl) }?;
    }
    signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)?;
    Ok(())
}
