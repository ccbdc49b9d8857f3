//! Jobs and the job list
//!
//! A job is one pipeline launched from a command line. Its status is derived
//! from the states of its member processes, which the job status tracker
//! updates as child-state notifications arrive.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::fmt;

/// Small positive number users refer to a job by (`fg 2`, `kill %1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened to one child process, as reported by `waitpid`.
///
/// This is the classification the terminal state synchronizer keys on, so
/// exits and signal terminations are never folded together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Normal exit, whatever the code.
    Exited(i32),
    /// Killed by a signal it did not catch.
    Signaled(Signal),
    /// Suspended by a stop signal; still alive.
    Stopped(Signal),
    /// Resumed after a stop.
    Continued,
}

impl StateChange {
    /// Classify a raw wait status. Statuses that carry no state change
    /// (`StillAlive`, ptrace events) yield `None`.
    pub fn from_wait_status(status: WaitStatus) -> Option<(Pid, StateChange)> {
        match status {
            WaitStatus::Exited(pid, code) => Some((pid, StateChange::Exited(code))),
            WaitStatus::Signaled(pid, signal, _core_dumped) => {
                Some((pid, StateChange::Signaled(signal)))
            }
            WaitStatus::Stopped(pid, signal) => Some((pid, StateChange::Stopped(signal))),
            WaitStatus::Continued(pid) => Some((pid, StateChange::Continued)),
            _ => None,
        }
    }
}

/// State of one member process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    Stopped(Signal),
    Exited(i32),
    Signaled(Signal),
}

impl ProcessState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, ProcessState::Exited(_) | ProcessState::Signaled(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub pid: Pid,
    pub state: ProcessState,
}

/// Status of a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Stopped(Signal),
    Continued,
    Exited(i32),
    Signaled(Signal),
}

impl JobStatus {
    /// True once every member process has terminated.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Exited(_) | JobStatus::Signaled(_))
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, JobStatus::Stopped(_))
    }

    /// The `$?`-style code for a finished job: the exit code, or 128 plus
    /// the signal number.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            JobStatus::Exited(code) => Some(*code),
            JobStatus::Signaled(signal) => Some(128 + *signal as i32),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running | JobStatus::Continued => f.write_str("Running"),
            JobStatus::Stopped(Signal::SIGTTIN | Signal::SIGTTOU) => f.write_str("Stopped (tty)"),
            JobStatus::Stopped(_) => f.write_str("Stopped"),
            JobStatus::Exited(0) => f.write_str("Done"),
            JobStatus::Exited(code) => write!(f, "Exit {}", code),
            JobStatus::Signaled(signal) => f.write_str(&describe_signal(*signal)),
        }
    }
}

/// Human-readable description of a terminating signal.
pub fn describe_signal(signal: Signal) -> String {
    let text = match signal {
        Signal::SIGHUP => "Hangup",
        Signal::SIGINT => "Interrupt",
        Signal::SIGQUIT => "Quit",
        Signal::SIGILL => "Illegal instruction",
        Signal::SIGTRAP => "Trace/breakpoint trap",
        Signal::SIGABRT => "Aborted",
        Signal::SIGBUS => "Bus error",
        Signal::SIGFPE => "Floating point exception",
        Signal::SIGKILL => "Killed",
        Signal::SIGSEGV => "Segmentation fault",
        Signal::SIGPIPE => "Broken pipe",
        Signal::SIGALRM => "Alarm clock",
        Signal::SIGTERM => "Terminated",
        other => return format!("Killed by signal {}", other as i32),
    };
    text.to_string()
}

/// Whether a job currently owns (or is meant to own) the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Foreground,
    Background,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    /// Process group of the pipeline; the first member's pid.
    pub pgid: Pid,
    pub processes: Vec<Process>,
    pub status: JobStatus,
    pub placement: Placement,
    /// Command line as typed, for `jobs` and notifications.
    pub command_line: String,
    /// The current stop has been shown to the user.
    pub stop_reported: bool,
}

impl Job {
    pub fn new(
        id: JobId,
        pgid: Pid,
        pids: &[Pid],
        placement: Placement,
        command_line: String,
    ) -> Self {
        Self {
            id,
            pgid,
            processes: pids
                .iter()
                .map(|&pid| Process {
                    pid,
                    state: ProcessState::Running,
                })
                .collect(),
            status: JobStatus::Running,
            placement,
            command_line,
            stop_reported: false,
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.processes.iter().any(|p| p.pid == pid)
    }

    pub fn last_pid(&self) -> Option<Pid> {
        self.processes.last().map(|p| p.pid)
    }

    pub fn is_foreground(&self) -> bool {
        self.placement == Placement::Foreground
    }

    /// Number of members not yet known to have terminated.
    pub fn alive(&self) -> usize {
        self.processes
            .iter()
            .filter(|p| !p.state.is_terminated())
            .count()
    }

    /// Record a change for member `pid` and re-derive the job status.
    ///
    /// Returns false if `pid` is not a member of this job.
    pub fn apply(&mut self, pid: Pid, change: StateChange) -> bool {
        let Some(process) = self.processes.iter_mut().find(|p| p.pid == pid) else {
            return false;
        };
        process.state = match change {
            StateChange::Exited(code) => ProcessState::Exited(code),
            StateChange::Signaled(signal) => ProcessState::Signaled(signal),
            StateChange::Stopped(signal) => ProcessState::Stopped(signal),
            StateChange::Continued => ProcessState::Running,
        };
        self.status = self.derive_status(change);
        if !self.status.is_stopped() {
            self.stop_reported = false;
        }
        true
    }

    /// Mark stopped members running again after the shell sent SIGCONT,
    /// ahead of the CONTINUED notifications.
    pub fn mark_resumed(&mut self) {
        for process in &mut self.processes {
            if matches!(process.state, ProcessState::Stopped(_)) {
                process.state = ProcessState::Running;
            }
        }
        if !self.status.is_finished() {
            self.status = JobStatus::Continued;
        }
        self.stop_reported = false;
    }

    fn derive_status(&self, change: StateChange) -> JobStatus {
        if self.alive() == 0 {
            return self.final_status();
        }
        match change {
            StateChange::Stopped(signal) => JobStatus::Stopped(signal),
            StateChange::Continued => {
                let still_stopped = self
                    .processes
                    .iter()
                    .any(|p| matches!(p.state, ProcessState::Stopped(_)));
                if still_stopped {
                    self.status
                } else {
                    JobStatus::Continued
                }
            }
            // A member ending while others live leaves the job as it was.
            StateChange::Exited(_) | StateChange::Signaled(_) => self.status,
        }
    }

    /// Status of a job whose members have all terminated.
    ///
    /// Any member killed by a signal other than SIGPIPE makes the job
    /// signaled; SIGPIPE is how upstream members normally end when a reader
    /// goes away. Otherwise the last member decides.
    fn final_status(&self) -> JobStatus {
        let fatal = self.processes.iter().find_map(|p| match p.state {
            ProcessState::Signaled(signal) if signal != Signal::SIGPIPE => Some(signal),
            _ => None,
        });
        if let Some(signal) = fatal {
            return JobStatus::Signaled(signal);
        }
        match self.processes.last().map(|p| p.state) {
            Some(ProcessState::Signaled(signal)) => JobStatus::Signaled(signal),
            Some(ProcessState::Exited(code)) => JobStatus::Exited(code),
            _ => JobStatus::Exited(0),
        }
    }
}

/// Tracked jobs, kept in id order.
#[derive(Debug, Default)]
pub struct JobList {
    jobs: BTreeMap<JobId, Job>,
}

impl JobList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job under the lowest free id.
    ///
    /// A foreground job displaces any job still marked foreground; there is
    /// only ever one.
    pub fn add(
        &mut self,
        pgid: Pid,
        pids: &[Pid],
        placement: Placement,
        command_line: String,
    ) -> JobId {
        let id = self.next_free_id();
        if placement == Placement::Foreground {
            self.demote_foreground();
        }
        self.jobs
            .insert(id, Job::new(id, pgid, pids, placement, command_line));
        id
    }

    fn next_free_id(&self) -> JobId {
        let mut candidate = 1;
        for id in self.jobs.keys() {
            if id.0 != candidate {
                break;
            }
            candidate += 1;
        }
        JobId(candidate)
    }

    fn demote_foreground(&mut self) {
        for job in self.jobs.values_mut() {
            if job.is_foreground() {
                tracing::warn!("job {} was still marked foreground; demoting", job.id);
                job.placement = Placement::Background;
            }
        }
    }

    /// Move a job into or out of the foreground, keeping at most one
    /// foreground job.
    pub fn set_placement(&mut self, id: JobId, placement: Placement) -> bool {
        if !self.jobs.contains_key(&id) {
            return false;
        }
        if placement == Placement::Foreground {
            self.demote_foreground();
        }
        if let Some(job) = self.jobs.get_mut(&id) {
            job.placement = placement;
        }
        true
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn find_by_pid(&self, pid: Pid) -> Option<JobId> {
        self.jobs.values().find(|job| job.contains(pid)).map(|job| job.id)
    }

    pub fn foreground(&self) -> Option<JobId> {
        self.jobs.values().find(|job| job.is_foreground()).map(|job| job.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.values_mut()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Remove and return every finished background job, in id order.
    pub fn take_finished_background(&mut self) -> Vec<Job> {
        let finished: Vec<JobId> = self
            .jobs
            .values()
            .filter(|job| !job.is_foreground() && job.status.is_finished())
            .map(|job| job.id)
            .collect();
        finished
            .into_iter()
            .filter_map(|id| self.jobs.remove(&id))
            .collect()
    }
}
