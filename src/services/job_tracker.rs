//! Job status tracker
//!
//! Turns raw wait statuses into classified [`StateChange`]s and applies them
//! to the job list. Unknown pids are ignored: they belong to jobs that were
//! already reaped and removed, or to children the shell never tracked.

use super::child_status::Reaper;
use crate::model::job::{JobId, JobList, JobStatus, StateChange};
use nix::errno::Errno;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

/// One classified change, attributed to its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedChange {
    pub job: JobId,
    pub pid: Pid,
    pub change: StateChange,
    /// Job status after applying the change.
    pub status: JobStatus,
}

#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: JobList,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> &JobList {
        &self.jobs
    }

    pub fn jobs_mut(&mut self) -> &mut JobList {
        &mut self.jobs
    }

    /// Classify one wait status and record it on the owning job.
    pub fn record(&mut self, status: WaitStatus) -> Option<TrackedChange> {
        let (pid, change) = StateChange::from_wait_status(status)?;
        let Some(id) = self.jobs.find_by_pid(pid) else {
            tracing::debug!(%pid, ?change, "state change for untracked child ignored");
            return None;
        };
        let job = self.jobs.get_mut(id)?;
        job.apply(pid, change);
        tracing::debug!(job = %id, %pid, ?change, status = ?job.status, "child state changed");
        Some(TrackedChange {
            job: id,
            pid,
            change,
            status: job.status,
        })
    }

    /// Reap every change that is already pending, without blocking.
    pub fn drain<R: Reaper>(&mut self, reaper: &mut R) -> Vec<TrackedChange> {
        let mut changes = Vec::new();
        loop {
            match reaper.next_change(false) {
                Ok(WaitStatus::StillAlive) | Err(Errno::ECHILD) => break,
                Ok(status) => changes.extend(self.record(status)),
                Err(e) => {
                    tracing::error!("waitpid failed while draining: {}", e);
                    break;
                }
            }
        }
        changes
    }

    /// Block until job `id` leaves the foreground: every member terminated,
    /// or the job stopped. Changes of other jobs seen meanwhile are
    /// recorded too.
    ///
    /// Returns `None` if `id` is not tracked.
    pub fn wait_for_job<R: Reaper>(&mut self, id: JobId, reaper: &mut R) -> Option<JobStatus> {
        loop {
            let status = self.jobs.get(id)?.status;
            if status.is_finished() || status.is_stopped() {
                return Some(status);
            }
            match reaper.next_change(true) {
                Ok(status) => {
                    self.record(status);
                }
                Err(e) => {
                    // Only reachable if someone else reaped our children.
                    tracing::warn!(job = %id, "waitpid failed: {}; assuming the job is gone", e);
                    return self.abandon(id);
                }
            }
        }
    }

    fn abandon(&mut self, id: JobId) -> Option<JobStatus> {
        let job = self.jobs.get_mut(id)?;
        let lost: Vec<Pid> = job
            .processes
            .iter()
            .filter(|p| !p.state.is_terminated())
            .map(|p| p.pid)
            .collect();
        for pid in lost {
            job.apply(pid, StateChange::Exited(0));
        }
        Some(job.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::job::Placement;
    use crate::services::child_status::scripted::ScriptedReaper;
    use nix::sys::signal::Signal;

    fn pid(n: i32) -> Pid {
        Pid::from_raw(n)
    }

    #[test]
    fn test_record_unknown_pid_is_ignored() {
        let mut tracker = JobTracker::new();
        assert_eq!(tracker.record(WaitStatus::Exited(pid(42), 0)), None);
    }

    #[test]
    fn test_record_attributes_change_to_job() {
        let mut tracker = JobTracker::new();
        let id = tracker
            .jobs_mut()
            .add(pid(10), &[pid(10)], Placement::Foreground, "vim".into());

        let change = tracker
            .record(WaitStatus::Signaled(pid(10), Signal::SIGKILL, false))
            .unwrap();
        assert_eq!(change.job, id);
        assert_eq!(change.change, StateChange::Signaled(Signal::SIGKILL));
        assert_eq!(change.status, JobStatus::Signaled(Signal::SIGKILL));
    }

    #[test]
    fn test_wait_returns_when_all_members_exit() {
        let mut tracker = JobTracker::new();
        let id = tracker.jobs_mut().add(
            pid(10),
            &[pid(10), pid(11)],
            Placement::Foreground,
            "a | b".into(),
        );
        let mut reaper = ScriptedReaper::new([
            WaitStatus::Exited(pid(10), 0),
            WaitStatus::Exited(pid(11), 3),
        ]);

        assert_eq!(
            tracker.wait_for_job(id, &mut reaper),
            Some(JobStatus::Exited(3))
        );
        assert_eq!(reaper.blocking_calls, 2);
    }

    #[test]
    fn test_wait_returns_on_stop_and_records_other_jobs() {
        let mut tracker = JobTracker::new();
        let bg = tracker
            .jobs_mut()
            .add(pid(5), &[pid(5)], Placement::Background, "sleep 1".into());
        let fg = tracker
            .jobs_mut()
            .add(pid(10), &[pid(10)], Placement::Foreground, "vim".into());
        let mut reaper = ScriptedReaper::new([
            WaitStatus::Exited(pid(5), 0),
            WaitStatus::Exited(pid(77), 0),
            WaitStatus::Stopped(pid(10), Signal::SIGTSTP),
        ]);

        assert_eq!(
            tracker.wait_for_job(fg, &mut reaper),
            Some(JobStatus::Stopped(Signal::SIGTSTP))
        );
        assert_eq!(
            tracker.jobs().get(bg).unwrap().status,
            JobStatus::Exited(0)
        );
    }

    #[test]
    fn test_continued_does_not_end_the_wait() {
        let mut tracker = JobTracker::new();
        let id = tracker
            .jobs_mut()
            .add(pid(10), &[pid(10)], Placement::Foreground, "cat".into());
        let mut reaper = ScriptedReaper::new([
            WaitStatus::Continued(pid(10)),
            WaitStatus::Exited(pid(10), 0),
        ]);
        assert_eq!(
            tracker.wait_for_job(id, &mut reaper),
            Some(JobStatus::Exited(0))
        );
    }

    #[test]
    fn test_wait_gives_up_when_children_vanish() {
        let mut tracker = JobTracker::new();
        let id = tracker
            .jobs_mut()
            .add(pid(10), &[pid(10)], Placement::Foreground, "x".into());
        let mut reaper = ScriptedReaper::default();
        assert_eq!(
            tracker.wait_for_job(id, &mut reaper),
            Some(JobStatus::Exited(0))
        );
    }

    #[test]
    fn test_drain_stops_when_nothing_is_pending() {
        let mut tracker = JobTracker::new();
        let id = tracker
            .jobs_mut()
            .add(pid(10), &[pid(10)], Placement::Background, "sleep".into());
        let mut reaper = ScriptedReaper::new([WaitStatus::Exited(pid(10), 0)]);

        let changes = tracker.drain(&mut reaper);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].job, id);
        assert_eq!(reaper.blocking_calls, 0);
        assert!(tracker.drain(&mut reaper).is_empty());
    }
}
