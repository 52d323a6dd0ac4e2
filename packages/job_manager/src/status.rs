use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use std::fmt;
use tracing::{debug, info};

use crate::error::JobError;
use crate::job::Job;

/// Lifecycle state of a job.
///
/// Starts as `Running` and changes at most once, to one of the terminal
/// variants. A terminal status is never re-evaluated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    Running,
    /// Exited normally with this code
    Exited(u8),
    /// Terminated by this signal number
    Signalled(i32),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    /// Map a wait result onto a terminal status; `None` means still running.
    pub(crate) fn from_wait(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(JobStatus::Exited(code as u8)),
            WaitStatus::Signaled(_, signal, _) => Some(JobStatus::Signalled(signal as i32)),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Exited(code) => write!(f, "exited({})", code),
            JobStatus::Signalled(signum) => write!(f, "signalled({})", signum),
        }
    }
}

impl Job {
    /// Non-blocking reap.
    ///
    /// Only a `Running` job is waited on; once terminal this is a no-op, which
    /// keeps the explicit `report` path and the termination-notification path
    /// from ever waiting on the same process twice.
    pub fn reap(&mut self) -> Result<JobStatus, JobError> {
        if self.status.is_terminal() {
            return Ok(self.status);
        }

        let status = waitpid(self.pid(), Some(WaitPidFlag::WNOHANG)).map_err(|source| {
            JobError::WaitFailed {
                id: self.id(),
                source,
            }
        })?;
        self.record(status);
        Ok(self.status)
    }

    /// Blocking wait until the process terminates. Used at shutdown.
    pub fn wait(&mut self) -> Result<JobStatus, JobError> {
        while !self.status.is_terminal() {
            match waitpid(self.pid(), None) {
                Ok(status) => self.record(status),
                Err(Errno::EINTR) => continue,
                Err(source) => {
                    return Err(JobError::WaitFailed {
                        id: self.id(),
                        source,
                    });
                }
            }
        }
        Ok(self.status)
    }

    fn record(&mut self, status: WaitStatus) {
        match JobStatus::from_wait(status) {
            Some(terminal) => {
                info!(
                    "Job {} ({}, pid {}) {}",
                    self.id(),
                    self.program(),
                    self.pid(),
                    terminal
                );
                self.status = terminal;
            }
            None => debug!("Job {} still running ({:?})", self.id(), status),
        }
    }
}
