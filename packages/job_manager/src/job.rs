use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::os::fd::OwnedFd;
use tracing::debug;

use crate::error::JobError;
use crate::status::JobStatus;

/// Identifier handed to the operator for a spawned process.
///
/// Ids are assigned in creation order starting at 0 and are never reused.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A spawned child process together with the controller's ends of its pipes
#[derive(Debug)]
pub struct Job {
    id: JobId,
    pid: Pid,
    program: String,
    pub(crate) status: JobStatus,
    /// Write end of the pipe feeding the child's stdin; `None` once closed
    pub(crate) stdin: Option<File>,
    /// Read end of the pipe carrying the child's stdout (non-blocking)
    pub(crate) stdout: BufReader<File>,
}

impl Job {
    pub(crate) fn new(id: JobId, program: &str, pid: Pid, stdin: OwnedFd, stdout: OwnedFd) -> Self {
        Self {
            id,
            pid,
            program: program.to_string(),
            status: JobStatus::Running,
            stdin: Some(File::from(stdin)),
            stdout: BufReader::new(File::from(stdout)),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Last observed status. Call [`Job::reap`] first for a fresh value.
    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn is_stdin_open(&self) -> bool {
        self.stdin.is_some()
    }

    /// Close the controller's end of the child's stdin so its next read sees EOF.
    ///
    /// Returns false if it was already closed.
    pub fn close_stdin(&mut self) -> bool {
        let was_open = self.stdin.take().is_some();
        debug!("Job {} stdin closed (was open: {})", self.id, was_open);
        was_open
    }

    /// Deliver `signal` to the job's process.
    ///
    /// Once the process has been reaped its pid may belong to someone else,
    /// so nothing is sent and `Ok(false)` is returned.
    pub fn signal(&self, signal: Signal) -> Result<bool, JobError> {
        if self.status.is_terminal() {
            debug!(
                "Not signalling job {} ({}): already {}",
                self.id, signal, self.status
            );
            return Ok(false);
        }

        kill(self.pid, signal).map_err(|source| JobError::SignalFailed {
            id: self.id,
            source,
        })?;
        debug!("Sent {} to job {} (pid {})", signal, self.id, self.pid);
        Ok(true)
    }
}
