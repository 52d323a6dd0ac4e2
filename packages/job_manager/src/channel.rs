use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::io::{BufRead, ErrorKind, Write};
use std::os::fd::AsFd;
use tracing::{debug, warn};

use crate::error::JobError;
use crate::job::Job;

/// Outcome of a single receive attempt on a job's stdout
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Received {
    /// One line of output, without its trailing newline
    Line(String),
    /// Nothing is available right now
    NoInput,
    /// The child has closed its stdout
    Eof,
}

impl Job {
    /// Write `text` followed by a newline to the job's stdin.
    ///
    /// Never blocks. When the pipe is full the write fails with
    /// [`ErrorKind::WouldBlock`] and whatever did not fit is dropped.
    pub fn send_line(&mut self, text: &str) -> Result<(), JobError> {
        let id = self.id();
        let stdin = self.stdin.as_mut().ok_or(JobError::StdinClosed(id))?;

        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text.as_bytes());
        data.push(b'\n');

        stdin
            .write_all(&data)
            .and_then(|()| stdin.flush())
            .map_err(|source| {
                warn!("Write to job {} failed: {}", id, source);
                JobError::WriteFailed { id, source }
            })?;
        debug!("Sent {} bytes to job {}", data.len(), id);
        Ok(())
    }

    /// Read one line from the job's stdout without blocking.
    ///
    /// A fragment with no trailing newline is returned as a line rather than
    /// waiting for the rest of it.
    pub fn receive_line(&mut self) -> Result<Received, JobError> {
        let id = self.id();

        if self.stdout.buffer().is_empty() {
            let readable = poll_readable(self.stdout.get_ref()).map_err(|errno| {
                JobError::ReadFailed {
                    id,
                    source: std::io::Error::from(errno),
                }
            })?;
            if !readable {
                return Ok(Received::NoInput);
            }
        }

        let mut line = Vec::new();
        loop {
            match self.stdout.read_until(b'\n', &mut line) {
                Ok(0) if line.is_empty() => return Ok(Received::Eof),
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if line.is_empty() {
                        return Ok(Received::NoInput);
                    }
                    break;
                }
                Err(source) => return Err(JobError::ReadFailed { id, source }),
            }
        }

        if line.last() == Some(&b'\n') {
            line.pop();
        }
        Ok(Received::Line(String::from_utf8_lossy(&line).into_owned()))
    }
}

/// Whether a read on `fd` would return immediately (data, EOF or error)
fn poll_readable(fd: impl AsFd) -> nix::Result<bool> {
    let mut fds = [PollFd::new(fd.as_fd(), PollFlags::POLLIN)];
    loop {
        match poll(&mut fds, PollTimeout::ZERO) {
            Ok(ready) => return Ok(ready > 0),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
}
