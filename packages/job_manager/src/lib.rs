//! Job Manager - child process table for an interactive job-control shell
//!
//! Each job is a spawned program whose stdin and stdout are connected to the
//! controller through pipes. Jobs are numbered in creation order and stay in
//! the table after they terminate, so their final status can still be queried.
//!
//! The API is synchronous and single-owner: the controller holds the
//! [`JobTable`] and calls [`JobTable::reap_terminated`] when it is told a
//! child has terminated (for instance from a `SIGCHLD` stream).
//!
//! # Example
//!
//! ```no_run
//! use job_manager::{JobTable, Received, Signal};
//! use std::time::Duration;
//!
//! let mut table = JobTable::new();
//! let id = table.spawn("cat", &[] as &[&str]).unwrap();
//!
//! let job = table.find_by_job_id_mut(id).unwrap();
//! job.send_line("hello").unwrap();
//! std::thread::sleep(Duration::from_millis(50));
//! if let Received::Line(line) = job.receive_line().unwrap() {
//!     println!("job {} said {}", id, line);
//! }
//!
//! table.cleanup(Signal::SIGKILL, Duration::ZERO);
//! ```

mod channel;
mod error;
mod job;
mod launcher;
mod shutdown;
mod status;
mod table;

pub use channel::Received;
pub use error::JobError;
pub use job::{Job, JobId};
pub use launcher::EXEC_FAILURE_CODE;
pub use status::JobStatus;
pub use table::JobTable;

/// Re-exported so callers can name signals without depending on `nix` directly
pub use nix::sys::signal::Signal;
