use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::libc;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::unistd::{ForkResult, close, dup2, fork, pipe2};
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::raw::c_char;
use tracing::{error, info, warn};

use crate::error::JobError;
use crate::job::JobId;
use crate::table::JobTable;

/// Exit status of a child whose program image could not be loaded
pub const EXEC_FAILURE_CODE: i32 = 99;

impl JobTable {
    /// Launch `program` with `args`, wiring its stdin and stdout to pipes
    /// owned by the new job. Stderr is inherited.
    ///
    /// A program that cannot be executed still yields a job; it exits with
    /// [`EXEC_FAILURE_CODE`].
    pub fn spawn<S: AsRef<str>>(&mut self, program: &str, args: &[S]) -> Result<JobId, JobError> {
        // Everything the child needs is allocated before forking.
        let argv_owned = std::iter::once(program)
            .chain(args.iter().map(AsRef::as_ref))
            .map(|arg| CString::new(arg).map_err(|_| JobError::InvalidArgument(arg.to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        let mut argv: Vec<*const c_char> = argv_owned.iter().map(|arg| arg.as_ptr()).collect();
        argv.push(std::ptr::null());

        // Close-on-exec so later children never hold these ends open.
        let (stdin_read, stdin_write) = pipe2(OFlag::O_CLOEXEC).map_err(JobError::PipeFailed)?;
        let (stdout_read, stdout_write) = pipe2(OFlag::O_CLOEXEC).map_err(JobError::PipeFailed)?;

        info!("Spawning job: {} with args: {:?}", program, &argv_owned[1..]);

        // SAFETY: the child branch only makes async-signal-safe calls before
        // it either replaces its image or exits.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => exec_child(
                &argv,
                ChildFds {
                    stdin: stdin_read.as_raw_fd(),
                    stdout: stdout_write.as_raw_fd(),
                    parent_stdin: stdin_write.as_raw_fd(),
                    parent_stdout: stdout_read.as_raw_fd(),
                },
            ),
            Ok(ForkResult::Parent { child }) => {
                drop(stdin_read);
                drop(stdout_write);

                // A child that stops reading must not stall `send`, nor a
                // quiet one `rcv`.
                for (end, fd) in [("stdin", &stdin_write), ("stdout", &stdout_read)] {
                    if let Err(e) = set_nonblocking(fd) {
                        warn!("Failed to make {} of {} non-blocking: {}", end, program, e);
                    }
                }

                let job = self.create(program, child, stdin_write, stdout_read);
                info!("Job {} started with pid {}", job.id(), child);
                Ok(job.id())
            }
            Err(e) => {
                error!("Failed to fork for '{}': {}", program, e);
                Err(JobError::ForkFailed(e))
            }
        }
    }
}

struct ChildFds {
    stdin: RawFd,
    stdout: RawFd,
    parent_stdin: RawFd,
    parent_stdout: RawFd,
}

fn exec_child(argv: &[*const c_char], fds: ChildFds) -> ! {
    let _ = close(fds.parent_stdin);
    let _ = close(fds.parent_stdout);

    if dup2(fds.stdin, libc::STDIN_FILENO).is_ok() && dup2(fds.stdout, libc::STDOUT_FILENO).is_ok()
    {
        // The controller ignores these; the program should not inherit that.
        // SAFETY: restoring default dispositions installs no handler code.
        unsafe {
            let _ = signal(Signal::SIGINT, SigHandler::SigDfl);
            let _ = signal(Signal::SIGPIPE, SigHandler::SigDfl);
        }

        // SAFETY: argv is a null-terminated array of pointers into CStrings
        // that outlive this call; execvp only returns on failure.
        unsafe {
            libc::execvp(argv[0], argv.as_ptr());
        }
    }

    // SAFETY: _exit skips the parent's atexit handlers and stdio buffers.
    unsafe { libc::_exit(EXEC_FAILURE_CODE) }
}

fn set_nonblocking(fd: &OwnedFd) -> nix::Result<()> {
    let raw = fd.as_raw_fd();
    let flags = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
    fcntl(raw, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}
