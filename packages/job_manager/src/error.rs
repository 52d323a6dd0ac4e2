use crate::job::JobId;

/// Errors that can occur while launching or talking to a job
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Creating one of the stdin/stdout pipes failed
    #[error("failed to create pipe: {0}")]
    PipeFailed(#[source] nix::Error),

    /// The process could not be forked
    #[error("failed to fork: {0}")]
    ForkFailed(#[source] nix::Error),

    /// Program name or an argument contains an interior NUL byte
    #[error("invalid argument {0:?}: contains a NUL byte")]
    InvalidArgument(String),

    /// Delivering a signal failed
    #[error("failed to signal job {id}: {source}")]
    SignalFailed {
        id: JobId,
        #[source]
        source: nix::Error,
    },

    /// Waiting on the job's process failed
    #[error("failed to wait on job {id}: {source}")]
    WaitFailed {
        id: JobId,
        #[source]
        source: nix::Error,
    },

    /// The controller's end of the job's stdin has already been closed
    #[error("stdin of job {0} is closed")]
    StdinClosed(JobId),

    /// Writing to the job's stdin failed (e.g. broken pipe)
    #[error("failed to write to job {id}: {source}")]
    WriteFailed {
        id: JobId,
        #[source]
        source: std::io::Error,
    },

    /// Reading from the job's stdout failed
    #[error("failed to read from job {id}: {source}")]
    ReadFailed {
        id: JobId,
        #[source]
        source: std::io::Error,
    },
}
