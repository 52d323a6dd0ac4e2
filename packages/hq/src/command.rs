//! Parsing and validation of operator commands.
//!
//! A line is split into words (double/single quotes group words), the first
//! word names the command and the rest are its arguments. Arguments beyond
//! what a command consumes are ignored.

use job_manager::{JobId, Signal};
use std::time::Duration;

/// Highest signal number accepted by `signal`
pub const MAX_SIGNAL: i32 = 31;

/// Validation failures, displayed exactly as the operator sees them
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Error: Insufficient arguments")]
    InsufficientArguments,

    #[error("Error: Invalid job")]
    InvalidJob,

    #[error("Error: Invalid signal")]
    InvalidSignal,

    #[error("Error: Invalid sleep time")]
    InvalidSleepTime,

    #[error("Error: Invalid command")]
    InvalidCommand,
}

/// A validated command, ready to execute
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `spawn <program> [args...]`
    Spawn { program: String, args: Vec<String> },
    /// `report [jobid]`
    Report { job: Option<JobId> },
    /// `signal <jobid> <signum>`
    Signal { job: JobId, signal: Signal },
    /// `sleep <seconds>`
    Sleep { duration: Duration },
    /// `send <jobid> <text>`
    Send { job: JobId, text: String },
    /// `rcv <jobid>`
    Rcv { job: JobId },
    /// `eof <jobid>`
    Eof { job: JobId },
    /// `cleanup`
    Cleanup,
}

impl Command {
    /// Validate a tokenized line against a table holding `job_count` jobs.
    ///
    /// Returns `Ok(None)` for an empty line.
    pub fn parse(tokens: &[String], job_count: usize) -> Result<Option<Self>, CommandError> {
        let Some((name, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match name.as_str() {
            "spawn" => {
                let (program, rest) = args
                    .split_first()
                    .ok_or(CommandError::InsufficientArguments)?;
                Command::Spawn {
                    program: program.clone(),
                    args: rest.to_vec(),
                }
            }
            "report" => Command::Report {
                job: args
                    .first()
                    .map(|arg| parse_job_id(arg, job_count))
                    .transpose()?,
            },
            "signal" => {
                require(args, 2)?;
                Command::Signal {
                    job: parse_job_id(&args[0], job_count)?,
                    signal: parse_signal(&args[1])?,
                }
            }
            "sleep" => {
                require(args, 1)?;
                Command::Sleep {
                    duration: parse_sleep_time(&args[0])?,
                }
            }
            "send" => {
                require(args, 2)?;
                Command::Send {
                    job: parse_job_id(&args[0], job_count)?,
                    text: args[1].clone(),
                }
            }
            "rcv" => {
                require(args, 1)?;
                Command::Rcv {
                    job: parse_job_id(&args[0], job_count)?,
                }
            }
            "eof" => {
                require(args, 1)?;
                Command::Eof {
                    job: parse_job_id(&args[0], job_count)?,
                }
            }
            "cleanup" => Command::Cleanup,
            _ => return Err(CommandError::InvalidCommand),
        };

        Ok(Some(command))
    }
}

fn require(args: &[String], count: usize) -> Result<(), CommandError> {
    if args.len() < count {
        return Err(CommandError::InsufficientArguments);
    }
    Ok(())
}

/// Split a line into words. Unbalanced quotes make the line invalid.
pub fn tokenize(line: &str) -> Result<Vec<String>, CommandError> {
    shell_words::split(line).map_err(|_| CommandError::InvalidCommand)
}

/// A job id must be a plain non-negative integer naming a created job
pub fn parse_job_id(arg: &str, job_count: usize) -> Result<JobId, CommandError> {
    if arg.is_empty() || !arg.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CommandError::InvalidJob);
    }
    match arg.parse::<usize>() {
        Ok(index) if index < job_count => Ok(JobId(index)),
        _ => Err(CommandError::InvalidJob),
    }
}

/// A signal number must be an integer in `1..=31`
pub fn parse_signal(arg: &str) -> Result<Signal, CommandError> {
    let signum: i32 = arg.parse().map_err(|_| CommandError::InvalidSignal)?;
    if !(1..=MAX_SIGNAL).contains(&signum) {
        return Err(CommandError::InvalidSignal);
    }
    Signal::try_from(signum).map_err(|_| CommandError::InvalidSignal)
}

/// A sleep time is a finite, non-negative number of seconds, possibly fractional
pub fn parse_sleep_time(arg: &str) -> Result<Duration, CommandError> {
    let secs: f64 = arg.parse().map_err(|_| CommandError::InvalidSleepTime)?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(CommandError::InvalidSleepTime);
    }
    if secs == 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(secs).map_err(|_| CommandError::InvalidSleepTime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str, job_count: usize) -> Result<Option<Command>, CommandError> {
        Command::parse(&tokenize(line).unwrap(), job_count)
    }

    #[test]
    fn test_empty_line_is_ignored() {
        assert_eq!(parse("", 0), Ok(None));
        assert_eq!(parse("   \t ", 0), Ok(None));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(parse("launch cat", 0), Err(CommandError::InvalidCommand));
        assert_eq!(parse("SPAWN cat", 0), Err(CommandError::InvalidCommand));
    }

    #[test]
    fn test_unbalanced_quotes() {
        assert_eq!(tokenize("send 0 \"oops"), Err(CommandError::InvalidCommand));
    }

    #[test]
    fn test_spawn_keeps_quoted_arguments() {
        assert_eq!(
            parse("spawn sh -c \"echo hi; exit 2\"", 0),
            Ok(Some(Command::Spawn {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), "echo hi; exit 2".to_string()],
            }))
        );
        assert_eq!(parse("spawn", 0), Err(CommandError::InsufficientArguments));
    }

    #[test]
    fn test_report() {
        assert_eq!(parse("report", 0), Ok(Some(Command::Report { job: None })));
        assert_eq!(
            parse("report 1", 2),
            Ok(Some(Command::Report { job: Some(JobId(1)) }))
        );
        assert_eq!(parse("report 2", 2), Err(CommandError::InvalidJob));
        assert_eq!(parse("report 999", 2), Err(CommandError::InvalidJob));
        assert_eq!(parse("report x", 2), Err(CommandError::InvalidJob));
    }

    #[test]
    fn test_signal_validation_order() {
        assert_eq!(parse("signal 0", 1), Err(CommandError::InsufficientArguments));
        assert_eq!(parse("signal 5 9", 1), Err(CommandError::InvalidJob));
        assert_eq!(parse("signal 0 99", 1), Err(CommandError::InvalidSignal));
        assert_eq!(parse("signal 0 0", 1), Err(CommandError::InvalidSignal));
        assert_eq!(parse("signal 0 nine", 1), Err(CommandError::InvalidSignal));
        assert_eq!(
            parse("signal 0 9", 1),
            Ok(Some(Command::Signal {
                job: JobId(0),
                signal: Signal::SIGKILL,
            }))
        );
    }

    #[test]
    fn test_sleep() {
        assert_eq!(
            parse("sleep 1.5", 0),
            Ok(Some(Command::Sleep {
                duration: Duration::from_millis(1500),
            }))
        );
        assert_eq!(
            parse("sleep 0", 0),
            Ok(Some(Command::Sleep {
                duration: Duration::ZERO,
            }))
        );
        assert_eq!(parse("sleep", 0), Err(CommandError::InsufficientArguments));
        assert_eq!(parse("sleep -1", 0), Err(CommandError::InvalidSleepTime));
        assert_eq!(parse("sleep 1s", 0), Err(CommandError::InvalidSleepTime));
        assert_eq!(parse("sleep inf", 0), Err(CommandError::InvalidSleepTime));
        assert_eq!(parse("sleep NaN", 0), Err(CommandError::InvalidSleepTime));
    }

    #[test]
    fn test_send_rcv_eof() {
        assert_eq!(
            parse("send 0 \"hello world\"", 1),
            Ok(Some(Command::Send {
                job: JobId(0),
                text: "hello world".to_string(),
            }))
        );
        assert_eq!(parse("send 0", 1), Err(CommandError::InsufficientArguments));
        assert_eq!(parse("send 1 hi", 1), Err(CommandError::InvalidJob));
        assert_eq!(parse("rcv 0", 1), Ok(Some(Command::Rcv { job: JobId(0) })));
        assert_eq!(parse("rcv", 1), Err(CommandError::InsufficientArguments));
        assert_eq!(parse("eof 0", 1), Ok(Some(Command::Eof { job: JobId(0) })));
        assert_eq!(parse("eof -1", 1), Err(CommandError::InvalidJob));
    }

    #[test]
    fn test_extra_arguments_are_ignored() {
        assert_eq!(parse("cleanup now please", 0), Ok(Some(Command::Cleanup)));
        assert_eq!(
            parse("rcv 0 extra stuff", 1),
            Ok(Some(Command::Rcv { job: JobId(0) }))
        );
    }

    #[test]
    fn test_job_id_must_be_plain_digits() {
        assert_eq!(parse_job_id("0", 1), Ok(JobId(0)));
        assert_eq!(parse_job_id("+0", 1), Err(CommandError::InvalidJob));
        assert_eq!(parse_job_id("0.0", 1), Err(CommandError::InvalidJob));
        assert_eq!(parse_job_id(" 0", 1), Err(CommandError::InvalidJob));
        assert_eq!(parse_job_id("", 1), Err(CommandError::InvalidJob));
        assert_eq!(
            parse_job_id("99999999999999999999999", 1),
            Err(CommandError::InvalidJob)
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CommandError::InsufficientArguments.to_string(),
            "Error: Insufficient arguments"
        );
        assert_eq!(CommandError::InvalidJob.to_string(), "Error: Invalid job");
        assert_eq!(CommandError::InvalidSignal.to_string(), "Error: Invalid signal");
        assert_eq!(
            CommandError::InvalidSleepTime.to_string(),
            "Error: Invalid sleep time"
        );
        assert_eq!(CommandError::InvalidCommand.to_string(), "Error: Invalid command");
    }
}
