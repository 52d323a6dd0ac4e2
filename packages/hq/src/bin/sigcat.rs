//! sigcat - copy stdin to stdout line by line, announcing every signal received
//!
//! Each catchable signal in 1..=31 prints `sigcat received <description>` to the
//! current output stream. SIGUSR1 switches that stream to stdout and SIGUSR2
//! switches it to stderr. Handy as a job for exercising `hq`.

use anyhow::{Context, Result};
use job_manager::Signal;
use nix::libc;
use std::ffi::CStr;
use std::io::Write;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::debug;

use hq::command::MAX_SIGNAL;
use hq::session::spawn_line_reader;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Output {
    Stdout,
    Stderr,
}

impl Output {
    fn write_line(self, line: &str) -> std::io::Result<()> {
        match self {
            Output::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{}", line)?;
                out.flush()
            }
            Output::Stderr => {
                let mut out = std::io::stderr().lock();
                writeln!(out, "{}", line)?;
                out.flush()
            }
        }
    }

    /// Stream to use after handling `signum`
    fn after(self, signum: i32) -> Self {
        match Signal::try_from(signum) {
            Ok(Signal::SIGUSR1) => Output::Stdout,
            Ok(Signal::SIGUSR2) => Output::Stderr,
            _ => self,
        }
    }
}

fn announcement(signum: i32) -> String {
    format!("sigcat received {}", describe(signum))
}

/// The C library's description of `signum`, e.g. `User defined signal 1`
fn describe(signum: i32) -> String {
    // SAFETY: strsignal returns null or a NUL-terminated string that stays
    // valid until the next call; it is copied out immediately.
    unsafe {
        let description = libc::strsignal(signum);
        if description.is_null() {
            return format!("Unknown signal {}", signum);
        }
        CStr::from_ptr(description).to_string_lossy().into_owned()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let (signal_tx, mut signals) = mpsc::channel(32);
    for signum in 1..=MAX_SIGNAL {
        // KILL, STOP and the synchronous fault signals cannot be caught
        let mut stream = match signal(SignalKind::from_raw(signum)) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("Not catching signal {}: {}", signum, e);
                continue;
            }
        };
        let tx = signal_tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(signum).await.is_err() {
                    break;
                }
            }
        });
    }
    drop(signal_tx);

    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));
    let mut output = Output::Stdout;

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(Ok(line)) => output.write_line(&line).context("Failed to copy input")?,
                Some(Err(e)) => return Err(e).context("Failed to read input"),
                None => break,
            },
            Some(signum) = signals.recv() => {
                output
                    .write_line(&announcement(signum))
                    .context("Failed to announce signal")?;
                output = output.after(signum);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announcement() {
        assert_eq!(announcement(2), "sigcat received Interrupt");
        assert_eq!(announcement(10), "sigcat received User defined signal 1");
        assert_eq!(announcement(15), "sigcat received Terminated");
    }

    #[test]
    fn test_output_switching() {
        assert_eq!(Output::Stdout.after(12), Output::Stderr);
        assert_eq!(Output::Stderr.after(10), Output::Stdout);
        assert_eq!(Output::Stderr.after(15), Output::Stderr);
        assert_eq!(Output::Stdout.after(1), Output::Stdout);
    }
}
