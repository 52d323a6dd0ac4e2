use anyhow::{Context, Result};
use std::io::{BufRead, Write};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;

/// Read lines from `reader` on a dedicated thread.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, so a
/// garbled line is handled like any other bad command. The channel closes at
/// end of input. A read error is forwarded and also ends the stream.
pub fn spawn_line_reader<R>(mut reader: R) -> mpsc::Receiver<std::io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let line = match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => Ok(decode_line(&buf)),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
        debug!("Input reader thread exiting");
    });
    rx
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// Run the command loop until `lines` is exhausted, then shut down every
/// remaining job.
///
/// Child terminations are picked up from `SIGCHLD` and reaped between
/// commands; `SIGINT` is swallowed so an interrupt cannot kill the
/// controller while it still owns children.
pub async fn run<W: Write>(
    mut lines: mpsc::Receiver<std::io::Result<String>>,
    dispatcher: &mut Dispatcher<W>,
    prompt: Option<&str>,
) -> Result<()> {
    let mut child_exits =
        signal(SignalKind::child()).context("Failed to install SIGCHLD handler")?;
    let mut interrupts =
        signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    let result = command_loop(
        &mut lines,
        dispatcher,
        prompt,
        &mut child_exits,
        &mut interrupts,
    )
    .await;

    info!("Shutting down, terminating remaining jobs");
    dispatcher.cleanup();
    result
}

async fn command_loop<W: Write>(
    lines: &mut mpsc::Receiver<std::io::Result<String>>,
    dispatcher: &mut Dispatcher<W>,
    prompt: Option<&str>,
    child_exits: &mut tokio::signal::unix::Signal,
    interrupts: &mut tokio::signal::unix::Signal,
) -> Result<()> {
    loop {
        dispatcher.table_mut().reap_terminated();
        dispatcher.prompt(prompt)?;

        let line = loop {
            tokio::select! {
                line = lines.recv() => break line,
                Some(()) = child_exits.recv() => {
                    let reaped = dispatcher.table_mut().reap_terminated();
                    debug!("SIGCHLD: {} job(s) reaped", reaped);
                }
                Some(()) = interrupts.recv() => {
                    info!("SIGINT received, ignoring");
                }
            }
        };

        match line {
            Some(Ok(line)) => dispatcher.dispatch_line(&line).await?,
            Some(Err(e)) => {
                warn!("Failed to read input: {}", e);
                return Err(e).context("Failed to read command");
            }
            None => {
                info!("End of input");
                return Ok(());
            }
        }
    }
}
