use anyhow::{Context, Result};
use job_manager::{Job, JobId, JobTable, Received, Signal};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandError, tokenize};
use crate::config::ShutdownConfig;

/// Header line printed before every `report`
pub const REPORT_HEADER: &str = "[Job] cmd:status";

/// Executes operator commands against the job table and writes their
/// transcript output to `out`.
///
/// Operator mistakes are reported on `out` and never fail; only a failure to
/// write to `out` itself is returned as an error.
pub struct Dispatcher<W: Write> {
    table: JobTable,
    out: W,
    shutdown: ShutdownConfig,
}

impl<W: Write> Dispatcher<W> {
    pub fn new(out: W, shutdown: ShutdownConfig) -> Self {
        Self {
            table: JobTable::new(),
            out,
            shutdown,
        }
    }

    pub fn table(&self) -> &JobTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut JobTable {
        &mut self.table
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Print the prompt, if any, without a trailing newline
    pub fn prompt(&mut self, prompt: Option<&str>) -> Result<()> {
        if let Some(prompt) = prompt {
            write!(self.out, "{}", prompt).context("Failed to write prompt")?;
            self.out.flush().context("Failed to flush prompt")?;
        }
        Ok(())
    }

    /// Tokenize, validate and run one input line
    pub async fn dispatch_line(&mut self, line: &str) -> Result<()> {
        let parsed =
            tokenize(line).and_then(|tokens| Command::parse(&tokens, self.table.len()));

        match parsed {
            Ok(Some(command)) => self.execute(command).await,
            Ok(None) => Ok(()),
            Err(e) => {
                debug!("Rejected {:?}: {}", line, e);
                self.print_error(e)
            }
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<()> {
        debug!("Executing {:?}", command);
        match command {
            Command::Spawn { program, args } => self.spawn(&program, &args),
            Command::Report { job } => self.report(job),
            Command::Signal { job, signal } => {
                self.signal(job, signal);
                Ok(())
            }
            Command::Sleep { duration } => {
                self.sleep(duration).await;
                Ok(())
            }
            Command::Send { job, text } => {
                self.send(job, &text);
                Ok(())
            }
            Command::Rcv { job } => self.rcv(job),
            Command::Eof { job } => {
                self.eof(job);
                Ok(())
            }
            Command::Cleanup => {
                self.cleanup();
                Ok(())
            }
        }
    }

    /// Kill and reap every job that is still running
    pub fn cleanup(&mut self) {
        let reaped = self
            .table
            .cleanup(self.shutdown.signal, self.shutdown.grace);
        info!("Cleanup reaped {} job(s)", reaped);
    }

    fn spawn(&mut self, program: &str, args: &[String]) -> Result<()> {
        match self.table.spawn(program, args) {
            Ok(id) => self.print_line(&format!("New Job ID [{}] created", id)),
            Err(e) => {
                tracing::error!("Failed to spawn '{}': {}", program, e);
                self.print_line(&format!("Error: Unable to spawn {}", program))
            }
        }
    }

    fn report(&mut self, job: Option<JobId>) -> Result<()> {
        let ids: Vec<JobId> = match job {
            Some(id) => vec![id],
            None => self.table.iter().map(Job::id).collect(),
        };

        self.print_line(REPORT_HEADER)?;
        for id in ids {
            let Some(job) = self.table.find_by_job_id_mut(id) else {
                continue;
            };
            if let Err(e) = job.reap() {
                warn!("{}", e);
            }
            let line = format!("[{}] {}:{}", job.id(), job.program(), job.status());
            self.print_line(&line)?;
        }
        Ok(())
    }

    fn signal(&mut self, id: JobId, signal: Signal) {
        let Some(job) = self.table.find_by_job_id(id) else {
            return;
        };
        match job.signal(signal) {
            Ok(true) => info!("Sent {} to job {}", signal, id),
            Ok(false) => {}
            Err(e) => warn!("{}", e),
        }
    }

    async fn sleep(&mut self, duration: Duration) {
        debug!("Sleeping for {:?}", duration);
        tokio::time::sleep(duration).await;
    }

    fn send(&mut self, id: JobId, text: &str) {
        let Some(job) = self.table.find_by_job_id_mut(id) else {
            return;
        };
        if !job.is_stdin_open() {
            debug!("Dropping text for job {}: stdin already closed", id);
            return;
        }
        if let Err(e) = job.send_line(text) {
            warn!("{}", e);
        }
    }

    fn rcv(&mut self, id: JobId) -> Result<()> {
        let Some(job) = self.table.find_by_job_id_mut(id) else {
            return Ok(());
        };
        let received = match job.receive_line() {
            Ok(received) => received,
            Err(e) => {
                warn!("{}", e);
                Received::Eof
            }
        };

        match received {
            Received::Line(line) => self.print_line(&line),
            Received::NoInput => self.print_line("<no input>"),
            Received::Eof => self.print_line("<EOF>"),
        }
    }

    fn eof(&mut self, id: JobId) {
        if let Some(job) = self.table.find_by_job_id_mut(id) {
            job.close_stdin();
        }
    }

    fn print_error(&mut self, error: CommandError) -> Result<()> {
        self.print_line(&error.to_string())
    }

    fn print_line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line).context("Failed to write output")?;
        self.out.flush().context("Failed to flush output")
    }
}
