use nix::sys::signal::Signal;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::table::JobTable;

const GRACE_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl JobTable {
    /// Terminate and reap every job that is still running.
    ///
    /// Each running job is sent `signal`. Unless that was already `SIGKILL`,
    /// jobs still alive after `grace` are sent `SIGKILL`. Every job is then
    /// waited on (blocking) so none is left behind as a zombie.
    ///
    /// Returns the number of jobs this call moved to a terminal status.
    pub fn cleanup(&mut self, signal: Signal, grace: Duration) -> usize {
        let running = self.running_count();
        if running == 0 {
            return 0;
        }
        info!("Cleaning up {} running job(s) with {}", running, signal);

        for job in self.iter_mut().filter(|job| !job.status().is_terminal()) {
            if let Err(e) = job.signal(signal) {
                warn!("{}", e);
            }
        }

        if signal != Signal::SIGKILL {
            let deadline = Instant::now() + grace;
            while self.reap_running() > 0 && Instant::now() < deadline {
                std::thread::sleep(GRACE_POLL_INTERVAL);
            }
            for job in self.iter_mut().filter(|job| !job.status().is_terminal()) {
                warn!("Job {} outlived {}, sending SIGKILL", job.id(), signal);
                if let Err(e) = job.signal(Signal::SIGKILL) {
                    warn!("{}", e);
                }
            }
        }

        for job in self.iter_mut().filter(|job| !job.status().is_terminal()) {
            if let Err(e) = job.wait() {
                warn!("{}", e);
            }
        }

        running - self.running_count()
    }

    fn running_count(&self) -> usize {
        self.iter()
            .filter(|job| !job.status().is_terminal())
            .count()
    }

    /// Non-blocking reap of every running job; returns how many remain running
    fn reap_running(&mut self) -> usize {
        self.sweep();
        self.running_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::JobStatus;

    #[test]
    fn test_cleanup_kills_and_reaps_everything() {
        let mut table = JobTable::new();
        table.spawn("sleep", &["30"]).unwrap();
        table.spawn("cat", &[] as &[&str]).unwrap();

        assert_eq!(table.cleanup(Signal::SIGKILL, Duration::ZERO), 2);
        for job in table.iter() {
            assert_eq!(job.status(), JobStatus::Signalled(9));
        }
    }

    #[test]
    fn test_cleanup_leaves_terminal_status_untouched() {
        let mut table = JobTable::new();
        let id = table.spawn("true", &[] as &[&str]).unwrap();
        table.find_by_job_id_mut(id).unwrap().wait().unwrap();

        assert_eq!(table.cleanup(Signal::SIGKILL, Duration::ZERO), 0);
        assert_eq!(
            table.find_by_job_id(id).unwrap().status(),
            JobStatus::Exited(0)
        );
    }

    #[test]
    fn test_cleanup_escalates_when_signal_is_ignored() {
        let mut table = JobTable::new();
        // The trap runs in the shell itself, so SIGTERM is swallowed.
        let id = table
            .spawn("sh", &["-c", "trap '' TERM; while :; do sleep 1; done"])
            .unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(table.cleanup(Signal::SIGTERM, Duration::from_millis(200)), 1);
        assert_eq!(
            table.find_by_job_id(id).unwrap().status(),
            JobStatus::Signalled(9)
        );
    }

    #[test]
    fn test_cleanup_twice_is_harmless() {
        let mut table = JobTable::new();
        table.spawn("sleep", &["30"]).unwrap();
        assert_eq!(table.cleanup(Signal::SIGKILL, Duration::ZERO), 1);
        assert_eq!(table.cleanup(Signal::SIGKILL, Duration::ZERO), 0);
    }
}
