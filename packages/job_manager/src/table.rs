use nix::unistd::Pid;
use std::os::fd::OwnedFd;
use tracing::{debug, warn};

use crate::job::{Job, JobId};
use crate::status::JobStatus;

/// Ordered table of every job spawned in this session.
///
/// Jobs are never removed: the job at index `i` always has id `i`, so a job
/// id stays resolvable after its process has terminated.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
}

impl JobTable {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Register a freshly spawned process under the next job id
    pub fn create(
        &mut self,
        program: &str,
        pid: Pid,
        stdin: OwnedFd,
        stdout: OwnedFd,
    ) -> &mut Job {
        let index = self.jobs.len();
        let id = JobId(index);
        self.jobs.push(Job::new(id, program, pid, stdin, stdout));
        debug!("Registered job {} ({}) with pid {}", id, program, pid);
        &mut self.jobs[index]
    }

    /// Number of jobs ever created
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn find_by_job_id(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id.0)
    }

    pub fn find_by_job_id_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.jobs.get_mut(id.0)
    }

    /// Lookup used by the termination-notification path
    pub fn find_by_process_id_mut(&mut self, pid: Pid) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.pid() == pid)
    }

    /// Jobs in creation order
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.iter_mut()
    }

    /// Handle a termination notification for `pid`.
    ///
    /// Returns the job's status after the reap, or `None` if the pid is not
    /// one of ours.
    pub fn on_child_terminated(&mut self, pid: Pid) -> Option<JobStatus> {
        let job = self.find_by_process_id_mut(pid)?;
        match job.reap() {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Failed to reap pid {}: {}", pid, e);
                Some(job.status())
            }
        }
    }

    /// Reap every child that has terminated since the last call.
    ///
    /// Returns how many jobs moved to a terminal status.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn reap_terminated(&mut self) -> usize {
        use nix::errno::Errno;
        use nix::sys::wait::{Id, WaitPidFlag, WaitStatus, waitid};

        // WNOWAIT leaves the child waitable so the per-job reap below is the
        // one that consumes its exit status.
        let flags = WaitPidFlag::WEXITED | WaitPidFlag::WNOHANG | WaitPidFlag::WNOWAIT;
        let mut reaped = 0;
        loop {
            let pid = match waitid(Id::All, flags) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => match status.pid() {
                    Some(pid) => pid,
                    None => break,
                },
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(e) => {
                    warn!("waitid failed: {}", e);
                    break;
                }
            };

            match self.on_child_terminated(pid) {
                Some(status) if status.is_terminal() => reaped += 1,
                Some(_) => {
                    warn!("pid {} reported terminated but could not be reaped", pid);
                    break;
                }
                None => {
                    // It stays first in line, so look at our own jobs directly
                    debug!("Untracked pid {} terminated, sweeping jobs", pid);
                    reaped += self.sweep();
                    break;
                }
            }
        }
        reaped
    }

    /// Reap every child that has terminated since the last call.
    ///
    /// Returns how many jobs moved to a terminal status.
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn reap_terminated(&mut self) -> usize {
        self.sweep()
    }

    /// Non-blocking reap of every running job; returns how many became terminal
    pub(crate) fn sweep(&mut self) -> usize {
        let mut reaped = 0;
        for job in self.jobs.iter_mut().filter(|job| !job.status().is_terminal()) {
            match job.reap() {
                Ok(status) if status.is_terminal() => reaped += 1,
                Ok(_) => {}
                Err(e) => warn!("Failed to reap job {}: {}", job.id(), e),
            }
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::pipe;

    fn fake_job(table: &mut JobTable, program: &str, pid: i32) -> JobId {
        let (stdin_read, stdin_write) = pipe().unwrap();
        let (stdout_read, _stdout_write) = pipe().unwrap();
        drop(stdin_read);
        table
            .create(program, Pid::from_raw(pid), stdin_write, stdout_read)
            .id()
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let mut table = JobTable::new();
        assert!(table.is_empty());

        let a = fake_job(&mut table, "a", 100_001);
        let b = fake_job(&mut table, "b", 100_002);
        let c = fake_job(&mut table, "c", 100_003);

        assert_eq!((a, b, c), (JobId(0), JobId(1), JobId(2)));
        assert_eq!(table.len(), 3);
        let programs: Vec<&str> = table.iter().map(|job| job.program()).collect();
        assert_eq!(programs, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_find_by_job_id() {
        let mut table = JobTable::new();
        fake_job(&mut table, "first", 100_010);
        fake_job(&mut table, "second", 100_011);

        assert_eq!(table.find_by_job_id(JobId(1)).unwrap().program(), "second");
        assert!(table.find_by_job_id(JobId(2)).is_none());
    }

    #[test]
    fn test_find_by_process_id() {
        let mut table = JobTable::new();
        fake_job(&mut table, "first", 100_020);
        fake_job(&mut table, "second", 100_021);

        let job = table.find_by_process_id_mut(Pid::from_raw(100_021)).unwrap();
        assert_eq!(job.id(), JobId(1));
        assert!(table.find_by_process_id_mut(Pid::from_raw(1)).is_none());
    }

    #[test]
    fn test_new_job_is_running_with_open_stdin() {
        let mut table = JobTable::new();
        let id = fake_job(&mut table, "prog", 100_030);
        let job = table.find_by_job_id(id).unwrap();
        assert_eq!(job.status(), JobStatus::Running);
        assert!(job.is_stdin_open());
    }

    #[test]
    fn test_on_child_terminated_unknown_pid() {
        let mut table = JobTable::new();
        fake_job(&mut table, "prog", 100_040);
        assert_eq!(table.on_child_terminated(Pid::from_raw(100_041)), None);
    }

    #[test]
    fn test_on_child_terminated_reaps_job() {
        let mut table = JobTable::new();
        let id = table.spawn("true", &[] as &[&str]).unwrap();
        let pid = table.find_by_job_id(id).unwrap().pid();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut status = JobStatus::Running;
        while !status.is_terminal() && std::time::Instant::now() < deadline {
            status = table.on_child_terminated(pid).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(status, JobStatus::Exited(0));
        assert_eq!(table.find_by_job_id(id).unwrap().status(), JobStatus::Exited(0));
    }

    /// Block until `pid` has terminated without consuming its status
    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn wait_until_exited(pid: Pid) {
        use nix::sys::wait::{Id, WaitPidFlag, waitid};
        waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT).unwrap();
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    #[test]
    fn test_reap_terminated_drains_exited_and_killed_jobs() {
        let mut table = JobTable::new();
        let exited = table.spawn("true", &[] as &[&str]).unwrap();
        let killed = table.spawn("sh", &["-c", "kill -9 $$"]).unwrap();
        let running = table.spawn("sleep", &["30"]).unwrap();

        for id in [exited, killed] {
            wait_until_exited(table.find_by_job_id(id).unwrap().pid());
        }

        assert_eq!(table.reap_terminated(), 2);
        assert_eq!(table.find_by_job_id(exited).unwrap().status(), JobStatus::Exited(0));
        assert_eq!(table.find_by_job_id(killed).unwrap().status(), JobStatus::Signalled(9));
        assert_eq!(table.find_by_job_id(running).unwrap().status(), JobStatus::Running);

        // Nothing new has terminated
        assert_eq!(table.reap_terminated(), 0);

        let job = table.find_by_job_id_mut(running).unwrap();
        job.signal(nix::sys::signal::Signal::SIGKILL).unwrap();
        job.wait().unwrap();
    }
}
