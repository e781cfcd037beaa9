use crate::parser::MAX_COMMAND_LENGTH;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::fmt;
use tracing::{debug, warn};

/// A background or stopped child process tracked by the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub jid: usize,
    pub pid: Pid,
    /// The line the user typed (after alias expansion), `&` included.
    pub cmdline: String,
    pub stopped: bool,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} : {}", self.jid, self.cmdline, self.pid)?;
        if self.stopped {
            write!(f, " (stopped)")?;
        }
        Ok(())
    }
}

/// The job table. Jobs are kept in ascending `jid` order.
///
/// Finished jobs are only noticed when the table is touched: there is no
/// reaper, so an exited background child stays a zombie until the next
/// `add_job`, `remove_finished_jobs` or `kill_all_jobs`.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: Vec<Job>,
    max_jid: usize,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable::default()
    }

    /// Registers a process and returns its job id, which is one more than
    /// the highest id still tracked after finished jobs are purged.
    pub fn add_job(&mut self, cmdline: &str, pid: Pid, stopped: bool) -> usize {
        self.remove_finished_jobs();
        let jid = self.max_jid + 1;
        let cmdline: String = cmdline.chars().take(MAX_COMMAND_LENGTH).collect();
        debug!(jid, %pid, %cmdline, stopped, "job added");
        self.jobs.push(Job {
            jid,
            pid,
            cmdline,
            stopped,
        });
        self.max_jid = jid;
        jid
    }

    /// Polls every job without blocking and drops the ones whose process
    /// has exited, been killed, or can no longer be waited on.
    pub fn remove_finished_jobs(&mut self) {
        self.jobs.retain_mut(|job| {
            let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
            match waitpid(job.pid, Some(flags)) {
                Ok(WaitStatus::StillAlive) => true,
                Ok(WaitStatus::Stopped(..)) => {
                    job.stopped = true;
                    true
                }
                Ok(WaitStatus::Continued(_)) => {
                    job.stopped = false;
                    true
                }
                Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => {
                    debug!(jid = job.jid, pid = %job.pid, "job finished");
                    false
                }
                Ok(other) => {
                    warn!(jid = job.jid, status = ?other, "unexpected wait status");
                    true
                }
                Err(err) => {
                    debug!(jid = job.jid, pid = %job.pid, %err, "job can no longer be waited on");
                    false
                }
            }
        });
        self.max_jid = self.jobs.iter().map(|job| job.jid).max().unwrap_or(0);
    }

    pub fn get_job_by_id(&self, jid: usize) -> Option<&Job> {
        self.jobs.iter().find(|job| job.jid == jid)
    }

    pub fn get_job_by_id_mut(&mut self, jid: usize) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| job.jid == jid)
    }

    /// Takes a job out of the table without touching its process.
    pub fn remove_job_by_id(&mut self, jid: usize) -> Option<Job> {
        let idx = self.jobs.iter().position(|job| job.jid == jid)?;
        let job = self.jobs.remove(idx);
        self.max_jid = self.jobs.iter().map(|job| job.jid).max().unwrap_or(0);
        debug!(jid, pid = %job.pid, "job removed");
        Some(job)
    }

    /// Highest id currently tracked, 0 when empty.
    pub fn max_id(&self) -> usize {
        self.max_jid
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    /// One line per job, ascending by id. Finished jobs are purged first.
    pub fn listing(&mut self) -> String {
        self.remove_finished_jobs();
        self.iter().map(|job| format!("{}\n", job)).collect()
    }

    /// Sends SIGKILL to every live job and empties the table. Does not wait
    /// for the processes to exit.
    pub fn kill_all_jobs(&mut self) {
        self.remove_finished_jobs();
        println!("smash: sending SIGKILL signal to {} jobs:", self.len());
        for job in self.jobs.drain(..) {
            println!("{}: {}", job.pid, job.cmdline);
            if let Err(err) = kill(job.pid, Signal::SIGKILL) {
                eprintln!("smash error: kill failed: {}", err);
            }
        }
        self.max_jid = 0;
    }
}
