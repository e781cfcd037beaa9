use crate::error::{Result, ShellError};
use crate::jobs::JobTable;
use crate::parser::{CommandLine, Program};
use crate::signals::ForegroundSlot;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execv, execvp, fork, setpgid, ForkResult, Pid};
use std::ffi::CString;
use std::io::{self, Write};
use tracing::debug;

const COMPLEX_INTERPRETER: &str = "/bin/bash";

/// A program with its argument vector already converted to C strings, so
/// the forked child only has to call exec.
#[derive(Debug)]
pub struct PreparedProgram {
    file: CString,
    argv: Vec<CString>,
    /// Whether `file` is searched for in `PATH`.
    search_path: bool,
}

impl PreparedProgram {
    pub fn new(program: &Program) -> Result<Self> {
        match program {
            Program::Argv(args) => Self::from_args(args),
            Program::Complex(line) => {
                let argv = [COMPLEX_INTERPRETER, "-c", line.as_str()]
                    .iter()
                    .map(|s| to_cstring(s))
                    .collect::<Result<Vec<_>>>()?;
                Ok(PreparedProgram {
                    file: argv[0].clone(),
                    argv,
                    search_path: false,
                })
            }
        }
    }

    pub fn from_args(args: &[String]) -> Result<Self> {
        let argv = args
            .iter()
            .map(|s| to_cstring(s))
            .collect::<Result<Vec<_>>>()?;
        let file = argv
            .first()
            .cloned()
            .ok_or(ShellError::InvalidArguments { verb: "exec" })?;
        Ok(PreparedProgram {
            file,
            argv,
            search_path: true,
        })
    }

    /// Replaces the current process image. Only returns on failure.
    fn exec(&self) -> Errno {
        let result = if self.search_path {
            execvp(self.file.as_c_str(), self.argv.as_slice())
        } else {
            execv(self.file.as_c_str(), self.argv.as_slice())
        };
        match result {
            Ok(never) => match never {},
            Err(err) => err,
        }
    }
}

fn to_cstring(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| ShellError::InvalidArguments { verb: "exec" })
}

/// Forks a child in a new process group and execs `program` in it.
///
/// `setup` runs in the child between the process group change and exec,
/// for descriptor plumbing. If it fails, or exec fails, the child reports
/// the error and leaves through `_exit(1)`, skipping the parent's exit
/// handlers; it never returns into shell code.
/// `libc::_exit`: terminates immediately without running exit handlers.
fn _exit(code: i32) -> ! {
    unsafe { nix::libc::_exit(code) }
}

pub fn spawn<F>(program: &PreparedProgram, setup: F) -> Result<Pid>
where
    F: FnOnce() -> Result<()>,
{
    // Buffered output would otherwise be written twice.
    let _ = io::stdout().flush();

    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            debug!(pid = %child, program = ?program.file, "forked");
            Ok(child)
        }
        Ok(ForkResult::Child) => {
            if let Err(err) = setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
                eprintln!("{}", ShellError::sys("setpgid")(err));
                _exit(1);
            }
            if let Err(err) = setup() {
                eprintln!("{}", err);
                _exit(1);
            }
            let err = program.exec();
            eprintln!("{}", ShellError::sys("execvp")(err));
            _exit(1);
        }
        Err(err) => Err(ShellError::sys("fork")(err)),
    }
}

/// Blocks until `pid` exits or stops, retrying interrupted waits.
pub fn wait_for(pid: Pid, flags: Option<WaitPidFlag>) -> Result<WaitStatus> {
    loop {
        match waitpid(pid, flags) {
            Err(Errno::EINTR) => continue,
            other => return other.map_err(ShellError::sys("waitpid")),
        }
    }
}

/// Waits on `pid` as the foreground process. While the wait lasts the pid
/// is the Ctrl-C target. A process that stops is put in the job table as a
/// stopped job.
pub fn wait_foreground(
    pid: Pid,
    cmdline: &str,
    jobs: &mut JobTable,
    foreground: &ForegroundSlot,
) -> Result<()> {
    foreground.set(pid);
    let status = wait_for(pid, Some(WaitPidFlag::WUNTRACED));
    foreground.release(pid);

    match status? {
        WaitStatus::Stopped(..) => {
            let jid = jobs.add_job(cmdline, pid, true);
            debug!(jid, %pid, "foreground process stopped");
        }
        status => debug!(%pid, ?status, "foreground process done"),
    }
    Ok(())
}

/// Runs an external program: in the foreground the shell blocks on it,
/// in the background it is registered in the job table and the shell
/// returns immediately.
pub fn execute_command(
    program: &Program,
    line: &CommandLine,
    jobs: &mut JobTable,
    foreground: &ForegroundSlot,
) -> Result<()> {
    let prepared = PreparedProgram::new(program)?;
    let pid = spawn(&prepared, || Ok(()))?;

    if line.background {
        jobs.add_job(&line.display, pid, false);
        Ok(())
    } else {
        wait_foreground(pid, &line.display, jobs, foreground)
    }
}
