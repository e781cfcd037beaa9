use crate::error::{Result, ShellError};
use crate::exec::{spawn, wait_for, PreparedProgram};
use nix::unistd::{close, dup2, pipe};
use std::os::unix::io::RawFd;
use tracing::debug;

const STDIN_FD: RawFd = 0;
const STDOUT_FD: RawFd = 1;
const STDERR_FD: RawFd = 2;

/// Runs `left | right`, or `left |& right` when `stderr` is set, and
/// returns once both children have been waited on.
///
/// Each side is a plain external program; aliases and builtins do not apply
/// inside a pipeline.
pub fn execute_pipeline(left: &[String], right: &[String], stderr: bool) -> Result<()> {
    let left = PreparedProgram::from_args(left)?;
    let right = PreparedProgram::from_args(right)?;

    let (read_end, write_end) = pipe().map_err(ShellError::sys("pipe"))?;
    let writer_target = if stderr { STDERR_FD } else { STDOUT_FD };

    let writer = spawn(&left, || {
        dup2(write_end, writer_target).map_err(ShellError::sys("dup2"))?;
        close_pair(read_end, write_end)
    });
    let writer = match writer {
        Ok(pid) => pid,
        Err(err) => {
            let _ = close_pair(read_end, write_end);
            return Err(err);
        }
    };

    let reader = spawn(&right, || {
        dup2(read_end, STDIN_FD).map_err(ShellError::sys("dup2"))?;
        close_pair(read_end, write_end)
    });

    // The reader only sees EOF once every copy of the write end is closed,
    // ours included.
    let closed = close_pair(read_end, write_end);
    debug!(%writer, reader = ?reader.as_ref().ok(), stderr, "pipeline started");

    let writer_status = wait_for(writer, None);
    let reader_status = match reader {
        Ok(pid) => wait_for(pid, None).map(|_| ()),
        Err(err) => Err(err),
    };

    reader_status?;
    writer_status?;
    closed
}

fn close_pair(read_end: RawFd, write_end: RawFd) -> Result<()> {
    let read = close(read_end);
    let write = close(write_end);
    read.and(write).map_err(ShellError::sys("close"))
}
