use crate::error::{Result, ShellError};
use nix::fcntl::{fcntl, open, FcntlArg, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup2};
use std::io::{self, Write};
use std::os::unix::io::RawFd;
use tracing::debug;

const STDOUT_FD: RawFd = 1;

/// Points the shell's own standard output at `path` while `run` executes,
/// then puts the original descriptor back.
///
/// `>` truncates and `>>` appends; the file is created if missing. Children
/// forked by `run` inherit the redirected descriptor but not the saved
/// one, which is close-on-exec. It is restored and closed on every path
/// once it has been duplicated.
pub fn with_stdout_redirected<T, F>(path: &str, append: bool, run: F) -> Result<T>
where
    F: FnOnce() -> T,
{
    let _ = io::stdout().flush();
    let saved = fcntl(STDOUT_FD, FcntlArg::F_DUPFD_CLOEXEC(3)).map_err(ShellError::sys("fcntl"))?;

    let mut flags = OFlag::O_WRONLY | OFlag::O_CREAT;
    flags |= if append { OFlag::O_APPEND } else { OFlag::O_TRUNC };
    let fd = match open(path, flags, Mode::from_bits_truncate(0o666)) {
        Ok(fd) => fd,
        Err(err) => {
            let _ = close(saved);
            return Err(ShellError::sys("open")(err));
        }
    };

    let redirected = dup2(fd, STDOUT_FD);
    let _ = close(fd);
    if let Err(err) = redirected {
        let _ = close(saved);
        return Err(ShellError::sys("dup2")(err));
    }
    debug!(path, append, "stdout redirected");

    let result = run();

    let _ = io::stdout().flush();
    let restored = dup2(saved, STDOUT_FD);
    let _ = close(saved);
    restored.map_err(ShellError::sys("dup2"))?;
    Ok(result)
}
