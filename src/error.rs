use nix::errno::Errno;
use thiserror::Error;

/// Errors reported by a single dispatch cycle. None of them end the shell.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Wrong arity or a malformed argument.
    #[error("smash error: {verb}: invalid arguments")]
    InvalidArguments { verb: &'static str },

    /// The arguments were well formed but the state does not allow the
    /// operation (unknown job, taken alias name, unset variable...).
    #[error("smash error: {verb}: {message}")]
    Domain { verb: &'static str, message: String },

    /// A system call failed.
    #[error("smash error: {call} failed: {source}")]
    Sys {
        call: &'static str,
        #[source]
        source: Errno,
    },

    /// An I/O operation from the standard library failed.
    #[error("smash error: {call} failed: {source}")]
    Io {
        call: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("smash error: command line exceeds {limit} characters")]
    TooLong { limit: usize },

    #[error("smash error: readline failed: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
}

impl ShellError {
    pub fn domain(verb: &'static str, message: impl Into<String>) -> Self {
        ShellError::Domain {
            verb,
            message: message.into(),
        }
    }

    pub fn sys(call: &'static str) -> impl FnOnce(Errno) -> Self {
        move |source| ShellError::Sys { call, source }
    }

    pub fn io(call: &'static str) -> impl FnOnce(std::io::Error) -> Self {
        move |source| ShellError::Io { call, source }
    }
}

pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_prefix() {
        let e = ShellError::InvalidArguments { verb: "fg" };
        assert_eq!(e.to_string(), "smash error: fg: invalid arguments");
        let e = ShellError::domain("kill", "job-id 3 does not exist");
        assert_eq!(e.to_string(), "smash error: kill: job-id 3 does not exist");
        let e = ShellError::sys("fork")(Errno::EAGAIN);
        assert!(e.to_string().starts_with("smash error: fork failed: "));
    }
}
