use crate::alias::AliasTable;
use crate::builtins::DEFAULT_PROMPT;
use crate::error::{Result, ShellError};
use crate::exec::execute_command;
use crate::jobs::JobTable;
use crate::parser::{classify, Command, CommandLine, MAX_COMMAND_LENGTH};
use crate::pipeline::execute_pipeline;
use crate::redirect::with_stdout_redirected;
use crate::signals::{route_interrupt, ForegroundSlot};
use nix::unistd::{getpid, Pid};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use tracing::debug;

/// What the read loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// All state owned by one shell instance.
#[derive(Debug)]
pub struct Shell {
    pub prompt: String,
    /// Directory before the last successful `cd`.
    pub prev_dir: Option<PathBuf>,
    pub jobs: JobTable,
    pub aliases: AliasTable,
    pub foreground: ForegroundSlot,
    /// The shell's own pid, fixed at startup.
    pub pid: Pid,
}

impl Default for Shell {
    fn default() -> Self {
        Shell::new()
    }
}

impl Shell {
    pub fn new() -> Self {
        Shell::with_foreground(ForegroundSlot::new())
    }

    /// Builds a shell around a foreground slot shared with the signal
    /// thread.
    pub fn with_foreground(foreground: ForegroundSlot) -> Self {
        Shell {
            prompt: DEFAULT_PROMPT.to_string(),
            prev_dir: None,
            jobs: JobTable::new(),
            aliases: AliasTable::new(),
            foreground,
            pid: getpid(),
        }
    }

    pub fn prompt_text(&self) -> String {
        format!("{}> ", self.prompt)
    }

    /// Runs one line. Errors are reported on stderr and never end the
    /// shell; only `quit` returns [`Flow::Exit`].
    pub fn execute(&mut self, raw: &str) -> Flow {
        match self.dispatch(raw) {
            Ok(flow) => flow,
            Err(err) => {
                debug!(?err, "command failed");
                eprintln!("{}", err);
                Flow::Continue
            }
        }
    }

    /// Resolves a line to a single action and performs it: aliases first,
    /// then redirection, pipeline, builtin, and finally an external
    /// program.
    pub fn dispatch(&mut self, raw: &str) -> Result<Flow> {
        if raw.trim().chars().count() > MAX_COMMAND_LENGTH {
            return Err(ShellError::TooLong {
                limit: MAX_COMMAND_LENGTH,
            });
        }
        let Some(line) = CommandLine::parse(raw) else {
            return Ok(Flow::Continue);
        };
        let Some(line) = self.aliases.expand(line)? else {
            return Ok(Flow::Continue);
        };

        let command = classify(&line)?;
        debug!(?command, background = line.background, "dispatching");
        match command {
            Command::Builtin(builtin) => builtin.execute(self),
            Command::Redirection {
                inner,
                path,
                append,
            } => with_stdout_redirected(&path, append, || self.execute(&inner)),
            Command::Pipeline {
                left,
                right,
                stderr,
            } => {
                execute_pipeline(&left, &right, stderr)?;
                Ok(Flow::Continue)
            }
            Command::External(program) => {
                execute_command(&program, &line, &mut self.jobs, &self.foreground)?;
                Ok(Flow::Continue)
            }
        }
    }
}

/// Runs the main shell loop until `quit` or end of input.
///
/// With a terminal on stdin and prompts enabled, lines come from a line
/// editor. Otherwise lines are read straight from stdin, and the prompt is
/// printed only if `emit_prompt` is set.
pub fn run_shell(shell: &mut Shell, emit_prompt: bool) -> Result<()> {
    if emit_prompt && io::stdin().is_terminal() {
        run_interactive(shell)
    } else {
        run_plain(shell, emit_prompt)
    }
}

fn run_interactive(shell: &mut Shell) -> Result<()> {
    let mut editor = DefaultEditor::new()?;
    loop {
        match editor.readline(&shell.prompt_text()) {
            Ok(cmdline) => {
                if shell.execute(&cmdline) == Flow::Exit {
                    return Ok(());
                }
            }
            // The editor swallows Ctrl-C while it owns the terminal.
            Err(ReadlineError::Interrupted) => {
                route_interrupt(&shell.foreground);
            }
            Err(ReadlineError::Eof) => return Ok(()),
            Err(err) => return Err(err.into()),
        }
    }
}

fn run_plain(shell: &mut Shell, emit_prompt: bool) -> Result<()> {
    let stdin = io::stdin();
    loop {
        if emit_prompt {
            print!("{}", shell.prompt_text());
            let _ = io::stdout().flush();
        }

        let mut cmdline = String::new();
        match stdin.lock().read_line(&mut cmdline) {
            Ok(0) => return Ok(()), // End-of-file (Ctrl-D)
            Ok(_) => {
                if shell.execute(&cmdline) == Flow::Exit {
                    return Ok(());
                }
            }
            Err(e) => return Err(ShellError::io("read")(e)),
        }
    }
}
