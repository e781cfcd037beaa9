use crate::error::{Result, ShellError};
use crate::exec::wait_foreground;
use crate::shell::{Flow, Shell};
use crate::sysinfo;
use nix::errno::Errno;
use nix::libc;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_PROMPT: &str = "smash";

/// Reserved command names. These are never looked up in `PATH` and cannot
/// be used as alias names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    ChPrompt,
    ShowPid,
    Pwd,
    Cd,
    Jobs,
    Fg,
    Kill,
    Quit,
    Alias,
    Unalias,
    Unsetenv,
    WatchProc,
    Du,
    WhoAmI,
    NetInfo,
}

static VERBS: Lazy<HashMap<&'static str, Verb>> = Lazy::new(|| {
    HashMap::from([
        ("chprompt", Verb::ChPrompt),
        ("showpid", Verb::ShowPid),
        ("pwd", Verb::Pwd),
        ("cd", Verb::Cd),
        ("jobs", Verb::Jobs),
        ("fg", Verb::Fg),
        ("kill", Verb::Kill),
        ("quit", Verb::Quit),
        ("alias", Verb::Alias),
        ("unalias", Verb::Unalias),
        ("unsetenv", Verb::Unsetenv),
        ("watchproc", Verb::WatchProc),
        ("du", Verb::Du),
        ("whoami", Verb::WhoAmI),
        ("netinfo", Verb::NetInfo),
    ])
});

impl Verb {
    pub fn lookup(name: &str) -> Option<Verb> {
        VERBS.get(name).copied()
    }
}

/// A builtin with its arguments already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    ChPrompt(Option<String>),
    ShowPid,
    Pwd,
    Cd(Option<String>),
    Jobs,
    Fg(Option<usize>),
    Kill { signal: i32, jid: usize },
    Quit { kill: bool },
    /// `None` lists the aliases.
    Alias(Option<(String, String)>),
    Unalias(Vec<String>),
    Unsetenv(Vec<String>),
    WatchProc(i32),
    Du(Option<String>),
    WhoAmI,
    NetInfo(String),
}

impl Builtin {
    /// Checks arity and argument formats. `args` excludes the verb.
    pub fn parse(verb: Verb, args: &[String]) -> Result<Builtin> {
        let first = args.first().cloned();
        let builtin = match verb {
            Verb::ChPrompt => Builtin::ChPrompt(first),
            Verb::ShowPid => Builtin::ShowPid,
            Verb::Pwd => Builtin::Pwd,
            Verb::Cd => {
                if args.len() > 1 {
                    return Err(ShellError::domain("cd", "too many arguments"));
                }
                Builtin::Cd(first)
            }
            Verb::Jobs => Builtin::Jobs,
            Verb::Fg => {
                let invalid = ShellError::InvalidArguments { verb: "fg" };
                match args {
                    [] => Builtin::Fg(None),
                    [id] => Builtin::Fg(Some(id.parse().map_err(|_| invalid)?)),
                    _ => return Err(invalid),
                }
            }
            Verb::Kill => parse_kill(args)?,
            Verb::Quit => Builtin::Quit {
                kill: first.as_deref() == Some("kill"),
            },
            // `classify` parses alias definitions from the raw line, since
            // split arguments lose the spacing inside the quoted body.
            Verb::Alias => return Err(ShellError::InvalidArguments { verb: "alias" }),
            Verb::Unalias => Builtin::Unalias(args.to_vec()),
            Verb::Unsetenv => Builtin::Unsetenv(args.to_vec()),
            Verb::WatchProc => {
                let invalid = ShellError::InvalidArguments { verb: "watchproc" };
                match args {
                    [pid] => match pid.parse::<i32>() {
                        Ok(pid) if pid > 0 => Builtin::WatchProc(pid),
                        _ => return Err(invalid),
                    },
                    _ => return Err(invalid),
                }
            }
            Verb::Du => {
                if args.len() > 1 {
                    return Err(ShellError::domain("du", "too many arguments"));
                }
                Builtin::Du(first)
            }
            Verb::WhoAmI => Builtin::WhoAmI,
            Verb::NetInfo => Builtin::NetInfo(
                first.ok_or_else(|| ShellError::domain("netinfo", "interface not specified"))?,
            ),
        };
        Ok(builtin)
    }

    /// Runs the builtin inside the shell process.
    pub fn execute(self, shell: &mut Shell) -> Result<Flow> {
        debug!(builtin = ?self, "running builtin");
        match self {
            Builtin::ChPrompt(name) => {
                shell.prompt = name.unwrap_or_else(|| DEFAULT_PROMPT.to_string());
            }
            Builtin::ShowPid => println!("smash pid is {}", shell.pid),
            Builtin::Pwd => {
                let cwd = env::current_dir().map_err(ShellError::io("getcwd"))?;
                println!("{}", cwd.display());
            }
            Builtin::Cd(target) => change_dir(shell, target.as_deref())?,
            Builtin::Jobs => print!("{}", shell.jobs.listing()),
            Builtin::Fg(jid) => foreground(shell, jid)?,
            Builtin::Kill { signal, jid } => send_signal(shell, signal, jid)?,
            Builtin::Quit { kill } => {
                if kill {
                    shell.jobs.kill_all_jobs();
                }
                return Ok(Flow::Exit);
            }
            Builtin::Alias(None) => print!("{}", shell.aliases.listing()),
            Builtin::Alias(Some((name, expansion))) => shell.aliases.define(&name, &expansion)?,
            Builtin::Unalias(names) => shell.aliases.remove_all(&names)?,
            Builtin::Unsetenv(names) => unset_env(&names)?,
            Builtin::WatchProc(pid) => println!("{}", sysinfo::watch_proc(pid)?),
            Builtin::Du(path) => println!("{}", sysinfo::disk_usage(path.as_deref())?),
            Builtin::WhoAmI => println!("{}", sysinfo::who_am_i()?),
            Builtin::NetInfo(iface) => print!("{}", sysinfo::net_info(&iface)?),
        }
        Ok(Flow::Continue)
    }
}

fn parse_kill(args: &[String]) -> Result<Builtin> {
    let invalid = || ShellError::InvalidArguments { verb: "kill" };
    let [signal, jid] = args else {
        return Err(invalid());
    };
    let signal = signal
        .strip_prefix('-')
        .and_then(|s| s.parse::<i32>().ok())
        .filter(|s| (1..=libc::SIGRTMAX()).contains(s))
        .ok_or_else(invalid)?;
    let jid = jid.parse::<usize>().map_err(|_| invalid())?;
    Ok(Builtin::Kill { signal, jid })
}

fn change_dir(shell: &mut Shell, target: Option<&str>) -> Result<()> {
    let target: PathBuf = match target {
        None => dirs_next::home_dir().ok_or_else(|| ShellError::domain("cd", "HOME not set"))?,
        Some("-") => shell
            .prev_dir
            .clone()
            .ok_or_else(|| ShellError::domain("cd", "OLDPWD not set"))?,
        Some(path) => PathBuf::from(path),
    };
    let current = env::current_dir().map_err(ShellError::io("getcwd"))?;
    env::set_current_dir(&target).map_err(ShellError::io("chdir"))?;
    debug!(from = %current.display(), to = %target.display(), "changed directory");
    shell.prev_dir = Some(current);
    Ok(())
}

/// `fg [id]`: moves a job out of the table and waits on it as the
/// foreground process, continuing it first if it was stopped.
fn foreground(shell: &mut Shell, jid: Option<usize>) -> Result<()> {
    shell.jobs.remove_finished_jobs();
    let jid = match jid {
        Some(jid) => {
            if shell.jobs.get_job_by_id(jid).is_none() {
                return Err(ShellError::domain(
                    "fg",
                    format!("job-id {} does not exist", jid),
                ));
            }
            jid
        }
        None if shell.jobs.is_empty() => {
            return Err(ShellError::domain("fg", "jobs list is empty"));
        }
        None => shell.jobs.max_id(),
    };

    let job = shell
        .jobs
        .get_job_by_id(jid)
        .cloned()
        .ok_or_else(|| ShellError::domain("fg", format!("job-id {} does not exist", jid)))?;
    if job.stopped {
        kill(job.pid, Signal::SIGCONT).map_err(ShellError::sys("kill"))?;
    }
    shell.jobs.remove_job_by_id(jid);
    println!("{} : {}", job.cmdline, job.pid);
    wait_foreground(job.pid, &job.cmdline, &mut shell.jobs, &shell.foreground)
}

/// `kill -<signum> <id>`. The number is sent as given, so real-time
/// signals work too.
fn send_signal(shell: &mut Shell, signal: i32, jid: usize) -> Result<()> {
    shell.jobs.remove_finished_jobs();
    let job = shell
        .jobs
        .get_job_by_id_mut(jid)
        .ok_or_else(|| ShellError::domain("kill", format!("job-id {} does not exist", jid)))?;
    kill_raw(job.pid, signal).map_err(ShellError::sys("kill"))?;
    println!("signal number {} was sent to pid {}", signal, job.pid);
    match Signal::try_from(signal) {
        Ok(Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU) => {
            job.stopped = true
        }
        Ok(Signal::SIGCONT) => job.stopped = false,
        _ => {}
    }
    Ok(())
}

fn kill_raw(pid: Pid, signal: i32) -> nix::Result<()> {
    // `Signal` has no variants for the real-time range.
    let res = unsafe { libc::kill(pid.as_raw(), signal) };
    Errno::result(res).map(drop)
}

/// Removes variables from this process's environment; children spawned
/// afterwards no longer inherit them. Stops at the first missing name.
fn unset_env(names: &[String]) -> Result<()> {
    if names.is_empty() {
        return Err(ShellError::domain("unsetenv", "not enough arguments"));
    }
    for name in names {
        let valid = !name.is_empty() && !name.contains('=') && !name.contains('\0');
        if !valid || env::var_os(name).is_none() {
            return Err(ShellError::domain(
                "unsetenv",
                format!("{} does not exist", name),
            ));
        }
        env::remove_var(name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_verb_lookup() {
        assert_eq!(Verb::lookup("cd"), Some(Verb::Cd));
        assert_eq!(Verb::lookup("netinfo"), Some(Verb::NetInfo));
        assert_eq!(Verb::lookup("ls"), None);
    }

    #[test]
    fn test_parse_fg() {
        assert_eq!(Builtin::parse(Verb::Fg, &[]).unwrap(), Builtin::Fg(None));
        assert_eq!(
            Builtin::parse(Verb::Fg, &args(&["3"])).unwrap(),
            Builtin::Fg(Some(3))
        );
        assert!(Builtin::parse(Verb::Fg, &args(&["x"])).is_err());
        assert!(Builtin::parse(Verb::Fg, &args(&["1", "2"])).is_err());
    }

    #[test]
    fn test_parse_kill() {
        assert_eq!(
            Builtin::parse(Verb::Kill, &args(&["-9", "2"])).unwrap(),
            Builtin::Kill { signal: 9, jid: 2 }
        );
        assert_eq!(
            Builtin::parse(Verb::Kill, &args(&["-34", "1"])).unwrap(),
            Builtin::Kill { signal: 34, jid: 1 }
        );
        let cases: [&[&str]; 7] = [
            &["9", "2"],
            &["-x", "2"],
            &["-9"],
            &["-9", "a"],
            &["--9", "1"],
            &["-0", "1"],
            &["-65", "1"],
        ];
        for bad in cases {
            let err = Builtin::parse(Verb::Kill, &args(bad)).unwrap_err();
            assert_eq!(err.to_string(), "smash error: kill: invalid arguments");
        }
    }

    #[test]
    fn test_parse_cd_and_quit() {
        let err = Builtin::parse(Verb::Cd, &args(&["a", "b"])).unwrap_err();
        assert_eq!(err.to_string(), "smash error: cd: too many arguments");
        assert_eq!(
            Builtin::parse(Verb::Quit, &args(&["kill"])).unwrap(),
            Builtin::Quit { kill: true }
        );
        assert_eq!(
            Builtin::parse(Verb::Quit, &[]).unwrap(),
            Builtin::Quit { kill: false }
        );
    }

    #[test]
    fn test_chprompt() {
        let mut shell = Shell::new();
        Builtin::ChPrompt(Some("mysh".into())).execute(&mut shell).unwrap();
        assert_eq!(shell.prompt, "mysh");
        Builtin::ChPrompt(None).execute(&mut shell).unwrap();
        assert_eq!(shell.prompt, DEFAULT_PROMPT);
    }

    #[test]
    fn test_fg_on_empty_table() {
        let mut shell = Shell::new();
        let err = Builtin::Fg(None).execute(&mut shell).unwrap_err();
        assert_eq!(err.to_string(), "smash error: fg: jobs list is empty");
        let err = Builtin::Fg(Some(4)).execute(&mut shell).unwrap_err();
        assert_eq!(err.to_string(), "smash error: fg: job-id 4 does not exist");
    }

    #[test]
    fn test_fg_without_id_picks_highest_job() {
        let mut shell = Shell::new();
        let mut long = Command::new("sleep").arg("30").spawn().unwrap();
        let short = Command::new("sleep").arg("0.2").spawn().unwrap();
        shell
            .jobs
            .add_job("sleep 30 &", Pid::from_raw(long.id() as i32), false);
        shell
            .jobs
            .add_job("sleep 0.2 &", Pid::from_raw(short.id() as i32), false);

        Builtin::Fg(None).execute(&mut shell).unwrap();
        assert_eq!(shell.jobs.len(), 1);
        assert!(shell.jobs.get_job_by_id(1).is_some());
        assert_eq!(shell.foreground.get(), None);

        long.kill().unwrap();
        long.wait().unwrap();
    }

    #[test]
    fn test_kill_sends_to_job_pid() {
        let mut shell = Shell::new();
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        shell
            .jobs
            .add_job("sleep 30 &", Pid::from_raw(child.id() as i32), false);

        Builtin::Kill { signal: 9, jid: 1 }
            .execute(&mut shell)
            .unwrap();
        let status = child.wait().unwrap();
        assert!(status.code().is_none());
    }

    #[test]
    fn test_kill_sends_real_time_signal() {
        let mut shell = Shell::new();
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        shell
            .jobs
            .add_job("sleep 30 &", Pid::from_raw(child.id() as i32), false);

        let signal = libc::SIGRTMIN() + 2;
        Builtin::Kill { signal, jid: 1 }
            .execute(&mut shell)
            .unwrap();
        // Real-time signals terminate by default.
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(signal));
    }

    #[test]
    fn test_alias_verb_is_not_parsed_from_split_arguments() {
        let err = Builtin::parse(Verb::Alias, &args(&["ll='ls", "-l'"])).unwrap_err();
        assert!(matches!(err, ShellError::InvalidArguments { verb: "alias" }));
    }

    #[test]
    fn test_kill_unknown_job_sends_nothing() {
        let mut shell = Shell::new();
        let err = Builtin::Kill { signal: 9, jid: 1 }
            .execute(&mut shell)
            .unwrap_err();
        assert_eq!(err.to_string(), "smash error: kill: job-id 1 does not exist");
    }

    #[test]
    fn test_kill_stop_and_continue_track_state() {
        let mut shell = Shell::new();
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        shell
            .jobs
            .add_job("sleep 30 &", Pid::from_raw(child.id() as i32), false);

        Builtin::Kill { signal: Signal::SIGSTOP as i32, jid: 1 }
            .execute(&mut shell)
            .unwrap();
        assert!(shell.jobs.get_job_by_id(1).unwrap().stopped);
        Builtin::Kill { signal: Signal::SIGCONT as i32, jid: 1 }
            .execute(&mut shell)
            .unwrap();
        assert!(!shell.jobs.get_job_by_id(1).unwrap().stopped);

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_quit_exits() {
        let mut shell = Shell::new();
        assert_eq!(
            Builtin::Quit { kill: false }.execute(&mut shell).unwrap(),
            Flow::Exit
        );
    }

    #[test]
    fn test_alias_reserved_name_leaves_table_unchanged() {
        let mut shell = Shell::new();
        let err = Builtin::Alias(Some(("cd".into(), "pwd".into())))
            .execute(&mut shell)
            .unwrap_err();
        assert!(matches!(err, ShellError::Domain { verb: "alias", .. }));
        assert!(shell.aliases.listing().is_empty());
    }

    #[test]
    fn test_unsetenv() {
        env::set_var("SMASH_TEST_UNSET_ME", "1");
        unset_env(&args(&["SMASH_TEST_UNSET_ME"])).unwrap();
        assert!(env::var_os("SMASH_TEST_UNSET_ME").is_none());

        let err = unset_env(&args(&["SMASH_TEST_NEVER_SET"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "smash error: unsetenv: SMASH_TEST_NEVER_SET does not exist"
        );
        assert!(unset_env(&args(&["A=B"])).is_err());
        assert!(unset_env(&[]).is_err());
    }
}
