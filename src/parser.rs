use crate::alias;
use crate::builtins::{Builtin, Verb};
use crate::error::{Result, ShellError};

/// Longest command line accepted from the reader; also the display bound
/// for job command texts.
pub const MAX_COMMAND_LENGTH: usize = 200;

/// One input line, with the facts every dispatch cycle needs computed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// The trimmed line as typed, background marker included.
    pub display: String,
    /// The trimmed line with the trailing `&` and the whitespace before it
    /// removed.
    pub text: String,
    pub background: bool,
}

impl CommandLine {
    /// Returns `None` for a blank line.
    pub fn parse(raw: &str) -> Option<Self> {
        let display = raw.trim();
        if display.is_empty() {
            return None;
        }
        let (text, background) = match display.strip_suffix('&') {
            Some(stripped) => (stripped.trim_end(), true),
            None => (display, false),
        };
        Some(CommandLine {
            display: display.to_string(),
            text: text.to_string(),
            background,
        })
    }

    /// First whitespace-delimited token. Empty for a line that was only `&`.
    pub fn verb(&self) -> &str {
        self.text.split_whitespace().next().unwrap_or("")
    }

    /// Everything after the verb, leading whitespace kept.
    pub fn rest(&self) -> &str {
        let start = self.text.len() - self.text.trim_start().len();
        let after = &self.text[start..];
        match after.find(char::is_whitespace) {
            Some(idx) => &after[idx..],
            None => "",
        }
    }

    /// The arguments following the verb.
    pub fn args(&self) -> Vec<String> {
        parse_args(&self.text).into_iter().skip(1).collect()
    }
}

/// Splits a line into an owned argument vector on whitespace. No quoting.
pub fn parse_args(text: &str) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}

/// How an external program gets loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    /// Plain argument vector, resolved through `PATH`.
    Argv(Vec<String>),
    /// A line carrying wildcards, handed to `bash -c`.
    Complex(String),
}

impl Program {
    pub fn from_text(text: &str) -> Self {
        if text.contains('*') || text.contains('?') {
            Program::Complex(text.to_string())
        } else {
            Program::Argv(parse_args(text))
        }
    }
}

/// What a dispatch cycle will do. Built fresh for every line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Builtin(Builtin),
    /// Run `inner` through the resolver with stdout sent to `path`.
    Redirection {
        inner: String,
        path: String,
        append: bool,
    },
    /// Two external programs joined by a pipe. With `stderr` set the left
    /// side's standard error feeds the pipe instead of its standard output.
    Pipeline {
        left: Vec<String>,
        right: Vec<String>,
        stderr: bool,
    },
    External(Program),
}

/// Picks the handler for an already alias-expanded line.
///
/// `>` is searched for first, so a line holding both `>` and `|` is always a
/// redirection whose inner command is the pipeline.
pub fn classify(line: &CommandLine) -> Result<Command> {
    let verb = line.verb();
    if verb.is_empty() {
        return Err(ShellError::domain("syntax", "unexpected `&`"));
    }

    // The alias body is a quoted literal that may hold operators.
    if verb == "alias" {
        return Ok(Command::Builtin(Builtin::Alias(alias::parse_definition(
            line.rest(),
        )?)));
    }
    if let Some(idx) = line.text.find('>') {
        return parse_redirection(line, idx);
    }
    if let Some(idx) = line.text.find('|') {
        return parse_pipeline(line, idx);
    }
    if let Some(verb) = Verb::lookup(verb) {
        return Ok(Command::Builtin(Builtin::parse(verb, &line.args())?));
    }
    Ok(Command::External(Program::from_text(&line.text)))
}

fn parse_redirection(line: &CommandLine, idx: usize) -> Result<Command> {
    let inner = line.text[..idx].trim();
    let after = &line.text[idx + 1..];
    let (append, path) = match after.strip_prefix('>') {
        Some(path) => (true, path.trim()),
        None => (false, after.trim()),
    };
    if inner.is_empty() || path.is_empty() || path.contains('>') {
        return Err(ShellError::InvalidArguments { verb: "redirection" });
    }
    let inner = if line.background {
        format!("{} &", inner)
    } else {
        inner.to_string()
    };
    Ok(Command::Redirection {
        inner,
        path: path.to_string(),
        append,
    })
}

fn parse_pipeline(line: &CommandLine, idx: usize) -> Result<Command> {
    // Both sides are waited on before the prompt returns.
    if line.background {
        return Err(ShellError::domain(
            "pipe",
            "pipelines cannot run in the background",
        ));
    }
    let text = &line.text;
    let after = &text[idx + 1..];
    let (stderr, right) = match after.strip_prefix('&') {
        Some(right) => (true, right),
        None => (false, after),
    };
    let left = parse_args(&text[..idx]);
    let right = parse_args(right);
    if left.is_empty() || right.is_empty() || right.iter().any(|a| a.contains('|')) {
        return Err(ShellError::InvalidArguments { verb: "pipe" });
    }
    Ok(Command::Pipeline {
        left,
        right,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(raw: &str) -> CommandLine {
        CommandLine::parse(raw).unwrap()
    }

    #[test]
    fn test_blank_line() {
        assert!(CommandLine::parse("   \t ").is_none());
    }

    #[test]
    fn test_background_marker() {
        let l = line("  sleep 10   &  ");
        assert!(l.background);
        assert_eq!(l.text, "sleep 10");
        assert_eq!(l.display, "sleep 10   &");
        assert_eq!(l.verb(), "sleep");

        let l = line("sleep 10&");
        assert!(l.background);
        assert_eq!(l.text, "sleep 10");

        let l = line("sleep 10");
        assert!(!l.background);
        assert_eq!(l.display, l.text);
    }

    #[test]
    fn test_lone_ampersand_is_rejected() {
        let l = line("&");
        assert!(l.background);
        assert!(classify(&l).is_err());
    }

    #[test]
    fn test_rest_keeps_arguments_verbatim() {
        let l = line("ll -a  /tmp");
        assert_eq!(l.verb(), "ll");
        assert_eq!(l.rest(), " -a  /tmp");
        assert_eq!(line("ll").rest(), "");
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(parse_args("  ls   -l\t-a "), vec!["ls", "-l", "-a"]);
        assert!(parse_args("   ").is_empty());
    }

    #[test]
    fn test_external_and_wildcards() {
        assert_eq!(
            classify(&line("ls -l")).unwrap(),
            Command::External(Program::Argv(vec!["ls".into(), "-l".into()]))
        );
        assert_eq!(
            classify(&line("ls *.rs")).unwrap(),
            Command::External(Program::Complex("ls *.rs".into()))
        );
    }

    #[test]
    fn test_redirection() {
        assert_eq!(
            classify(&line("echo hi > /tmp/out.txt")).unwrap(),
            Command::Redirection {
                inner: "echo hi".into(),
                path: "/tmp/out.txt".into(),
                append: false,
            }
        );
        assert_eq!(
            classify(&line("echo hi>>/tmp/out.txt")).unwrap(),
            Command::Redirection {
                inner: "echo hi".into(),
                path: "/tmp/out.txt".into(),
                append: true,
            }
        );
        assert!(classify(&line("> /tmp/out.txt")).is_err());
        assert!(classify(&line("echo hi >")).is_err());
    }

    #[test]
    fn test_redirection_keeps_background_for_inner_command() {
        match classify(&line("sleep 1 > /tmp/x &")).unwrap() {
            Command::Redirection { inner, .. } => assert_eq!(inner, "sleep 1 &"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_redirection_takes_precedence_over_pipe() {
        match classify(&line("seq 3 | wc -l > /tmp/count")).unwrap() {
            Command::Redirection { inner, path, .. } => {
                assert_eq!(inner, "seq 3 | wc -l");
                assert_eq!(path, "/tmp/count");
            }
            other => panic!("unexpected {:?}", other),
        }
        // The `>` wins even when it comes after the pipe.
        assert!(matches!(
            classify(&line("echo a | cat > /tmp/x")).unwrap(),
            Command::Redirection { .. }
        ));
    }

    #[test]
    fn test_pipeline() {
        assert_eq!(
            classify(&line("seq 5 | wc -l")).unwrap(),
            Command::Pipeline {
                left: vec!["seq".into(), "5".into()],
                right: vec!["wc".into(), "-l".into()],
                stderr: false,
            }
        );
        assert_eq!(
            classify(&line("ls /nope |& wc -l")).unwrap(),
            Command::Pipeline {
                left: vec!["ls".into(), "/nope".into()],
                right: vec!["wc".into(), "-l".into()],
                stderr: true,
            }
        );
        assert!(classify(&line("| wc")).is_err());
        assert!(classify(&line("a | b | c")).is_err());
    }

    #[test]
    fn test_background_pipeline_is_rejected() {
        let err = classify(&line("seq 5 | wc -l &")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "smash error: pipe: pipelines cannot run in the background"
        );
        // Behind a redirection the inner pipeline carries the marker.
        match classify(&line("seq 5 | wc -l > /tmp/n &")).unwrap() {
            Command::Redirection { inner, .. } => {
                assert!(classify(&line(&inner)).is_err());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_builtins_are_recognized() {
        assert_eq!(
            classify(&line("fg 2")).unwrap(),
            Command::Builtin(Builtin::Fg(Some(2)))
        );
        assert_eq!(
            classify(&line("jobs")).unwrap(),
            Command::Builtin(Builtin::Jobs)
        );
        assert!(classify(&line("fg two")).is_err());
    }

    #[test]
    fn test_alias_body_may_hold_operators() {
        assert_eq!(
            classify(&line("alias cnt='ls | wc -l'")).unwrap(),
            Command::Builtin(Builtin::Alias(Some((
                "cnt".into(),
                "ls | wc -l".into()
            ))))
        );
    }
}
