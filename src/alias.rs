use crate::builtins::Verb;
use crate::error::{Result, ShellError};
use crate::parser::CommandLine;
use std::collections::HashSet;
use tracing::debug;

/// How many alias layers a single line may pass through before it is
/// treated as a cycle.
pub const MAX_ALIAS_DEPTH: usize = 16;

/// User-defined aliases, kept in definition order.
#[derive(Debug, Default)]
pub struct AliasTable {
    entries: Vec<(String, String)>,
}

impl AliasTable {
    pub fn new() -> Self {
        AliasTable::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, expansion)| expansion.as_str())
    }

    /// Adds an alias. The name must be neither a builtin verb nor an
    /// existing alias.
    pub fn define(&mut self, name: &str, expansion: &str) -> Result<()> {
        if Verb::lookup(name).is_some() || self.get(name).is_some() {
            return Err(ShellError::domain(
                "alias",
                format!("{} already exists or is a reserved command", name),
            ));
        }
        debug!(name, expansion, "alias defined");
        self.entries.push((name.to_string(), expansion.to_string()));
        Ok(())
    }

    /// Removes aliases in order, stopping at the first name that is not
    /// defined. Names before it stay removed.
    pub fn remove_all(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Err(ShellError::domain("unalias", "not enough arguments"));
        }
        for name in names {
            match self.entries.iter().position(|(n, _)| n == name) {
                Some(idx) => {
                    self.entries.remove(idx);
                }
                None => {
                    return Err(ShellError::domain(
                        "unalias",
                        format!("{} alias does not exist", name),
                    ))
                }
            }
        }
        Ok(())
    }

    /// One `name='expansion'` line per alias, in definition order.
    pub fn listing(&self) -> String {
        self.entries
            .iter()
            .map(|(name, expansion)| format!("{}='{}'\n", name, expansion))
            .collect()
    }

    /// Substitutes aliases for the verb until the verb is no longer an
    /// alias. Arguments after the verb are appended unchanged and the
    /// background marker is carried to every layer.
    ///
    /// Returns `Ok(None)` when the expansion leaves nothing to run.
    pub fn expand(&self, line: CommandLine) -> Result<Option<CommandLine>> {
        let mut line = line;
        let mut seen = HashSet::new();
        while let Some(expansion) = self.get(line.verb()) {
            let verb = line.verb().to_string();
            if seen.len() == MAX_ALIAS_DEPTH || !seen.insert(verb.clone()) {
                return Err(ShellError::domain(
                    "alias",
                    format!("alias cycle detected while expanding {}", verb),
                ));
            }
            let mut next = format!("{}{}", expansion, line.rest());
            if line.background {
                next.push_str(" &");
            }
            debug!(alias = %verb, expanded = %next, "alias expanded");
            line = match CommandLine::parse(&next) {
                Some(l) => l,
                None => return Ok(None),
            };
        }
        Ok(Some(line))
    }
}

/// Parses the text after the `alias` verb. Blank means "list all";
/// otherwise it must be `name='expansion'`.
pub fn parse_definition(rest: &str) -> Result<Option<(String, String)>> {
    let rest = rest.trim();
    if rest.is_empty() {
        return Ok(None);
    }
    let invalid = || ShellError::domain("alias", "invalid alias format");

    let (name, body) = rest.split_once('=').ok_or_else(invalid)?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }
    let expansion = body
        .strip_prefix('\'')
        .and_then(|b| b.strip_suffix('\''))
        .ok_or_else(invalid)?;
    if expansion.contains('\'') {
        return Err(invalid());
    }
    Ok(Some((name.to_string(), expansion.to_string())))
}
