//! Author identity for mutating commands.
//!
//! Resolution chain: `--author` flag > `EPICSHEET_AUTHOR` env > `USER` env
//! (interactive terminals only). Read-only commands never ask for one.

use std::env;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorResolutionError {
    pub message: String,
    pub code: &'static str,
}

impl std::fmt::Display for AuthorResolutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AuthorResolutionError {}

/// Environment reader, injectable for tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
    fn is_tty(&self) -> bool;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }

    fn is_tty(&self) -> bool {
        use std::io::IsTerminal;
        std::io::stdin().is_terminal()
    }
}

fn resolve_author_with(cli_flag: Option<&str>, env: &dyn EnvReader) -> Option<String> {
    if let Some(author) = cli_flag.map(str::trim).filter(|a| !a.is_empty()) {
        return Some(author.to_string());
    }
    if let Some(val) = env.get("EPICSHEET_AUTHOR") {
        return Some(val.trim().to_string());
    }
    // USER is only trusted when a person is at the keyboard.
    if env.is_tty() {
        return env.get("USER");
    }
    None
}

pub fn resolve_author(cli_flag: Option<&str>) -> Option<String> {
    resolve_author_with(cli_flag, &RealEnv)
}

/// Resolve the author, failing with a structured error when none is found.
pub fn require_author(cli_flag: Option<&str>) -> Result<String, AuthorResolutionError> {
    resolve_author(cli_flag).ok_or_else(|| AuthorResolutionError {
        message: "An author is required for this command.".to_string(),
        code: "missing_author",
    })
}
