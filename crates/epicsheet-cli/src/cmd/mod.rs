//! Subcommand handlers.
//!
//! Each module owns one command's clap `Args` and its `run_*` entry point.
//! Handlers render their own errors before returning them, so `main` only
//! sets the exit status.

pub mod blocker;
pub mod comment;
pub mod completions;
pub mod create;
pub mod init;
pub mod list;
pub mod migrate;
pub mod mine;
pub mod progress;
pub mod schema_version;
pub mod show;
pub mod status;
pub mod team;
pub mod timeline;

use crate::agent;
use crate::output::{CliError, OutputMode, render_error};
use crate::validate::{self, ValidationError};
use epicsheet_core::model::Platform;
use epicsheet_core::{EpicStore, ErrorCode, StoreError, config};
use std::path::PathBuf;
use tracing::debug;

/// What every command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct Context {
    pub config_path: Option<PathBuf>,
    pub output: OutputMode,
    pub author_flag: Option<String>,
}

impl Context {
    /// Resolve configuration and open the workbook it points at.
    pub fn open_store(&self) -> anyhow::Result<EpicStore> {
        let config = match config::load(self.config_path.as_deref()) {
            Ok(config) => config,
            Err(e) => {
                render_error(
                    self.output,
                    &CliError::with_details(
                        format!("{e:#}"),
                        "Check --config, EPICSHEET_BACKEND and SPREADSHEET_ID",
                        ErrorCode::ConfigInvalid.code(),
                    ),
                )?;
                return Err(e);
            }
        };
        debug!(backend = %config.backend, "opening workbook");
        EpicStore::open(config).map_err(|e| self.fail(&e))
    }

    /// Render a store error and turn it into the command's failure.
    pub fn fail(&self, err: &StoreError) -> anyhow::Error {
        match render_error(self.output, &CliError::from(err)) {
            Ok(()) => anyhow::anyhow!("{err}"),
            Err(render) => render,
        }
    }

    pub fn invalid(&self, err: &ValidationError) -> anyhow::Error {
        match render_error(self.output, &err.to_cli_error()) {
            Ok(()) => anyhow::anyhow!("{}", err.reason),
            Err(render) => render,
        }
    }

    /// The author of a mutating command, resolved and validated.
    pub fn author(&self) -> anyhow::Result<String> {
        let author = match agent::require_author(self.author_flag.as_deref()) {
            Ok(author) => author,
            Err(e) => {
                render_error(
                    self.output,
                    &CliError::with_details(&e.message, "Set --author or EPICSHEET_AUTHOR", e.code),
                )?;
                anyhow::bail!("{}", e.message);
            }
        };
        validate::validate_author(&author).map_err(|e| self.invalid(&e))?;
        Ok(author)
    }

    pub fn platform(&self, raw: &str) -> anyhow::Result<Platform> {
        validate::validate_platform(raw).map_err(|e| self.invalid(&e))
    }

    /// Like [`Self::platform`] for optional flags.
    pub fn maybe_platform(&self, raw: Option<&str>) -> anyhow::Result<Option<Platform>> {
        raw.map(|raw| self.platform(raw)).transpose()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::json_context;

    #[test]
    fn explicit_author_is_used() {
        assert_eq!(json_context().author().ok().as_deref(), Some("@tester"));
    }

    #[test]
    fn platform_flag_is_validated() {
        let ctx = json_context();
        assert!(ctx.platform("ios").is_ok());
        assert!(ctx.platform("windows").is_err());
        assert!(ctx.maybe_platform(None).expect("none").is_none());
    }
}
