//! Running a finished document with make.
//!
//! [`RunOptions`] map onto make flags:
//!
//! | option          | flag                       |
//! |-----------------|----------------------------|
//! | `jobs > 1`      | `-j N`                     |
//! | `dry_run`       | `-n --no-print-directory`  |
//! | `debug`         | `-d`                       |
//! | `ignore_errors` | `-i`                       |
//! | `force`         | `-B`                       |
//! | `run_clean`     | `clean` goal               |
//! | `extra_args`    | appended verbatim, last    |
//!
//! The call blocks until make exits. Its exit status is handed back as-is:
//! no retries, no interpretation.

use crate::error::{Result, WorkflowError};
use crate::rule::CLEAN_TARGET;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunOptions {
    /// Parallel make jobs. Must be at least 1.
    pub jobs: u32,
    /// Print what would run without running it.
    pub dry_run: bool,
    /// Make's own debug trace.
    pub debug: bool,
    /// Keep going past failing steps (inside make, not a retry).
    pub ignore_errors: bool,
    /// Treat every target as out of date.
    pub force: bool,
    /// Run the clean target instead of the workflow.
    pub run_clean: bool,
    pub extra_args: Vec<String>,
    /// Working directory for make; the current one when unset.
    pub directory: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            dry_run: false,
            debug: false,
            ignore_errors: true,
            force: false,
            run_clean: false,
            extra_args: Vec::new(),
            directory: None,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(WorkflowError::config(
                "jobs must be a positive integer, got 0",
            ));
        }
        Ok(())
    }
}

/// Launches make against a document.
#[derive(Debug, Clone)]
pub struct ExecutionDriver {
    make: String,
}

impl Default for ExecutionDriver {
    fn default() -> Self {
        Self::new("make")
    }
}

impl ExecutionDriver {
    pub fn new(make: impl Into<String>) -> Self {
        Self { make: make.into() }
    }

    pub fn program(&self) -> &str {
        &self.make
    }

    /// Make arguments for running `makefile` with `options`.
    pub fn arguments(&self, makefile: &Path, options: &RunOptions) -> Result<Vec<OsString>> {
        options.validate()?;

        // make resolves `-f` against its own working directory
        let makefile = match options.directory {
            Some(_) => std::path::absolute(makefile)?,
            None => makefile.to_path_buf(),
        };
        let mut args: Vec<OsString> = vec!["-f".into(), makefile.into_os_string()];

        if options.jobs > 1 {
            args.push("-j".into());
            args.push(options.jobs.to_string().into());
        }
        if options.dry_run {
            args.push("-n".into());
            args.push("--no-print-directory".into());
        }
        if options.debug {
            args.push("-d".into());
        }
        if options.ignore_errors {
            args.push("-i".into());
        }
        if options.force {
            args.push("-B".into());
        }
        if options.run_clean {
            args.push(CLEAN_TARGET.into());
        }
        args.extend(options.extra_args.iter().map(OsString::from));

        Ok(args)
    }

    pub fn command(&self, makefile: &Path, options: &RunOptions) -> Result<Command> {
        let mut cmd = Command::new(&self.make);
        cmd.args(self.arguments(makefile, options)?);
        if let Some(dir) = &options.directory {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    /// Run make to completion and return its exit status.
    pub fn run(&self, makefile: &Path, options: &RunOptions) -> Result<ExitStatus> {
        let mut cmd = self.command(makefile, options)?;

        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        info!(make = %self.make, args = %args.join(" "), dir = ?options.directory, "running workflow");

        let status = cmd.status().map_err(|source| WorkflowError::Launch {
            program: self.make.clone(),
            source,
        })?;

        info!(%status, "make finished");
        Ok(status)
    }
}
