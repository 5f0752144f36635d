//! Workflow command handlers
//!
//! Handles `mkflow run`, `mkflow render` and `mkflow missing`.

use anyhow::{Context, Result};
use colored::*;
use std::path::{Path, PathBuf};

use crate::config::{self, FlowConfig};
use crate::document::BuildDocument;
use crate::driver::RunOptions;
use crate::rule::LIST_TARGET;

/// Command-line adjustments on top of the `[run]` table.
#[derive(Debug, Default, Clone)]
pub struct RunOverrides {
    pub jobs: Option<u32>,
    pub dry_run: bool,
    pub debug: bool,
    pub stop_on_error: bool,
    pub force: bool,
    pub clean: bool,
    pub extra_args: Vec<String>,
}

impl RunOverrides {
    pub fn apply(&self, options: &mut RunOptions) {
        if let Some(jobs) = self.jobs {
            options.jobs = jobs;
        }
        options.dry_run |= self.dry_run;
        options.debug |= self.debug;
        options.force |= self.force;
        options.run_clean |= self.clean;
        if self.stop_on_error {
            options.ignore_errors = false;
        }
        options.extra_args.extend(self.extra_args.iter().cloned());
    }
}

/// Load a flow file; returns it with the directory it lives in.
pub fn load(config_path: &Path, make: Option<&str>) -> Result<(FlowConfig, PathBuf)> {
    let mut flow = config::load_config(config_path)?;
    if let Some(make) = make {
        flow.workflow.make = make.to_string();
    }

    let parent = match config_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let base_dir = std::path::absolute(parent)
        .with_context(|| format!("Failed to resolve {}", parent.display()))?;

    Ok((flow, base_dir))
}

fn build(flow: &FlowConfig, base_dir: &Path) -> Result<BuildDocument> {
    let doc = flow
        .build_document(base_dir)
        .context("Failed to build workflow document")?;

    println!(
        "   {} {} step(s), {} ({})",
        "📄".cyan(),
        flow.steps.len(),
        doc.path().display(),
        doc.capability()
    );
    Ok(doc)
}

/// Run `mkflow run`. Returns make's exit code.
pub fn run_flow(config_path: &Path, make: Option<&str>, overrides: &RunOverrides) -> Result<i32> {
    let (flow, base_dir) = load(config_path, make)?;

    let mut options = flow.run_options(&base_dir);
    overrides.apply(&mut options);
    options.validate()?;

    println!("{} Running workflow {}", "🚀".green(), config_path.display());
    let mut doc = build(&flow, &base_dir)?;
    let status = doc.run(&options)?;

    match status.code() {
        Some(0) => {
            println!("{} Workflow finished", "✓".green());
            Ok(0)
        }
        Some(code) => {
            println!("{} make exited with status {}", "x".red(), code);
            Ok(code)
        }
        None => {
            println!("{} make was terminated by a signal", "x".red());
            Ok(1)
        }
    }
}

/// Run `mkflow render`: print the generated document without writing it.
pub fn render_flow(config_path: &Path, make: Option<&str>) -> Result<()> {
    let (flow, base_dir) = load(config_path, make)?;
    let text = flow
        .render(&base_dir)
        .context("Failed to build workflow document")?;
    print!("{}", text);
    Ok(())
}

/// Run `mkflow missing`: list outputs make would still have to build.
pub fn list_missing(config_path: &Path, make: Option<&str>) -> Result<i32> {
    let (flow, base_dir) = load(config_path, make)?;

    let mut options = flow.run_options(&base_dir);
    options.run_clean = false;
    options.dry_run = false;
    options.extra_args = vec![LIST_TARGET.to_string()];

    let mut doc = build(&flow, &base_dir)?;
    let status = doc.run(&options)?;
    Ok(status.code().unwrap_or(1))
}
