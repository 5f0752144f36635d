//! The workflow document.
//!
//! A [`BuildDocument`] owns a Makefile that grows one rule at a time. Rule
//! blocks are appended to the backing file as soon as they are added; the
//! parts that keep changing as rules arrive live in memory until
//! [`BuildDocument::finalize`]:
//!
//! - the `MAIN` dependency list (every primary output, in order)
//! - the `.SECONDARY` declaration (intermediate outputs)
//! - the `clean` target
//!
//! `finalize` writes them into the file once. [`BuildDocument::render`]
//! composes the same text at any time without touching the file.
//!
//! ## Continuation
//!
//! Opening an existing path without `overwrite` continues that document
//! instead of starting over. No header is written and make is not probed
//! again; the rule encoding is inferred from the rules already in the file,
//! so a document that has no grouped rules yet stays on the legacy encoding.
//!
//! Only what is on disk is continued. A document that is still alive has not
//! written its `MAIN` list, `.SECONDARY` list or clean target yet, so
//! finalize (or drop) it before opening its path again.

use crate::args::{Arg, normalize_commands};
use crate::driver::{ExecutionDriver, RunOptions};
use crate::error::{Result, WorkflowError};
use crate::probe::{self, Capability};
use crate::rule::{
    self, AGGREGATE_TARGET, CLEAN_TARGET, LIST_TARGET, PRE_BUILD_TARGET, Rule, Step,
};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// How a document is opened.
#[derive(Debug, Clone)]
pub struct DocumentOptions {
    /// Backing file. `None` uses a temporary file removed on drop.
    pub path: Option<PathBuf>,
    /// Printed before anything else when the workflow runs.
    pub title: Option<String>,
    /// Start over even if `path` already exists.
    pub overwrite: bool,
    /// Make program used for probing and running.
    pub make: String,
    /// Skip probing and use this encoding.
    pub capability: Option<Capability>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            path: None,
            title: None,
            overwrite: false,
            make: "make".to_string(),
            capability: None,
        }
    }
}

impl DocumentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn make(mut self, make: impl Into<String>) -> Self {
        self.make = make.into();
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }
}

enum Backing {
    Ephemeral(TempPath),
    Persistent(PathBuf),
}

impl Backing {
    fn path(&self) -> &Path {
        match self {
            Backing::Ephemeral(path) => path,
            Backing::Persistent(path) => path,
        }
    }
}

/// An incrementally built Makefile.
pub struct BuildDocument {
    backing: Backing,
    /// Append handle; `None` once finalized.
    file: Option<File>,
    capability: Capability,
    make: String,
    /// Dependencies of `MAIN`, `pre-build` first when titled.
    aggregate: Vec<String>,
    secondary: Vec<String>,
    /// Recipe lines of the clean target.
    clean: Vec<String>,
    continuation: bool,
}

impl BuildDocument {
    /// Create a new document, or continue an existing one (see module docs).
    pub fn initialize(options: &DocumentOptions) -> Result<Self> {
        // Absolute, so make still finds it from another working directory.
        let path = options.path.as_deref().map(std::path::absolute).transpose()?;
        let backing = match path {
            Some(path) if path.exists() && !options.overwrite => {
                return Self::reopen(path, options.make.clone());
            }
            Some(path) => Backing::Persistent(path),
            None => Backing::Ephemeral(
                tempfile::Builder::new()
                    .prefix("mkflow-")
                    .suffix(".mk")
                    .tempfile()?
                    .into_temp_path(),
            ),
        };

        let capability = options
            .capability
            .unwrap_or_else(|| probe::probe(&options.make));

        let mut aggregate = Vec::new();
        if options.title.is_some() {
            aggregate.push(PRE_BUILD_TARGET.to_string());
        }

        fs::write(
            backing.path(),
            header_text(options.title.as_deref(), &aggregate),
        )?;
        let file = open_append(backing.path())?;

        info!(path = %backing.path().display(), %capability, "created workflow document");

        Ok(Self {
            backing,
            file: Some(file),
            capability,
            make: options.make.clone(),
            aggregate,
            secondary: Vec::new(),
            clean: Vec::new(),
            continuation: false,
        })
    }

    fn reopen(path: PathBuf, make: String) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let existing = parse_existing(&content).ok_or_else(|| {
            WorkflowError::state(format!(
                "{} has no {} target; not a workflow document",
                path.display(),
                AGGREGATE_TARGET
            ))
        })?;

        // Trailing blocks are held in memory again, so new rules land
        // before them.
        fs::write(&path, &existing.body)?;
        let file = open_append(&path)?;
        let capability = Capability::detect_in(&existing.body);

        info!(
            path = %path.display(),
            %capability,
            outputs = existing.aggregate.len(),
            "continuing workflow document"
        );

        Ok(Self {
            backing: Backing::Persistent(path),
            file: Some(file),
            capability,
            make,
            aggregate: existing.aggregate,
            secondary: existing.secondary,
            clean: existing.clean,
            continuation: true,
        })
    }

    /// Add a build step.
    ///
    /// Primary outputs join the `MAIN` target in call order, each once.
    /// Secondary outputs are declared `.SECONDARY` instead and never become
    /// `MAIN` dependencies.
    pub fn append(&mut self, step: Step) -> Result<()> {
        self.ensure_open()?;
        let rule = Rule::from_step(&step)?;

        if rule.is_secondary()
            && let Some(primary) = rule.outputs().iter().find(|o| self.aggregate.contains(o))
        {
            return Err(WorkflowError::config(format!(
                "'{}' is already a primary output and cannot be made secondary",
                primary
            )));
        }

        let block = rule::encode(&rule, self.capability);
        self.write_block(&block)?;

        if rule.is_secondary() {
            for output in rule.outputs() {
                if !self.secondary.contains(output) {
                    self.secondary.push(output.clone());
                }
            }
        } else {
            for output in rule.outputs() {
                if !self.aggregate.contains(output) && !self.secondary.contains(output) {
                    self.aggregate.push(output.clone());
                }
            }
        }

        debug!(
            outputs = ?rule.outputs(),
            inputs = ?rule.inputs(),
            secondary = rule.is_secondary(),
            "appended rule"
        );
        Ok(())
    }

    /// Add commands to the `clean` target, run with `make clean`.
    pub fn append_clean(&mut self, cmds: impl Into<Arg>) -> Result<()> {
        self.ensure_open()?;
        let cmds = normalize_commands(&cmds.into())?;
        self.clean.extend(rule::encode_clean(&cmds));
        debug!(commands = cmds.len(), "extended clean target");
        Ok(())
    }

    /// The full document text as it currently stands.
    pub fn render(&self) -> Result<String> {
        let on_disk = fs::read_to_string(self.path())?;
        if self.is_finalized() {
            return Ok(on_disk);
        }
        self.compose(&on_disk)
    }

    /// Write the in-memory parts into the file and close it for appending.
    pub fn finalize(&mut self) -> Result<()> {
        self.ensure_open()?;
        let text = self.render()?;
        fs::write(self.path(), text)?;
        self.file = None;

        info!(
            path = %self.path().display(),
            outputs = self.aggregate_dependencies().len(),
            secondary = self.secondary.len(),
            "finalized workflow document"
        );
        Ok(())
    }

    /// Finalize if needed and run the document with make.
    pub fn run(&mut self, options: &RunOptions) -> Result<ExitStatus> {
        options.validate()?;
        if !self.is_finalized() {
            self.finalize()?;
        }
        ExecutionDriver::new(&self.make).run(self.path(), options)
    }

    pub fn path(&self) -> &Path {
        self.backing.path()
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Outputs `MAIN` depends on, in the order they were added.
    pub fn aggregate_dependencies(&self) -> &[String] {
        match self.aggregate.first() {
            Some(first) if first == PRE_BUILD_TARGET => &self.aggregate[1..],
            _ => &self.aggregate,
        }
    }

    pub fn secondary_outputs(&self) -> &[String] {
        &self.secondary
    }

    pub fn is_continuation(&self) -> bool {
        self.continuation
    }

    pub fn is_finalized(&self) -> bool {
        self.file.is_none()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_finalized() {
            return Err(WorkflowError::state(format!(
                "{} is finalized; reopen it to append more rules",
                self.path().display()
            )));
        }
        Ok(())
    }

    fn write_block(&mut self, block: &str) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| WorkflowError::state("document is not open for appending"))?;
        file.write_all(block.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn compose(&self, on_disk: &str) -> Result<String> {
        let mut text = String::with_capacity(on_disk.len() + 256);
        let mut replaced = false;

        for line in on_disk.split_inclusive('\n') {
            if !replaced && aggregate_tokens(line).is_some() {
                text.push_str(&aggregate_line(&self.aggregate));
                text.push('\n');
                replaced = true;
            } else {
                text.push_str(line);
            }
        }

        if !replaced {
            return Err(WorkflowError::state(format!(
                "{} lost its {} target line",
                self.path().display(),
                AGGREGATE_TARGET
            )));
        }

        if !self.secondary.is_empty() {
            text.push_str(&format!("\n.SECONDARY: {}\n", self.secondary.join(" ")));
        }

        if !self.clean.is_empty() {
            text.push_str(&format!("\n.PHONY: {0}\n{0}:\n", CLEAN_TARGET));
            for line in &self.clean {
                text.push('\t');
                text.push_str(line);
                text.push('\n');
            }
        }

        Ok(text)
    }
}

impl Drop for BuildDocument {
    fn drop(&mut self) {
        if matches!(self.backing, Backing::Persistent(_))
            && !self.is_finalized()
            && let Err(e) = self.finalize()
        {
            warn!(path = %self.path().display(), error = %e, "could not finalize workflow document");
        }
    }
}

impl std::fmt::Debug for BuildDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildDocument")
            .field("path", &self.path())
            .field("capability", &self.capability)
            .field("aggregate", &self.aggregate)
            .field("secondary", &self.secondary)
            .field("finalized", &self.is_finalized())
            .finish()
    }
}

fn open_append(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().append(true).open(path)?)
}

fn header_text(title: Option<&str>, aggregate: &[String]) -> String {
    let mut text = String::new();

    match title {
        Some(_) => text.push_str(&format!(
            ".PHONY: {} {} {}\n",
            AGGREGATE_TARGET, PRE_BUILD_TARGET, LIST_TARGET
        )),
        None => text.push_str(&format!(".PHONY: {} {}\n", AGGREGATE_TARGET, LIST_TARGET)),
    }

    // Colours for the command previews
    text.push_str("\nCMDCOL := \u{1b}[32m\n");
    text.push_str("DEFCOL := \u{1b}[0m\n");

    text.push('\n');
    text.push_str(&aggregate_line(aggregate));
    text.push('\n');

    if let Some(title) = title {
        text.push_str(&format!(
            "\n{}:\n\t{}\n",
            PRE_BUILD_TARGET,
            rule::print_line(title)
        ));
    }

    text.push_str(&format!("\n{}:\n", LIST_TARGET));
    text.push_str("\t@printf '** Missing outputs **\\n'\n");
    text.push_str(&format!(
        "\t@$(MAKE) -n --debug -f $(lastword $(MAKEFILE_LIST)) | sed -n -e 's/^.*Must remake target //p' | sed -e '/{}/d' | sed -e '/{}/d'\n",
        AGGREGATE_TARGET, PRE_BUILD_TARGET
    ));

    text
}

fn aggregate_line(tokens: &[String]) -> String {
    let mut line = format!("{}:", AGGREGATE_TARGET);
    for token in tokens {
        line.push(' ');
        line.push_str(token);
    }
    line
}

/// Dependencies on a `MAIN:` line, `None` for any other line.
fn aggregate_tokens(line: &str) -> Option<Vec<String>> {
    let rest = line.strip_prefix(AGGREGATE_TARGET)?.strip_prefix(':')?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.split_whitespace().map(String::from).collect())
}

struct ExistingDocument {
    /// Everything except the trailing blocks, newline-terminated.
    body: String,
    aggregate: Vec<String>,
    secondary: Vec<String>,
    clean: Vec<String>,
}

/// Split a previously written document into its body and the parts that
/// are kept in memory. `None` if there is no `MAIN` line.
fn parse_existing(content: &str) -> Option<ExistingDocument> {
    let mut body = String::with_capacity(content.len());
    let mut aggregate = None;
    let mut secondary: Vec<String> = Vec::new();
    let mut clean = Vec::new();
    let clean_phony = format!(".PHONY: {}", CLEAN_TARGET);

    let mut lines = content.lines().peekable();
    while let Some(line) = lines.next() {
        if aggregate.is_none()
            && let Some(tokens) = aggregate_tokens(line)
        {
            aggregate = Some(tokens);
        } else if let Some(tokens) = secondary_tokens(line) {
            for token in tokens {
                if !secondary.iter().any(|s| s == token) {
                    secondary.push(token.to_string());
                }
            }
            continue;
        } else if line.trim_end() == clean_phony {
            continue;
        } else if is_clean_header(line) {
            while let Some(recipe) = lines.next_if(|l| l.starts_with('\t')) {
                clean.push(recipe[1..].to_string());
            }
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }

    let mut body = body.trim_end().to_string();
    body.push('\n');

    Some(ExistingDocument {
        body,
        aggregate: aggregate?,
        secondary,
        clean,
    })
}

fn secondary_tokens(line: &str) -> Option<std::str::SplitWhitespace<'_>> {
    let rest = line.strip_prefix(".SECONDARY")?.trim_start().strip_prefix(':')?;
    Some(rest.split_whitespace())
}

fn is_clean_header(line: &str) -> bool {
    line.strip_prefix(CLEAN_TARGET)
        .is_some_and(|rest| rest.trim() == ":")
}
