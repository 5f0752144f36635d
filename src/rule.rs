//! Rule encoding.
//!
//! A [`Step`] is what a caller hands over: commands, inputs and outputs in
//! whatever shape is convenient. [`Rule::from_step`] canonicalizes it and
//! [`encode`] turns the result into the text block appended to a document.
//!
//! ## Multi-output steps
//!
//! With [`Capability::GroupedTargets`] a step producing several files is a
//! single grouped rule:
//!
//! ```text
//! a.tif b.tif &: in.tif
//! ```
//!
//! Older make has no grouped targets, so the first output carries the
//! recipe and each further output forwards to the one before it:
//!
//! ```text
//! a.tif : in.tif
//!     ...recipe...
//! b.tif : a.tif
//!     @if test -f $@; then touch -h $@; else ...rebuild a.tif...; fi
//! ```

use crate::args::{Arg, normalize_commands, normalize_paths};
use crate::error::{Result, WorkflowError};
use crate::probe::Capability;
use serde::Deserialize;

/// Aggregate "build everything" target.
pub const AGGREGATE_TARGET: &str = "MAIN";
/// Prints the workflow title before anything else runs.
pub const PRE_BUILD_TARGET: &str = "pre-build";
/// Lists outputs make would still have to produce.
pub const LIST_TARGET: &str = "list";
/// Runs the clean commands on demand.
pub const CLEAN_TARGET: &str = "clean";

const RESERVED_TARGETS: [&str; 4] = [AGGREGATE_TARGET, PRE_BUILD_TARGET, LIST_TARGET, CLEAN_TARGET];

/// Recipe of a legacy forwarding rule. Refreshes the output if it exists,
/// otherwise drops the previous link of the chain and rebuilds it.
const FORWARD_RECIPE: &str = "if test -f $@; then touch -h $@; else if [ -f $^ ]; then rm -f $^ && $(MAKE) -f $(lastword $(MAKEFILE_LIST)) $^; fi; fi";

const QUIET_SUFFIX: &str = " 1> /dev/null";

/// A build step as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Step {
    pub cmds: Arg,
    #[serde(default)]
    pub inputs: Arg,
    pub outputs: Arg,
    /// Order-only prerequisites: must exist, but never force a re-run.
    #[serde(default)]
    pub soft_inputs: Arg,
    #[serde(default)]
    pub title: Option<String>,
    /// Secondary outputs are intermediates: deleting them does not trigger
    /// a rebuild, and they are not part of the aggregate target.
    #[serde(default)]
    pub secondary: bool,
    /// When false, the commands' stdout is discarded.
    #[serde(default = "default_verbose")]
    pub verbose: bool,
}

fn default_verbose() -> bool {
    true
}

impl Step {
    pub fn new(cmds: impl Into<Arg>, inputs: impl Into<Arg>, outputs: impl Into<Arg>) -> Self {
        Self {
            cmds: cmds.into(),
            inputs: inputs.into(),
            outputs: outputs.into(),
            soft_inputs: Arg::default(),
            title: None,
            secondary: false,
            verbose: true,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn soft_inputs(mut self, soft_inputs: impl Into<Arg>) -> Self {
        self.soft_inputs = soft_inputs.into();
        self
    }

    pub fn secondary(mut self) -> Self {
        self.secondary = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }
}

/// A canonicalized build step. Always has at least one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    commands: Vec<String>,
    inputs: Vec<String>,
    soft_inputs: Vec<String>,
    outputs: Vec<String>,
    title: Option<String>,
    secondary: bool,
    verbose: bool,
}

impl Rule {
    pub fn from_step(step: &Step) -> Result<Self> {
        let outputs = normalize_paths(&step.outputs)?;
        let inputs = normalize_paths(&step.inputs)?;
        let soft_inputs = normalize_paths(&step.soft_inputs)?;
        let commands = normalize_commands(&step.cmds)?;

        if outputs.is_empty() {
            return Err(WorkflowError::config("a rule needs at least one output"));
        }
        if let Some(reserved) = outputs.iter().find(|o| RESERVED_TARGETS.contains(&o.as_str())) {
            return Err(WorkflowError::config(format!(
                "'{}' is a reserved target name and cannot be used as an output",
                reserved
            )));
        }

        Ok(Self {
            commands,
            inputs,
            soft_inputs,
            outputs,
            title: step.title.clone(),
            secondary: step.secondary,
            verbose: step.verbose,
        })
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn soft_inputs(&self) -> &[String] {
        &self.soft_inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn is_secondary(&self) -> bool {
        self.secondary
    }
}

/// Encode a rule as a document block. Pure: no I/O.
pub fn encode(rule: &Rule, capability: Capability) -> String {
    let mut block = String::from("\n");

    match capability {
        Capability::GroupedTargets => {
            block.push_str(&rule.outputs.join(" "));
            block.push_str(" &:");
        }
        Capability::Legacy => {
            block.push_str(&rule.outputs[0]);
            block.push_str(" :");
        }
    }
    push_tokens(&mut block, &rule.inputs);
    if !rule.soft_inputs.is_empty() {
        block.push_str(" |");
        push_tokens(&mut block, &rule.soft_inputs);
    }
    block.push('\n');

    if let Some(title) = &rule.title {
        push_recipe_line(&mut block, &print_line(title));
    }

    for line in command_lines(&rule.commands, rule.verbose) {
        push_recipe_line(&mut block, &line);
    }

    if capability == Capability::Legacy {
        for link in rule.outputs.windows(2) {
            block.push_str(&format!("\n{} : {}\n", link[1], link[0]));
            push_recipe_line(&mut block, &format!("@{}", FORWARD_RECIPE));
        }
    }

    block
}

/// Recipe lines of the clean target, without the leading tab.
pub fn encode_clean(commands: &[String]) -> Vec<String> {
    command_lines(commands, true)
}

/// Recipe line printing `text`, without the leading tab. `+` keeps it
/// running under `make -n`.
pub fn print_line(text: &str) -> String {
    format!("@+printf '{}\\n'", escape_text(text))
}

/// Escape free text for a `printf` format inside single quotes.
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\'' => escaped.push_str(r"'\''"),
            '"' => escaped.push_str(r#"'\"'"#),
            '\n' => escaped.push_str(r"\n"),
            '\\' => escaped.push_str(r"\\"),
            '%' => escaped.push_str("%%"),
            '$' => escaped.push_str("$$"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// Each command is previewed in colour, then run. A failing preview (`-`)
// never aborts the rule.
fn command_lines(commands: &[String], verbose: bool) -> Vec<String> {
    let mut lines = Vec::with_capacity(commands.len() * 2);
    for cmd in commands {
        let cmd = if verbose {
            cmd.clone()
        } else {
            format!("{}{}", cmd, QUIET_SUFFIX)
        };
        lines.push(format!(
            "-@echo '${{CMDCOL}}+{}${{DEFCOL}}'",
            cmd.replace('\'', r"'\''")
        ));
        lines.push(format!("@{}", cmd));
    }
    lines
}

fn push_tokens(block: &mut String, tokens: &[String]) {
    for token in tokens {
        block.push(' ');
        block.push_str(token);
    }
}

fn push_recipe_line(block: &mut String, line: &str) {
    block.push('\t');
    block.push_str(line);
    block.push('\n');
}
