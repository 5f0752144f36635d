//! Workflow files (`flow.toml`).
//!
//! ```toml
//! [workflow]
//! title = "*** Test flow ***"
//! makefile = "flow.mk"      # temporary file when omitted
//!
//! [run]
//! jobs = 4
//!
//! [[step]]
//! cmds = "echo foo > hello1"
//! outputs = "hello1"
//!
//! [[step]]
//! cmds = ["sed 's/foo/faa/' hello1 > hello2"]
//! inputs = "hello1"
//! outputs = "hello2"
//!
//! [clean]
//! cmds = "rm -f hello1 hello2"
//! ```

use crate::args::{Arg, normalize_commands};
use crate::document::{BuildDocument, DocumentOptions};
use crate::driver::RunOptions;
use crate::error::{Result, WorkflowError};
use crate::rule::{Rule, Step};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "flow.toml";

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub run: RunOptions,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
    pub clean: Option<CleanConfig>,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    pub title: Option<String>,
    /// Relative paths are resolved against the directory of the flow file.
    pub makefile: Option<PathBuf>,
    /// A flow file describes the whole document, so it is rewritten on
    /// every load unless this is turned off.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
    #[serde(default = "default_make")]
    pub make: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            title: None,
            makefile: None,
            overwrite: default_overwrite(),
            make: default_make(),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct CleanConfig {
    pub cmds: Arg,
}

fn default_overwrite() -> bool {
    true
}

fn default_make() -> String {
    "make".to_string()
}

pub fn load_config(path: &Path) -> Result<FlowConfig> {
    let text = fs::read_to_string(path).map_err(|e| {
        WorkflowError::config(format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_config(&text, path)
}

pub fn parse_config(text: &str, origin: &Path) -> Result<FlowConfig> {
    toml::from_str(text)
        .map_err(|e| WorkflowError::config(format!("failed to parse {}: {}", origin.display(), e)))
}

impl FlowConfig {
    pub fn document_options(&self, base_dir: &Path) -> DocumentOptions {
        DocumentOptions {
            path: self.workflow.makefile.as_ref().map(|p| base_dir.join(p)),
            title: self.workflow.title.clone(),
            overwrite: self.workflow.overwrite,
            make: self.workflow.make.clone(),
            capability: None,
        }
    }

    /// `[run]` with the working directory defaulting to `base_dir`.
    pub fn run_options(&self, base_dir: &Path) -> RunOptions {
        let mut options = self.run.clone();
        options.directory = Some(match &options.directory {
            Some(dir) => base_dir.join(dir),
            None => base_dir.to_path_buf(),
        });
        options
    }

    /// Check every step and option without touching any file.
    ///
    /// Covers everything [`populate`](Self::populate) could reject, so a
    /// document is never left half written.
    pub fn validate(&self) -> Result<()> {
        self.run.validate()?;

        let mut primary: Vec<String> = Vec::new();
        let mut secondary: Vec<String> = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            let in_step = |e: WorkflowError| match e {
                WorkflowError::Config(msg) => {
                    WorkflowError::config(format!("step {}: {}", i + 1, msg))
                }
                other => other,
            };
            let rule = Rule::from_step(step).map_err(in_step)?;

            if rule.is_secondary() {
                if let Some(output) = rule.outputs().iter().find(|o| primary.contains(o)) {
                    return Err(in_step(WorkflowError::config(format!(
                        "'{}' is already a primary output and cannot be made secondary",
                        output
                    ))));
                }
                secondary.extend(rule.outputs().iter().cloned());
            } else {
                primary.extend(
                    rule.outputs()
                        .iter()
                        .filter(|o| !secondary.contains(o))
                        .cloned(),
                );
            }
        }

        if let Some(clean) = &self.clean {
            normalize_commands(&clean.cmds).map_err(|e| match e {
                WorkflowError::Config(msg) => WorkflowError::config(format!("clean: {}", msg)),
                other => other,
            })?;
        }
        Ok(())
    }

    /// Add the configured steps and clean commands to `doc`.
    pub fn populate(&self, doc: &mut BuildDocument) -> Result<()> {
        for step in &self.steps {
            doc.append(step.clone())?;
        }
        if let Some(clean) = &self.clean {
            doc.append_clean(clean.cmds.clone())?;
        }
        Ok(())
    }

    pub fn build_document(&self, base_dir: &Path) -> Result<BuildDocument> {
        self.validate()?;
        let mut doc = BuildDocument::initialize(&self.document_options(base_dir))?;
        self.populate(&mut doc)?;
        Ok(doc)
    }

    /// Compose the document text in a temporary file. The configured
    /// makefile is left alone.
    pub fn render(&self, base_dir: &Path) -> Result<String> {
        self.validate()?;
        let mut options = self.document_options(base_dir);
        options.path = None;
        let mut doc = BuildDocument::initialize(&options)?;
        self.populate(&mut doc)?;
        doc.render()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Capability;

    const FLOW: &str = r#"
[workflow]
title = "*** Test flow ***"

[run]
jobs = 2

[[step]]
title = "Hello1"
cmds = "echo foo > hello1"
outputs = "hello1"

[[step]]
cmds = ["sed 's/foo/faa/' hello1 > hello2"]
inputs = "hello1"
outputs = "hello2"

[[step]]
cmds = "echo bar > scratch"
outputs = "scratch"
secondary = true

[clean]
cmds = "rm -f hello1 hello2"
"#;

    #[test]
    fn test_parse_flow() {
        let config = parse_config(FLOW, Path::new("flow.toml")).unwrap();
        assert_eq!(config.workflow.title.as_deref(), Some("*** Test flow ***"));
        assert_eq!(config.workflow.make, "make");
        assert_eq!(config.run.jobs, 2);
        assert_eq!(config.steps.len(), 3);
        assert!(config.steps[2].secondary);
        assert!(config.clean.is_some());
    }

    #[test]
    fn test_populate_document() {
        let config = parse_config(FLOW, Path::new("flow.toml")).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let options = config
            .document_options(dir.path())
            .capability(Capability::GroupedTargets);
        let mut doc = BuildDocument::initialize(&options).unwrap();
        config.populate(&mut doc).unwrap();

        assert_eq!(doc.aggregate_dependencies(), ["hello1", "hello2"]);
        assert_eq!(doc.secondary_outputs(), ["scratch"]);
        let text = doc.render().unwrap();
        assert!(text.contains("\nMAIN: pre-build hello1 hello2\n"));
        assert!(text.contains("\nclean:\n"));
    }

    #[test]
    fn test_paths_resolved_against_base_dir() {
        let config = parse_config(
            "[workflow]\nmakefile = \"out/flow.mk\"\n[run]\ndirectory = \"work\"\n",
            Path::new("flow.toml"),
        )
        .unwrap();
        let base = Path::new("/projects/dem");
        assert_eq!(
            config.document_options(base).path,
            Some(PathBuf::from("/projects/dem/out/flow.mk"))
        );
        assert_eq!(
            config.run_options(base).directory,
            Some(PathBuf::from("/projects/dem/work"))
        );
    }

    #[test]
    fn test_bad_shapes_are_config_errors() {
        let err = parse_config("[[step]]\ncmds = 3\noutputs = \"o\"\n", Path::new("f.toml"))
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
        assert!(err.to_string().contains("f.toml"));

        let err = parse_config("[run]\njobs = -1\n", Path::new("f.toml")).unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
    }

    #[test]
    fn test_validate_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let makefile = dir.path().join("flow.mk");
        let config = parse_config(
            "[workflow]\nmakefile = \"flow.mk\"\n[[step]]\ncmds = \"a\"\noutputs = \"clean\"\n",
            Path::new("flow.toml"),
        )
        .unwrap();

        let err = config.build_document(dir.path()).unwrap_err();
        assert!(err.to_string().contains("step 1"));
        assert!(!makefile.exists());
    }

    #[test]
    fn test_secondary_after_primary_rejected_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse_config(
            r#"
[workflow]
makefile = "flow.mk"

[[step]]
cmds = "a"
outputs = "o1"

[[step]]
cmds = "b"
outputs = "o1"
secondary = true
"#,
            Path::new("flow.toml"),
        )
        .unwrap();

        let err = config.build_document(dir.path()).unwrap_err();
        assert!(err.to_string().contains("step 2"));
        assert!(!dir.path().join("flow.mk").exists());
    }

    #[test]
    fn test_secondary_then_primary_is_allowed() {
        let config = parse_config(
            "[[step]]\ncmds = \"a\"\noutputs = \"tmp\"\nsecondary = true\n\n[[step]]\ncmds = \"b\"\noutputs = [\"tmp\", \"o\"]\n",
            Path::new("flow.toml"),
        )
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn test_multiline_clean_rejected_before_write() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse_config(
            "[workflow]\nmakefile = \"flow.mk\"\n[[step]]\ncmds = \"a\"\noutputs = \"o1\"\n[clean]\ncmds = \"rm a\\nrm b\"\n",
            Path::new("flow.toml"),
        )
        .unwrap();

        let err = config.build_document(dir.path()).unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
        assert!(err.to_string().contains("clean"));
        assert!(!dir.path().join("flow.mk").exists());
    }

    #[test]
    fn test_rebuilding_rewrites_the_makefile() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse_config(
            "[workflow]\nmakefile = \"flow.mk\"\n[[step]]\ncmds = \"a\"\noutputs = \"o1\"\n",
            Path::new("flow.toml"),
        )
        .unwrap();
        assert!(config.workflow.overwrite);

        for _ in 0..3 {
            let doc = config.build_document(dir.path()).unwrap();
            assert!(!doc.is_continuation());
        }
        let text = fs::read_to_string(dir.path().join("flow.mk")).unwrap();
        assert_eq!(text.matches("\no1 ").count(), 1);
        assert!(text.contains("\nMAIN: o1\n"));
    }

    #[test]
    fn test_render_leaves_makefile_alone() {
        let dir = tempfile::tempdir().unwrap();
        let config = parse_config(
            "[workflow]\nmakefile = \"flow.mk\"\n[[step]]\ncmds = \"a\"\noutputs = \"o1\"\n",
            Path::new("flow.toml"),
        )
        .unwrap();

        let text = config.render(dir.path()).unwrap();
        assert!(text.contains("\nMAIN: o1\n"));
        assert!(!dir.path().join("flow.mk").exists());
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/flow.toml")).unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
    }
}
