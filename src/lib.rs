//! # mkflow - Make-driven workflows
//!
//! mkflow writes a GNU Make document one step at a time, so programs can
//! describe "run these commands to turn these inputs into these outputs"
//! without writing Make syntax, then hands the result to make to run with
//! as many parallel jobs as wanted.
//!
//! ## Features
//!
//! - **Incremental authoring**: steps are appended as they are discovered
//! - **Aggregate target**: `MAIN` always depends on every primary output
//! - **Intermediate outputs**: secondary outputs are not rebuilt when deleted
//! - **Multi-output steps**: grouped targets on recent make, a forwarding
//!   chain on older make
//! - **Continuation**: reopen a document and keep appending
//!
//! ## Quick Start
//!
//! ```no_run
//! use mkflow::{BuildDocument, DocumentOptions, RunOptions, Step};
//!
//! let mut doc = BuildDocument::initialize(&DocumentOptions::new().title("Demo"))?;
//! doc.append(Step::new("echo a > o1", (), "o1"))?;
//! doc.append(Step::new("cat o1 > o2", "o1", "o2"))?;
//! let status = doc.run(&RunOptions { jobs: 4, ..Default::default() })?;
//! # Ok::<(), mkflow::WorkflowError>(())
//! ```
//!
//! ## Module Organization
//!
//! - [`document`] - The incrementally built Makefile
//! - [`rule`] - Steps and their encoding as Make rules
//! - [`driver`] - Running a document with make
//! - [`probe`] - Make version detection
//! - [`config`] - Workflow files (`flow.toml`)
//! - [`commands`] - CLI command handlers

/// Argument shaping (single value or list) and path normalization.
pub mod args;

/// CLI command handlers extracted from main.
pub mod commands;

/// Workflow file parsing (`flow.toml`).
pub mod config;

/// The workflow document.
pub mod document;

/// Make invocation.
pub mod driver;

/// Error types.
pub mod error;

/// Make capability detection.
pub mod probe;

/// Steps, rules and rule encoding.
pub mod rule;

pub use args::Arg;
pub use document::{BuildDocument, DocumentOptions};
pub use driver::{ExecutionDriver, RunOptions};
pub use error::{Result, WorkflowError};
pub use probe::Capability;
pub use rule::{Rule, Step};
