//! Doctor command handler
//!
//! Handles `mkflow probe`: reports which make will be used and which rule
//! encoding new documents get.

use anyhow::Result;
use colored::*;

use crate::probe::{self, Capability, GROUPED_TARGETS_AFTER, ProbeResult};

/// Run the `mkflow probe` command
pub fn run_probe(make: &str) -> Result<()> {
    println!("{} Probing {}...", "🔍".blue(), make.bold());

    let result = probe::probe_version(make);
    match &result {
        ProbeResult::Detected(version) => {
            println!("Version... {}", version.to_string().green());
        }
        ProbeResult::Unknown => {
            println!("Version... {}", "Unknown (not found or unrecognised)".yellow());
        }
    }

    let capability = Capability::from_probe(&result);
    match capability {
        Capability::GroupedTargets => {
            println!("Rules...   {}", capability.to_string().green());
        }
        Capability::Legacy => {
            println!("Rules...   {}", capability.to_string().yellow());
            println!(
                "   Grouped targets need GNU Make newer than {}.",
                GROUPED_TARGETS_AFTER
            );
        }
    }

    Ok(())
}
