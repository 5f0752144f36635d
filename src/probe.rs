//! Make capability detection.
//!
//! Grouped targets (`a b &: deps`) are only understood by recent GNU Make.
//! The installed version is asked for once per document and reduced to a
//! [`Capability`]; anything that goes wrong along the way yields the legacy
//! encoding, which every make understands.

use regex::Regex;
use semver::Version;
use std::process::Command;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Versions strictly above this one get grouped-target rules.
pub const GROUPED_TARGETS_AFTER: Version = Version::new(4, 3, 0);

/// Rule encoding a document is written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// One `&:` rule per step.
    GroupedTargets,
    /// Primary rule plus a forwarding chain for extra outputs.
    Legacy,
}

/// Outcome of asking make for its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Detected(Version),
    Unknown,
}

// Header of a grouped rule, e.g. `a b &: c`. Recipe lines start with a tab.
static GROUPED_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[^\t#\s][^\n]*?\s&:").expect("valid regex"));

impl Capability {
    pub fn from_probe(result: &ProbeResult) -> Self {
        match result {
            ProbeResult::Detected(version) if *version > GROUPED_TARGETS_AFTER => {
                Capability::GroupedTargets
            }
            _ => Capability::Legacy,
        }
    }

    /// Infer the encoding an existing document was written with.
    ///
    /// Used when a document is reopened for appending: make is not asked
    /// again, so the encoding stays consistent within the file. A document
    /// without grouped rules is treated as legacy.
    pub fn detect_in(document: &str) -> Self {
        if GROUPED_HEADER.is_match(document) {
            Capability::GroupedTargets
        } else {
            Capability::Legacy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::GroupedTargets => "grouped targets",
            Capability::Legacy => "legacy forwarding chain",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ask `make` for its capability. Never fails.
pub fn probe(make: &str) -> Capability {
    let result = probe_version(make);
    let capability = Capability::from_probe(&result);
    debug!(make = %make, version = ?result, %capability, "probed make");
    capability
}

/// Run `<make> -v` and parse the version it reports.
pub fn probe_version(make: &str) -> ProbeResult {
    let output = match Command::new(make).arg("-v").output() {
        Ok(output) => output,
        Err(e) => {
            warn!(make = %make, error = %e, "could not run make to query its version");
            return ProbeResult::Unknown;
        }
    };

    let stdout = match String::from_utf8(output.stdout) {
        Ok(s) => s,
        Err(_) => {
            warn!(make = %make, "make version output is not valid UTF-8");
            return ProbeResult::Unknown;
        }
    };

    let result = parse_version_output(&stdout);
    if result == ProbeResult::Unknown {
        warn!(make = %make, "could not parse make version, using legacy rules");
    }
    result
}

/// Parse the output of `make -v`.
///
/// GNU Make prints `GNU Make X.Y[.Z]` on its first line; the version is the
/// last token of that line.
pub fn parse_version_output(stdout: &str) -> ProbeResult {
    stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().last())
        .and_then(parse_version_token)
        .map(ProbeResult::Detected)
        .unwrap_or(ProbeResult::Unknown)
}

/// Lenient dotted-version parse: `4.3` is `4.3.0`, `4.4rc1` is `4.4.0`.
fn parse_version_token(token: &str) -> Option<Version> {
    if let Ok(v) = Version::parse(token) {
        return Some(v);
    }

    let mut numbers = [0u64; 3];
    let mut seen = 0;
    for (i, part) in token.split('.').take(3).enumerate() {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            break;
        }
        numbers[i] = digits.parse().ok()?;
        seen += 1;
    }

    if seen == 0 {
        return None;
    }
    Some(Version::new(numbers[0], numbers[1], numbers[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const GNU_MAKE_44: &str = "GNU Make 4.4.1\nBuilt for x86_64-pc-linux-gnu\nCopyright (C) 1988-2023 Free Software Foundation, Inc.\n";

    #[test]
    fn test_parse_gnu_make_output() {
        assert_eq!(
            parse_version_output(GNU_MAKE_44),
            ProbeResult::Detected(Version::new(4, 4, 1))
        );
    }

    #[test]
    fn test_parse_two_component_version() {
        assert_eq!(
            parse_version_output("GNU Make 4.3\nBuilt for x86_64"),
            ProbeResult::Detected(Version::new(4, 3, 0))
        );
        assert_eq!(
            parse_version_output("GNU Make 3.81"),
            ProbeResult::Detected(Version::new(3, 81, 0))
        );
    }

    #[test]
    fn test_parse_suffixed_version() {
        assert_eq!(
            parse_version_output("GNU Make 4.4rc1"),
            ProbeResult::Detected(Version::new(4, 4, 0))
        );
    }

    #[test]
    fn test_parse_garbage_is_unknown() {
        assert_eq!(parse_version_output(""), ProbeResult::Unknown);
        assert_eq!(parse_version_output("make: unknown option"), ProbeResult::Unknown);
    }

    #[test]
    fn test_threshold_is_strict() {
        let at = ProbeResult::Detected(Version::new(4, 3, 0));
        let above = ProbeResult::Detected(Version::new(4, 3, 1));
        let below = ProbeResult::Detected(Version::new(3, 81, 0));
        assert_eq!(Capability::from_probe(&at), Capability::Legacy);
        assert_eq!(Capability::from_probe(&above), Capability::GroupedTargets);
        assert_eq!(Capability::from_probe(&below), Capability::Legacy);
        assert_eq!(Capability::from_probe(&ProbeResult::Unknown), Capability::Legacy);
    }

    #[test]
    fn test_missing_make_degrades_to_legacy() {
        assert_eq!(
            probe("mkflow-definitely-not-a-make-binary"),
            Capability::Legacy
        );
    }

    #[test]
    fn test_detect_in_document() {
        let grouped = "MAIN: a b\n\na b &: c\n\t@touch a b\n";
        let legacy = "MAIN: a b\n\na : c\n\t@touch a b\n\nb : a\n\t@if test -f $@; then touch -h $@; fi\n";
        assert_eq!(Capability::detect_in(grouped), Capability::GroupedTargets);
        assert_eq!(Capability::detect_in(legacy), Capability::Legacy);
        assert_eq!(Capability::detect_in(""), Capability::Legacy);
    }
}
