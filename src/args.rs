//! Argument shaping for rule inputs, outputs and commands.
//!
//! Callers may hand over either one value or an ordered list of values.
//! Both are folded into a canonical `Vec<String>` here, before anything is
//! written to a document.
//!
//! Paths are normalized lexically because make compares targets as strings:
//! `out//a.txt` and `out/a.txt` would otherwise be two different targets.

use crate::error::{Result, WorkflowError};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};

/// A single value or an ordered collection of values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged, expecting = "a string or a list of strings")]
pub enum Arg {
    One(String),
    Many(Vec<String>),
}

impl Default for Arg {
    fn default() -> Self {
        Arg::Many(Vec::new())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::One(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::One(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::One(value.clone())
    }
}

impl From<Vec<String>> for Arg {
    fn from(values: Vec<String>) -> Self {
        Arg::Many(values)
    }
}

impl From<Vec<&str>> for Arg {
    fn from(values: Vec<&str>) -> Self {
        Arg::Many(values.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for Arg {
    fn from(values: &[&str]) -> Self {
        Arg::Many(values.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&[String]> for Arg {
    fn from(values: &[String]) -> Self {
        Arg::Many(values.to_vec())
    }
}

impl<const N: usize> From<[&str; N]> for Arg {
    fn from(values: [&str; N]) -> Self {
        Arg::Many(values.iter().map(|s| s.to_string()).collect())
    }
}

/// `()` stands for "no values".
impl From<()> for Arg {
    fn from(_: ()) -> Self {
        Arg::default()
    }
}

/// Canonicalize an input/output argument into normalized paths.
///
/// An empty single string means "no paths"; every element of a list is
/// normalized, so an empty element becomes `.`.
pub fn normalize_paths(arg: &Arg) -> Result<Vec<String>> {
    let paths: Vec<String> = match arg {
        Arg::One(value) if value.is_empty() => Vec::new(),
        Arg::One(value) => vec![normalize_path(value)],
        Arg::Many(values) => values.iter().map(|v| normalize_path(v)).collect(),
    };

    if let Some(bad) = paths.iter().find(|p| p.chars().any(char::is_whitespace)) {
        return Err(WorkflowError::config(format!(
            "path '{}' contains whitespace; make would split it into several targets",
            bad
        )));
    }

    Ok(paths)
}

/// Canonicalize a command argument. Commands are kept verbatim.
pub fn normalize_commands(arg: &Arg) -> Result<Vec<String>> {
    let cmds = match arg {
        Arg::One(cmd) => vec![cmd.clone()],
        Arg::Many(cmds) => cmds.clone(),
    };

    if let Some(bad) = cmds.iter().find(|c| c.contains('\n') || c.contains('\r')) {
        return Err(WorkflowError::config(format!(
            "command {:?} spans several lines; pass each line as a separate command",
            bad
        )));
    }

    Ok(cmds)
}

/// Lexically normalize a path without touching the filesystem.
///
/// Redundant separators and `.` components are dropped, and `..` cancels the
/// preceding normal component. Leading `..` of a relative path is kept.
pub fn normalize_path(raw: &str) -> String {
    let mut components: Vec<Component> = Vec::new();

    for component in Path::new(raw).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            other => components.push(other),
        }
    }

    if components.is_empty() {
        return ".".to_string();
    }

    let normalized: PathBuf = components.iter().collect();
    normalized.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_collapses_separators() {
        assert_eq!(normalize_path("out//a.txt"), "out/a.txt");
        assert_eq!(normalize_path("out/./a.txt"), "out/a.txt");
        assert_eq!(normalize_path("out/a/"), "out/a");
        assert_eq!(normalize_path("./a.txt"), "a.txt");
    }

    #[test]
    fn test_normalize_path_parent_components() {
        assert_eq!(normalize_path("out/tmp/../a.txt"), "out/a.txt");
        assert_eq!(normalize_path("../a.txt"), "../a.txt");
        assert_eq!(normalize_path("a/../.."), "..");
        assert_eq!(normalize_path("/../a.txt"), "/a.txt");
        assert_eq!(normalize_path("a/.."), ".");
    }

    #[test]
    fn test_normalize_path_absolute() {
        assert_eq!(normalize_path("/data//raw/./x.tif"), "/data/raw/x.tif");
    }

    #[test]
    fn test_single_value_becomes_one_element() {
        let paths = normalize_paths(&"dir//file".into()).unwrap();
        assert_eq!(paths, vec!["dir/file"]);
    }

    #[test]
    fn test_empty_string_means_no_paths() {
        assert!(normalize_paths(&"".into()).unwrap().is_empty());
        assert!(normalize_paths(&().into()).unwrap().is_empty());
    }

    #[test]
    fn test_list_keeps_order_and_duplicates() {
        let paths = normalize_paths(&vec!["b", "a//x", "b"].into()).unwrap();
        assert_eq!(paths, vec!["b", "a/x", "b"]);
    }

    #[test]
    fn test_empty_list_element_is_current_dir() {
        let paths = normalize_paths(&vec!["a", ""].into()).unwrap();
        assert_eq!(paths, vec!["a", "."]);
    }

    #[test]
    fn test_whitespace_in_path_rejected() {
        let err = normalize_paths(&"my file.txt".into()).unwrap_err();
        assert!(matches!(err, WorkflowError::Config(_)));
    }

    #[test]
    fn test_commands_kept_verbatim() {
        let cmds = normalize_commands(&"echo  a//b > x".into()).unwrap();
        assert_eq!(cmds, vec!["echo  a//b > x"]);

        let cmds = normalize_commands(&["a", "b"].into()).unwrap();
        assert_eq!(cmds, vec!["a", "b"]);
    }

    #[test]
    fn test_multiline_command_rejected() {
        let err = normalize_commands(&"echo a\necho b".into()).unwrap_err();
        assert!(err.to_string().contains("separate command"));
    }

    #[derive(Deserialize)]
    struct Holder {
        value: Arg,
    }

    #[test]
    fn test_deserialize_shapes() {
        let one: Holder = toml::from_str(r#"value = "a""#).unwrap();
        assert_eq!(one.value, Arg::One("a".into()));

        let many: Holder = toml::from_str(r#"value = ["a", "b"]"#).unwrap();
        assert_eq!(many.value, Arg::Many(vec!["a".into(), "b".into()]));
    }

    #[test]
    fn test_deserialize_rejects_other_shapes() {
        let err = toml::from_str::<Holder>("value = 3").err().unwrap();
        assert!(err.to_string().contains("a string or a list of strings"));

        assert!(toml::from_str::<Holder>("value = [1, 2]").is_err());
    }
}
