//! Fixture loading and management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::HarnessError;

/// A single fixture test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureCase {
    /// Case identifier.
    pub name: String,
    /// Function being exercised (`sprintf`, `sscanf`, `stream`, ...).
    pub function: String,
    /// ISO C / POSIX clause the case checks.
    pub standard_ref: String,
    /// Call inputs; the shape depends on `function`.
    pub inputs: serde_json::Value,
    /// Expected rendered result.
    pub expected_output: String,
    /// Expected errno after the call (0 when the call must not set it).
    #[serde(default)]
    pub expected_errno: i32,
}

/// A collection of fixture cases for a function family.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureSet {
    /// Schema version.
    pub version: String,
    /// Function family name.
    pub family: String,
    /// UTC timestamp of capture.
    pub captured_at: String,
    /// Individual test cases.
    pub cases: Vec<FixtureCase>,
}

impl FixtureSet {
    /// Load fixture set from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize fixture set to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load fixture set from a file path.
    pub fn from_file(path: &Path) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

/// Fixture files named by `path`: the file itself, or every `.json` file in
/// the directory, sorted.
pub fn fixture_paths(path: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("json"))
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(HarnessError::NoFixtures(path.to_path_buf()));
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_errno_defaults_to_zero() {
        let set = FixtureSet::from_json(
            r#"{"version":"v1","family":"stdio/printf","captured_at":"2026-10-01T00:00:00Z",
                "cases":[{"name":"n","function":"sprintf","standard_ref":"C11 7.21.6.1",
                          "inputs":{"format":"x","args":[]},"expected_output":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(set.cases[0].expected_errno, 0);
        let again = FixtureSet::from_json(&set.to_json().unwrap()).unwrap();
        assert_eq!(again.cases[0].name, "n");
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = fixture_paths(Path::new("/nonexistent/fixtures")).unwrap_err();
        assert!(matches!(err, HarnessError::Io(_)));
    }
}
