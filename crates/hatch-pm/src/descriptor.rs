//! Package descriptor parsing (h5p.json, library.json)
//!
//! Descriptors are JSON documents. The root descriptor names the main
//! library and the packages the content needs directly; every package
//! descriptor lists its own dependencies and the scripts and stylesheets it
//! preloads.

use crate::layout::normalize_path;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Errors that can occur during descriptor parsing
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// Malformed JSON or missing required field
    #[error("Failed to parse descriptor {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Well-formed JSON with unusable values
    #[error("Invalid descriptor {path}: {reason}")]
    Invalid { path: String, reason: String },
}

/// Reference to a package by name and version
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRef {
    pub machine_name: String,

    #[serde(deserialize_with = "version_number")]
    pub major_version: u32,

    #[serde(deserialize_with = "version_number")]
    pub minor_version: u32,
}

impl LibraryRef {
    /// Create a new reference
    pub fn new(machine_name: impl Into<String>, major_version: u32, minor_version: u32) -> Self {
        Self {
            machine_name: machine_name.into(),
            major_version,
            minor_version,
        }
    }

    /// Unique package identifier, also the package's directory in the archive
    ///
    /// `H5P.MultiChoice` 1.16 becomes `H5P.MultiChoice-1.16`.
    pub fn package_path(&self) -> String {
        format!(
            "{}-{}.{}",
            self.machine_name, self.major_version, self.minor_version
        )
    }
}

/// A file listed in `preloadedJs` / `preloadedCss`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRef {
    pub path: String,
}

/// Root descriptor (h5p.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RootDescriptor {
    /// Content title
    #[serde(default)]
    pub title: String,

    /// Machine name of the package that renders this content
    #[serde(default)]
    pub main_library: String,

    /// Content language code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Where the content came from (URL or free text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// License identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    /// Supported embed types ("div", "iframe")
    #[serde(default)]
    pub embed_types: Vec<String>,

    /// Packages the content needs directly
    #[serde(default)]
    pub preloaded_dependencies: Vec<LibraryRef>,
}

/// Package descriptor (library.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_name: Option<String>,

    /// Scripts to execute, in order
    #[serde(default, rename = "preloadedJs")]
    pub preloaded_js: Vec<FileRef>,

    /// Stylesheets to apply, in order
    #[serde(default, rename = "preloadedCss")]
    pub preloaded_css: Vec<FileRef>,

    /// Packages this package needs
    #[serde(default)]
    pub preloaded_dependencies: Vec<LibraryRef>,
}

/// One traversal's record of a package: its identity, the packages it
/// depends on, and the assets it preloads. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Unique identifier (`machineName-major.minor`)
    pub package_path: String,

    /// Machine name without the version suffix
    pub machine_name: String,

    /// Identifiers of the packages this one depends on, in declared order
    pub dependencies: Vec<String>,

    /// Package-relative script paths
    pub preloaded_scripts: Vec<String>,

    /// Package-relative stylesheet paths
    pub preloaded_styles: Vec<String>,
}

impl RootDescriptor {
    /// Parse the root descriptor
    pub fn parse(path: &str, content: &str) -> Result<Self, DescriptorError> {
        let root: RootDescriptor = parse_json(path, content)?;

        validate_refs(path, &root.preloaded_dependencies)?;

        Ok(root)
    }

    /// Find the direct dependency whose machine name is the main library
    pub fn main_dependency(&self) -> Option<&LibraryRef> {
        self.preloaded_dependencies
            .iter()
            .find(|dep| dep.machine_name == self.main_library)
    }
}

impl LibraryDescriptor {
    /// Parse a package descriptor
    pub fn parse(path: &str, content: &str) -> Result<Self, DescriptorError> {
        let library: LibraryDescriptor = parse_json(path, content)?;

        validate_refs(path, &library.preloaded_dependencies)?;
        for file in library.preloaded_js.iter().chain(&library.preloaded_css) {
            if file.path.trim().is_empty() {
                return Err(DescriptorError::Invalid {
                    path: path.to_string(),
                    reason: "preloaded file path cannot be empty".to_string(),
                });
            }
        }

        Ok(library)
    }

    /// Normalized script paths
    pub fn script_paths(&self) -> Vec<String> {
        self.preloaded_js.iter().map(|f| normalize_path(&f.path)).collect()
    }

    /// Normalized stylesheet paths
    pub fn style_paths(&self) -> Vec<String> {
        self.preloaded_css.iter().map(|f| normalize_path(&f.path)).collect()
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(path: &str, content: &str) -> Result<T, DescriptorError> {
    // Editors on Windows like to prepend a byte order mark
    let content = content.trim_start_matches('\u{feff}');
    serde_json::from_str(content).map_err(|source| DescriptorError::Parse {
        path: path.to_string(),
        source,
    })
}

fn validate_refs(path: &str, refs: &[LibraryRef]) -> Result<(), DescriptorError> {
    for dep in refs {
        if dep.machine_name.trim().is_empty() {
            return Err(DescriptorError::Invalid {
                path: path.to_string(),
                reason: "dependency machineName cannot be empty".to_string(),
            });
        }
    }
    Ok(())
}

/// Versions show up both as numbers and as numeric strings in the wild
fn version_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_path() {
        let dep = LibraryRef::new("H5P.MultiChoice", 1, 16);
        assert_eq!(dep.package_path(), "H5P.MultiChoice-1.16");
    }

    #[test]
    fn test_parse_root() {
        let json = r#"{
            "title": "Quiz",
            "language": "en",
            "mainLibrary": "H5P.MultiChoice",
            "embedTypes": ["div"],
            "preloadedDependencies": [
                {"machineName": "H5P.MultiChoice", "majorVersion": 1, "minorVersion": 16},
                {"machineName": "FontAwesome", "majorVersion": "4", "minorVersion": "5"}
            ]
        }"#;

        let root = RootDescriptor::parse("h5p.json", json).unwrap();
        assert_eq!(root.title, "Quiz");
        assert_eq!(root.embed_types, vec!["div"]);
        assert_eq!(root.preloaded_dependencies[1].package_path(), "FontAwesome-4.5");
        assert_eq!(
            root.main_dependency().map(|d| d.package_path()),
            Some("H5P.MultiChoice-1.16".to_string())
        );
    }

    #[test]
    fn test_root_without_main_library() {
        let root = RootDescriptor::parse("h5p.json", r#"{"title": "x"}"#).unwrap();
        assert_eq!(root.main_library, "");
        assert!(root.main_dependency().is_none());
    }

    #[test]
    fn test_parse_library() {
        let json = "\u{feff}{
            \"machineName\": \"H5P.Question\",
            \"preloadedJs\": [{\"path\": \"./scripts/question.js\"}],
            \"preloadedCss\": [{\"path\": \"styles/question.css\"}],
            \"preloadedDependencies\": [
                {\"machineName\": \"H5P.JoubelUI\", \"majorVersion\": 1, \"minorVersion\": 3}
            ]
        }";

        let library = LibraryDescriptor::parse("H5P.Question-1.5/library.json", json).unwrap();
        assert_eq!(library.script_paths(), vec!["scripts/question.js"]);
        assert_eq!(library.style_paths(), vec!["styles/question.css"]);
        assert_eq!(library.preloaded_dependencies.len(), 1);
    }

    #[test]
    fn test_library_lists_default_to_empty() {
        let library = LibraryDescriptor::parse("x/library.json", "{}").unwrap();
        assert!(library.preloaded_js.is_empty());
        assert!(library.preloaded_css.is_empty());
        assert!(library.preloaded_dependencies.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        let result = LibraryDescriptor::parse("x/library.json", "{ not json");
        match result {
            Err(DescriptorError::Parse { path, .. }) => assert_eq!(path, "x/library.json"),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_version_string() {
        let json = r#"{"preloadedDependencies": [{"machineName": "A", "majorVersion": "one", "minorVersion": 0}]}"#;
        assert!(LibraryDescriptor::parse("x/library.json", json).is_err());
    }
}
