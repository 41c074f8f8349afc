//! Archive layout conventions
//!
//! Names of the well-known entries inside a content archive. The defaults
//! follow the H5P package format; every field can be overridden from the
//! `[archive]` table of `hatch.toml`.

use serde::{Deserialize, Serialize};

/// Where the descriptors and the content subtree live inside an archive
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ArchiveLayout {
    /// Root descriptor entry (default: "h5p.json")
    pub root_descriptor: String,

    /// Descriptor file name inside each package directory (default: "library.json")
    pub library_descriptor: String,

    /// Prefix of the author content subtree (default: "content/")
    pub content_namespace: String,

    /// Content description file inside the namespace, kept as raw text
    /// (default: "content.json")
    pub content_descriptor: String,
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        Self {
            root_descriptor: "h5p.json".to_string(),
            library_descriptor: "library.json".to_string(),
            content_namespace: "content/".to_string(),
            content_descriptor: "content.json".to_string(),
        }
    }
}

impl ArchiveLayout {
    /// Archive entry of a package's descriptor
    pub fn descriptor_path(&self, package_path: &str) -> String {
        format!("{}/{}", package_path, self.library_descriptor)
    }

    /// Full archive entry of the content description file
    pub fn content_descriptor_entry(&self) -> String {
        format!("{}{}", self.content_namespace, self.content_descriptor)
    }

    /// Strip the content namespace from an archive entry name
    pub fn content_relative<'a>(&self, entry: &'a str) -> Option<&'a str> {
        entry.strip_prefix(self.content_namespace.as_str())
    }
}

/// Normalize a relative path for lookups.
///
/// - Replace backslashes with forward slashes
/// - Remove leading `./`
/// - Remove trailing `/`
pub fn normalize_path(path: &str) -> String {
    let mut p = path.replace('\\', "/");
    while let Some(rest) = p.strip_prefix("./") {
        p = rest.to_string();
    }
    while p.ends_with('/') {
        p.pop();
    }
    p
}
