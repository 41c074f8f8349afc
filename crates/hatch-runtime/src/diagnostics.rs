//! Non-fatal conditions observed while preparing a load

use serde::Serialize;
use std::fmt;

/// A condition that degraded the load without aborting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// A dependency edge closed a cycle and was not followed
    CyclicDependency { from: String, to: String },

    /// A stylesheet `url(...)` reference that matched no package file
    UnresolvedStylesheetReference {
        package: String,
        stylesheet: String,
        reference: String,
    },

    /// A content file whose extension has no known MIME type
    UnknownMimeType { path: String },

    /// The root's main library names none of its direct dependencies
    UnmatchedMainLibrary { main_library: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::CyclicDependency { from, to } => {
                write!(f, "cyclic dependency {} -> {} was truncated", from, to)
            }
            Diagnostic::UnresolvedStylesheetReference {
                package,
                stylesheet,
                reference,
            } => write!(
                f,
                "unresolved reference '{}' in {}/{} left unchanged",
                reference, package, stylesheet
            ),
            Diagnostic::UnknownMimeType { path } => {
                write!(f, "no MIME type known for {}", path)
            }
            Diagnostic::UnmatchedMainLibrary { main_library } => write!(
                f,
                "main library '{}' is not a direct dependency; no entry package",
                main_library
            ),
        }
    }
}

/// Collector for [`Diagnostic`]s, in the order they were observed
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let diagnostic = Diagnostic::UnresolvedStylesheetReference {
            package: "H5P.Foo-1.0".to_string(),
            stylesheet: "styles/foo.css".to_string(),
            reference: "img/missing.png".to_string(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "unresolved reference 'img/missing.png' in H5P.Foo-1.0/styles/foo.css left unchanged"
        );
    }

    #[test]
    fn test_collect_and_serialize() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(Diagnostic::CyclicDependency {
            from: "A-1.0".to_string(),
            to: "B-1.0".to_string(),
        });
        diagnostics.extend([Diagnostic::UnknownMimeType {
            path: "data.xyz".to_string(),
        }]);

        assert_eq!(diagnostics.len(), 2);
        let json = serde_json::to_value(&diagnostics).unwrap();
        assert_eq!(json[0]["kind"], "cyclic_dependency");
        assert_eq!(json[1]["path"], "data.xyz");
    }
}
