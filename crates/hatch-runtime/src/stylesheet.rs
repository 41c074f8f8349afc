//! Stylesheet reference rewriting
//!
//! Relative `url(...)` references inside a package stylesheet point at
//! files in the same package. They are resolved against the stylesheet's
//! own location and replaced by the resource handle of the target file.

use percent_encoding::percent_decode_str;
use regex::{Captures, Regex};
use std::sync::LazyLock;
use url::Url;

/// Synthetic base every archive path is joined onto
const ARCHIVE_BASE: &str = "hatch://archive/";

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^\s"')][^\s)]*))\s*\)"#)
        .expect("url() pattern is valid")
});

/// Where a `url(...)` reference points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A file inside the package, as a package-relative path
    Package(String),

    /// Outside the package (`data:`, `http:`, fragment-only, empty)
    External,

    /// Not a valid URL reference, or one that leaves the package
    Invalid,
}

/// Resolve a reference found in the stylesheet at `stylesheet_path`
/// inside `package_path`
///
/// Resolution follows URL path-join semantics against the stylesheet's
/// archive path, so a path starting with `/` resolves from the archive
/// root. Targets outside `package_path` are [`Reference::Invalid`]. Query
/// strings and fragments are dropped.
pub fn resolve_reference(package_path: &str, stylesheet_path: &str, reference: &str) -> Reference {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return Reference::External;
    }

    let target = Url::parse(ARCHIVE_BASE)
        .and_then(|base| base.join(&format!("{}/{}", package_path, stylesheet_path)))
        .and_then(|sheet| sheet.join(reference));
    let target = match target {
        Ok(target) => target,
        Err(_) => return Reference::Invalid,
    };

    if target.scheme() != "hatch" || target.host_str() != Some("archive") {
        return Reference::External;
    }

    let decoded = match percent_decode_str(target.path()).decode_utf8() {
        Ok(path) => path,
        Err(_) => return Reference::Invalid,
    };
    let prefix = format!("/{}/", package_path);
    match decoded.strip_prefix(prefix.as_str()) {
        Some(path) if !path.is_empty() => Reference::Package(path.to_string()),
        _ => Reference::Invalid,
    }
}

/// Outcome of rewriting one stylesheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,

    /// References left untouched because nothing matched them
    pub unresolved: Vec<String>,
}

/// Rewrite every `url(...)` reference that `lookup` can resolve
///
/// `stylesheet_path` is relative to `package_path`, and `lookup` receives
/// the package-relative path of the target. Only the reference itself is
/// replaced; quotes, whitespace and everything outside the `url(...)` stay
/// byte-identical.
pub fn rewrite_stylesheet<F>(
    css: &str,
    package_path: &str,
    stylesheet_path: &str,
    lookup: F,
) -> Rewrite
where
    F: Fn(&str) -> Option<String>,
{
    let mut unresolved = Vec::new();

    let text = URL_PATTERN.replace_all(css, |caps: &Captures<'_>| {
        let whole = &caps[0];
        let Some(reference) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            return whole.to_string();
        };

        let replacement = match resolve_reference(package_path, stylesheet_path, reference.as_str()) {
            Reference::External => None,
            Reference::Package(path) => {
                let found = lookup(&path);
                if found.is_none() {
                    unresolved.push(reference.as_str().to_string());
                }
                found
            }
            Reference::Invalid => {
                unresolved.push(reference.as_str().to_string());
                None
            }
        };

        match replacement {
            Some(handle) => {
                let offset = caps.get(0).map_or(0, |m| m.start());
                let start = reference.start() - offset;
                let end = start + reference.as_str().len();
                format!("{}{}{}", &whole[..start], handle, &whole[end..])
            }
            None => whole.to_string(),
        }
    });

    Rewrite {
        text: text.into_owned(),
        unresolved,
    }
}
