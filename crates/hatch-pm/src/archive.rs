//! Content archive access
//!
//! Wraps a zip container held entirely in memory. Entries are listed once
//! when the archive is opened; their contents are decompressed lazily, on a
//! blocking worker, each time they are read.

use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use zip::result::ZipError;
use zip::ZipArchive;

/// Upper bound on the buffer reserved up front for one entry
const MAX_PREALLOC: usize = 1 << 20;

/// Errors that can occur while reading the archive
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The bytes are not a readable zip container
    #[error("Invalid archive: {0}")]
    Format(String),

    /// The archive has no entry with this name
    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    /// A text read hit an entry that is not valid UTF-8
    #[error("Entry is not valid UTF-8 text: {0}")]
    NotText(String),

    /// Decompression I/O failure
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Invalid entry pattern
    #[error("Invalid entry pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The blocking read task was cancelled or panicked
    #[error("Archive read task failed: {0}")]
    Task(String),
}

/// How an entry's contents should be returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Text,
    Binary,
}

/// Contents of an entry, as requested by [`ReadMode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryData {
    Text(String),
    Binary(Vec<u8>),
}

/// A file entry listed from the archive
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    /// Full path of the entry inside the archive
    pub name: String,
}

/// Outcome of [`Archive::extract_to`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    /// Files written, in archive order
    pub files: Vec<PathBuf>,

    /// Entries whose names would escape the output directory
    pub skipped: Vec<String>,
}

/// Rule used to select entries from the archive
#[derive(Debug, Clone)]
pub enum EntryPattern {
    /// A single entry by its full path
    Exact(String),

    /// Every entry under a path prefix (e.g. `"content/"`)
    Prefix(String),

    /// Shell-style glob over full entry paths (e.g. `"H5P.Foo-1.0/**/*.js"`)
    Glob(glob::Pattern),
}

impl EntryPattern {
    /// Build a glob pattern
    pub fn glob(pattern: &str) -> Result<Self, ArchiveError> {
        glob::Pattern::new(pattern)
            .map(EntryPattern::Glob)
            .map_err(|e| ArchiveError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })
    }

    /// Check whether an entry path satisfies this pattern
    pub fn matches(&self, name: &str) -> bool {
        match self {
            EntryPattern::Exact(path) => name == path,
            EntryPattern::Prefix(prefix) => name.starts_with(prefix.as_str()),
            EntryPattern::Glob(pattern) => pattern.matches(name),
        }
    }
}

/// In-memory content archive
///
/// Cloning is cheap: the raw bytes and the parsed central directory are
/// shared between clones.
#[derive(Debug, Clone)]
pub struct Archive {
    inner: ZipArchive<Cursor<Arc<[u8]>>>,
    /// File entry names in central directory order (directories excluded)
    names: Arc<[String]>,
}

impl Archive {
    /// Open an archive from its raw bytes
    ///
    /// Fails with [`ArchiveError::Format`] if the bytes are not a zip container.
    pub fn open(bytes: impl Into<Arc<[u8]>>) -> Result<Self, ArchiveError> {
        let mut inner = ZipArchive::new(Cursor::new(bytes.into()))
            .map_err(|e| ArchiveError::Format(e.to_string()))?;

        let mut names = Vec::with_capacity(inner.len());
        for i in 0..inner.len() {
            let entry = inner
                .by_index_raw(i)
                .map_err(|e| ArchiveError::Format(e.to_string()))?;
            if !entry.is_dir() {
                names.push(entry.name().to_string());
            }
        }

        Ok(Self {
            inner,
            names: names.into(),
        })
    }

    /// Number of file entries
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the archive has no file entries
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Check if an entry exists
    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// All file entry names, in archive order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    /// List the entries matching a pattern, in archive order
    pub fn list_entries(&self, pattern: &EntryPattern) -> Vec<Entry> {
        self.names
            .iter()
            .filter(|name| pattern.matches(name))
            .map(|name| Entry { name: name.clone() })
            .collect()
    }

    /// Read an entry in the requested mode
    pub async fn read_entry(&self, entry: &Entry, mode: ReadMode) -> Result<EntryData, ArchiveError> {
        match mode {
            ReadMode::Text => self.read_text(&entry.name).await.map(EntryData::Text),
            ReadMode::Binary => self.read_bytes(&entry.name).await.map(EntryData::Binary),
        }
    }

    /// Read an entry as raw bytes
    pub async fn read_bytes(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let archive = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || archive.read_blocking(&name))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))?
    }

    /// Read an entry as UTF-8 text
    pub async fn read_text(&self, name: &str) -> Result<String, ArchiveError> {
        let bytes = self.read_bytes(name).await?;
        String::from_utf8(bytes).map_err(|_| ArchiveError::NotText(name.to_string()))
    }

    /// Read an entry on the current thread
    ///
    /// Used by the async readers and by callers that are already off the
    /// async runtime (extraction).
    pub fn read_blocking(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let mut inner = self.inner.clone();
        let mut file = inner.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => ArchiveError::EntryNotFound(name.to_string()),
            other => ArchiveError::Format(other.to_string()),
        })?;

        // The header size is untrusted; past the cap the buffer grows as data arrives
        let capacity = usize::try_from(file.size()).map_or(MAX_PREALLOC, |n| n.min(MAX_PREALLOC));
        let mut buf = Vec::with_capacity(capacity);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Write every entry under `out_dir`, on the current thread
    ///
    /// Entries with absolute names or `..` components are skipped.
    pub fn extract_to(&self, out_dir: &Path) -> Result<Extracted, ArchiveError> {
        let mut inner = self.inner.clone();
        let mut extracted = Extracted::default();

        for i in 0..inner.len() {
            let mut entry = inner
                .by_index(i)
                .map_err(|e| ArchiveError::Format(e.to_string()))?;
            let entry_path = match entry.enclosed_name() {
                Some(p) => out_dir.join(p),
                None => {
                    extracted.skipped.push(entry.name().to_string());
                    continue;
                }
            };

            if entry.is_dir() {
                std::fs::create_dir_all(&entry_path)?;
            } else {
                if let Some(parent) = entry_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut outfile = File::create(&entry_path)?;
                io::copy(&mut entry, &mut outfile)?;
                extracted.files.push(entry_path);
            }
        }

        Ok(extracted)
    }
}
