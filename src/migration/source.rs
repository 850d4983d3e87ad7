//! Where migration and seed scripts come from

use crate::core::error::{DatabaseError, Result};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io;
use std::path::PathBuf;

/// A directory entry of a [`MigrationSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// File or directory name (no path)
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl SourceEntry {
    fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// Read-only file tree holding migration scripts
///
/// Paths are `/`-separated and relative to the source root.
pub trait MigrationSource: Send + Sync + Debug {
    /// List a directory, sorted by name
    fn read_dir(&self, dir: &str) -> Result<Vec<SourceEntry>>;

    /// Read a file
    fn read_to_string(&self, path: &str) -> Result<String>;
}

fn not_found(path: &str) -> DatabaseError {
    io::Error::new(io::ErrorKind::NotFound, format!("{}: not found", path)).into()
}

/// Scripts on the local file system, rooted at a directory
#[derive(Debug, Clone)]
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    /// Create a source rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MigrationSource for FsSource {
    fn read_dir(&self, dir: &str) -> Result<Vec<SourceEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(self.root.join(dir))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type()?.is_dir() {
                entries.push(SourceEntry::dir(name));
            } else {
                entries.push(SourceEntry::file(name));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_to_string(&self, path: &str) -> Result<String> {
        Ok(std::fs::read_to_string(self.root.join(path))?)
    }
}

/// Scripts held in memory, keyed by path
///
/// Directories are implied by the file paths. Useful for scripts embedded with
/// `include_str!` and for tests.
///
/// ```
/// use rust_ark::migration::{MemorySource, MigrationSource};
///
/// let source = MemorySource::new()
///     .with_file("migrations/1_users.sql", "CREATE TABLE users (id INTEGER);")
///     .with_file("seeds/1_dev/1_users.sql", "INSERT INTO users VALUES (1);");
///
/// let entries = source.read_dir("seeds").unwrap();
/// assert_eq!(entries[0].name, "1_dev");
/// assert!(entries[0].is_dir);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, String>,
}

fn normalize(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_matches('/')
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file
    #[must_use]
    pub fn with_file(mut self, path: &str, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Add or replace a file
    pub fn insert(&mut self, path: &str, contents: impl Into<String>) {
        self.files.insert(normalize(path).to_string(), contents.into());
    }
}

impl MigrationSource for MemorySource {
    fn read_dir(&self, dir: &str) -> Result<Vec<SourceEntry>> {
        let dir = normalize(dir);
        let prefix = if dir.is_empty() || dir == "." {
            String::new()
        } else {
            format!("{}/", dir)
        };

        let mut children: BTreeMap<&str, bool> = BTreeMap::new();
        for path in self.files.keys() {
            let Some(rest) = path.strip_prefix(prefix.as_str()) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    children.insert(child, true);
                }
                None => {
                    children.entry(rest).or_insert(false);
                }
            }
        }

        if children.is_empty() {
            return Err(not_found(dir));
        }

        Ok(children
            .into_iter()
            .map(|(name, is_dir)| SourceEntry {
                name: name.to_string(),
                is_dir,
            })
            .collect())
    }

    fn read_to_string(&self, path: &str) -> Result<String> {
        self.files
            .get(normalize(path))
            .cloned()
            .ok_or_else(|| not_found(path))
    }
}
