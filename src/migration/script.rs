//! Migration scripts
//!
//! Scripts use goose-style annotations:
//!
//! ```sql
//! -- +goose Up
//! CREATE TABLE users (id INTEGER PRIMARY KEY);
//!
//! -- +goose Down
//! DROP TABLE users;
//! ```
//!
//! `StatementBegin` / `StatementEnd` markers are accepted and ignored. A script with no
//! annotation at all is entirely `Up`.

use super::source::MigrationSource;
use crate::core::error::{DatabaseError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static MIGRATION_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_.+\.sql$").expect("valid migration file regex"));

/// Parsed `Up` and `Down` sections of a script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    up: String,
    down: String,
}

#[derive(Clone, Copy)]
enum Section {
    Up,
    Down,
}

fn annotation(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("--")?
        .trim_start()
        .strip_prefix("+goose")
        .map(str::trim)
}

impl Script {
    /// Split a script into its sections
    pub fn parse(text: &str) -> Self {
        let annotated = text.lines().any(|line| annotation(line).is_some());
        let mut section = if annotated { None } else { Some(Section::Up) };
        let mut script = Script::default();

        for line in text.lines() {
            if let Some(marker) = annotation(line) {
                if marker.eq_ignore_ascii_case("up") {
                    section = Some(Section::Up);
                } else if marker.eq_ignore_ascii_case("down") {
                    section = Some(Section::Down);
                }
                continue;
            }

            let target = match section {
                Some(Section::Up) => &mut script.up,
                Some(Section::Down) => &mut script.down,
                None => continue,
            };
            target.push_str(line);
            target.push('\n');
        }

        script
    }

    /// Forward SQL
    pub fn up(&self) -> &str {
        &self.up
    }

    /// Revert SQL
    pub fn down(&self) -> &str {
        &self.down
    }

    /// Whether a section holds anything besides whitespace and comments
    pub(crate) fn has_statements(section: &str) -> bool {
        section.lines().any(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with("--")
        })
    }
}

/// A versioned script file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Numeric prefix of the file name
    pub version: i64,
    /// File name
    pub name: String,
    /// Path within the source
    pub path: String,
}

impl MigrationFile {
    /// Read and parse the script
    pub fn load(&self, source: &dyn MigrationSource) -> Result<Script> {
        Ok(Script::parse(&source.read_to_string(&self.path)?))
    }
}

/// Version encoded in a migration file name (`<version>_<name>.sql`)
pub fn migration_version(name: &str) -> Option<i64> {
    MIGRATION_FILE
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
}

/// Join a directory and an entry name, trimming the directory's trailing `/`
pub fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Collect the versioned scripts of a directory, keyed by version
///
/// A missing directory holds no scripts. Files not named `<version>_<name>.sql` are
/// ignored. Two files sharing a version are a migration error.
pub fn collect(source: &dyn MigrationSource, dir: &str) -> Result<BTreeMap<i64, MigrationFile>> {
    let mut files = BTreeMap::new();

    let entries = match source.read_dir(dir) {
        Ok(entries) => entries,
        Err(DatabaseError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(files)
        }
        Err(e) => return Err(e),
    };

    for entry in entries {
        if entry.is_dir {
            continue;
        }
        let Some(version) = migration_version(&entry.name) else {
            continue;
        };

        let file = MigrationFile {
            version,
            path: join(dir, &entry.name),
            name: entry.name,
        };
        if let Some(existing) = files.insert(version, file) {
            return Err(DatabaseError::migration(format!(
                "duplicate migration version {} ({} in {})",
                version, existing.name, dir
            )));
        }
    }

    Ok(files)
}
