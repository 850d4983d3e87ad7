//! Schema migrations and seed data
//!
//! Migration scripts live in one directory as `<version>_<name>.sql` files. Seed data
//! lives in versioned subdirectories of a seed directory (`<version>...`), each holding
//! scripts in the same format. The [`Orchestrator`] interleaves the two on local hosts
//! and reverts everything it applied when a step fails.

mod migrator;
mod orchestrator;
mod script;
mod source;

pub use migrator::{Migrator, SqlMigrator};
pub use orchestrator::{is_local_host, MigrationReport, Orchestrator};
pub use script::{migration_version, MigrationFile, Script};
pub use source::{FsSource, MemorySource, MigrationSource, SourceEntry};
