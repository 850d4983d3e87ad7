//! Interleaved migration and seed application
//!
//! On local hosts migrations are applied one step at a time and the seed paired with
//! each step is applied right after it, so seed data always meets the schema it was
//! written for. Remote hosts only ever get the migrations.

use super::migrator::Migrator;
use super::script::{self, join};
use super::source::MigrationSource;
use crate::core::error::{DatabaseError, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, LazyLock};
use tracing::{Instrument, Span};

static SEED_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+).*$").expect("valid seed directory regex"));

/// Hosts that receive seed data
const LOCAL_HOSTS: [&str; 3] = ["localhost", "host.docker.internal", "db"];

/// Whether `host` (optionally `host:port`) is a local or development host
///
/// ```
/// use rust_ark::migration::is_local_host;
///
/// assert!(is_local_host("localhost:5432"));
/// assert!(is_local_host("db"));
/// assert!(!is_local_host("db.example.com"));
/// ```
pub fn is_local_host(host: &str) -> bool {
    let host = host.split(':').next().unwrap_or(host);
    LOCAL_HOSTS.contains(&host)
}

/// What a migration run applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Versions applied, in application order
    pub applied_migrations: Vec<i64>,
    /// Seed directories applied, in application order
    pub applied_seeds: Vec<String>,
}

/// Applies a migration directory and, on local hosts, its seed directories
pub struct Orchestrator {
    migrator: Arc<dyn Migrator>,
    source: Arc<dyn MigrationSource>,
    migration_directory: String,
    seed_directory: Option<String>,
    local: bool,
    span: Span,
}

impl Orchestrator {
    /// Create an orchestrator for a remote host with no seeds
    pub fn new(
        migrator: Arc<dyn Migrator>,
        source: Arc<dyn MigrationSource>,
        migration_directory: impl Into<String>,
    ) -> Self {
        Self {
            migrator,
            source,
            migration_directory: migration_directory.into(),
            seed_directory: None,
            local: false,
            span: tracing::info_span!("migration_run"),
        }
    }

    /// Set the seed directory
    #[must_use]
    pub fn with_seed_directory(mut self, dir: impl Into<String>) -> Self {
        self.seed_directory = Some(dir.into());
        self
    }

    /// Mark the target host as local, enabling seeds and stepwise application
    #[must_use]
    pub fn with_local(mut self, local: bool) -> Self {
        self.local = local;
        self
    }

    /// Record the run under `span`
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Largest version in the migration directory, 0 when there is none
    fn max_migration_version(&self) -> Result<i64> {
        let files = script::collect(self.source.as_ref(), &self.migration_directory)?;
        Ok(files.keys().next_back().copied().unwrap_or(0))
    }

    /// Seed directories keyed by version; empty unless the host is local
    fn seeds(&self) -> BTreeMap<i64, String> {
        let mut seeds = BTreeMap::new();
        let Some(dir) = self.seed_directory.as_deref().filter(|_| self.local) else {
            return seeds;
        };

        let entries = match self.source.read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir, error = %e, "seed directory not readable; skipping seeds");
                return seeds;
            }
        };

        for entry in entries.into_iter().filter(|entry| entry.is_dir) {
            let version = SEED_DIR
                .captures(&entry.name)
                .and_then(|caps| caps[1].parse::<i64>().ok());
            if let Some(version) = version {
                seeds.insert(version, join(dir, &entry.name));
            }
        }
        seeds
    }

    /// Apply everything that is pending
    ///
    /// On failure every seed applied by this run is reverted (newest first), then every
    /// migration this run recorded, and a [`DatabaseError::Migration`] carrying the cause
    /// is returned. Versions recorded by earlier runs are left alone.
    pub async fn run(&self) -> Result<MigrationReport> {
        self.execute().instrument(self.span.clone()).await
    }

    async fn execute(&self) -> Result<MigrationReport> {
        let max_version = self.max_migration_version()?;
        let seeds = self.seeds();
        let min_seed = seeds.keys().next().copied().unwrap_or(0);
        let before: BTreeSet<i64> = self
            .migrator
            .applied_versions()
            .await?
            .into_iter()
            .collect();
        let recorded = before.last().copied().unwrap_or(0);
        let steps = max_version.max(seeds.len() as i64);

        tracing::info!(
            local = self.local,
            max_version,
            recorded,
            seeds = seeds.len(),
            "starting migration run"
        );

        let mut report = MigrationReport::default();
        let mut failure = None;

        if self.local {
            for i in 0..steps {
                match self.migrator.up_to(&self.migration_directory, i + 1).await {
                    Ok(applied) => report.applied_migrations.extend(applied),
                    Err(DatabaseError::NoNextVersion) => {}
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }

                let seed_version = i + min_seed;
                let Some(seed) = seeds.get(&seed_version) else {
                    continue;
                };
                if seed_version <= recorded {
                    continue;
                }

                match self.migrator.apply_seed(seed).await {
                    Ok(_) | Err(DatabaseError::NoNextVersion) => {
                        report.applied_seeds.push(seed.clone());
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
        }

        if failure.is_none() {
            match self.migrator.up(&self.migration_directory).await {
                Ok(applied) => report.applied_migrations.extend(applied),
                Err(DatabaseError::NoNextVersion) => {}
                Err(e) => failure = Some(e),
            }
        }

        match failure {
            None => {
                tracing::info!(
                    migrations = report.applied_migrations.len(),
                    seeds = report.applied_seeds.len(),
                    "migration run complete"
                );
                Ok(report)
            }
            Some(cause) => {
                tracing::error!(error = %cause, "migration run failed; rolling back");
                self.roll_back(&report, &before).await;
                Err(DatabaseError::migration_failed(
                    format!("migration run over {} failed", self.migration_directory),
                    cause,
                ))
            }
        }
    }

    /// Best-effort revert; failures are logged and the original cause is kept
    ///
    /// Reverts the versions recorded since `before`, including steps committed by a
    /// partly failed `up_to` or `up`.
    async fn roll_back(&self, report: &MigrationReport, before: &BTreeSet<i64>) {
        for seed in report.applied_seeds.iter().rev() {
            if let Err(e) = self.migrator.down_seed(seed).await {
                tracing::warn!(path = %seed, error = %e, "seed rollback failed");
            }
        }

        let touched: Vec<i64> = match self.migrator.applied_versions().await {
            Ok(now) => now.into_iter().filter(|v| !before.contains(v)).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "version table unreadable; using run report");
                report.applied_migrations.clone()
            }
        };

        if let Err(e) = self
            .migrator
            .down_versions(&self.migration_directory, &touched)
            .await
        {
            tracing::warn!(error = %e, "migration rollback failed");
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("migration_directory", &self.migration_directory)
            .field("seed_directory", &self.seed_directory)
            .field("local", &self.local)
            .finish()
    }
}
