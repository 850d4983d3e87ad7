//! Versioned migrations over a [`Backend`]

use super::script::{self, MigrationFile, Script};
use super::source::MigrationSource;
use crate::core::config::DEFAULT_MIGRATION_TABLE;
use crate::core::database::{Backend, UnitOfWork};
use crate::core::error::{DatabaseError, Result};
use crate::core::value::DatabaseValue;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Applies and reverts migration directories
///
/// Directory arguments are paths within the migrator's script source.
#[async_trait]
pub trait Migrator: Send + Sync {
    /// Recorded versions, ascending
    async fn applied_versions(&self) -> Result<Vec<i64>>;

    /// Highest recorded version, 0 when nothing is recorded
    async fn current_version(&self) -> Result<i64> {
        Ok(self.applied_versions().await?.last().copied().unwrap_or(0))
    }

    /// Apply pending migrations of `dir` with version `<= version`, in order
    ///
    /// Fails with [`DatabaseError::NoNextVersion`] when nothing is pending.
    async fn up_to(&self, dir: &str, version: i64) -> Result<Vec<i64>>;

    /// Apply every pending migration of `dir`
    async fn up(&self, dir: &str) -> Result<Vec<i64>>;

    /// Revert every recorded version in descending order
    async fn down(&self, dir: &str) -> Result<Vec<i64>> {
        let versions = self.applied_versions().await?;
        self.down_versions(dir, &versions).await
    }

    /// Revert those of `versions` that are recorded, newest first
    async fn down_versions(&self, dir: &str, versions: &[i64]) -> Result<Vec<i64>>;

    /// Apply the scripts of a seed directory without recording versions
    ///
    /// The whole directory runs in one backend transaction; a failing script leaves
    /// none of the directory's data behind.
    async fn apply_seed(&self, dir: &str) -> Result<usize>;

    /// Run the `Down` sections of a seed directory in reverse order
    async fn down_seed(&self, dir: &str) -> Result<usize>;
}

/// [`Migrator`] running scripts through a [`Backend`] and recording versions in a table
///
/// Each migration runs in its own backend transaction together with its version row,
/// so a failed migration leaves nothing behind.
pub struct SqlMigrator {
    backend: Arc<dyn Backend>,
    source: Arc<dyn MigrationSource>,
    table: String,
}

impl SqlMigrator {
    /// Create a migrator recording versions in `schema_migrations`
    pub fn new(backend: Arc<dyn Backend>, source: Arc<dyn MigrationSource>) -> Self {
        Self {
            backend,
            source,
            table: DEFAULT_MIGRATION_TABLE.to_string(),
        }
    }

    /// Use a different version table
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Name of the version table
    pub fn table(&self) -> &str {
        &self.table
    }

    async fn read_versions(&self, uow: &mut dyn UnitOfWork) -> Result<Vec<i64>> {
        uow.exec_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at BIGINT NOT NULL
            )",
            self.table
        ))
        .await?;

        let rows = uow
            .query(
                &format!("SELECT version FROM {} ORDER BY version", self.table),
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get("version").and_then(DatabaseValue::as_long))
            .collect())
    }

    async fn apply(&self, file: &MigrationFile) -> Result<()> {
        let script = file.load(self.source.as_ref())?;
        let insert = self.backend.placeholder().rewrite(&format!(
            "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
            self.table
        ))
        .into_owned();
        let params = [
            DatabaseValue::Long(file.version),
            DatabaseValue::String(file.name.clone()),
            DatabaseValue::Long(chrono::Utc::now().timestamp()),
        ];

        let mut uow = self.backend.begin(false).await?;
        let result = async {
            if Script::has_statements(script.up()) {
                uow.exec_batch(script.up()).await?;
            }
            uow.exec(&insert, &params).await.map(|_| ())
        }
        .await;
        finish(uow, result)
            .await
            .map_err(|e| DatabaseError::migration_failed(format!("apply {}", file.path), e))?;

        tracing::info!(version = file.version, path = %file.path, "migration applied");
        Ok(())
    }

    async fn revert(&self, file: &MigrationFile) -> Result<()> {
        let script = file.load(self.source.as_ref())?;
        let delete = self
            .backend
            .placeholder()
            .rewrite(&format!("DELETE FROM {} WHERE version = ?", self.table))
            .into_owned();
        let params = [DatabaseValue::Long(file.version)];

        let mut uow = self.backend.begin(false).await?;
        let result = async {
            if Script::has_statements(script.down()) {
                uow.exec_batch(script.down()).await?;
            }
            uow.exec(&delete, &params).await.map(|_| ())
        }
        .await;
        finish(uow, result)
            .await
            .map_err(|e| DatabaseError::migration_failed(format!("revert {}", file.path), e))?;

        tracing::info!(version = file.version, path = %file.path, "migration reverted");
        Ok(())
    }

    /// Run one section of every script in a seed directory, unversioned, in a single
    /// backend transaction; `Down` sections run in reverse order
    async fn run_seed(&self, dir: &str, up: bool) -> Result<usize> {
        let mut files: Vec<MigrationFile> = script::collect(self.source.as_ref(), dir)?
            .into_values()
            .collect();
        if !up {
            files.reverse();
        }

        let mut sections = Vec::with_capacity(files.len());
        for file in &files {
            let script = file.load(self.source.as_ref())?;
            let sql = if up { script.up() } else { script.down() };
            if Script::has_statements(sql) {
                sections.push((file.path.as_str(), sql.to_string()));
            }
        }
        if sections.is_empty() {
            return Ok(files.len());
        }

        let mut uow = self.backend.begin(false).await?;
        let result = async {
            for (path, sql) in &sections {
                uow.exec_batch(sql)
                    .await
                    .map_err(|e| DatabaseError::migration_failed(format!("seed {}", path), e))?;
            }
            Ok::<(), DatabaseError>(())
        }
        .await;
        finish(uow, result).await?;
        Ok(files.len())
    }

    async fn pending(&self, dir: &str, limit: Option<i64>) -> Result<Vec<MigrationFile>> {
        let applied: BTreeSet<i64> = self.applied_versions().await?.into_iter().collect();
        Ok(script::collect(self.source.as_ref(), dir)?
            .into_values()
            .filter(|file| !applied.contains(&file.version))
            .filter(|file| limit.map_or(true, |max| file.version <= max))
            .collect())
    }
}

/// Commit on success, roll back on failure
async fn finish(uow: Box<dyn UnitOfWork>, result: Result<()>) -> Result<()> {
    match result {
        Ok(()) => uow.commit().await,
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::warn!(error = %rollback_err, "rollback failed");
            }
            Err(e)
        }
    }
}

impl std::fmt::Debug for SqlMigrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlMigrator")
            .field("dialect", &self.backend.dialect())
            .field("table", &self.table)
            .field("source", &self.source)
            .finish()
    }
}

#[async_trait]
impl Migrator for SqlMigrator {
    /// Creates the version table if needed
    async fn applied_versions(&self) -> Result<Vec<i64>> {
        let mut uow = self.backend.begin(false).await?;
        match self.read_versions(uow.as_mut()).await {
            Ok(versions) => {
                uow.commit().await?;
                Ok(versions)
            }
            Err(e) => finish(uow, Err(e)).await.map(|_| Vec::new()),
        }
    }

    async fn up_to(&self, dir: &str, version: i64) -> Result<Vec<i64>> {
        let pending = self.pending(dir, Some(version)).await?;
        if pending.is_empty() {
            return Err(DatabaseError::NoNextVersion);
        }

        let mut applied = Vec::with_capacity(pending.len());
        for file in &pending {
            self.apply(file).await?;
            applied.push(file.version);
        }
        Ok(applied)
    }

    async fn up(&self, dir: &str) -> Result<Vec<i64>> {
        let pending = self.pending(dir, None).await?;
        if pending.is_empty() {
            tracing::debug!(dir, "no migrations to run");
        }

        let mut applied = Vec::with_capacity(pending.len());
        for file in &pending {
            self.apply(file).await?;
            applied.push(file.version);
        }
        Ok(applied)
    }

    async fn down_versions(&self, dir: &str, versions: &[i64]) -> Result<Vec<i64>> {
        let files = script::collect(self.source.as_ref(), dir)?;
        let recorded: BTreeSet<i64> = self.applied_versions().await?.into_iter().collect();
        let targets: BTreeSet<i64> = versions
            .iter()
            .copied()
            .filter(|version| recorded.contains(version))
            .collect();
        let mut reverted = Vec::with_capacity(targets.len());

        for version in targets.into_iter().rev() {
            match files.get(&version) {
                Some(file) => {
                    self.revert(file).await?;
                    reverted.push(version);
                }
                None => {
                    tracing::warn!(version, dir, "no script for recorded version; skipping");
                }
            }
        }
        Ok(reverted)
    }

    async fn apply_seed(&self, dir: &str) -> Result<usize> {
        let scripts = self.run_seed(dir, true).await?;
        tracing::info!(path = dir, scripts, "seed applied");
        Ok(scripts)
    }

    async fn down_seed(&self, dir: &str) -> Result<usize> {
        let scripts = self.run_seed(dir, false).await?;
        tracing::info!(path = dir, scripts, "seed reverted");
        Ok(scripts)
    }
}
