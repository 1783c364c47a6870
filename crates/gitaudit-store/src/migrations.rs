use anyhow::{Context, Result};
use sqlx::{Pool, Postgres};

/// Versioned migration, applied inside its own transaction with a row
/// recorded in `schema_migrations`. Applied once at startup under a
/// single advisory lock so two instances starting concurrently don't
/// race the same migration.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        up_sql: include_str!("sql/001_initial_schema.sql"),
    },
    Migration {
        version: 2,
        name: "webhook_dedup_and_audit",
        up_sql: include_str!("sql/002_webhook_dedup_and_audit.sql"),
    },
];

pub struct MigrationRunner<'a> {
    pool: &'a Pool<Postgres>,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(pool: &'a Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(self.pool)
        .await
        .context("creating schema_migrations table")?;
        Ok(())
    }

    async fn current_version(&self) -> Result<i64> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(self.pool)
            .await
            .context("reading current schema version")?;
        Ok(row.0.unwrap_or(0))
    }

    /// Runs every migration whose version exceeds the current one, under an
    /// advisory lock so concurrent instances don't race at startup.
    pub async fn migrate(&self) -> Result<()> {
        self.init().await?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(0x67697461_i64) // "gita" - arbitrary fixed lock key for this service
            .execute(self.pool)
            .await
            .context("acquiring migration advisory lock")?;

        let result = self.migrate_locked().await;

        let _ = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(0x67697461_i64)
            .execute(self.pool)
            .await;

        result
    }

    async fn migrate_locked(&self) -> Result<()> {
        let current = self.current_version().await?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
            let mut tx = self.pool.begin().await.context("starting migration transaction")?;
            sqlx::query(migration.up_sql)
                .execute(&mut *tx)
                .await
                .with_context(|| format!("applying migration {} ({})", migration.version, migration.name))?;
            sqlx::query("INSERT INTO schema_migrations (version, name) VALUES ($1, $2)")
                .bind(migration.version)
                .bind(migration.name)
                .execute(&mut *tx)
                .await
                .context("recording migration version")?;
            tx.commit().await.context("committing migration transaction")?;
            tracing::info!(version = migration.version, name = migration.name, "applied migration");
        }
        Ok(())
    }
}
