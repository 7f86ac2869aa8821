mod comparison_tables;
mod evaluation_rows;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ids::Id;
use crate::models::{ComparisonTable, EvaluationRow, NewEvaluationRow, Vote};
use crate::voting::VoteCounts;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use log::{debug, info};
use sqlx::{
    Sqlite,
    migrate::MigrateDatabase,
    sqlite::{SqlitePool, SqlitePoolOptions},
};

/// Storage client shared by every request. Constructed once at startup.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(config: &Config) -> Result<Self> {
        let db_url = config.database_url.as_str();

        // Create database if it doesn't exist
        if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            info!("Creating database at {}", db_url);
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(db_url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and makes sure the schema is in place.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        Self::init_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Single-connection in-memory database; every connection to
    /// `sqlite::memory:` is a separate database, so the pool must never
    /// open a second one or reap the first.
    #[cfg(test)]
    pub async fn in_memory() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Self::from_pool(pool).await.unwrap()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn init_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comparison_tables (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comparison_table_variants (
                comparison_table_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                PRIMARY KEY (comparison_table_id, position),
                FOREIGN KEY (comparison_table_id) REFERENCES comparison_tables(id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS evaluation_rows (
                id TEXT PRIMARY KEY,
                comparison_table_id TEXT NOT NULL,
                inputs TEXT NOT NULL,
                outputs TEXT NOT NULL,
                vote TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (comparison_table_id) REFERENCES comparison_tables(id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS comparison_tables_created_at ON comparison_tables (created_at)",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS evaluation_rows_table_vote ON evaluation_rows (comparison_table_id, vote)",
        )
        .execute(pool)
        .await?;

        debug!("Database schema ready");
        Ok(())
    }
}

/// Current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// Fixed width keeps lexical order equal to chronological order.
fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(entity: &'static str, id: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::CorruptRecord {
            entity,
            id: id.to_string(),
            reason: format!("bad timestamp {:?}: {}", raw, e),
        })
}

fn parse_stored_id(entity: &'static str, raw: &str) -> Result<Id> {
    Id::parse(raw).map_err(|e| Error::CorruptRecord {
        entity,
        id: raw.to_string(),
        reason: e.to_string(),
    })
}

fn expect_one_row(entity: &'static str, rows_affected: u64) -> Result<()> {
    if rows_affected == 1 {
        Ok(())
    } else {
        Err(Error::NotAcknowledged { entity })
    }
}

#[async_trait]
pub trait ComparisonTableStore: Send + Sync {
    async fn insert_comparison_table(&self, table: &ComparisonTable) -> Result<()>;

    async fn get_comparison_table(&self, id: &Id) -> Result<ComparisonTable>;

    /// Newest first, at most `limit` tables.
    async fn list_recent_comparison_tables(&self, limit: u32) -> Result<Vec<ComparisonTable>>;

    async fn create_comparison_table(&self, variants: Vec<String>) -> Result<ComparisonTable> {
        let table = ComparisonTable::new(variants, now())?;
        self.insert_comparison_table(&table).await?;
        Ok(table)
    }
}

#[async_trait]
pub trait EvaluationRowStore: Send + Sync {
    async fn insert_evaluation_row(&self, row: &EvaluationRow) -> Result<()>;

    async fn get_evaluation_row(&self, id: &Id) -> Result<EvaluationRow>;

    /// Sets `vote` and `updated_at` on one row and nothing else.
    async fn write_vote(&self, id: &Id, vote: &Vote, at: DateTime<Utc>) -> Result<()>;

    async fn count_evaluation_rows(&self, comparison_table_id: &Id, vote: Option<&Vote>)
    -> Result<i64>;

    /// Row counts per vote value for one table, read as a single snapshot.
    async fn vote_counts(&self, comparison_table_id: &Id) -> Result<VoteCounts>;

    async fn create_evaluation_row(
        &self,
        comparison_table_id: Id,
        fields: NewEvaluationRow,
    ) -> Result<EvaluationRow> {
        let row = EvaluationRow::new(comparison_table_id, fields, now());
        self.insert_evaluation_row(&row).await?;
        Ok(row)
    }

    async fn update_vote(&self, id: &Id, vote: Vote) -> Result<EvaluationRow> {
        self.write_vote(id, &vote, now()).await?;
        self.get_evaluation_row(id).await
    }
}
