use super::{
    ComparisonTableStore, Database, expect_one_row, format_timestamp, parse_stored_id,
    parse_timestamp,
};
use crate::error::{Error, Result};
use crate::ids::Id;
use crate::models::ComparisonTable;
use async_trait::async_trait;
use log::debug;
use sqlx::Row;

const ENTITY: &str = "comparison table";

impl Database {
    async fn load_variants(&self, id: &str) -> Result<Vec<String>> {
        let variants = sqlx::query(
            r#"
            SELECT name
            FROM comparison_table_variants
            WHERE comparison_table_id = ?
            ORDER BY position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(variants)
    }

    async fn table_from_row(&self, row: &sqlx::sqlite::SqliteRow) -> Result<ComparisonTable> {
        let raw_id = row.try_get::<String, _>("id")?;
        let created_at = row.try_get::<String, _>("created_at")?;
        let updated_at = row.try_get::<String, _>("updated_at")?;

        Ok(ComparisonTable {
            id: parse_stored_id(ENTITY, &raw_id)?,
            variants: self.load_variants(&raw_id).await?,
            created_at: parse_timestamp(ENTITY, &raw_id, &created_at)?,
            updated_at: parse_timestamp(ENTITY, &raw_id, &updated_at)?,
        })
    }
}

#[async_trait]
impl ComparisonTableStore for Database {
    async fn insert_comparison_table(&self, table: &ComparisonTable) -> Result<()> {
        let id = table.id.to_string();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO comparison_tables (id, created_at, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(format_timestamp(&table.created_at))
        .bind(format_timestamp(&table.updated_at))
        .execute(&mut *tx)
        .await?;
        expect_one_row(ENTITY, inserted.rows_affected())?;

        // Variants keep their caller-given order through `position`
        for (position, name) in table.variants.iter().enumerate() {
            let inserted = sqlx::query(
                r#"
                INSERT INTO comparison_table_variants (comparison_table_id, position, name)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(position as i64)
            .bind(name)
            .execute(&mut *tx)
            .await?;
            expect_one_row(ENTITY, inserted.rows_affected())?;
        }

        tx.commit().await?;
        debug!("Inserted comparison table {} with {} variant(s)", id, table.variants.len());
        Ok(())
    }

    async fn get_comparison_table(&self, id: &Id) -> Result<ComparisonTable> {
        let row = sqlx::query(
            r#"
            SELECT id, created_at, updated_at
            FROM comparison_tables
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(ENTITY, id))?;

        self.table_from_row(&row).await
    }

    async fn list_recent_comparison_tables(&self, limit: u32) -> Result<Vec<ComparisonTable>> {
        // One round trip: the newest tables joined with their variants in order
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.created_at, t.updated_at, v.name
            FROM (
                SELECT id, created_at, updated_at
                FROM comparison_tables
                ORDER BY created_at DESC, id DESC
                LIMIT ?
            ) AS t
            LEFT JOIN comparison_table_variants AS v ON v.comparison_table_id = t.id
            ORDER BY t.created_at DESC, t.id DESC, v.position
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        let mut tables: Vec<ComparisonTable> = Vec::new();
        for row in &rows {
            let raw_id = row.try_get::<String, _>("id")?;
            let name: Option<String> = row.try_get("name")?;
            let id = parse_stored_id(ENTITY, &raw_id)?;

            let starts_new_table = tables.last().map_or(true, |table| table.id != id);
            if starts_new_table {
                let created_at = row.try_get::<String, _>("created_at")?;
                let updated_at = row.try_get::<String, _>("updated_at")?;
                tables.push(ComparisonTable {
                    id,
                    variants: Vec::new(),
                    created_at: parse_timestamp(ENTITY, &raw_id, &created_at)?,
                    updated_at: parse_timestamp(ENTITY, &raw_id, &updated_at)?,
                });
            }
            if let (Some(name), Some(table)) = (name, tables.last_mut()) {
                table.variants.push(name);
            }
        }
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::now;
    use crate::error::ErrorKind;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn create_then_get_returns_same_variants_in_order() {
        let db = Database::in_memory().await;
        let created = db
            .create_comparison_table(names(&["gpt-b", "gpt-a", "claude"]))
            .await
            .unwrap();

        let fetched = db.get_comparison_table(&created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.variants, names(&["gpt-b", "gpt-a", "claude"]));
    }

    #[tokio::test]
    async fn create_rejects_empty_variants_without_writing() {
        let db = Database::in_memory().await;
        let err = db.create_comparison_table(Vec::new()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(db.list_recent_comparison_tables(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_unknown_table_is_not_found() {
        let db = Database::in_memory().await;
        let err = db.get_comparison_table(&Id::allocate()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn list_recent_returns_newest_first_within_limit() {
        let db = Database::in_memory().await;
        let base = now() - Duration::hours(1);
        let mut ids = Vec::new();
        // Inserted out of chronological order on purpose
        for minutes in [10, 30, 20] {
            let table = ComparisonTable::new(names(&["A"]), base + Duration::minutes(minutes)).unwrap();
            db.insert_comparison_table(&table).await.unwrap();
            ids.push(table.id);
        }

        let listed = db.list_recent_comparison_tables(2).await.unwrap();
        let listed_ids: Vec<Id> = listed.iter().map(|t| t.id).collect();
        assert_eq!(listed_ids, vec![ids[1], ids[2]]);
        assert!(listed[0].created_at > listed[1].created_at);
    }

    #[tokio::test]
    async fn list_recent_keeps_each_tables_variants_in_order() {
        let db = Database::in_memory().await;
        let base = now() - Duration::hours(1);
        let older = ComparisonTable::new(names(&["x2", "x1"]), base).unwrap();
        let newer =
            ComparisonTable::new(names(&["c", "a", "b", "a"]), base + Duration::minutes(1)).unwrap();
        db.insert_comparison_table(&older).await.unwrap();
        db.insert_comparison_table(&newer).await.unwrap();

        let listed = db.list_recent_comparison_tables(10).await.unwrap();
        assert_eq!(listed, vec![newer.clone(), older]);

        let limited = db.list_recent_comparison_tables(1).await.unwrap();
        assert_eq!(limited, vec![newer]);
    }

    #[tokio::test]
    async fn duplicate_insert_fails_as_persistence_error() {
        let db = Database::in_memory().await;
        let table = db.create_comparison_table(names(&["A"])).await.unwrap();
        let err = db.insert_comparison_table(&table).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        // The failed transaction left nothing behind
        assert_eq!(db.list_recent_comparison_tables(10).await.unwrap().len(), 1);
    }
}
