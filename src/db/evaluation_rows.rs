use super::{
    Database, EvaluationRowStore, expect_one_row, format_timestamp, parse_stored_id,
    parse_timestamp,
};
use crate::error::{Error, Result};
use crate::ids::Id;
use crate::models::{EvaluationRow, Vote};
use crate::voting::VoteCounts;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use sqlx::Row;

const ENTITY: &str = "evaluation row";

fn decode_json<T: DeserializeOwned>(id: &str, column: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::CorruptRecord {
        entity: ENTITY,
        id: id.to_string(),
        reason: format!("bad {} column: {}", column, e),
    })
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| Error::invalid(format!("cannot encode row payload: {}", e)))
}

fn row_from_sql(row: &sqlx::sqlite::SqliteRow) -> Result<EvaluationRow> {
    let raw_id = row.try_get::<String, _>("id")?;
    let table_id = row.try_get::<String, _>("comparison_table_id")?;
    let inputs = row.try_get::<String, _>("inputs")?;
    let outputs = row.try_get::<String, _>("outputs")?;
    let vote: Option<String> = row.try_get("vote")?;
    let created_at = row.try_get::<String, _>("created_at")?;
    let updated_at = row.try_get::<String, _>("updated_at")?;

    Ok(EvaluationRow {
        id: parse_stored_id(ENTITY, &raw_id)?,
        comparison_table_id: parse_stored_id(ENTITY, &table_id)?,
        inputs: decode_json(&raw_id, "inputs", &inputs)?,
        outputs: decode_json(&raw_id, "outputs", &outputs)?,
        vote: vote.map(Vote::from),
        created_at: parse_timestamp(ENTITY, &raw_id, &created_at)?,
        updated_at: parse_timestamp(ENTITY, &raw_id, &updated_at)?,
    })
}

#[async_trait]
impl EvaluationRowStore for Database {
    async fn insert_evaluation_row(&self, row: &EvaluationRow) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO evaluation_rows (id, comparison_table_id, inputs, outputs, vote, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(row.id.to_string())
        .bind(row.comparison_table_id.to_string())
        .bind(encode_json(&row.inputs)?)
        .bind(encode_json(&row.outputs)?)
        .bind(row.vote.as_ref().map(Vote::as_str))
        .bind(format_timestamp(&row.created_at))
        .bind(format_timestamp(&row.updated_at))
        .execute(&self.pool)
        .await?;
        expect_one_row(ENTITY, inserted.rows_affected())?;

        debug!("Inserted evaluation row {} for table {}", row.id, row.comparison_table_id);
        Ok(())
    }

    async fn get_evaluation_row(&self, id: &Id) -> Result<EvaluationRow> {
        let row = sqlx::query(
            r#"
            SELECT id, comparison_table_id, inputs, outputs, vote, created_at, updated_at
            FROM evaluation_rows
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found(ENTITY, id))?;

        row_from_sql(&row)
    }

    async fn write_vote(&self, id: &Id, vote: &Vote, at: DateTime<Utc>) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE evaluation_rows
            SET vote = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(vote.as_str())
        .bind(format_timestamp(&at))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(Error::not_found(ENTITY, id));
        }
        expect_one_row(ENTITY, updated.rows_affected())?;

        debug!("Recorded vote {:?} on evaluation row {}", vote.as_str(), id);
        Ok(())
    }

    async fn count_evaluation_rows(
        &self,
        comparison_table_id: &Id,
        vote: Option<&Vote>,
    ) -> Result<i64> {
        let count = match vote {
            Some(vote) => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM evaluation_rows WHERE comparison_table_id = ? AND vote = ?",
                )
                .bind(comparison_table_id.to_string())
                .bind(vote.as_str())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM evaluation_rows WHERE comparison_table_id = ?",
                )
                .bind(comparison_table_id.to_string())
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(count)
    }

    async fn vote_counts(&self, comparison_table_id: &Id) -> Result<VoteCounts> {
        let rows = sqlx::query(
            r#"
            SELECT vote, COUNT(*) AS n
            FROM evaluation_rows
            WHERE comparison_table_id = ?
            GROUP BY vote
            "#,
        )
        .bind(comparison_table_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = VoteCounts::default();
        for row in rows {
            let vote: Option<String> = row.try_get("vote")?;
            let n: i64 = row.try_get("n")?;
            counts.record(vote.map(Vote::from), n);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ComparisonTableStore;
    use crate::error::ErrorKind;
    use crate::models::{NewEvaluationRow, RowInput, RowOutput};
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    async fn table_with_rows(db: &Database, rows: usize) -> (Id, Vec<Id>) {
        let table = db
            .create_comparison_table(vec!["A".to_string(), "B".to_string()])
            .await
            .unwrap();
        let mut ids = Vec::new();
        for _ in 0..rows {
            let row = db
                .create_evaluation_row(table.id, NewEvaluationRow::default())
                .await
                .unwrap();
            ids.push(row.id);
        }
        (table.id, ids)
    }

    #[tokio::test]
    async fn created_row_round_trips_with_payload() {
        let db = Database::in_memory().await;
        let (table_id, _) = table_with_rows(&db, 0).await;
        let fields = NewEvaluationRow {
            inputs: vec![RowInput {
                input_name: "country".to_string(),
                input_value: "Peru".to_string(),
            }],
            outputs: vec![
                RowOutput {
                    variant_name: "A".to_string(),
                    variant_output: "Lima".to_string(),
                },
                RowOutput {
                    variant_name: "B".to_string(),
                    variant_output: "Cusco".to_string(),
                },
            ],
            ..Default::default()
        };

        let created = db.create_evaluation_row(table_id, fields).await.unwrap();
        let fetched = db.get_evaluation_row(&created.id).await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.vote, None);
    }

    #[tokio::test]
    async fn update_vote_is_idempotent_apart_from_updated_at() {
        let db = Database::in_memory().await;
        let (_, rows) = table_with_rows(&db, 1).await;
        let row_id = rows[0];
        let created = db.get_evaluation_row(&row_id).await.unwrap();

        let first_at = created.created_at + Duration::seconds(1);
        let second_at = created.created_at + Duration::seconds(2);
        db.write_vote(&row_id, &Vote::from("A"), first_at).await.unwrap();
        let first = db.get_evaluation_row(&row_id).await.unwrap();
        db.write_vote(&row_id, &Vote::from("A"), second_at).await.unwrap();
        let second = db.get_evaluation_row(&row_id).await.unwrap();

        assert_eq!(first.vote, Some(Vote::from("A")));
        assert_eq!(second.vote, first.vote);
        assert_eq!(first.updated_at, first_at);
        assert_eq!(second.updated_at, second_at);
        assert_eq!(second.created_at, created.created_at);
        assert_eq!(second.inputs, first.inputs);
    }

    #[tokio::test]
    async fn update_vote_on_missing_row_is_not_found() {
        let db = Database::in_memory().await;
        let err = db.update_vote(&Id::allocate(), Vote::Flag).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn counts_filter_by_table_and_vote() {
        let db = Database::in_memory().await;
        let (table_id, rows) = table_with_rows(&db, 3).await;
        let (other_table, other_rows) = table_with_rows(&db, 2).await;
        db.update_vote(&rows[0], Vote::from("A")).await.unwrap();
        db.update_vote(&rows[1], Vote::Flag).await.unwrap();
        db.update_vote(&other_rows[0], Vote::from("A")).await.unwrap();

        assert_eq!(db.count_evaluation_rows(&table_id, None).await.unwrap(), 3);
        assert_eq!(db.count_evaluation_rows(&table_id, Some(&Vote::from("A"))).await.unwrap(), 1);
        assert_eq!(db.count_evaluation_rows(&table_id, Some(&Vote::Flag)).await.unwrap(), 1);
        assert_eq!(db.count_evaluation_rows(&table_id, Some(&Vote::from("B"))).await.unwrap(), 0);
        assert_eq!(db.count_evaluation_rows(&other_table, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn vote_counts_snapshot_includes_unvoted_rows_in_total() {
        let db = Database::in_memory().await;
        let (table_id, rows) = table_with_rows(&db, 4).await;
        db.update_vote(&rows[0], Vote::from("B")).await.unwrap();
        db.update_vote(&rows[1], Vote::from("B")).await.unwrap();
        db.update_vote(&rows[2], Vote::Flag).await.unwrap();

        let counts = db.vote_counts(&table_id).await.unwrap();
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.count_for(&Vote::from("B")), 2);
        assert_eq!(counts.count_for(&Vote::Flag), 1);
        assert_eq!(counts.count_for(&Vote::from("A")), 0);
    }
}
