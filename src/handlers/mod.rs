//! Request handling for comparison tables, evaluation rows and tallies.
//!
//! Each function validates raw caller input, talks to the stores and returns
//! the shaped result or an [`Error`] carrying a stable kind for the boundary.

use crate::db::{ComparisonTableStore, EvaluationRowStore};
use crate::error::{Error, Result};
use crate::ids::Id;
use crate::models::{
    ComparisonTable, EvaluationRow, EvaluationRowUpdate, NewComparisonTable, NewEvaluationRow,
    Vote,
};
use crate::voting::{TallyResult, tally};
use log::{info, warn};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowCount {
    pub comparison_table_id: Id,
    pub vote: Option<Vote>,
    pub count: i64,
}

pub async fn create_comparison_table<S>(
    store: &S,
    request: NewComparisonTable,
) -> Result<ComparisonTable>
where
    S: ComparisonTableStore + ?Sized,
{
    let table = store.create_comparison_table(request.variants).await?;
    info!("Created comparison table {} with variants {:?}", table.id, table.variants);
    Ok(table)
}

/// `limit` defaults to `max_limit` and is clamped to it.
pub async fn list_comparison_tables<S>(
    store: &S,
    limit: Option<u32>,
    max_limit: u32,
) -> Result<Vec<ComparisonTable>>
where
    S: ComparisonTableStore + ?Sized,
{
    let limit = match limit {
        Some(0) => return Err(Error::invalid("limit must be at least 1")),
        Some(limit) => limit.min(max_limit),
        None => max_limit,
    };
    store.list_recent_comparison_tables(limit).await
}

pub async fn get_comparison_table<S>(store: &S, table_id: &str) -> Result<ComparisonTable>
where
    S: ComparisonTableStore + ?Sized,
{
    let table_id = Id::parse(table_id)?;
    store.get_comparison_table(&table_id).await
}

/// Creates an unvoted row under the table named in the path.
pub async fn create_evaluation_row<S>(
    store: &S,
    table_id: &str,
    fields: NewEvaluationRow,
) -> Result<EvaluationRow>
where
    S: ComparisonTableStore + EvaluationRowStore + ?Sized,
{
    let table_id = Id::parse(table_id)?;
    if let Some(body_table_id) = fields.comparison_table_id.as_deref() {
        if Id::parse(body_table_id)? != table_id {
            return Err(Error::invalid(format!(
                "comparison_table_id {} does not match the table {} in the path",
                body_table_id, table_id
            )));
        }
    }
    if fields.id.is_some() || fields.vote.is_some() {
        warn!("Ignoring caller-supplied id/vote on new evaluation row for table {}", table_id);
    }

    // Rows must reference an existing table
    store.get_comparison_table(&table_id).await?;

    let row = store.create_evaluation_row(table_id, fields).await?;
    info!("Created evaluation row {} in table {}", row.id, table_id);
    Ok(row)
}

/// Records a vote. Only `vote` is applied from the update body.
pub async fn update_evaluation_row_vote<S>(
    store: &S,
    table_id: &str,
    row_id: &str,
    update: EvaluationRowUpdate,
) -> Result<EvaluationRow>
where
    S: ComparisonTableStore + EvaluationRowStore + ?Sized,
{
    let table_id = Id::parse(table_id)?;
    let row_id = Id::parse(row_id)?;
    let vote = match update.vote {
        Some(raw) if !raw.is_empty() => Vote::from(raw),
        _ => return Err(Error::invalid("vote is required")),
    };

    let row = store.get_evaluation_row(&row_id).await?;
    if row.comparison_table_id != table_id {
        return Err(Error::not_found("evaluation row", row_id));
    }

    let table = store.get_comparison_table(&table_id).await?;
    if !table.accepts(&vote) {
        return Err(Error::invalid(format!(
            "vote {:?} is neither the flag {:?} nor one of {:?}",
            vote.as_str(),
            crate::models::FLAG_VOTE,
            table.variants
        )));
    }

    let updated = store.update_vote(&row_id, vote).await?;
    info!(
        "Recorded vote {:?} on row {} of table {}",
        updated.vote.as_ref().map(Vote::as_str),
        row_id,
        table_id
    );
    Ok(updated)
}

pub async fn count_evaluation_rows<S>(
    store: &S,
    table_id: &str,
    vote: Option<String>,
) -> Result<RowCount>
where
    S: ComparisonTableStore + EvaluationRowStore + ?Sized,
{
    let table_id = Id::parse(table_id)?;
    store.get_comparison_table(&table_id).await?;

    let vote = vote.map(Vote::from);
    let count = store.count_evaluation_rows(&table_id, vote.as_ref()).await?;
    Ok(RowCount {
        comparison_table_id: table_id,
        vote,
        count,
    })
}

pub async fn fetch_votes_data<S>(store: &S, table_id: &str) -> Result<TallyResult>
where
    S: ComparisonTableStore + EvaluationRowStore + ?Sized,
{
    let table_id = Id::parse(table_id)?;
    tally::tally(store, &table_id).await
}
