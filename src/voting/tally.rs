use crate::db::{ComparisonTableStore, EvaluationRowStore};
use crate::error::Result;
use crate::ids::Id;
use crate::models::{ComparisonTable, Vote};
use crate::voting::{TallyResult, VariantShare, VariantVotes, VoteCounts, VoteShare};
use log::debug;
use std::collections::HashSet;

/// `count / total * 100` rounded half-up to two decimals.
///
/// The rounding is done on integers so ties such as `1/32 = 3.125%` always
/// land on `3.13`. An empty table (`total == 0`) yields `0.0`.
pub fn percentage(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let (count, total) = (i128::from(count), i128::from(total));
    let hundredths = (count * 20_000 + total) / (2 * total);
    hundredths as f64 / 100.0
}

fn share(count: i64, total: i64) -> VoteShare {
    VoteShare {
        number_of_votes: count,
        percentage: percentage(count, total),
    }
}

/// Turns one snapshot of row counts into the table's statistics.
///
/// A variant listed more than once is reported once, at its first position.
pub fn compute(table: &ComparisonTable, counts: &VoteCounts) -> TallyResult {
    let total = counts.total();

    let mut seen = HashSet::new();
    let variants_votes_data = table
        .variants
        .iter()
        .filter(|variant| seen.insert(variant.as_str()))
        .map(|variant| VariantShare {
            variant: variant.clone(),
            share: share(counts.count_for(&Vote::Variant(variant.clone())), total),
        })
        .collect();

    TallyResult {
        variants: table.variants.clone(),
        nb_of_rows: total,
        flag_votes: share(counts.count_for(&Vote::Flag), total),
        variants_votes_data: VariantVotes(variants_votes_data),
    }
}

/// Resolves the table and tallies its rows from a single grouped read.
pub async fn tally<S>(store: &S, comparison_table_id: &Id) -> Result<TallyResult>
where
    S: ComparisonTableStore + EvaluationRowStore + ?Sized,
{
    let table = store.get_comparison_table(comparison_table_id).await?;
    let counts = store.vote_counts(comparison_table_id).await?;
    let result = compute(&table, &counts);

    debug!(
        "Tallied comparison table {}: {} row(s), {} flag vote(s)",
        comparison_table_id, result.nb_of_rows, result.flag_votes.number_of_votes
    );
    Ok(result)
}
