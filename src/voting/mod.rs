pub mod tally;

use crate::models::Vote;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

// Row counts per vote value for one comparison table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VoteCounts {
    unvoted: i64,
    by_vote: HashMap<Vote, i64>,
}

impl VoteCounts {
    pub fn record(&mut self, vote: Option<Vote>, rows: i64) {
        match vote {
            Some(vote) => *self.by_vote.entry(vote).or_insert(0) += rows,
            None => self.unvoted += rows,
        }
    }

    /// Every row of the table, voted or not.
    pub fn total(&self) -> i64 {
        self.unvoted + self.by_vote.values().sum::<i64>()
    }

    pub fn count_for(&self, vote: &Vote) -> i64 {
        self.by_vote.get(vote).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct VoteShare {
    pub number_of_votes: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantShare {
    pub variant: String,
    pub share: VoteShare,
}

/// Per-variant shares, serialized as a map in table order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantVotes(pub Vec<VariantShare>);

#[cfg(test)]
impl VariantVotes {
    pub fn get(&self, variant: &str) -> Option<&VoteShare> {
        self.0
            .iter()
            .find(|entry| entry.variant == variant)
            .map(|entry| &entry.share)
    }
}

impl Serialize for VariantVotes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for entry in &self.0 {
            map.serialize_entry(&entry.variant, &entry.share)?;
        }
        map.end()
    }
}

// Aggregate statistics for one comparison table
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TallyResult {
    pub variants: Vec<String>,
    pub nb_of_rows: i64,
    pub flag_votes: VoteShare,
    pub variants_votes_data: VariantVotes,
}
