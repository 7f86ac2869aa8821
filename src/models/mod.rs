use crate::error::{Error, Result};
use crate::ids::Id;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Vote value reviewers use when no variant is acceptable.
pub const FLAG_VOTE: &str = "0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTable {
    pub id: Id,
    pub variants: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComparisonTable {
    pub fn new(variants: Vec<String>, now: DateTime<Utc>) -> Result<Self> {
        validate_variants(&variants)?;
        Ok(Self {
            id: Id::allocate(),
            variants,
            created_at: now,
            updated_at: now,
        })
    }

    /// Whether `vote` is the flag or one of this table's variants.
    pub fn accepts(&self, vote: &Vote) -> bool {
        match vote {
            Vote::Flag => true,
            Vote::Variant(name) => self.variants.iter().any(|v| v == name),
        }
    }
}

fn validate_variants(variants: &[String]) -> Result<()> {
    if variants.is_empty() {
        return Err(Error::invalid("a comparison table needs at least one variant"));
    }
    for variant in variants {
        if variant.is_empty() {
            return Err(Error::invalid("variant names must not be empty"));
        }
        if variant == FLAG_VOTE {
            return Err(Error::invalid(format!(
                "variant name {:?} is reserved for flag votes",
                FLAG_VOTE
            )));
        }
    }
    Ok(())
}

/// A reviewer's choice on one evaluation row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Vote {
    Flag,
    Variant(String),
}

impl Vote {
    pub fn as_str(&self) -> &str {
        match self {
            Vote::Flag => FLAG_VOTE,
            Vote::Variant(name) => name,
        }
    }
}

impl From<String> for Vote {
    fn from(raw: String) -> Self {
        if raw == FLAG_VOTE {
            Vote::Flag
        } else {
            Vote::Variant(raw)
        }
    }
}

impl From<&str> for Vote {
    fn from(raw: &str) -> Self {
        Vote::from(raw.to_string())
    }
}

impl From<Vote> for String {
    fn from(vote: Vote) -> Self {
        match vote {
            Vote::Flag => FLAG_VOTE.to_string(),
            Vote::Variant(name) => name,
        }
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowInput {
    pub input_name: String,
    pub input_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowOutput {
    pub variant_name: String,
    pub variant_output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRow {
    pub id: Id,
    pub comparison_table_id: Id,
    #[serde(default)]
    pub inputs: Vec<RowInput>,
    #[serde(default)]
    pub outputs: Vec<RowOutput>,
    pub vote: Option<Vote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationRow {
    /// Builds an unvoted row with a fresh id.
    pub fn new(comparison_table_id: Id, fields: NewEvaluationRow, now: DateTime<Utc>) -> Self {
        Self {
            id: Id::allocate(),
            comparison_table_id,
            inputs: fields.inputs,
            outputs: fields.outputs,
            vote: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// --- Request payloads ---

#[derive(Debug, Clone, Deserialize)]
pub struct NewComparisonTable {
    pub variants: Vec<String>,
}

/// Body for row creation. `id` and `vote` are accepted but ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEvaluationRow {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub comparison_table_id: Option<String>,
    #[serde(default)]
    pub inputs: Vec<RowInput>,
    #[serde(default)]
    pub outputs: Vec<RowOutput>,
    #[serde(default)]
    pub vote: Option<String>,
}

/// Body for a vote update. Any other field a caller sends is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EvaluationRowUpdate {
    #[serde(default)]
    pub vote: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn new_table_keeps_variant_order_and_stamps_both_times() {
        let now = Utc::now();
        let table = ComparisonTable::new(names(&["v2", "v1", "v3"]), now).unwrap();
        assert_eq!(table.variants, names(&["v2", "v1", "v3"]));
        assert_eq!(table.created_at, now);
        assert_eq!(table.updated_at, now);
    }

    #[test]
    fn table_rejects_empty_and_reserved_variants() {
        for bad in [names(&[]), names(&["a", ""]), names(&["a", "0"])] {
            let err = ComparisonTable::new(bad, Utc::now()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
    }

    #[test]
    fn flag_sentinel_parses_to_flag_vote() {
        assert_eq!(Vote::from("0"), Vote::Flag);
        assert_eq!(Vote::from("A"), Vote::Variant("A".to_string()));
        assert_eq!(serde_json::to_string(&Vote::Flag).unwrap(), "\"0\"");
    }

    #[test]
    fn table_accepts_only_its_variants_and_the_flag() {
        let table = ComparisonTable::new(names(&["A", "B"]), Utc::now()).unwrap();
        assert!(table.accepts(&Vote::Flag));
        assert!(table.accepts(&Vote::from("B")));
        assert!(!table.accepts(&Vote::from("C")));
    }

    #[test]
    fn new_row_ignores_supplied_id_and_vote() {
        let table_id = Id::allocate();
        let fields = NewEvaluationRow {
            id: Some("caller-chosen".to_string()),
            vote: Some("A".to_string()),
            inputs: vec![RowInput {
                input_name: "country".to_string(),
                input_value: "France".to_string(),
            }],
            ..Default::default()
        };
        let row = EvaluationRow::new(table_id, fields, Utc::now());
        assert_eq!(row.comparison_table_id, table_id);
        assert_eq!(row.vote, None);
        assert_eq!(row.inputs.len(), 1);
        assert_eq!(row.created_at, row.updated_at);
    }
}
