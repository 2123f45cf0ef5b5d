//! Classification of per-patient results into summary buckets.

use serde::Serialize;

use crate::backend::{ItemResult, Outcome};

/// Summary bucket for one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// At least one member was added.
    Success,
    /// Nothing to do: members already present, or the patient has no channel.
    Skip,
    Error,
}

/// Counts per bucket plus the entries worth showing individually.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub success: usize,
    pub skip: usize,
    pub error: usize,
    /// Skipped and failed entries, in result order.
    pub details: Vec<ItemResult>,
}

impl ResultSummary {
    pub fn total(&self) -> usize {
        self.success + self.skip + self.error
    }
}

pub fn classify(item: &ItemResult) -> Bucket {
    match item.outcome {
        Outcome::Error => Bucket::Error,
        Outcome::Skip => Bucket::Skip,
        Outcome::Success if item.invited > 0 => Bucket::Success,
        Outcome::Success => Bucket::Skip,
    }
}

/// Summarizes a result sequence. Counts always add up to `results.len()`.
pub fn summarize(results: &[ItemResult]) -> ResultSummary {
    let mut summary = ResultSummary::default();

    for item in results {
        match classify(item) {
            Bucket::Success => summary.success += 1,
            Bucket::Skip => {
                summary.skip += 1;
                summary.details.push(item.clone());
            }
            Bucket::Error => {
                summary.error += 1;
                summary.details.push(item.clone());
            }
        }
    }

    summary
}
