//! Metadata filtering and sorting
//!
//! Applied after paper aggregation, before reranking. Filtering fails open:
//! a candidate missing the metadata a filter needs is kept, never dropped.
//! Validation is the one hard gate; a contradictory filter rejects the
//! whole request up front.

use crate::retrieval::{SearchCandidate, sort_candidates};
use biorag_common::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};

const YEAR_MIN: i32 = 1900;
const YEAR_MAX: i32 = 2100;

/// Sort order for filtered candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Relevance score descending (the aggregation order)
    #[default]
    Relevance,
    /// Publication date, newest first; undated papers last
    Date,
    /// Citation count descending
    Citations,
}

/// Search filter set. All fields optional; an empty filter passes everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Keep papers published in or after this year
    pub year_start: Option<i32>,

    /// Keep papers published in or before this year
    pub year_end: Option<i32>,

    /// Keep papers whose journal matches any entry (case-insensitive
    /// substring)
    pub journals: Option<Vec<String>>,

    /// Sort order applied after filtering
    #[serde(default)]
    pub sort_by: SortBy,
}

impl SearchFilters {
    /// Reject contradictory or out-of-range filters before any retrieval
    /// work happens.
    pub fn validate(&self) -> Result<()> {
        for year in [self.year_start, self.year_end].into_iter().flatten() {
            if !(YEAR_MIN..=YEAR_MAX).contains(&year) {
                return Err(EngineError::InvalidFilter {
                    message: format!(
                        "year {} outside supported range {}-{}",
                        year, YEAR_MIN, YEAR_MAX
                    ),
                });
            }
        }

        if let (Some(start), Some(end)) = (self.year_start, self.year_end) {
            if end < start {
                return Err(EngineError::InvalidFilter {
                    message: format!("year_end ({}) precedes year_start ({})", end, start),
                });
            }
        }

        Ok(())
    }

    fn is_noop(&self) -> bool {
        self.year_start.is_none()
            && self.year_end.is_none()
            && self.journals.as_ref().map_or(true, |j| j.is_empty())
            && self.sort_by == SortBy::Relevance
    }
}

/// Apply filters and the requested sort to aggregated candidates.
///
/// Candidates missing the metadata a filter inspects pass through
/// unfiltered. The sort is stable, so equal keys keep their relevance
/// order.
pub fn apply_filters(
    mut candidates: Vec<SearchCandidate>,
    filters: &SearchFilters,
) -> Vec<SearchCandidate> {
    if filters.is_noop() {
        return candidates;
    }

    candidates.retain(|c| passes_year(c, filters) && passes_journal(c, filters));

    match filters.sort_by {
        SortBy::Relevance => sort_candidates(&mut candidates),
        SortBy::Date => {
            // Undated papers sort last regardless of direction
            candidates.sort_by(|a, b| match (a.publication_date, b.publication_date) {
                (Some(da), Some(db)) => db.cmp(&da),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            });
        }
        SortBy::Citations => {
            candidates.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
        }
    }

    candidates
}

fn passes_year(candidate: &SearchCandidate, filters: &SearchFilters) -> bool {
    if filters.year_start.is_none() && filters.year_end.is_none() {
        return true;
    }

    let Some(date) = candidate.publication_date else {
        // fail open on missing metadata
        return true;
    };

    let year = chrono::Datelike::year(&date);
    filters.year_start.map_or(true, |start| year >= start)
        && filters.year_end.map_or(true, |end| year <= end)
}

fn passes_journal(candidate: &SearchCandidate, filters: &SearchFilters) -> bool {
    let Some(journals) = filters.journals.as_ref().filter(|j| !j.is_empty()) else {
        return true;
    };

    let Some(journal) = candidate.journal.as_deref() else {
        return true;
    };

    let journal_lower = journal.to_lowercase();
    journals
        .iter()
        .any(|wanted| journal_lower.contains(&wanted.to_lowercase()))
}
