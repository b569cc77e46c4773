//! Paper store types and in-memory implementation
//!
//! The relational store is an external collaborator; the engine only reads
//! paper rows and citation edges through the [`PaperStore`] trait. The
//! in-memory implementation backs tests and local development.

use super::PaperStore;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Paper row as seen by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Paper identifier (PMID)
    pub pmid: String,

    /// Paper title
    pub title: String,

    /// Journal name, when known
    pub journal: Option<String>,

    /// Publication date, when known
    pub publication_date: Option<NaiveDate>,

    /// Citation count
    pub citation_count: i64,
}

/// Directed citation relation: citing paper -> cited paper
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationEdge {
    pub citing_pmid: String,
    pub cited_pmid: String,
}

#[derive(Default)]
struct StoreInner {
    papers: HashMap<String, PaperRecord>,
    /// pmid -> papers it cites
    outgoing: HashMap<String, Vec<String>>,
    /// pmid -> papers citing it
    incoming: HashMap<String, Vec<String>>,
}

/// In-memory paper store
#[derive(Default)]
pub struct InMemoryPaperStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryPaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a paper row
    pub async fn add_paper(&self, paper: PaperRecord) {
        let mut guard = self.inner.write().await;
        guard.papers.insert(paper.pmid.clone(), paper);
    }

    /// Record a citation edge
    pub async fn add_citation(&self, citing_pmid: &str, cited_pmid: &str) {
        let mut guard = self.inner.write().await;
        guard
            .outgoing
            .entry(citing_pmid.to_string())
            .or_default()
            .push(cited_pmid.to_string());
        guard
            .incoming
            .entry(cited_pmid.to_string())
            .or_default()
            .push(citing_pmid.to_string());
    }
}

#[async_trait]
impl PaperStore for InMemoryPaperStore {
    async fn get_paper(&self, pmid: &str) -> Result<Option<PaperRecord>> {
        let guard = self.inner.read().await;
        Ok(guard.papers.get(pmid).cloned())
    }

    async fn get_papers(&self, pmids: &[String]) -> Result<HashMap<String, PaperRecord>> {
        let guard = self.inner.read().await;
        Ok(pmids
            .iter()
            .filter_map(|pmid| guard.papers.get(pmid).map(|p| (pmid.clone(), p.clone())))
            .collect())
    }

    async fn references_of(&self, pmid: &str) -> Result<Vec<String>> {
        let guard = self.inner.read().await;
        Ok(guard.outgoing.get(pmid).cloned().unwrap_or_default())
    }

    async fn citers_of(&self, pmid: &str) -> Result<Vec<String>> {
        let guard = self.inner.read().await;
        Ok(guard.incoming.get(pmid).cloned().unwrap_or_default())
    }

    async fn citers_of_many(&self, pmids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let guard = self.inner.read().await;
        Ok(pmids
            .iter()
            .map(|pmid| {
                (
                    pmid.clone(),
                    guard.incoming.get(pmid).cloned().unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn references_of_many(&self, pmids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let guard = self.inner.read().await;
        Ok(pmids
            .iter()
            .map(|pmid| {
                (
                    pmid.clone(),
                    guard.outgoing.get(pmid).cloned().unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn published_since(&self, cutoff: NaiveDate) -> Result<Vec<PaperRecord>> {
        let guard = self.inner.read().await;
        Ok(guard
            .papers
            .values()
            .filter(|p| p.publication_date.map_or(false, |d| d >= cutoff))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(pmid: &str, date: Option<&str>, citations: i64) -> PaperRecord {
        PaperRecord {
            pmid: pmid.to_string(),
            title: format!("Paper {}", pmid),
            journal: Some("Nature".to_string()),
            publication_date: date.map(|d| d.parse().unwrap()),
            citation_count: citations,
        }
    }

    #[tokio::test]
    async fn test_citation_edges() {
        let store = InMemoryPaperStore::new();
        store.add_citation("10", "20").await;
        store.add_citation("10", "30").await;
        store.add_citation("40", "20").await;

        assert_eq!(store.references_of("10").await.unwrap(), vec!["20", "30"]);
        assert_eq!(store.citers_of("20").await.unwrap(), vec!["10", "40"]);

        let batched = store
            .citers_of_many(&["20".to_string(), "30".to_string()])
            .await
            .unwrap();
        assert_eq!(batched["20"], vec!["10", "40"]);
        assert_eq!(batched["30"], vec!["10"]);
    }

    #[tokio::test]
    async fn test_published_since_excludes_undated() {
        let store = InMemoryPaperStore::new();
        store.add_paper(paper("1", Some("2024-06-01"), 5)).await;
        store.add_paper(paper("2", Some("2020-01-01"), 50)).await;
        store.add_paper(paper("3", None, 100)).await;

        let cutoff: NaiveDate = "2023-01-01".parse().unwrap();
        let recent = store.published_since(cutoff).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].pmid, "1");
    }

    #[tokio::test]
    async fn test_batched_paper_lookup_skips_missing() {
        let store = InMemoryPaperStore::new();
        store.add_paper(paper("1", None, 0)).await;

        let found = store
            .get_papers(&["1".to_string(), "999".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("1"));
    }
}
