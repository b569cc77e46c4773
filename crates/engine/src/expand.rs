//! Lexical query expansion
//!
//! Appends domain synonyms to the query to improve recall before embedding.
//! Purely additive: the original query always comes first, untouched.

/// Biomedical synonym table. An ordered slice keeps expansion deterministic.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("t cell", &["t lymphocyte", "t-cell"]),
    ("cancer", &["carcinoma", "tumor", "malignancy", "neoplasm"]),
    ("crispr", &["crispr-cas9", "crispr/cas9", "gene editing"]),
    ("car-t", &["car t", "chimeric antigen receptor"]),
    ("immunotherapy", &["immune therapy", "immunotherapeutic"]),
    ("antibody", &["immunoglobulin", "mab", "monoclonal antibody"]),
    ("rna", &["ribonucleic acid"]),
    ("dna", &["deoxyribonucleic acid"]),
    ("gene", &["genetic", "genomic"]),
    ("protein", &["proteomic", "polypeptide"]),
];

/// Query expander over a static synonym table
#[derive(Debug, Clone)]
pub struct QueryExpander {
    terms: Vec<(String, Vec<String>)>,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self {
            terms: SYNONYMS
                .iter()
                .map(|(term, synonyms)| {
                    (
                        term.to_string(),
                        synonyms.iter().map(|s| s.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

impl QueryExpander {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an expander over a custom synonym table
    pub fn with_terms(terms: Vec<(String, Vec<String>)>) -> Self {
        Self { terms }
    }

    /// Expand the query with synonyms for every matched canonical term.
    ///
    /// Matching is a case-insensitive substring test against the lowercased
    /// query. Example: "T cell exhaustion" -> "T cell exhaustion t lymphocyte t-cell".
    pub fn expand(&self, query: &str) -> String {
        let query_lower = query.to_lowercase();
        let mut parts = vec![query.to_string()];

        for (term, synonyms) in &self.terms {
            if query_lower.contains(term.as_str()) {
                parts.extend(synonyms.iter().cloned());
            }
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expansion_is_additive_and_ordered() {
        let expander = QueryExpander::new();
        let expanded = expander.expand("T cell exhaustion");
        assert!(expanded.starts_with("T cell exhaustion"));
        assert_eq!(expanded, "T cell exhaustion t lymphocyte t-cell");
    }

    #[test]
    fn test_case_insensitive_match() {
        let expander = QueryExpander::new();
        let expanded = expander.expand("CRISPR screening in CANCER");
        assert!(expanded.contains("crispr-cas9"));
        assert!(expanded.contains("carcinoma"));
        assert!(expanded.contains("neoplasm"));
    }

    #[test]
    fn test_no_match_returns_query_unchanged() {
        let expander = QueryExpander::new();
        assert_eq!(expander.expand("zebrafish behavior"), "zebrafish behavior");
    }

    #[test]
    fn test_deterministic() {
        let expander = QueryExpander::new();
        let a = expander.expand("gene and protein interaction");
        let b = expander.expand("gene and protein interaction");
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_terms() {
        let expander = QueryExpander::with_terms(vec![(
            "aspirin".to_string(),
            vec!["acetylsalicylic acid".to_string()],
        )]);
        assert_eq!(
            expander.expand("aspirin dosage"),
            "aspirin dosage acetylsalicylic acid"
        );
    }
}
