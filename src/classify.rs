//! Query classification: sql, document, or hybrid.
//!
//! Scores the query against two fixed intent-phrase lists by
//! case-insensitive substring match. The decision order is the whole
//! routing contract: both scores positive → hybrid; sql strictly greater →
//! sql; document positive → document; no signal → sql.

use crate::models::QueryType;

/// Phrases signalling a structured database question.
const SQL_PHRASES: &[&str] = &[
    "how many",
    "count",
    "average",
    "total",
    "sum",
    "list all",
    "show me",
    "find employees",
    "department",
    "salary",
    "highest",
    "lowest",
    "hired",
];

/// Phrases signalling a document-content question, including a few
/// technical-skill tokens that live in resumes rather than tables.
const DOC_PHRASES: &[&str] = &[
    "skills",
    "experience",
    "resume",
    "review",
    "performance",
    "feedback",
    "qualified",
    "expertise",
    "python",
    "javascript",
    "java",
];

/// Classifies a free-text query. Pure function, no I/O.
pub fn classify(query: &str) -> QueryType {
    let query_lower = query.to_lowercase();

    let sql_score = SQL_PHRASES
        .iter()
        .filter(|p| query_lower.contains(*p))
        .count();
    let doc_score = DOC_PHRASES
        .iter()
        .filter(|p| query_lower.contains(*p))
        .count();

    if sql_score > 0 && doc_score > 0 {
        QueryType::Hybrid
    } else if sql_score > doc_score {
        QueryType::Sql
    } else if doc_score > 0 {
        QueryType::Document
    } else {
        QueryType::Sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_queries_route_to_sql() {
        assert_eq!(
            classify("how many employees are in engineering"),
            QueryType::Sql
        );
        assert_eq!(classify("average salary by department"), QueryType::Sql);
    }

    #[test]
    fn content_queries_route_to_documents() {
        assert_eq!(
            classify("what are this candidate's skills"),
            QueryType::Document
        );
        assert_eq!(
            classify("what feedback did the candidate receive"),
            QueryType::Document
        );
    }

    #[test]
    fn sql_phrases_match_inside_longer_words() {
        // Substring scoring: "sum" inside "summarize" counts as an SQL
        // signal, so a query that also carries a document phrase goes hybrid.
        assert_eq!(classify("summarize the latest feedback"), QueryType::Hybrid);
    }

    #[test]
    fn mixed_signals_route_to_hybrid() {
        assert_eq!(
            classify("list all employees with python skills"),
            QueryType::Hybrid
        );
    }

    #[test]
    fn no_signal_defaults_to_sql() {
        assert_eq!(classify("hello"), QueryType::Sql);
        assert_eq!(classify(""), QueryType::Sql);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify("HOW MANY people were HIRED"), QueryType::Sql);
        assert_eq!(classify("Python EXPERTISE"), QueryType::Document);
    }

    #[test]
    fn classification_is_deterministic() {
        let q = "show me performance reviews";
        assert_eq!(classify(q), classify(q));
    }
}
