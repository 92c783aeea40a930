//! Readiness and index overview.
//!
//! Answers "is there something to chat with, and what is it?": whether an
//! index is attached, which repository it came from, how many entries it
//! holds and which models are configured. Used by `companion status` and
//! `GET /status`.

use serde::Serialize;

use crate::index::IndexStats;

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub ready: bool,
    /// An analyze run currently holds the workspace.
    pub analyzing: bool,
    pub index: Option<IndexStats>,
    pub embedding_model: String,
    pub llm: String,
    pub top_k: usize,
}

/// Human-readable report for the CLI.
pub fn render_status(status: &Status) -> String {
    let mut out = String::new();
    out.push_str("Codebase Companion Status\n");
    out.push_str("=========================\n\n");

    let state = match (status.ready, status.analyzing) {
        (_, true) => "analyzing",
        (true, false) => "ready",
        (false, false) => "not analyzed",
    };
    out.push_str(&format!("  State:       {state}\n"));

    if let Some(index) = &status.index {
        out.push_str(&format!(
            "  Repository:  {}\n",
            index.repository_url.as_deref().unwrap_or("unknown")
        ));
        out.push_str(&format!("  Index:       {}\n", index.location.display()));
        out.push_str(&format!("  Entries:     {}\n", index.entries));
        out.push_str(&format!("  Built with:  {} ({} dims)\n", index.model, index.dims));
        out.push_str(&format!(
            "  Built at:    {}\n",
            index.built_at.as_deref().map(format_built_at).unwrap_or_else(|| "unknown".into())
        ));
    }

    out.push('\n');
    out.push_str(&format!("  Embeddings:  {}\n", status.embedding_model));
    out.push_str(&format!("  LLM:         {}\n", status.llm));
    out.push_str(&format!("  Top-k:       {}\n", status.top_k));
    out
}

/// RFC 3339 timestamp → `YYYY-MM-DD HH:MM UTC`; anything unparseable is
/// shown verbatim.
fn format_built_at(ts: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| {
            dt.with_timezone(&chrono::Utc)
                .format("%Y-%m-%d %H:%M UTC")
                .to_string()
        })
        .unwrap_or_else(|_| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn status(index: Option<IndexStats>) -> Status {
        Status {
            ready: index.is_some(),
            analyzing: false,
            index,
            embedding_model: "hash-64".into(),
            llm: "mock".into(),
            top_k: 7,
        }
    }

    #[test]
    fn not_analyzed_report() {
        let text = render_status(&status(None));
        assert!(text.contains("not analyzed"));
        assert!(!text.contains("Repository:"));
    }

    #[test]
    fn ready_report_lists_index() {
        let text = render_status(&status(Some(IndexStats {
            location: PathBuf::from("./vector_index"),
            entries: 42,
            model: "hash-64".into(),
            dims: 64,
            repository_url: Some("https://github.com/acme/demo.git".into()),
            built_at: Some("2026-03-01T12:30:00+00:00".into()),
        })));
        assert!(text.contains("ready"));
        assert!(text.contains("https://github.com/acme/demo.git"));
        assert!(text.contains("42"));
        assert!(text.contains("2026-03-01 12:30 UTC"));
    }

    #[test]
    fn unparseable_timestamp_shown_verbatim() {
        assert_eq!(format_built_at("yesterday"), "yesterday");
    }
}
