use crate::models::{
    metadata_chunk_id, metadata_source, DocumentResults, Reconstruction, SimpleResults,
    SourceOutcome,
};
use crate::SearchError;
use serde::Serialize;
use std::fmt::Write;

pub fn render_simple(results: &SimpleResults) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "query: {}", results.query);

    if results.chunks.is_empty() {
        out.push_str("no matching chunks\n");
        return out;
    }

    for (rank, chunk) in results.chunks.iter().enumerate() {
        let position = metadata_chunk_id(&chunk.metadata)
            .map(|chunk_id| chunk_id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "[{}] relevance={:.4} source={} chunk={}",
            rank + 1,
            chunk.relevance_score,
            metadata_source(&chunk.metadata),
            position
        );
        let _ = writeln!(out, "{}\n", chunk.text);
    }

    out
}

pub fn render_documents(results: &DocumentResults) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "query: {}", results.query);

    if results.outcomes.is_empty() {
        out.push_str("no matching documents\n");
        return out;
    }

    for (rank, outcome) in results.outcomes.iter().enumerate() {
        match outcome {
            SourceOutcome::Retrieved(document) => {
                let origin = match document.reconstruction {
                    Reconstruction::FullDocument => "stored full document".to_string(),
                    Reconstruction::Chunks { count } => format!("rebuilt from {count} chunks"),
                };
                let _ = writeln!(
                    out,
                    "[{}] {} relevance={:.4} ({})",
                    rank + 1,
                    document.source,
                    document.relevance_score,
                    origin
                );
                let _ = writeln!(out, "{}\n", document.content);
            }
            SourceOutcome::Failed {
                source,
                relevance_score,
                reason,
            } => {
                let _ = writeln!(
                    out,
                    "[{}] {} relevance={:.4} unavailable: {}\n",
                    rank + 1,
                    source,
                    relevance_score,
                    reason
                );
            }
        }
    }

    out
}

pub fn render_json<T: Serialize>(results: &T) -> Result<String, SearchError> {
    Ok(serde_json::to_string_pretty(results)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, RetrievedChunk, RetrievedDocument};
    use serde_json::{json, Value};

    fn simple_results() -> SimpleResults {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), json!("manual.md"));
        metadata.insert("chunk_id".to_string(), json!(3));
        SimpleResults {
            query: "reset the pump".to_string(),
            chunks: vec![RetrievedChunk {
                id: "manual.md_chunk_3".to_string(),
                text: "Hold the reset button.".to_string(),
                metadata,
                distance: 0.25,
                relevance_score: 0.75,
            }],
        }
    }

    fn document_results() -> DocumentResults {
        DocumentResults {
            query: "reset the pump".to_string(),
            outcomes: vec![
                SourceOutcome::Retrieved(RetrievedDocument {
                    source: "manual.md".to_string(),
                    content: "Step one.\n\nStep two.".to_string(),
                    relevance_score: 0.81234,
                    reconstruction: Reconstruction::Chunks { count: 2 },
                }),
                SourceOutcome::Failed {
                    source: "notes.txt".to_string(),
                    relevance_score: -0.1,
                    reason: "store unavailable".to_string(),
                },
            ],
        }
    }

    #[test]
    fn simple_text_lists_rank_relevance_and_position() {
        let text = render_simple(&simple_results());
        assert!(text.starts_with("query: reset the pump\n"));
        assert!(text.contains("[1] relevance=0.7500 source=manual.md chunk=3"));
        assert!(text.contains("Hold the reset button."));
    }

    #[test]
    fn document_text_reports_failed_sources() {
        let text = render_documents(&document_results());
        assert!(text.contains("[1] manual.md relevance=0.8123 (rebuilt from 2 chunks)"));
        assert!(text.contains("Step one.\n\nStep two."));
        assert!(text.contains("[2] notes.txt relevance=-0.1000 unavailable: store unavailable"));
    }

    #[test]
    fn empty_results_say_so() {
        let empty = DocumentResults {
            query: "nothing".to_string(),
            outcomes: Vec::new(),
        };
        assert!(render_documents(&empty).contains("no matching documents"));
    }

    #[test]
    fn json_output_tags_outcomes() -> Result<(), Box<dyn std::error::Error>> {
        let rendered = render_json(&document_results())?;
        let value: Value = serde_json::from_str(&rendered)?;

        assert_eq!(value["outcomes"][0]["status"], "retrieved");
        assert_eq!(value["outcomes"][0]["reconstruction"]["kind"], "chunks");
        assert_eq!(value["outcomes"][1]["status"], "failed");
        assert_eq!(value["outcomes"][1]["source"], "notes.txt");
        Ok(())
    }
}
