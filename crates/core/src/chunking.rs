use crate::error::IngestError;
use crate::models::{Chunk, Document, Metadata};
use regex::Regex;
use serde_json::Value;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkProfile {
    Bulk,
    Single,
}

impl From<ChunkProfile> for ChunkingConfig {
    fn from(value: ChunkProfile) -> Self {
        match value {
            ChunkProfile::Bulk => Self {
                chunk_size: 800,
                chunk_overlap: 80,
            },
            ChunkProfile::Single => Self {
                chunk_size: 1_000,
                chunk_overlap: 100,
            },
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        ChunkProfile::Single.into()
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Separator {
    Literal(&'static str),
    Sentence,
    Character,
}

const SEPARATORS: [Separator; 5] = [
    Separator::Literal("\n\n"),
    Separator::Literal("\n"),
    Separator::Sentence,
    Separator::Literal(" "),
    Separator::Character,
];

const SENTENCE_BOUNDARY: &str = r#"([.!?]["')\]]*)\s+"#;

impl Separator {
    fn joiner(self) -> &'static str {
        match self {
            Separator::Literal(separator) => separator,
            Separator::Sentence => " ",
            Separator::Character => "",
        }
    }

    fn applies(self, text: &str, sentence: &Regex) -> bool {
        match self {
            Separator::Literal(separator) => text.contains(separator),
            Separator::Sentence => sentence.is_match(text),
            Separator::Character => true,
        }
    }

    fn split<'a>(self, text: &'a str, sentence: &Regex) -> Vec<&'a str> {
        match self {
            Separator::Literal(separator) => text
                .split(separator)
                .filter(|piece| !piece.is_empty())
                .collect(),
            Separator::Sentence => {
                let mut pieces = Vec::new();
                let mut start = 0;
                for capture in sentence.captures_iter(text) {
                    let (Some(whole), Some(terminal)) = (capture.get(0), capture.get(1)) else {
                        continue;
                    };
                    if terminal.end() > start {
                        pieces.push(&text[start..terminal.end()]);
                    }
                    start = whole.end();
                }
                if start < text.len() {
                    pieces.push(&text[start..]);
                }
                pieces
            }
            Separator::Character => text
                .char_indices()
                .map(|(index, ch)| &text[index..index + ch.len_utf8()])
                .collect(),
        }
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Splits text at the coarsest boundary available (paragraph, line,
/// sentence, word) and only cuts inside words when nothing else fits.
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    config: ChunkingConfig,
    sentence: Regex,
}

impl RecursiveSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self {
            config,
            sentence: Regex::new(SENTENCE_BOUNDARY)?,
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &SEPARATORS)
    }

    fn split_with(&self, text: &str, separators: &[Separator]) -> Vec<String> {
        let position = separators
            .iter()
            .position(|separator| separator.applies(text, &self.sentence))
            .unwrap_or(separators.len().saturating_sub(1));
        let Some(separator) = separators.get(position).copied() else {
            return Vec::new();
        };
        let finer = &separators[position + 1..];

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in separator.split(text, &self.sentence) {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge(&pending, separator.joiner()));
                pending.clear();
            }

            if finer.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_with(piece, finer));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator.joiner()));
        }

        chunks
    }

    fn merge(&self, pieces: &[&str], joiner: &str) -> Vec<String> {
        let joiner_len = char_len(joiner);
        let ChunkingConfig {
            chunk_size,
            chunk_overlap,
        } = self.config;

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;
        let gap = |window: &VecDeque<&str>| if window.is_empty() { 0 } else { joiner_len };

        for &piece in pieces {
            let len = char_len(piece);

            if !window.is_empty() && total + len + gap(&window) > chunk_size {
                if let Some(chunk) = join_window(&window, joiner) {
                    chunks.push(chunk);
                }

                while total > chunk_overlap
                    || (total > 0 && total + len + gap(&window) > chunk_size)
                {
                    let Some(front) = window.pop_front() else {
                        break;
                    };
                    total = total.saturating_sub(char_len(front) + gap(&window));
                }
            }

            window.push_back(piece);
            if window.len() > 1 {
                total += joiner_len;
            }
            total += len;
        }

        if let Some(chunk) = join_window(&window, joiner) {
            chunks.push(chunk);
        }

        chunks
    }
}

fn join_window(window: &VecDeque<&str>, joiner: &str) -> Option<String> {
    let joined = window.iter().copied().collect::<Vec<_>>().join(joiner);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn json_elements(content: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(content.trim()).ok()? {
        Value::Array(items) => Some(items),
        other => Some(vec![other]),
    }
}

pub fn split_documents(
    documents: &[Document],
    splitter: &RecursiveSplitter,
) -> Result<Vec<Chunk>, IngestError> {
    let mut grouped: Vec<(String, Vec<(String, Metadata)>)> = Vec::new();

    for document in documents {
        let pieces = match json_elements(&document.content) {
            Some(items) => items
                .iter()
                .map(serde_json::to_string_pretty)
                .collect::<Result<Vec<_>, _>>()?,
            None => splitter.split_text(&document.content),
        };

        let slot = match grouped
            .iter()
            .position(|(source, _)| source == &document.source)
        {
            Some(index) => index,
            None => {
                grouped.push((document.source.clone(), Vec::new()));
                grouped.len() - 1
            }
        };

        grouped[slot]
            .1
            .extend(pieces.into_iter().map(|text| (text, document.metadata.clone())));
    }

    let mut chunks = Vec::new();
    for (source, pieces) in grouped {
        let total_chunks = pieces.len();
        for (chunk_id, (text, metadata)) in pieces.into_iter().enumerate() {
            chunks.push(Chunk {
                source: source.clone(),
                chunk_id,
                total_chunks,
                text,
                metadata,
            });
        }
    }

    Ok(chunks)
}
