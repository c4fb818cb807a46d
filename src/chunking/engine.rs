//! Token-bounded, punctuation-balanced chunking of cleaned article text.
//!
//! The engine is a pure function pipeline: normalize raw text, split it into
//! sentences, then greedily pack sentences into chunks whose token counts lie
//! within configured bounds. A chunk is only finalized when its bracket and
//! quote characters are balanced; a single sentence that alone exceeds the
//! upper bound is force-split on a fixed token window instead.

use html_escape::decode_html_entities;
use regex::Regex;
use tiktoken_rs::{CoreBPE, cl100k_base};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkBounds;
use crate::error::{PipelineError, Result};

/// A finished chunk and its token count under the engine's encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub token_size: usize,
}

/// Returns true iff double quotes come in pairs and parentheses and square
/// brackets open and close the same number of times.
pub fn is_balanced(text: &str) -> bool {
    let mut quotes = 0usize;
    let mut round = 0isize;
    let mut square = 0isize;
    for ch in text.chars() {
        match ch {
            '"' => quotes += 1,
            '(' => round += 1,
            ')' => round -= 1,
            '[' => square += 1,
            ']' => square -= 1,
            _ => {}
        }
    }
    quotes % 2 == 0 && round == 0 && square == 0
}

/// Sentence-packing chunker over a fixed subword encoding (`cl100k_base`).
///
/// Construction loads the encoder and compiles the cleaning patterns once;
/// the engine is then cheap to share across articles.
pub struct ChunkingEngine {
    bpe: CoreBPE,
    bounds: ChunkBounds,
    junk: Regex,
    urls: Regex,
    whitespace: Regex,
    newlines: Regex,
}

impl std::fmt::Debug for ChunkingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkingEngine")
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl ChunkingEngine {
    pub fn new(bounds: ChunkBounds) -> Result<Self> {
        let bpe = cl100k_base().map_err(|err| PipelineError::Chunking {
            message: format!("load cl100k_base: {err}"),
        })?;
        Ok(Self {
            bpe,
            bounds,
            junk: compile(r"(?is)STORY CONTINUES.*?privacy policy \.")?,
            urls: compile(r"(https?://\S+|www\.\S+)")?,
            whitespace: compile(r"\s+")?,
            newlines: compile(r"\n+")?,
        })
    }

    pub fn bounds(&self) -> ChunkBounds {
        self.bounds
    }

    /// Number of tokens in `text` under the engine's encoding.
    pub fn token_count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    /// Normalize raw article text: drop the syndication boilerplate block,
    /// collapse whitespace, decode HTML entities, straighten curly quotes,
    /// strip URLs.
    pub fn clean(&self, text: &str) -> String {
        let stripped = self.junk.replace_all(text, "");
        let stripped = stripped.trim();
        let collapsed = self.whitespace.replace_all(stripped, " ");
        let collapsed = collapsed.trim();
        let unescaped = decode_html_entities(collapsed);
        let straightened = unescaped
            .replace('“', "\"")
            .replace('”', "\"")
            .replace('‘', "'")
            .replace('’', "'");
        let no_urls = self.urls.replace_all(&straightened, "");
        let single_newline = self.newlines.replace_all(&no_urls, "\n");
        let flattened = self.whitespace.replace_all(&single_newline, " ");
        flattened.trim().to_string()
    }

    /// Split text on UAX #29 sentence boundaries.
    pub fn sentences<'a>(&self, text: &'a str) -> Vec<&'a str> {
        text.unicode_sentences().collect()
    }

    /// Full pipeline: clean, segment, pack. Returns chunks with their token
    /// counts; empty input yields no chunks.
    pub fn chunk(&self, raw: &str) -> Result<Vec<Chunk>> {
        let cleaned = self.clean(raw);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }
        let sentences = self.sentences(&cleaned);
        let packed = self.pack_sentences(&sentences)?;
        Ok(packed
            .into_iter()
            .map(|text| {
                let token_size = self.token_count(&text);
                Chunk { text, token_size }
            })
            .collect())
    }

    /// Greedy sentence packing.
    ///
    /// The accumulator grows one sentence at a time. When the candidate
    /// overflows the upper bound, the accumulator is finalized if it is long
    /// enough and balanced; otherwise the overflowing sentence alone is
    /// force-split on the token window and the accumulator is discarded. The
    /// overflow check takes priority over the balance check. A candidate
    /// within bounds is finalized only when balanced; imbalance forces
    /// continued accumulation regardless of token count. Whatever remains
    /// after the last sentence becomes the final chunk.
    pub fn pack_sentences(&self, sentences: &[&str]) -> Result<Vec<String>> {
        let ChunkBounds { lower, upper } = self.bounds;
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();

        for sentence in sentences {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let candidate = if current.is_empty() {
                sentence.to_string()
            } else {
                format!("{current} {sentence}")
            };
            let candidate_tokens = self.token_count(&candidate);

            if candidate_tokens > upper {
                if !current.is_empty()
                    && self.token_count(&current) >= lower
                    && is_balanced(&current)
                {
                    chunks.push(std::mem::replace(&mut current, sentence.to_string()));
                } else {
                    chunks.extend(self.split_by_token_window(sentence)?);
                    current.clear();
                }
                continue;
            }

            if is_balanced(&candidate) && candidate_tokens >= lower {
                chunks.push(candidate);
                current.clear();
            } else {
                current = candidate;
            }
        }

        if !current.is_empty() {
            if self.token_count(&current) > upper {
                chunks.extend(self.split_by_token_window(&current)?);
            } else {
                chunks.push(current);
            }
        }
        Ok(chunks)
    }

    /// Force-split text on a fixed token window of width `upper`.
    ///
    /// A remainder shorter than `lower` is absorbed into the window before
    /// it, so the final window may exceed `upper` by up to `lower - 1`
    /// tokens. After decoding, an undersized final piece is merged into its
    /// predecessor, since trimming a decoded window can shrink its re-encoded
    /// count below `lower`.
    pub fn split_by_token_window(&self, text: &str) -> Result<Vec<String>> {
        let ChunkBounds { lower, upper } = self.bounds;
        let tokens = self.bpe.encode_ordinary(text);
        if tokens.len() <= upper {
            return Ok(vec![text.to_string()]);
        }

        let mut pieces: Vec<String> = Vec::new();
        let mut start = 0usize;
        while start < tokens.len() {
            let mut end = (start + upper).min(tokens.len());
            if end < tokens.len() && tokens.len() - end < lower {
                end = tokens.len();
            }
            let piece = self.bpe.decode(tokens[start..end].to_vec()).map_err(|err| {
                PipelineError::Chunking {
                    message: format!("decode token window: {err}"),
                }
            })?;
            pieces.push(piece.trim().to_string());
            start = end;
        }

        if pieces.len() > 1 && self.token_count(&pieces[pieces.len() - 1]) < lower {
            if let Some(tail) = pieces.pop() {
                if let Some(prev) = pieces.last_mut() {
                    prev.push(' ');
                    prev.push_str(&tail);
                }
            }
        }
        Ok(pieces)
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|err| PipelineError::Chunking {
        message: format!("compile pattern: {err}"),
    })
}
