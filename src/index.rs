use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub type TermWeights = HashMap<String, f32>;

/// One indexed line of the source text. `terms` holds raw term frequencies
/// until [`LineIndex::finish`] rescales them to tf-idf.
#[derive(Serialize, Deserialize)]
pub struct IndexedLine {
    pub text: String,
    pub terms: TermWeights,
}

/// The whole index for one source file. Every non-empty line of the source is
/// a document whose raw text is stored alongside its term weights, so search
/// results can be served as the line texts themselves.
#[derive(Serialize, Deserialize)]
pub struct LineIndex {
    pub source: PathBuf,
    pub built_at: SystemTime,
    pub lines: Vec<IndexedLine>,
}

impl LineIndex {
    pub fn new(source: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            built_at: SystemTime::now(),
            lines: Vec::new(),
        }
    }

    /// Adds one line with its pre-lexed tokens. Stores term frequencies; call
    /// [`finish`](Self::finish) once every line is in.
    pub fn add_line(&mut self, text: &str, tokens: &[String]) {
        let mut terms = TermWeights::new();
        for token in tokens {
            *terms.entry(token.clone()).or_insert(0.0) += 1.0;
        }

        let word_count = tokens.len() as f32;
        for count in terms.values_mut() {
            *count /= word_count;
        }

        self.lines.push(IndexedLine {
            text: text.to_string(),
            terms,
        });
    }

    /// Rescales the stored term frequencies to tf-idf. Must run after the last
    /// `add_line` and before any search.
    pub fn finish(&mut self) {
        let docs_count = self.lines.len() as f32;
        let mut doc_freq: HashMap<String, u32> = HashMap::new();

        for line in &self.lines {
            for term in line.terms.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        for line in &mut self.lines {
            for (term, tf) in line.terms.iter_mut() {
                let df = *doc_freq.get(term).unwrap_or(&1) as f32;
                *tf *= (docs_count / df).ln();
            }
        }
    }

    /// Scores every line by the summed tf-idf of the query tokens it contains
    /// and returns up to `limit` line texts, best match first. Lines that
    /// match no token are excluded.
    pub fn search(&self, tokens: &[String], limit: usize) -> Vec<String> {
        let mut hits: Vec<(f32, &str)> = Vec::new();

        for line in &self.lines {
            let mut score = 0.0;
            for token in tokens {
                if let Some(weight) = line.terms.get(token) {
                    score += weight;
                }
            }

            if score > 0.0 {
                hits.push((score, line.text.as_str()));
            }
        }

        hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        hits.into_iter()
            .take(limit)
            .map(|(_, text)| text.to_string())
            .collect()
    }

    /// Whether the source file is unchanged since the index was built. `None`
    /// when the source can no longer be inspected.
    pub fn is_fresh(&self) -> Option<bool> {
        let modified_at = self.source.metadata().ok()?.modified().ok()?;
        Some(modified_at <= self.built_at)
    }
}
