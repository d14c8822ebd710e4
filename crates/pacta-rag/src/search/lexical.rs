//! Lexical ranking: BM25 over an in-memory corpus snapshot.

use std::collections::{HashMap, HashSet};

use crate::storage::CorpusSnapshot;
use crate::types::ChunkId;

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is", "it",
    "its", "of", "on", "or", "that", "the", "to", "was", "were", "will", "with", "this", "but",
    "they", "have", "had", "what", "when", "where", "who", "which", "you", "your", "we", "our",
    "can", "all", "there", "their", "been", "would", "could", "should", "may", "might", "must",
    "do", "does", "did", "if", "not", "no", "so", "up", "out", "just", "than", "then", "too",
    "very", "also",
];

/// One lexical match. `score` is raw BM25: unbounded, comparable only within
/// the batch that produced it.
#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub chunk_index: usize,
    pub chunk_id: ChunkId,
    pub score: f32,
}

pub struct LexicalRanker {
    k1: f64,
    b: f64,
}

impl LexicalRanker {
    pub fn new() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }

    pub fn with_params(k1: f64, b: f64) -> Self {
        Self {
            k1: k1.clamp(0.0, 3.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    /// Score every chunk in the snapshot against the concatenated search-term
    /// query; returns matching chunks (score > 0) ranked by raw BM25,
    /// truncated to `top_k`.
    pub fn rank(&self, snapshot: &CorpusSnapshot, query: &str, top_k: usize) -> Vec<LexicalHit> {
        if snapshot.is_empty() {
            return Vec::new();
        }

        let query_terms = tokenize(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let doc_terms_list: Vec<Vec<String>> = snapshot
            .chunks()
            .iter()
            .map(|chunk| tokenize(&chunk.text))
            .collect();

        let avgdl = (doc_terms_list.iter().map(|d| d.len()).sum::<usize>() as f64
            / doc_terms_list.len().max(1) as f64)
            .max(1.0);

        let df_map = compute_document_frequencies(&doc_terms_list);
        let n = doc_terms_list.len() as f64;

        let mut idf_cache = HashMap::new();
        for term in &query_terms {
            let df = df_map.get(term).copied().unwrap_or(0) as f64;
            idf_cache.insert(term.clone(), compute_idf_from_df(n, df));
        }

        let mut hits: Vec<LexicalHit> = doc_terms_list
            .iter()
            .enumerate()
            .filter_map(|(idx, doc_terms)| {
                let score = self.compute_bm25_score(&query_terms, doc_terms, avgdl, &idf_cache);
                if score > 0.0 {
                    Some(LexicalHit {
                        chunk_index: idx,
                        chunk_id: snapshot.chunks()[idx].chunk_id.clone(),
                        score: score as f32,
                    })
                } else {
                    None
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        hits
    }

    fn compute_bm25_score(
        &self,
        query_terms: &[String],
        doc_terms: &[String],
        avgdl: f64,
        idf_cache: &HashMap<String, f64>,
    ) -> f64 {
        let doc_len = doc_terms.len() as f64;
        let length_norm = 1.0 - self.b + self.b * (doc_len / avgdl);

        let mut score = 0.0;
        for term in query_terms {
            let tf = doc_terms.iter().filter(|t| t == &term).count() as f64;
            if tf > 0.0 {
                let idf = idf_cache.get(term).copied().unwrap_or(0.0);
                let tf_component = (tf * (self.k1 + 1.0)) / (tf + self.k1 * length_norm);
                score += idf * tf_component;
            }
        }
        score
    }
}

impl Default for LexicalRanker {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercase, split on non-alphanumeric, drop single-char tokens and stop words.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 1 && !ENGLISH_STOP_WORDS.contains(s))
        .map(|s| s.to_string())
        .collect()
}

/// IDF with the +1 floor so it stays non-negative even for very common terms.
fn compute_idf_from_df(n: f64, df: f64) -> f64 {
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

fn compute_document_frequencies(doc_terms_list: &[Vec<String>]) -> HashMap<String, usize> {
    let mut df_map: HashMap<String, usize> = HashMap::new();
    for doc_terms in doc_terms_list {
        let unique_terms: HashSet<&String> = doc_terms.iter().collect();
        for term in unique_terms {
            *df_map.entry(term.clone()).or_insert(0) += 1;
        }
    }
    df_map
}
