use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const INDEX_VERSION: u32 = 1;

/// A hand-built embedding index persisted as one JSON document. Loaded
/// wholesale into memory; retrieval is a brute-force cosine scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub version: u32,
    pub created_at: String,
    pub model: String,
    pub dim: usize,
    pub items: Vec<IndexItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexItem {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f64>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk<'a> {
    pub item: &'a IndexItem,
    pub score: f64,
}

impl VectorIndex {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read vector index {}", path.display()))?;
        let index: VectorIndex = serde_json::from_str(&raw).context("decode vector index")?;
        if index.version != INDEX_VERSION {
            return Err(anyhow!(
                "vector index version {} is unsupported",
                index.version
            ));
        }
        if index.items.is_empty() {
            return Err(anyhow!("vector index has no items"));
        }
        Ok(index)
    }

    /// Top-k chunks by cosine similarity against a query embedding.
    /// Items whose dimension disagrees with the query are skipped.
    pub fn search(&self, query: &[f64], k: usize) -> Vec<ScoredChunk<'_>> {
        let mut scored: Vec<ScoredChunk<'_>> = self
            .items
            .par_iter()
            .filter_map(|item| {
                cosine_similarity(query, &item.embedding).map(|score| ScoredChunk { item, score })
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item.id.cmp(&b.item.id))
        });
        scored.truncate(k);
        scored
    }
}

/// None when the vectors disagree in length or either has zero norm.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a <= 0.0 || norm_b <= 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::{IndexItem, VectorIndex, cosine_similarity};

    fn index_with(embeddings: &[(&str, Vec<f64>)]) -> VectorIndex {
        VectorIndex {
            version: 1,
            created_at: "2025-01-01T00:00:00Z".to_string(),
            model: "test-embed".to_string(),
            dim: embeddings.first().map(|(_, e)| e.len()).unwrap_or(0),
            items: embeddings
                .iter()
                .map(|(id, embedding)| IndexItem {
                    id: id.to_string(),
                    text: format!("chunk {id}"),
                    embedding: embedding.clone(),
                    meta: serde_json::Value::Null,
                })
                .collect(),
        }
    }

    #[test]
    fn cosine_basics() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn search_ranks_by_similarity_and_truncates() {
        let index = index_with(&[
            ("far", vec![0.0, 1.0]),
            ("near", vec![1.0, 0.1]),
            ("exact", vec![2.0, 0.0]),
        ]);
        let hits = index.search(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item.id, "exact");
        assert_eq!(hits[1].item.id, "near");
    }

    #[test]
    fn mismatched_dimensions_are_skipped() {
        let index = index_with(&[("bad", vec![1.0, 0.0, 0.0]), ("good", vec![1.0, 0.0])]);
        let hits = index.search(&[1.0, 0.0], 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, "good");
    }
}
