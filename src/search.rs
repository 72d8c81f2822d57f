//! Result selection over embedded chunks.
//!
//! # Algorithm
//!
//! 1. Score every stored vector by cosine similarity to the query vector.
//! 2. Keep the `fetch_k` most similar (ties keep insertion order).
//! 3. Select `k` of those:
//!    - **similarity**: the top `k` as ranked.
//!    - **mmr**: maximal marginal relevance. The first pick is the most
//!      relevant candidate; each following pick maximizes
//!      `λ·sim(query, c) − (1−λ)·max sim(c, already selected)`.
//!
//! Selection works on candidate positions, so a result never repeats.

use crate::config::RetrievalConfig;
use crate::embedding::cosine_similarity;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchStrategy {
    Similarity,
    /// `lambda = 1.0` is pure relevance, `0.0` is pure diversity.
    Mmr { lambda: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub k: usize,
    pub fetch_k: usize,
    pub strategy: SearchStrategy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            k: 8,
            fetch_k: 20,
            strategy: SearchStrategy::Mmr { lambda: 0.5 },
        }
    }
}

impl QueryOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            k: config.k,
            fetch_k: config.fetch_k.max(config.k),
            strategy: config.search_strategy(),
        }
    }
}

/// Positions of `candidates` ordered by descending similarity to `query`.
pub fn rank_by_similarity(query: &[f32], candidates: &[Vec<f32>]) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine_similarity(query, c)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Pick up to `k` positions of `candidates` by maximal marginal relevance.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[Vec<f32>],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    if k == 0 || candidates.is_empty() {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut remaining: Vec<usize> = (0..candidates.len()).collect();
    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let score = if selected.is_empty() {
                relevance[idx]
            } else {
                let redundancy = selected
                    .iter()
                    .map(|&s| cosine_similarity(&candidates[idx], &candidates[s]))
                    .fold(f32::NEG_INFINITY, f32::max);
                lambda * relevance[idx] - (1.0 - lambda) * redundancy
            };
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

/// Select result positions from `vectors` for `query` according to `opts`.
pub fn select(query: &[f32], vectors: &[Vec<f32>], opts: &QueryOptions) -> Vec<usize> {
    let mut ranked = rank_by_similarity(query, vectors);
    ranked.truncate(opts.fetch_k.max(opts.k));

    match opts.strategy {
        SearchStrategy::Similarity => ranked.into_iter().take(opts.k).map(|(i, _)| i).collect(),
        SearchStrategy::Mmr { lambda } => {
            let pool: Vec<Vec<f32>> = ranked.iter().map(|&(i, _)| vectors[i].clone()).collect();
            maximal_marginal_relevance(query, &pool, opts.k, lambda)
                .into_iter()
                .map(|pos| ranked[pos].0)
                .collect()
        }
    }
}
