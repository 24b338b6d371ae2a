//! Cosmetic next-token probability lists.
//!
//! Nothing here is a model output: the lists either come from a seeded random
//! source or from word frequencies of the text streamed so far.

use std::collections::HashMap;

use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::tokenizer::tokenize;

/// Candidate vocabulary for simulated distributions.
pub const SIMULATED_VOCABULARY: [&str; 8] = ["the", "a", "is", "and", "to", "in", "it", "of"];

/// How many entries the output panel shows.
pub const DISPLAY_COUNT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenProbability {
    pub token: String,
    pub probability: f64,
}

/// Seedable generator of ranked token/probability lists.
#[derive(Debug, Clone)]
pub struct ProbabilitySynthesizer {
    rng: StdRng,
}

impl ProbabilitySynthesizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Random weights over [`SIMULATED_VOCABULARY`], normalized and sorted descending.
    pub fn simulate(&mut self) -> Vec<TokenProbability> {
        let weights: Vec<f64> = SIMULATED_VOCABULARY
            .iter()
            .map(|_| self.rng.gen::<f64>())
            .collect();
        let sum: f64 = weights.iter().sum();

        SIMULATED_VOCABULARY
            .iter()
            .zip(weights)
            .map(|(token, weight)| TokenProbability {
                token: token.to_string(),
                probability: if sum > 0.0 {
                    weight / sum
                } else {
                    1.0 / SIMULATED_VOCABULARY.len() as f64
                },
            })
            .sorted_by(|a, b| b.probability.total_cmp(&a.probability))
            .collect()
    }

    /// Word frequencies of `text`, lowercased.
    ///
    /// Sorted by descending probability. Ties keep first-occurrence order.
    pub fn from_text(text: &str) -> Vec<TokenProbability> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Vec::new();
        }

        let mut counts: HashMap<String, usize> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for token in tokens.iter().map(|t| t.to_lowercase()) {
            let count = counts.entry(token.clone()).or_insert(0);
            if *count == 0 {
                order.push(token);
            }
            *count += 1;
        }

        let total = tokens.len() as f64;
        order
            .into_iter()
            .map(|token| {
                let count = counts.get(&token).copied().unwrap_or(0);
                TokenProbability {
                    token,
                    probability: count as f64 / total,
                }
            })
            .sorted_by(|a, b| b.probability.total_cmp(&a.probability))
            .collect()
    }
}

/// First `n` entries of a ranked list.
pub fn top(probabilities: &[TokenProbability], n: usize) -> &[TokenProbability] {
    &probabilities[..n.min(probabilities.len())]
}
