//! Per-position naturalness scoring
//!
//! At every position the forward model (given the prefix) and the backward
//! model (given the suffix) each predict the token that belongs there. Where
//! the two agree with each other and with the observed token the code looks
//! natural; where they disagree it probably isn't.

use crate::predict::{Distribution, DistributionError};
use crate::vocabulary::Vind;
use serde::{Deserialize, Serialize};

/// Weight of `indexed_prob` in the composite score.
pub const LAMBDA: f64 = 0.5;

/// Scoring record for one position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexResult {
    /// Position in the scored vector
    pub index: usize,
    /// Token observed at `index`
    pub token: Vind,
    /// `a[t] * b[t]`
    pub indexed_prob: f64,
    /// Diagnostic only; not part of `score`
    pub cosine_similarity: f64,
    /// `0.5 * |a - b|_1`
    pub total_variation: f64,
    /// `1 - total_variation`
    pub comp_total_variation: f64,
    /// Composite naturalness in `[0, 1]`; low means suspicious
    pub score: f64,
    /// Most likely token according to the forward model
    pub forward_top: Vind,
    /// Most likely token according to the backward model
    pub backward_top: Vind,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisagreementScorer;

impl DisagreementScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score position `index` holding `token`, given the forward
    /// distribution `a` and backward distribution `b`.
    pub fn score(
        &self,
        index: usize,
        token: Vind,
        a: &Distribution,
        b: &Distribution,
    ) -> Result<IndexResult, DistributionError> {
        if a.len() != b.len() {
            return Err(DistributionError::WrongLength {
                expected: a.len(),
                actual: b.len(),
            });
        }
        if token as usize >= a.len() {
            return Err(DistributionError::WrongLength {
                expected: token as usize + 1,
                actual: a.len(),
            });
        }

        let (a_probs, b_probs) = (a.as_slice(), b.as_slice());
        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;
        let mut l1 = 0.0f64;
        for (&x, &y) in a_probs.iter().zip(b_probs) {
            let (x, y) = (f64::from(x), f64::from(y));
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
            l1 += (x - y).abs();
        }

        let indexed_prob = unit(f64::from(a.probability(token)) * f64::from(b.probability(token)));
        let cosine_similarity = if norm_a > 0.0 && norm_b > 0.0 {
            unit(dot / (norm_a.sqrt() * norm_b.sqrt()))
        } else {
            0.0
        };
        // Distributions are normalized only up to the tolerance, so the raw
        // values can drift slightly outside [0, 1].
        let total_variation = unit(0.5 * l1);
        let comp_total_variation = 1.0 - total_variation;
        let score = unit(LAMBDA * indexed_prob + (1.0 - LAMBDA) * comp_total_variation);

        Ok(IndexResult {
            index,
            token,
            indexed_prob,
            cosine_similarity,
            total_variation,
            comp_total_variation,
            score,
            forward_top: a.argmax(),
            backward_top: b.argmax(),
        })
    }
}

fn unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
