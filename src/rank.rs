//! Position ranking

use crate::score::IndexResult;

/// Orders scored positions from most to least suspicious.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker;

impl Ranker {
    /// Ascending by score. The sort is stable, so equal scores keep
    /// position order.
    pub fn rank(&self, mut results: Vec<IndexResult>) -> Vec<IndexResult> {
        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        results
    }
}

/// 1-based rank of the first result satisfying `pred`.
pub fn first_rank_where(
    ranked: &[IndexResult],
    mut pred: impl FnMut(&IndexResult) -> bool,
) -> Option<usize> {
    ranked.iter().position(|r| pred(r)).map(|i| i + 1)
}
