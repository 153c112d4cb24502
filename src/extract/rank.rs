//! Candidate ranking.
//!
//! The pooled candidates are competing guesses at a single total; the policy
//! is: drop implausible digit runs, dedup, take the largest survivor. The
//! true total is, empirically, the largest plausible number on the page — a
//! heuristic, and the dominant source of wrong answers, accepted because the
//! source has no stable schema.

use super::{Candidate, CandidatePool};

/// Candidates at or above this bound are treated as corrupted digit runs
/// (typically concatenations harvested by the global fallback scan).
pub const MAX_PLAUSIBLE_VALUE: u64 = 10_000_000_000;

/// Surviving candidates, largest value first, deduplicated by value.
///
/// The stable sort keeps, for each value, the provenance of the strategy that
/// found it first.
pub fn ranked(pool: &CandidatePool) -> Vec<Candidate> {
    let mut out: Vec<Candidate> = pool
        .iter()
        .filter(|c| c.value < MAX_PLAUSIBLE_VALUE)
        .cloned()
        .collect();
    out.sort_by(|a, b| b.value.cmp(&a.value));
    out.dedup_by(|a, b| a.value == b.value);
    out
}

/// Best guess at the total value, or `None` when nothing survives filtering.
pub fn select(pool: &CandidatePool) -> Option<u64> {
    ranked(pool).first().map(|c| c.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Origin;

    fn pool_of(values: &[u64]) -> CandidatePool {
        values
            .iter()
            .map(|v| Candidate {
                value: *v,
                origin: Origin::GlobalScan,
            })
            .collect()
    }

    #[test]
    fn empty_pool_selects_nothing() {
        assert_eq!(select(&CandidatePool::new()), None);
    }

    #[test]
    fn maximum_survivor_wins() {
        assert_eq!(select(&pool_of(&[3, 12_500, 42])), Some(12_500));
    }

    #[test]
    fn zero_only_pool_is_a_valid_zero() {
        assert_eq!(select(&pool_of(&[0])), Some(0));
    }

    #[test]
    fn sanity_bound_rejects_corrupted_runs() {
        assert_eq!(select(&pool_of(&[MAX_PLAUSIBLE_VALUE, 500])), Some(500));
        assert_eq!(select(&pool_of(&[MAX_PLAUSIBLE_VALUE])), None);
        assert_eq!(
            select(&pool_of(&[MAX_PLAUSIBLE_VALUE - 1])),
            Some(MAX_PLAUSIBLE_VALUE - 1)
        );
    }

    #[test]
    fn ranked_dedups_and_orders_descending() {
        let r = ranked(&pool_of(&[5, 900, 5, 900, 13]));
        let values: Vec<u64> = r.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![900, 13, 5]);
    }

    #[test]
    fn select_is_idempotent_under_dedup() {
        let p = pool_of(&[7, 7, 7, 200]);
        let once: CandidatePool = ranked(&p).into_iter().collect();
        assert_eq!(select(&once), select(&p));
    }

    #[test]
    fn first_strategy_provenance_is_kept_for_ties() {
        let mut p = CandidatePool::new();
        p.push(12_500, Origin::LabeledNeighborhood);
        p.push(12_500, Origin::GlobalScan);
        let r = ranked(&p);
        assert_eq!(r.len(), 1);
        assert_eq!(r[0].origin, Origin::LabeledNeighborhood);
    }
}
