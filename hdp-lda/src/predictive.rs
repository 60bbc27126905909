//! Dirichlet-multinomial predictive likelihoods.
//!
//! # Fast form (one word)
//!
//! ```text
//! f_k(v) = (n_kv + base) / (n_k + base * V)
//! f_new(v) = 1 / V
//! ```
//!
//! # Sequential form (a whole table)
//!
//! The words of a table are scored one at a time against running counts
//! that include the table words already scored (Pólya urn):
//!
//! ```text
//! log f_k(x_jt) = Σ_i [ ln(n_kv + c_v + base) - ln(n_k + c + base * V) ]
//! ```
//!
//! where `c_v`, `c` count the table words processed so far. The constant
//! Γ(V base) / Γ(base)^V is omitted since it cancels in normalization.

use crate::partition::{PartitionState, WordCounts};
use std::collections::HashMap;

/// Predictive probability of word `v` under the active dish `k`.
#[inline]
pub fn word_predictive(state: &PartitionState, k: usize, v: usize, base: f64) -> f64 {
    let n_kv = state.topic_word(k, v) as f64;
    let n_k = state.topic_size(k) as f64;
    (n_kv + base) / (n_k + base * state.num_words() as f64)
}

/// Predictive probability of any word under a dish with no customers.
#[inline]
pub fn new_word_predictive(state: &PartitionState) -> f64 {
    1.0 / state.num_words() as f64
}

/// Sequential (Pólya urn) log-likelihood of `words` given prior counts.
///
/// * `words` - word ids to score, in order
/// * `counts` - dish word counts to start from (`None` for an empty dish)
/// * `total` - sum of `counts`
/// * `base` - symmetric Dirichlet pseudocount
/// * `num_words` - vocabulary size V
pub fn log_urn_predictive(
    words: &[usize],
    counts: Option<&WordCounts>,
    total: usize,
    base: f64,
    num_words: usize,
) -> f64 {
    let vbase = base * num_words as f64;
    let mut seen: HashMap<usize, usize> = HashMap::with_capacity(words.len());
    let mut n = total as f64;
    let mut llik = 0.0;

    for &v in words {
        let prior = counts.and_then(|c| c.get(&v)).copied().unwrap_or(0);
        let c_v = seen.entry(v).or_insert(0);
        llik += ((prior + *c_v) as f64 + base).ln() - (n + vbase).ln();
        *c_v += 1;
        n += 1.0;
    }
    llik
}

/// Log-likelihood of a table's words under the active dish `k`.
///
/// The table must already be detached from `k`.
pub fn log_table_predictive(state: &PartitionState, k: usize, words: &[usize], base: f64) -> f64 {
    log_urn_predictive(
        words,
        Some(state.topic_word_counts(k)),
        state.topic_size(k),
        base,
        state.num_words(),
    )
}

/// Log-likelihood of a table's words under a brand-new dish.
pub fn log_table_predictive_new(state: &PartitionState, words: &[usize], base: f64) -> f64 {
    log_urn_predictive(words, None, 0, base, state.num_words())
}

/// Exact predictive likelihoods recomputed from the raw assignments.
///
/// These read only word ids, table pointers and dish pointers, never the
/// count caches, and serve as a reference for the fast forms above.
/// They cost O(N) per call.
pub mod exact {
    use crate::partition::PartitionState;
    use special::Gamma as SpecialGamma;

    /// `Σ_v lnΓ(base + n_v) - lnΓ(V base + Σ_v n_v)`
    fn log_dirichlet_multinomial(counts: &[f64], base: f64) -> f64 {
        let vbase = base * counts.len() as f64;
        let total: f64 = counts.iter().sum();
        counts
            .iter()
            .map(|&n| SpecialGamma::ln_gamma(base + n).0)
            .sum::<f64>()
            - SpecialGamma::ln_gamma(vbase + total).0
    }

    /// Word counts of dish `target` excluding guarded customers;
    /// guarded customers are added back if `with_guarded`.
    fn topic_counts<G>(
        state: &PartitionState,
        target: Option<usize>,
        guard: G,
        with_guarded: bool,
    ) -> Vec<f64>
    where
        G: Fn(usize, usize, usize) -> bool,
    {
        let mut counts = vec![0.0; state.num_words()];
        for j in 0..state.num_docs() {
            for i in 0..state.doc_len(j) {
                let t = state.table_of(j, i);
                let take = if guard(j, i, t) {
                    with_guarded
                } else {
                    target == Some(state.topic_of_table(j, t))
                };
                if take {
                    counts[state.word(j, i)] += 1.0;
                }
            }
        }
        counts
    }

    fn log_ratio<G>(state: &PartitionState, target: Option<usize>, guard: G, base: f64) -> f64
    where
        G: Fn(usize, usize, usize) -> bool,
    {
        let joint = topic_counts(state, target, &guard, true);
        let rest = topic_counts(state, target, &guard, false);
        log_dirichlet_multinomial(&joint, base) - log_dirichlet_multinomial(&rest, base)
    }

    /// `p(x_ji | X_k^{-ji})`; `k = None` scores against an empty dish.
    pub fn word_predictive(
        state: &PartitionState,
        k: Option<usize>,
        j: usize,
        i: usize,
        base: f64,
    ) -> f64 {
        let guard = |jj: usize, ii: usize, _t: usize| jj == j && ii == i;
        log_ratio(state, k, guard, base).exp()
    }

    /// `ln p(x_jt | X_k^{-jt})`; `k = None` scores against an empty dish.
    pub fn log_table_predictive(
        state: &PartitionState,
        k: Option<usize>,
        j: usize,
        t: usize,
        base: f64,
    ) -> f64 {
        let guard = |jj: usize, _i: usize, tt: usize| jj == j && tt == t;
        log_ratio(state, k, guard, base)
    }
}
