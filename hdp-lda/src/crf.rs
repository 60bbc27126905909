//! Collapsed Gibbs steps of the Chinese restaurant franchise.
//!
//! Two moves:
//! - `reseat_customer`: draw a table for one word among the document's
//!   active tables plus a new one (whose dish is drawn on the spot);
//! - `reseat_table`: draw a dish for a whole table, moving all of its
//!   customers together.
//!
//! Both see the latest state, including moves made earlier in the same
//! sweep, so they must run sequentially.

use crate::partition::PartitionState;
use crate::predictive::*;
use rand::rngs::SmallRng;
use rand::Rng;

/// Gibbs sampler for table and dish assignments.
pub struct CrfSampler {
    rng: SmallRng,
    alpha: f64,
    gamma: f64,
    base: f64,
    /// Scratch: candidate table ids
    table_ids: Vec<usize>,
    /// Scratch: candidate dish ids
    topic_ids: Vec<usize>,
    /// Scratch: weights over `table_ids` + new table
    table_weights: Vec<f64>,
    /// Scratch: weights over `topic_ids` + new dish
    topic_weights: Vec<f64>,
}

impl CrfSampler {
    /// * `rng` - random source (seeded by the caller)
    /// * `alpha` - document-level concentration
    /// * `gamma` - franchise-level concentration
    /// * `base` - Dirichlet pseudocount of each dish
    pub fn new(rng: SmallRng, alpha: f64, gamma: f64, base: f64) -> Self {
        CrfSampler {
            rng,
            alpha,
            gamma,
            base,
            table_ids: Vec::new(),
            topic_ids: Vec::new(),
            table_weights: Vec::new(),
            topic_weights: Vec::new(),
        }
    }

    /// Re-draw the table of customer `(j, i)`.
    ///
    /// ```text
    /// p(t_ji = t)   ∝ n_jt f_{k_jt}(x_ji)
    /// p(t_ji = new) ∝ alpha / (m + gamma) * (Σ_k m_k f_k(x_ji) + gamma / V)
    /// ```
    ///
    /// `m` counts the active tables of the whole franchise.
    pub fn reseat_customer(&mut self, state: &mut PartitionState, j: usize, i: usize) {
        let v = state.word(j, i);
        state.unseat_customer(j, i);

        self.fill_table_weights(state, j, v);

        let t = match sample_discrete_id(&self.table_ids, &self.table_weights, &mut self.rng) {
            Some(t) => t,
            None => self.open_table(state, j),
        };
        state.seat_customer(j, i, t);
    }

    /// Open a table in document `j` for a customer eating word `v`
    /// and draw its dish.
    ///
    /// ```text
    /// p(k_jt = k)   ∝ m_k f_k(v)
    /// p(k_jt = new) ∝ gamma / V
    /// ```
    ///
    /// Returns the new table id. The customer is not seated.
    pub fn create_table(&mut self, state: &mut PartitionState, j: usize, v: usize) -> usize {
        self.fill_topic_weights(state, v);
        self.open_table(state, j)
    }

    /// Re-draw the dish of table `(j, t)` together with all its customers.
    ///
    /// ```text
    /// p(k_jt = k)   ∝ m_k^{-jt} f_k(x_jt)
    /// p(k_jt = new) ∝ gamma f_new(x_jt)
    /// ```
    ///
    /// evaluated in log space (sequential urn form) and shifted by the
    /// maximum before exponentiating.
    pub fn reseat_table(&mut self, state: &mut PartitionState, j: usize, t: usize) {
        let words = state.table_words(j, t);
        state.detach_table(j, t);

        self.fill_table_topic_log_weights(state, &words);
        exp_shifted(&mut self.topic_weights);

        let k = match sample_discrete_id(&self.topic_ids, &self.topic_weights, &mut self.rng) {
            Some(k) => k,
            None => state.create_topic(),
        };
        state.attach_table(j, t, k, &words);
    }

    /// Fill `table_ids` / `table_weights` with `n_jt f_{k_jt}(v)` for
    /// every active table of `j`, followed by the new-table weight. The
    /// dish weights of a new table are left in `topic_ids` /
    /// `topic_weights`.
    fn fill_table_weights(&mut self, state: &PartitionState, j: usize, v: usize) {
        let franchise = self.fill_topic_weights(state, v);

        self.table_ids.clear();
        self.table_weights.clear();
        for t in state.active_tables(j) {
            let k = state.topic_of_table(j, t);
            self.table_ids.push(t);
            self.table_weights
                .push(state.table_size(j, t) as f64 * word_predictive(state, k, v, self.base));
        }
        let m = state.num_active_tables() as f64;
        self.table_weights
            .push(self.alpha / (m + self.gamma) * franchise);
    }

    /// Fill `topic_ids` / `topic_weights` with the log-weights
    /// `ln m_k + log f_k(words)` of every active dish, followed by
    /// `ln gamma + log f_new(words)`.
    fn fill_table_topic_log_weights(&mut self, state: &PartitionState, words: &[usize]) {
        self.topic_ids.clear();
        self.topic_weights.clear();
        for k in state.active_topics() {
            self.topic_ids.push(k);
            self.topic_weights.push(
                log_table_predictive(state, k, words, self.base)
                    + (state.topic_tables(k) as f64).ln(),
            );
        }
        self.topic_weights
            .push(log_table_predictive_new(state, words, self.base) + self.gamma.ln());
    }

    /// Fill `topic_ids` / `topic_weights` with `m_k f_k(v)` for every
    /// active dish followed by `gamma / V`. Returns their sum.
    fn fill_topic_weights(&mut self, state: &PartitionState, v: usize) -> f64 {
        self.topic_ids.clear();
        self.topic_weights.clear();
        let mut total = 0.0;
        for k in state.active_topics() {
            let w = state.topic_tables(k) as f64 * word_predictive(state, k, v, self.base);
            self.topic_ids.push(k);
            self.topic_weights.push(w);
            total += w;
        }
        let w_new = self.gamma * new_word_predictive(state);
        self.topic_weights.push(w_new);
        total + w_new
    }

    /// Open a table in `j` and serve it a dish drawn from `topic_weights`.
    fn open_table(&mut self, state: &mut PartitionState, j: usize) -> usize {
        let t = state.create_table(j);
        let k = match sample_discrete_id(&self.topic_ids, &self.topic_weights, &mut self.rng) {
            Some(k) => k,
            None => state.create_topic(),
        };
        state.assign_table(j, t, k);
        t
    }
}

/// Draw among `ids` plus a trailing "new" outcome.
///
/// `weights` has one entry per id and one more for "new"; they need not
/// be normalized. Returns `None` when "new" is drawn, leaving the caller
/// to allocate the id.
pub fn sample_discrete_id(ids: &[usize], weights: &[f64], rng: &mut SmallRng) -> Option<usize> {
    debug_assert_eq!(weights.len(), ids.len() + 1);
    ids.get(sample_categorical(weights, rng)).copied()
}

/// Inverse-CDF draw from unnormalized non-negative weights.
pub fn sample_categorical(weights: &[f64], rng: &mut SmallRng) -> usize {
    let total: f64 = weights.iter().sum();

    if total <= 0.0 || !total.is_finite() {
        // Fallback: uniform
        return rng.random_range(0..weights.len());
    }

    // strict comparison: a zero weight never owns the point u
    let u: f64 = rng.random::<f64>() * total;
    let mut cum = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cum += w;
        if cum > u {
            return i;
        }
    }

    // rounding left u at the very end: last entry with mass
    weights
        .iter()
        .rposition(|&w| w > 0.0)
        .unwrap_or(weights.len() - 1)
}

/// Turn log-weights into weights: `w_i <- exp(w_i - max_i w_i)`.
pub fn exp_shifted(log_weights: &mut [f64]) {
    let max = log_weights
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);
    for w in log_weights.iter_mut() {
        *w = (*w - max).exp();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::SeedableRng;

    fn toy_state() -> PartitionState {
        let docs = vec![vec![0, 0, 1], vec![0, 1, 1], vec![2, 2, 2]];
        PartitionState::new(docs, 3).unwrap()
    }

    #[test]
    fn test_sample_categorical() {
        let mut rng = SmallRng::seed_from_u64(7);
        let weights = [0.0, 10.0, 0.0];
        for _ in 0..100 {
            assert_eq!(sample_categorical(&weights, &mut rng), 1);
        }

        let mut counts = [0usize; 2];
        for _ in 0..10_000 {
            counts[sample_categorical(&[1.0, 3.0], &mut rng)] += 1;
        }
        let frac = counts[1] as f64 / 10_000.0;
        assert!((frac - 0.75).abs() < 0.03, "frac = {}", frac);
    }

    #[test]
    fn test_sample_categorical_skips_zero_weights() {
        let mut rng = SmallRng::seed_from_u64(13);
        for _ in 0..1000 {
            assert_eq!(sample_categorical(&[0.0, 1.0], &mut rng), 1);
            assert_eq!(sample_categorical(&[0.0, 0.0, 2.0, 0.0], &mut rng), 2);
        }
        assert_eq!(sample_discrete_id(&[3], &[0.0, 1e-300], &mut rng), None);
    }

    #[test]
    fn test_sample_discrete_id_sentinel() {
        let mut rng = SmallRng::seed_from_u64(3);
        assert_eq!(sample_discrete_id(&[4, 9], &[0.0, 0.0, 1.0], &mut rng), None);
        assert_eq!(sample_discrete_id(&[4, 9], &[0.0, 1.0, 0.0], &mut rng), Some(9));
        assert_eq!(sample_discrete_id(&[], &[1.0], &mut rng), None);
    }

    #[test]
    fn test_exp_shifted_avoids_underflow() {
        let mut w = vec![-2000.0, -2001.0, -5000.0];
        exp_shifted(&mut w);
        assert_eq!(w[0], 1.0);
        assert!((w[1] - (-1.0f64).exp()).abs() < 1e-12);
        assert!(w[2] >= 0.0 && w[2] < 1e-300);
    }

    #[test]
    fn test_reseat_customer_keeps_invariants() {
        let mut state = toy_state();
        let mut sampler = CrfSampler::new(SmallRng::seed_from_u64(1), 1.0, 1.0, 0.5);

        for _ in 0..20 {
            for j in 0..state.num_docs() {
                for i in 0..state.doc_len(j) {
                    sampler.reseat_customer(&mut state, j, i);
                    state.check_invariants().unwrap();
                }
            }
        }
    }

    #[test]
    fn test_reseat_table_keeps_invariants() {
        let mut state = toy_state();
        let mut sampler = CrfSampler::new(SmallRng::seed_from_u64(2), 1.0, 5.0, 0.5);

        for _ in 0..20 {
            for j in 0..state.num_docs() {
                let tables: Vec<usize> = state.active_tables(j).collect();
                for t in tables {
                    let n_jt = state.table_size(j, t);
                    sampler.reseat_table(&mut state, j, t);
                    assert_eq!(state.table_size(j, t), n_jt);
                    state.check_invariants().unwrap();
                }
            }
        }
    }

    #[test]
    fn test_create_table_serves_a_dish() {
        let mut state = toy_state();
        let mut sampler = CrfSampler::new(SmallRng::seed_from_u64(5), 1.0, 1.0, 0.5);

        // move the last customer of document 0 to a table opened for it
        let v = state.word(0, 2);
        state.unseat_customer(0, 2);
        let t = sampler.create_table(&mut state, 0, v);
        assert_eq!(t, 1);
        assert!(state.is_active_topic(state.topic_of_table(0, t)));
        state.seat_customer(0, 2, t);

        assert_eq!(state.num_active_tables(), 4);
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_new_dish_when_gamma_dominates() {
        // huge gamma: a detached table almost surely opens a new dish,
        // which must reuse the id freed by the detach
        let mut state = toy_state();
        let k = state.create_topic();
        let words = state.table_words(2, 0);
        state.detach_table(2, 0);
        state.attach_table(2, 0, k, &words);

        let mut sampler = CrfSampler::new(SmallRng::seed_from_u64(11), 1.0, 1e12, 0.5);
        sampler.reseat_table(&mut state, 2, 0);
        assert_eq!(state.topic_of_table(2, 0), 1);
        assert_eq!(state.topic_capacity(), 2);
        state.check_invariants().unwrap();
    }

    #[test]
    fn test_customer_weights_by_hand() {
        // alpha = 2, gamma = 0.5, base = 0.5, V = 3
        let mut state = toy_state();
        let mut sampler = CrfSampler::new(SmallRng::seed_from_u64(0), 2.0, 0.5, 0.5);

        // word 1 leaves doc 0: dish 0 keeps n_k = 8, n_k1 = 2, m_0 = m = 3
        let v = state.word(0, 2);
        assert_eq!(v, 1);
        state.unseat_customer(0, 2);
        sampler.fill_table_weights(&state, 0, v);

        let f = 2.5 / 9.5;
        let franchise = 3.0 * f + 0.5 / 3.0;

        assert_eq!(sampler.topic_ids, vec![0]);
        assert_eq!(sampler.topic_weights.len(), 2);
        assert_abs_diff_eq!(sampler.topic_weights[0], 3.0 * f, epsilon = 1e-12);
        assert_abs_diff_eq!(sampler.topic_weights[1], 0.5 / 3.0, epsilon = 1e-12);

        assert_eq!(sampler.table_ids, vec![0]);
        assert_eq!(sampler.table_weights.len(), 2);
        assert_abs_diff_eq!(sampler.table_weights[0], 2.0 * f, epsilon = 1e-12);
        assert_abs_diff_eq!(
            sampler.table_weights[1],
            2.0 / (3.0 + 0.5) * franchise,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_table_dish_log_weights_by_hand() {
        // alpha = 2, gamma = 0.5, base = 0.5, V = 3
        let mut state = toy_state();
        let mut sampler = CrfSampler::new(SmallRng::seed_from_u64(0), 2.0, 0.5, 0.5);

        // without doc 2, dish 0 holds {0: 3, 1: 3}, n_k = 6, m_0 = 2
        let words = state.table_words(2, 0);
        state.detach_table(2, 0);
        sampler.fill_table_topic_log_weights(&state, &words);

        // three 2's, none seen before at dish 0
        let log_f0 = (0.5f64 / 7.5).ln() + (1.5f64 / 8.5).ln() + (2.5f64 / 9.5).ln();
        let log_new = (0.5f64 / 1.5).ln() + (1.5f64 / 2.5).ln() + (2.5f64 / 3.5).ln();

        assert_eq!(sampler.topic_ids, vec![0]);
        assert_eq!(sampler.topic_weights.len(), 2);
        assert_abs_diff_eq!(sampler.topic_weights[0], 2f64.ln() + log_f0, epsilon = 1e-12);
        assert_abs_diff_eq!(sampler.topic_weights[1], 0.5f64.ln() + log_new, epsilon = 1e-12);
    }
}
