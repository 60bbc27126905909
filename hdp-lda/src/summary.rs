//! Posterior-mean word distributions of the active topics.

use crate::partition::PartitionState;

/// Smoothed word distribution of one topic
#[derive(Debug, Clone, PartialEq)]
pub struct TopicWordDist {
    /// Dish id in the partition state
    pub topic: usize,
    /// `(n_kv + base) / (n_k + V base)` for every word id `v`
    pub probs: Vec<f64>,
}

impl TopicWordDist {
    /// The `n` most probable word ids with their probabilities,
    /// ties broken by word id.
    pub fn top_words(&self, n: usize) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = self.probs.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }
}

/// Word distributions of the active topics in ascending topic id.
pub fn topic_word_distributions(state: &PartitionState, base: f64) -> Vec<TopicWordDist> {
    let nv = state.num_words();
    let vbase = base * nv as f64;

    state
        .active_topics()
        .map(|k| {
            let denom = state.topic_size(k) as f64 + vbase;
            let mut probs = vec![base / denom; nv];
            for (&v, &n) in state.topic_word_counts(k) {
                probs[v] = (n as f64 + base) / denom;
            }
            TopicWordDist { topic: k, probs }
        })
        .collect()
}
