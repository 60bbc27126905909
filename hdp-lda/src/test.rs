//! Scenario tests across the sampler, the state and the summaries.

use crate::inference::{HdpLda, HdpOptions};
use crate::partition::PartitionState;
use crate::predictive::exact;
use crate::predictive::*;
use approx::assert_abs_diff_eq;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn toy_corpus() -> Vec<Vec<usize>> {
    // "a a b", "a b b", "c c c"
    vec![vec![0, 0, 1], vec![0, 1, 1], vec![2, 2, 2]]
}

/// Documents drawn from `n_topics` disjoint word blocks, one block each.
fn block_corpus(n_docs: usize, n_topics: usize, block: usize, doc_len: usize, seed: u64) -> Vec<Vec<usize>> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..n_docs)
        .map(|d| {
            let k = d % n_topics;
            (0..doc_len)
                .map(|_| k * block + rng.random_range(0..block))
                .collect()
        })
        .collect()
}

fn options(num_iter: usize, seed: u64) -> HdpOptions {
    HdpOptions {
        num_iter,
        seed,
        check_invariants: true,
        ..Default::default()
    }
}

// ─── Tests ───

#[test]
fn test_toy_initial_state() {
    let model = HdpLda::new(toy_corpus(), 3, options(0, 42)).unwrap();
    let state = model.state();

    assert_eq!(state.active_topics().collect::<Vec<_>>(), vec![0]);
    assert_eq!(state.topic_tables(0), 3);
    assert_eq!(state.topic_size(0), 9);
    for v in 0..3 {
        assert_eq!(state.topic_word(0, v), 3);
    }
    for j in 0..3 {
        let tables: Vec<usize> = state.active_tables(j).collect();
        assert_eq!(tables, vec![0]);
        assert_eq!(state.table_size(j, 0), 3);
    }
}

#[test]
fn test_zero_iterations_leave_state_unchanged() {
    let initial = PartitionState::new(toy_corpus(), 3).unwrap();
    let mut model = HdpLda::new(toy_corpus(), 3, options(0, 42)).unwrap();
    model.run().unwrap();

    assert_eq!(model.num_sweeps(), 0);
    assert_eq!(model.state(), &initial);
    model.state().check_invariants().unwrap();
}

#[test]
fn test_invariants_hold_between_sweeps() {
    let docs = block_corpus(20, 3, 5, 15, 1);
    let doc_lens: Vec<usize> = docs.iter().map(|d| d.len()).collect();
    let mut model = HdpLda::new(docs, 15, options(0, 7)).unwrap();

    for _ in 0..30 {
        model.run_sweep();
        let state = model.state();
        state.check_invariants().unwrap();

        for (j, &n) in doc_lens.iter().enumerate() {
            let seated: usize = state.active_tables(j).map(|t| state.table_size(j, t)).sum();
            assert_eq!(seated, n);
        }
        for k in state.active_topics() {
            let served = (0..state.num_docs())
                .flat_map(move |j| state.active_tables(j).map(move |t| (j, t)))
                .filter(|&(j, t)| state.topic_of_table(j, t) == k)
                .count();
            assert_eq!(served, state.topic_tables(k));
            let words: usize = state.topic_word_counts(k).values().sum();
            assert_eq!(words, state.topic_size(k));
        }
    }
}

#[test]
fn test_same_seed_same_state() {
    let docs = block_corpus(12, 2, 4, 10, 3);

    let mut a = HdpLda::new(docs.clone(), 8, options(15, 99)).unwrap();
    let mut b = HdpLda::new(docs.clone(), 8, options(15, 99)).unwrap();
    a.run().unwrap();
    b.run().unwrap();
    assert_eq!(a.state(), b.state());
    assert_eq!(a.worddist(), b.worddist());
}

#[test]
fn test_single_customer_document() {
    let docs = vec![vec![0], vec![1, 1, 2], vec![2, 0]];
    let mut model = HdpLda::new(docs, 3, options(0, 5)).unwrap();

    for _ in 0..50 {
        model.run_sweep();
        let state = model.state();
        state.check_invariants().unwrap();

        let tables: Vec<usize> = state.active_tables(0).collect();
        assert_eq!(tables.len(), 1);
        assert_eq!(state.table_size(0, tables[0]), 1);
        assert!(state.is_active_topic(state.topic_of_table(0, tables[0])));
    }
}

#[test]
fn test_empty_documents_are_skipped() {
    let docs = vec![vec![], vec![0, 1, 1], vec![], vec![2, 2]];
    let mut model = HdpLda::new(docs, 3, options(10, 1)).unwrap();
    model.run().unwrap();

    assert_eq!(model.state().active_tables(0).count(), 0);
    assert_eq!(model.state().active_tables(2).count(), 0);
    assert!(model.state().num_active_topics() >= 1);
}

#[test]
fn test_all_empty_corpus() {
    let mut model = HdpLda::new(vec![vec![], vec![]], 2, options(3, 1)).unwrap();
    model.run().unwrap();
    assert_eq!(model.state().num_active_topics(), 0);
    assert!(model.worddist().is_empty());
}

#[test]
fn test_storage_bounded_by_reuse() {
    // heavy churn: storage never exceeds what is simultaneously needed
    let docs = block_corpus(10, 2, 3, 8, 11);
    let opts = HdpOptions {
        alpha: 5.0,
        gamma: 5.0,
        ..options(0, 11)
    };
    let mut model = HdpLda::new(docs, 6, opts).unwrap();

    for _ in 0..40 {
        model.run_sweep();
        let state = model.state();
        for j in 0..state.num_docs() {
            // at most one slot per customer plus one opened then freed
            assert!(state.table_capacity(j) <= state.doc_len(j) + 1);
        }
        let total: usize = (0..state.num_docs()).map(|j| state.doc_len(j)).sum();
        assert!(state.topic_capacity() <= total + 1);
    }
}

#[test]
fn test_recovers_disjoint_blocks() {
    let n_topics = 3;
    let block = 4;
    let docs = block_corpus(30, n_topics, block, 20, 5);
    let opts = HdpOptions {
        alpha: 1.0,
        gamma: 1.0,
        base: 0.1,
        ..options(100, 21)
    };
    let mut model = HdpLda::new(docs, n_topics * block, opts).unwrap();
    model.run().unwrap();

    // every dish that carries mass concentrates on one block
    for dist in model.worddist() {
        let size = model.state().topic_size(dist.topic);
        if size < 20 {
            continue;
        }
        let block_mass: Vec<f64> = (0..n_topics)
            .map(|b| dist.probs[b * block..(b + 1) * block].iter().sum())
            .collect();
        let best = block_mass.iter().cloned().fold(0.0, f64::max);
        assert!(best > 0.8, "topic {} block masses {:?}", dist.topic, block_mass);
    }
}

#[test]
fn test_fast_predictive_matches_exact_mid_run() {
    let docs = block_corpus(8, 2, 3, 6, 2);
    let mut model = HdpLda::new(docs, 6, options(0, 3)).unwrap();
    for _ in 0..5 {
        model.run_sweep();
    }
    let base = model.options().base;
    let state = model.state();

    for j in 0..state.num_docs() {
        let tables: Vec<usize> = state.active_tables(j).collect();
        for t in tables {
            let mut s = state.clone();
            let words = s.table_words(j, t);
            s.detach_table(j, t);
            for k in s.active_topics() {
                assert_abs_diff_eq!(
                    log_table_predictive(&s, k, &words, base),
                    exact::log_table_predictive(&s, Some(k), j, t, base),
                    epsilon = 1e-8
                );
            }
        }

        for i in 0..state.doc_len(j) {
            let mut s = state.clone();
            s.unseat_customer(j, i);
            let v = s.word(j, i);
            for k in s.active_topics() {
                assert_abs_diff_eq!(
                    word_predictive(&s, k, v, base),
                    exact::word_predictive(&s, Some(k), j, i, base),
                    epsilon = 1e-10
                );
            }
        }
    }
}
