//! Sweep loop for HDP-LDA.
//!
//! One sweep reseats every customer (documents in order, words in
//! order) and then re-draws the dish of every active table. A run is
//! `num_iter` sweeps with no convergence test; the state is only
//! observable between sweeps.

use crate::crf::CrfSampler;
use crate::partition::PartitionState;
use crate::summary::{topic_word_distributions, TopicWordDist};
use anyhow::{anyhow, bail, ensure};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::{debug, info};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::io::Write;

/// Options for HDP-LDA inference.
#[derive(Debug, Clone)]
pub struct HdpOptions {
    /// Document-level concentration (new tables). Default: 1.0
    pub alpha: f64,
    /// Franchise-level concentration (new dishes). Default: 1.0
    pub gamma: f64,
    /// Symmetric Dirichlet pseudocount of each dish. Default: 0.5
    pub base: f64,
    /// Number of Gibbs sweeps run by `run`. Default: 10
    pub num_iter: usize,
    /// Random seed. Default: 42
    pub seed: u64,
    /// Show a progress bar over sweeps. Default: false
    pub show_progress: bool,
    /// Recompute and verify all caches after every sweep. Default: false
    pub check_invariants: bool,
}

impl Default for HdpOptions {
    fn default() -> Self {
        HdpOptions {
            alpha: 1.0,
            gamma: 1.0,
            base: 0.5,
            num_iter: 10,
            seed: 42,
            show_progress: false,
            check_invariants: false,
        }
    }
}

impl HdpOptions {
    /// Reject hyperparameters the sampler cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [("alpha", self.alpha), ("gamma", self.gamma), ("base", self.base)] {
            ensure!(
                value.is_finite() && value > 0.0,
                "{} must be a positive finite number, got {}",
                name,
                value
            );
        }
        Ok(())
    }
}

/// HDP-LDA model: seating state plus the sampler driving it.
///
/// # Usage
///
/// ```no_run
/// use hdp_lda::{HdpLda, HdpOptions};
///
/// let docs = vec![vec![0, 0, 1], vec![0, 1, 1], vec![2, 2, 2]];
/// let mut model = HdpLda::new(docs, 3, HdpOptions::default())?;
/// model.run()?;
/// for dist in model.worddist() {
///     println!("{}: {:?}", dist.topic, dist.top_words(3));
/// }
/// # Ok::<(), anyhow::Error>(())
/// ```
pub struct HdpLda {
    options: HdpOptions,
    state: PartitionState,
    sampler: CrfSampler,
    num_sweeps: usize,
}

impl HdpLda {
    /// Seat the corpus at its initial arrangement (one table per
    /// document, one shared dish).
    ///
    /// * `docs` - word ids per document
    /// * `num_words` - vocabulary size V
    /// * `options` - hyperparameters and run settings
    pub fn new(docs: Vec<Vec<usize>>, num_words: usize, options: HdpOptions) -> anyhow::Result<Self> {
        options.validate()?;
        let state = PartitionState::new(docs, num_words)?;
        Ok(Self::with_state(state, options))
    }

    /// Resume from a saved arrangement with a fresh random stream.
    pub fn from_state(state: PartitionState, options: HdpOptions) -> anyhow::Result<Self> {
        options.validate()?;
        state
            .check_invariants()
            .map_err(|e| anyhow!("inconsistent saved state: {}", e))?;
        Ok(Self::with_state(state, options))
    }

    fn with_state(state: PartitionState, options: HdpOptions) -> Self {
        let rng = SmallRng::seed_from_u64(options.seed);
        let sampler = CrfSampler::new(rng, options.alpha, options.gamma, options.base);
        HdpLda {
            options,
            state,
            sampler,
            num_sweeps: 0,
        }
    }

    /// One Gibbs sweep: all customers, then all tables.
    pub fn run_sweep(&mut self) {
        let state = &mut self.state;

        for j in 0..state.num_docs() {
            for i in 0..state.doc_len(j) {
                self.sampler.reseat_customer(state, j, i);
            }
        }

        let mut tables = vec![];
        for j in 0..state.num_docs() {
            tables.clear();
            tables.extend(state.active_tables(j));
            for &t in tables.iter() {
                self.sampler.reseat_table(state, j, t);
            }
        }

        self.num_sweeps += 1;
        debug_assert!(
            state.check_invariants().is_ok(),
            "invariant violated after sweep {}:\n{}",
            self.num_sweeps,
            state.dump()
        );
    }

    /// Run `options.num_iter` sweeps.
    ///
    /// With `check_invariants`, fails on the first sweep that leaves the
    /// caches inconsistent with the assignments.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let num_iter = self.options.num_iter;

        info!(
            "HDP-LDA: {} documents, {} words, V = {}, alpha = {}, gamma = {}, base = {}",
            self.state.num_docs(),
            (0..self.state.num_docs())
                .map(|j| self.state.doc_len(j))
                .sum::<usize>(),
            self.state.num_words(),
            self.options.alpha,
            self.options.gamma,
            self.options.base
        );

        let pb = ProgressBar::new(num_iter as u64);
        if !self.options.show_progress {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        for iter in 0..num_iter {
            self.run_sweep();

            if self.options.check_invariants {
                self.state
                    .check_invariants()
                    .map_err(|e| anyhow!("sweep {}: {}", iter + 1, e))?;
            }

            debug!(
                "[{}] topics: {}, tables: {}",
                iter + 1,
                self.state.num_active_topics(),
                self.state.num_active_tables()
            );
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(
            "done {} sweeps: {} topics, {} tables",
            self.num_sweeps,
            self.state.num_active_topics(),
            self.state.num_active_tables()
        );
        Ok(())
    }

    /// Smoothed word distribution of every active topic.
    pub fn worddist(&self) -> Vec<TopicWordDist> {
        topic_word_distributions(&self.state, self.options.base)
    }

    /// Predictive probability of a held-out document.
    pub fn predictive(&self, _doc: &[usize]) -> anyhow::Result<f64> {
        bail!("held-out predictive probability is not supported")
    }

    pub fn state(&self) -> &PartitionState {
        &self.state
    }

    pub fn options(&self) -> &HdpOptions {
        &self.options
    }

    /// Sweeps completed so far
    pub fn num_sweeps(&self) -> usize {
        self.num_sweeps
    }

    /// Write the seating arrangement as JSON.
    pub fn save_state(&self, path: &str) -> anyhow::Result<()> {
        let mut buf = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer(&mut buf, &self.state)?;
        buf.flush()?;
        info!("saved state to {}", path);
        Ok(())
    }
}

/// Read a seating arrangement written by `HdpLda::save_state`.
pub fn load_state(path: &str) -> anyhow::Result<PartitionState> {
    let buf = std::io::BufReader::new(std::fs::File::open(path)?);
    let state: PartitionState = serde_json::from_reader(buf)?;
    Ok(state)
}
