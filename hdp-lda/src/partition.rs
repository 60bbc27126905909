//! Seating arrangement for the Chinese restaurant franchise.
//!
//! Tracks three nested assignments:
//!
//! ```text
//! customer (j, i) -> table (j, t) -> dish k
//! ```
//!
//! together with the count caches the sampler reads:
//! table occupancy `n_jt`, dish word counts `n_kv`, dish totals `n_k`
//! and the number of tables serving each dish `m_k`.
//!
//! All updates are incremental. `check_invariants` recomputes
//! everything from the raw assignments for verification.

use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

/// Id allocator with smallest-free-first reuse.
///
/// Ids are dense indices into the owner's storage. A released id goes
/// back to the free list and is handed out again before the id space
/// grows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdPool {
    /// Number of ids ever allocated (storage length)
    capacity: usize,
    active: BTreeSet<usize>,
    free: BTreeSet<usize>,
}

impl IdPool {
    /// Take the smallest free id, or append a new one.
    pub fn acquire(&mut self) -> usize {
        let id = match self.free.pop_first() {
            Some(id) => id,
            None => {
                self.capacity += 1;
                self.capacity - 1
            }
        };
        self.active.insert(id);
        id
    }

    /// Return an active id to the free list.
    pub fn release(&mut self, id: usize) {
        let removed = self.active.remove(&id);
        debug_assert!(removed, "releasing inactive id {}", id);
        self.free.insert(id);
    }

    #[inline]
    pub fn contains(&self, id: usize) -> bool {
        self.active.contains(&id)
    }

    /// Active ids in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.active.iter().copied()
    }

    /// Number of active ids
    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of ids ever allocated, active or free
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Word-id -> count map of one dish.
pub type WordCounts = HashMap<usize, usize>;

/// V must be positive and every word id must fall in `0..V`.
fn check_vocabulary(docs: &[Vec<usize>], num_words: usize) -> anyhow::Result<()> {
    ensure!(num_words > 0, "vocabulary size must be positive");

    for (j, doc) in docs.iter().enumerate() {
        if let Some(&v) = doc.iter().find(|&&v| v >= num_words) {
            bail!(
                "document {} has word id {} outside the vocabulary (V = {})",
                j,
                v,
                num_words
            );
        }
    }
    Ok(())
}

/// Full state of the franchise.
///
/// Indices: `j` document, `i` word position, `t` table (local to `j`),
/// `k` dish, `v` vocabulary id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionState {
    /// Vocabulary size V
    num_words: usize,
    /// `x_ji`: word id of each customer
    words: Vec<Vec<usize>>,
    /// `t_ji`: table of each customer
    table_of: Vec<Vec<usize>>,
    /// `k_jt`: dish of each table
    dish_of: Vec<Vec<usize>>,
    /// `n_jt`: occupancy of each table
    table_size: Vec<Vec<usize>>,
    /// active table ids per document
    tables: Vec<IdPool>,
    /// active dish ids
    topics: IdPool,
    /// `n_kv`: word counts per dish
    topic_word: Vec<WordCounts>,
    /// `n_k`: number of customers eating each dish
    topic_size: Vec<usize>,
    /// `m_k`: number of tables serving each dish
    topic_tables: Vec<usize>,
    /// `m`: total number of active tables in the franchise
    num_tables: usize,
}

impl PartitionState {
    /// Seat every document at a single table, all tables sharing dish 0.
    ///
    /// * `docs` - word ids per document
    /// * `num_words` - vocabulary size V (every id must be `< V`)
    ///
    /// Empty documents open no table. If no document has a word, no
    /// dish is opened either.
    pub fn new(docs: Vec<Vec<usize>>, num_words: usize) -> anyhow::Result<Self> {
        check_vocabulary(&docs, num_words)?;

        let nd = docs.len();
        let mut topics = IdPool::default();
        let mut topic_word = vec![];
        let mut topic_size = vec![];
        let mut topic_tables = vec![];

        let initial_topic = if docs.iter().any(|d| !d.is_empty()) {
            let k = topics.acquire();
            topic_word.push(WordCounts::new());
            topic_size.push(0);
            topic_tables.push(0);
            Some(k)
        } else {
            None
        };

        let mut table_of = Vec::with_capacity(nd);
        let mut dish_of = Vec::with_capacity(nd);
        let mut table_size = Vec::with_capacity(nd);
        let mut tables = Vec::with_capacity(nd);
        let mut num_tables = 0;

        for doc in docs.iter() {
            let mut pool = IdPool::default();
            match initial_topic {
                Some(k) if !doc.is_empty() => {
                    let t = pool.acquire();
                    debug_assert_eq!(t, 0);
                    for &v in doc {
                        *topic_word[k].entry(v).or_insert(0) += 1;
                    }
                    topic_size[k] += doc.len();
                    topic_tables[k] += 1;
                    num_tables += 1;
                    table_of.push(vec![t; doc.len()]);
                    dish_of.push(vec![k]);
                    table_size.push(vec![doc.len()]);
                }
                _ => {
                    table_of.push(vec![]);
                    dish_of.push(vec![]);
                    table_size.push(vec![]);
                }
            }
            tables.push(pool);
        }

        Ok(PartitionState {
            num_words,
            words: docs,
            table_of,
            dish_of,
            table_size,
            tables,
            topics,
            topic_word,
            topic_size,
            topic_tables,
            num_tables,
        })
    }

    /////////////////
    // read access //
    /////////////////

    #[inline]
    pub fn num_words(&self) -> usize {
        self.num_words
    }

    #[inline]
    pub fn num_docs(&self) -> usize {
        self.words.len()
    }

    #[inline]
    pub fn doc_len(&self, j: usize) -> usize {
        self.words[j].len()
    }

    /// Word ids of document `j`
    pub fn doc(&self, j: usize) -> &[usize] {
        &self.words[j]
    }

    #[inline]
    pub fn word(&self, j: usize, i: usize) -> usize {
        self.words[j][i]
    }

    #[inline]
    pub fn table_of(&self, j: usize, i: usize) -> usize {
        self.table_of[j][i]
    }

    #[inline]
    pub fn topic_of_table(&self, j: usize, t: usize) -> usize {
        self.dish_of[j][t]
    }

    #[inline]
    pub fn table_size(&self, j: usize, t: usize) -> usize {
        self.table_size[j][t]
    }

    /// Active tables of document `j` in ascending id order
    pub fn active_tables(&self, j: usize) -> impl Iterator<Item = usize> + '_ {
        self.tables[j].iter()
    }

    pub fn is_active_table(&self, j: usize, t: usize) -> bool {
        self.tables[j].contains(t)
    }

    /// Active dishes in ascending id order
    pub fn active_topics(&self) -> impl Iterator<Item = usize> + '_ {
        self.topics.iter()
    }

    pub fn is_active_topic(&self, k: usize) -> bool {
        self.topics.contains(k)
    }

    /// Total number of active tables across all documents
    #[inline]
    pub fn num_active_tables(&self) -> usize {
        self.num_tables
    }

    pub fn num_active_topics(&self) -> usize {
        self.topics.len()
    }

    /// Number of dish slots ever allocated (active or free)
    pub fn topic_capacity(&self) -> usize {
        self.topics.capacity()
    }

    /// Number of table slots ever allocated in document `j`
    pub fn table_capacity(&self, j: usize) -> usize {
        self.tables[j].capacity()
    }

    #[inline]
    pub fn topic_size(&self, k: usize) -> usize {
        self.topic_size[k]
    }

    #[inline]
    pub fn topic_tables(&self, k: usize) -> usize {
        self.topic_tables[k]
    }

    #[inline]
    pub fn topic_word(&self, k: usize, v: usize) -> usize {
        self.topic_word[k].get(&v).copied().unwrap_or(0)
    }

    pub fn topic_word_counts(&self, k: usize) -> &WordCounts {
        &self.topic_word[k]
    }

    /// Word ids of the customers sitting at table `(j, t)`
    pub fn table_words(&self, j: usize, t: usize) -> Vec<usize> {
        self.words[j]
            .iter()
            .zip(self.table_of[j].iter())
            .filter(|(_, &tt)| tt == t)
            .map(|(&v, _)| v)
            .collect()
    }

    ////////////////////////
    // seating primitives //
    ////////////////////////

    /// Remove customer `(j, i)` from its table.
    ///
    /// Counts are decremented first. If the table becomes empty it is
    /// closed; if that leaves its dish without tables, the dish is
    /// closed too. The customer's table pointer is stale until the next
    /// `seat_customer`.
    pub fn unseat_customer(&mut self, j: usize, i: usize) {
        let v = self.words[j][i];
        let t = self.table_of[j][i];
        let k = self.dish_of[j][t];

        self.remove_word(k, v);
        self.topic_size[k] -= 1;
        self.table_size[j][t] -= 1;

        if self.table_size[j][t] == 0 {
            self.tables[j].release(t);
            self.topic_tables[k] -= 1;
            self.num_tables -= 1;

            if self.topic_tables[k] == 0 {
                self.remove_topic(k);
            }
        }
    }

    /// Seat customer `(j, i)` at the active table `t`.
    pub fn seat_customer(&mut self, j: usize, i: usize, t: usize) {
        debug_assert!(self.tables[j].contains(t), "table ({}, {}) is closed", j, t);
        let v = self.words[j][i];
        let k = self.dish_of[j][t];

        self.table_of[j][i] = t;
        self.table_size[j][t] += 1;
        self.topic_size[k] += 1;
        *self.topic_word[k].entry(v).or_insert(0) += 1;
    }

    /// Open an empty table in document `j`, reusing the smallest free id.
    ///
    /// The table has no dish until `assign_table` is called.
    pub fn create_table(&mut self, j: usize) -> usize {
        let t = self.tables[j].acquire();
        if t == self.table_size[j].len() {
            self.table_size[j].push(0);
            self.dish_of[j].push(0);
        } else {
            self.table_size[j][t] = 0;
        }
        t
    }

    /// Serve dish `k` at the freshly opened table `(j, t)`.
    pub fn assign_table(&mut self, j: usize, t: usize, k: usize) {
        debug_assert_eq!(self.table_size[j][t], 0);
        self.dish_of[j][t] = k;
        self.topic_tables[k] += 1;
        self.num_tables += 1;
    }

    /// Open a new dish with zero counts, reusing the smallest free id.
    pub fn create_topic(&mut self) -> usize {
        let k = self.topics.acquire();
        if k == self.topic_size.len() {
            self.topic_word.push(WordCounts::new());
            self.topic_size.push(0);
            self.topic_tables.push(0);
        } else {
            debug_assert!(self.topic_word[k].is_empty());
            self.topic_size[k] = 0;
            self.topic_tables[k] = 0;
        }
        k
    }

    /// Take table `(j, t)` off its dish, returning the old dish.
    ///
    /// If the dish keeps other tables, the table's words are subtracted
    /// from it; otherwise the dish is closed and its word counts are
    /// dropped as a whole.
    pub fn detach_table(&mut self, j: usize, t: usize) -> usize {
        let k = self.dish_of[j][t];
        let n_jt = self.table_size[j][t];

        self.topic_tables[k] -= 1;
        self.topic_size[k] -= n_jt;

        if self.topic_tables[k] > 0 {
            for i in 0..self.words[j].len() {
                if self.table_of[j][i] == t {
                    let v = self.words[j][i];
                    self.remove_word(k, v);
                }
            }
        } else {
            self.remove_topic(k);
        }
        k
    }

    /// Serve dish `k` at table `(j, t)`, adding the table's words.
    ///
    /// * `words` - word ids at the table, as returned by `table_words`
    pub fn attach_table(&mut self, j: usize, t: usize, k: usize, words: &[usize]) {
        debug_assert_eq!(words.len(), self.table_size[j][t]);
        self.dish_of[j][t] = k;
        self.topic_tables[k] += 1;
        self.topic_size[k] += words.len();
        let counts = &mut self.topic_word[k];
        for &v in words {
            *counts.entry(v).or_insert(0) += 1;
        }
    }

    fn remove_word(&mut self, k: usize, v: usize) {
        let counts = &mut self.topic_word[k];
        let n = counts.entry(v).or_insert(0);
        debug_assert!(*n > 0, "dish {} has no count for word {}", k, v);
        *n -= 1;
        if *n == 0 {
            counts.remove(&v);
        }
    }

    fn remove_topic(&mut self, k: usize) {
        debug_assert_eq!(self.topic_size[k], 0, "closing dish {} with customers", k);
        self.topic_word[k] = WordCounts::new();
        self.topics.release(k);
    }

    //////////////////
    // verification //
    //////////////////

    /// Recompute all caches from the raw assignments and compare.
    ///
    /// Returns an error describing the first inconsistency found.
    pub fn check_invariants(&self) -> anyhow::Result<()> {
        check_vocabulary(&self.words, self.num_words)?;

        let nd = self.num_docs();
        ensure!(
            self.table_of.len() == nd
                && self.dish_of.len() == nd
                && self.table_size.len() == nd
                && self.tables.len() == nd,
            "per-document arrays do not cover {} documents",
            nd
        );

        let nk = self.topic_size.len();
        let mut topic_word = vec![WordCounts::new(); nk];
        let mut topic_size = vec![0usize; nk];
        let mut topic_tables = vec![0usize; nk];
        let mut num_tables = 0;

        for j in 0..self.num_docs() {
            ensure!(
                self.table_of[j].len() == self.words[j].len(),
                "document {}: {} table pointers for {} words",
                j,
                self.table_of[j].len(),
                self.words[j].len()
            );

            let mut occupancy = vec![0usize; self.table_size[j].len()];
            for (i, &t) in self.table_of[j].iter().enumerate() {
                ensure!(
                    self.tables[j].contains(t),
                    "customer ({}, {}) sits at closed table {}",
                    j,
                    i,
                    t
                );
                occupancy[t] += 1;
            }

            let mut seated = 0;
            for t in self.tables[j].iter() {
                ensure!(
                    occupancy[t] > 0 && occupancy[t] == self.table_size[j][t],
                    "table ({}, {}): cached size {} but {} customers",
                    j,
                    t,
                    self.table_size[j][t],
                    occupancy[t]
                );
                seated += occupancy[t];

                let k = self.dish_of[j][t];
                ensure!(
                    self.topics.contains(k),
                    "table ({}, {}) serves closed dish {}",
                    j,
                    t,
                    k
                );
                topic_tables[k] += 1;
                num_tables += 1;
            }
            ensure!(
                seated == self.words[j].len(),
                "document {}: {} customers seated out of {}",
                j,
                seated,
                self.words[j].len()
            );

            for (i, &v) in self.words[j].iter().enumerate() {
                let k = self.dish_of[j][self.table_of[j][i]];
                *topic_word[k].entry(v).or_insert(0) += 1;
                topic_size[k] += 1;
            }
        }

        ensure!(
            num_tables == self.num_tables,
            "cached table count {} but {} active tables",
            self.num_tables,
            num_tables
        );

        for k in 0..nk {
            if self.topics.contains(k) {
                ensure!(
                    topic_tables[k] > 0 && topic_tables[k] == self.topic_tables[k],
                    "dish {}: cached {} tables but {} serve it",
                    k,
                    self.topic_tables[k],
                    topic_tables[k]
                );
                ensure!(
                    topic_size[k] == self.topic_size[k],
                    "dish {}: cached {} customers but {} eat it",
                    k,
                    self.topic_size[k],
                    topic_size[k]
                );
                let cached_sum: usize = self.topic_word[k].values().sum();
                ensure!(
                    cached_sum == self.topic_size[k],
                    "dish {}: word counts sum to {} but total is {}",
                    k,
                    cached_sum,
                    self.topic_size[k]
                );
                ensure!(
                    topic_word[k] == self.topic_word[k],
                    "dish {}: word counts differ from recomputed",
                    k
                );
            } else {
                ensure!(
                    self.topic_word[k].is_empty(),
                    "closed dish {} still holds word counts",
                    k
                );
                ensure!(
                    topic_tables[k] == 0,
                    "closed dish {} is served at {} tables",
                    k,
                    topic_tables[k]
                );
            }
        }

        Ok(())
    }

    /// Multi-line rendering of every assignment array and cache.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let topics: Vec<usize> = self.topics.iter().collect();
        let tables: Vec<Vec<usize>> = self.tables.iter().map(|p| p.iter().collect()).collect();
        let n_kv: Vec<Vec<(usize, usize)>> = self
            .topic_word
            .iter()
            .map(|c| {
                let mut kv: Vec<(usize, usize)> = c.iter().map(|(&v, &n)| (v, n)).collect();
                kv.sort_unstable();
                kv
            })
            .collect();

        let _ = writeln!(out, "t_ji: {:?}", self.table_of);
        let _ = writeln!(out, "k_jt: {:?}", self.dish_of);
        let _ = writeln!(out, "n_kv: {:?}", n_kv);
        let _ = writeln!(out, "n_jt: {:?}", self.table_size);
        let _ = writeln!(out, "n_k: {:?}", self.topic_size);
        let _ = writeln!(out, "m_k: {:?}", self.topic_tables);
        let _ = writeln!(out, "tables: {:?}", tables);
        let _ = writeln!(out, "topics: {:?}", topics);
        out
    }
}
