//! Hierarchical Dirichlet Process topic model (HDP-LDA).
//!
//! Words ("customers") are seated at per-document tables, and tables
//! are served global dishes (topics), following the Chinese restaurant
//! franchise. Inference is collapsed Gibbs sampling: each sweep reseats
//! every customer and then re-draws the dish of every table, with
//! tables and topics born and destroyed along the way.
//!
//! # Model
//!
//! Symmetric Dirichlet(`base`) prior on each dish's word distribution,
//! document-level concentration `alpha`, franchise-level concentration
//! `gamma`.
//!
//! # References
//!
//! Teh, Jordan, Beal & Blei (2006). "Hierarchical Dirichlet Processes."
//! JASA 101(476).

/// Seating arrangement and sufficient statistics
pub mod partition;

/// Dirichlet-multinomial predictive likelihoods
pub mod predictive;

/// Chinese restaurant franchise reseating steps
pub mod crf;

/// Sweep loop and run configuration
pub mod inference;

/// Posterior-mean word distributions per topic
pub mod summary;

/// Term <-> id mapping with stopword filtering
pub mod vocabulary;

/// Corpus loading (one document per line)
pub mod corpus;

#[cfg(test)]
mod test;

pub use inference::{HdpLda, HdpOptions};
pub use partition::PartitionState;
pub use summary::TopicWordDist;
pub use vocabulary::Vocabulary;
