//! Spliced alignment of cDNA against genomic DNA by pair hidden Markov models.
//!
//! A parameter file ([`model`]) describes the pair HMM. [`viterbi`] decodes
//! the best path of a cDNA through a (seed-restricted) genomic window, and
//! [`forward`] sums over every path. [`align`] tries both orientations of
//! the cDNA and of the gene and prints the winner, and [`estimate`] fits a
//! parameter file to alignments produced this way.
#[macro_use]
extern crate log;
pub mod align;
pub mod error;
pub mod estimate;
pub mod fasta;
pub mod feature;
pub mod forward;
pub mod gen_seq;
pub mod intern;
pub mod model;
pub mod padseq;
pub mod recursion;
pub mod score;
pub mod seed;
pub mod tbtree;
pub mod trellis;
pub mod viterbi;
pub use align::{AlignConfig, AlignmentMode, SpliceMode, StrandedModels};
pub use error::{PairError, Result};
pub use estimate::{EstimateConfig, Hacks};
pub use model::Hmm;
