pub mod fasta;
pub mod source;

pub use source::{Reference, SequenceSource};
