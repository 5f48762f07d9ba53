//! k-mer 枚举、minimizer 稀疏化、倒排索引及其持久化

pub mod inverted;
pub mod kmer;
pub mod minimizer;
pub mod store;

pub use inverted::{
    AmbiguityPolicy, ContigIndex, IndexMeta, IndexOpt, IndexParams, IndexState, IndexStats, KmerIndex,
};
pub use kmer::KmerCursor;
pub use minimizer::MinimizerSelector;
pub use store::artifact_path;
