//! 候选区域打分：带阈值的 Hamming 距离、线性间隙全局比对，以及基于索引的种子搜索

pub mod global;
pub mod hamming;
pub mod search;

pub use global::{global_align, global_align_path, global_align_with, CostModel, GlobalAlignment, LinearCost};
pub use hamming::{hamming_distance, hamming_distance_with};
pub use search::{search, Candidate, SearchOpt, Strand};
