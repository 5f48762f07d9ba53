//! # kmer-seed
//!
//! 面向种子-延伸式序列搜索的 k-mer 倒排索引。
//!
//! 本 crate 提供：
//!
//! - **索引构建**：在参考序列的每条 contig 上滑动 k-mer 窗口，可选 minimizer 稀疏化，
//!   建立 key → 位置列表 的倒排表（contig 间并行）
//! - **持久化**：整个索引保存为单个自描述文件，加载时做结构与一致性校验
//! - **查询**：按 contig 查询 k-mer / minimizer 的出现位置
//! - **打分**：带提前终止的 Hamming 距离、线性间隙全局比对（支持通配符 `.`）
//!
//! ## 快速示例
//!
//! ```rust
//! use kmer_seed::index::{IndexOpt, IndexParams, KmerIndex};
//! use kmer_seed::io::Reference;
//! use kmer_seed::align;
//!
//! let reference = Reference::from_sequences("demo", [("chr1", "ACGTACGTAGCTGATCGTAG")]).unwrap();
//! let params = IndexParams::new(5);
//! let mut index = KmerIndex::new(params.clone()).unwrap();
//! index.build(&reference, &IndexOpt::new(params)).unwrap();
//!
//! assert_eq!(index.query("chr1", b"ACGTA").unwrap(), &[0, 4]);
//! assert_eq!(align::global_align(b"A.GT", b"ACGT", 1, 1), 0);
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — FASTA 解析与 [`io::SequenceSource`] 参考序列接口
//! - [`index`] — k-mer 枚举、minimizer 选择、倒排索引与持久化
//! - [`align`] — Hamming 距离、全局比对与种子搜索
//! - [`util`] — 碱基归一化、反向互补、规范形式
//! - [`error`] — 统一错误类型

pub mod align;
pub mod error;
pub mod index;
pub mod io;
pub mod util;

pub use error::{IndexError, Result};
