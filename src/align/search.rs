use std::collections::BTreeMap;

use log::debug;
use rayon::prelude::*;

use super::global::{global_align_path, LinearCost};
use super::hamming::hamming_distance_with;
use crate::error::{IndexError, Result};
use crate::index::{AmbiguityPolicy, KmerIndex};
use crate::io::SequenceSource;
use crate::util::dna;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn symbol(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchOpt {
    /// Hamming 距离阈值，候选窗口错配不超过该值即保留
    pub max_mismatches: usize,
    /// 可选的全局比对代价阈值，满足任一阈值即保留
    pub max_cost: Option<u64>,
    pub cost: LinearCost,
    /// 在查询序列上取 k-mer 种子的步长
    pub stride: usize,
    /// 同时搜索查询序列的反向互补
    pub both_strands: bool,
}

impl Default for SearchOpt {
    fn default() -> Self {
        Self {
            max_mismatches: 2,
            max_cost: None,
            cost: LinearCost::default(),
            stride: 1,
            both_strands: true,
        }
    }
}

/// 通过验证的候选区域
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub contig: String,
    /// 参考上的区间 [start, end)
    pub start: usize,
    pub end: usize,
    pub strand: Strand,
    /// 支持该窗口的种子数
    pub seeds: usize,
    pub mismatches: usize,
    pub cost: u64,
    pub cigar: String,
}

/// 一个待打分的窗口
struct Window<'a> {
    contig_rank: usize,
    contig: &'a str,
    start: usize,
    strand: Strand,
    seeds: usize,
}

/// 种子-验证式搜索：
/// 1. 在查询序列上按步长取 k-mer，用索引查种子位置；
/// 2. 由种子位置回推与查询等长的参考窗口，并去重；
/// 3. 对每个窗口计算带阈值的 Hamming 距离和全局比对代价（rayon 并行）；
/// 4. 按 (代价, 错配数, contig 顺序, 起点) 排序输出。
///
/// 查询中的通配符 `.` 保留到打分阶段：含通配符的 k-mer 不作种子，
/// Hamming 与全局比对都按 `opt.cost.wildcard` 将其视为匹配。
pub fn search<S: SequenceSource + ?Sized>(
    index: &KmerIndex,
    source: &S,
    query: &[u8],
    opt: &SearchOpt,
) -> Result<Vec<Candidate>> {
    let k = index.k();
    if query.len() < k {
        return Err(IndexError::invalid(
            "query",
            query.len(),
            format!("query is shorter than k = {}", k),
        ));
    }
    if opt.stride == 0 {
        return Err(IndexError::invalid("stride", 0, "seed stride must be positive"));
    }

    let fwd = dna::normalize_query(query);
    let rev = dna::revcomp(&fwd);
    let mut strands = vec![(Strand::Forward, fwd.as_slice())];
    if opt.both_strands {
        strands.push((Strand::Reverse, rev.as_slice()));
    }

    let mut windows: Vec<Window<'_>> = Vec::new();
    for (rank, contig) in index.contigs().iter().enumerate() {
        let src_len = source.contig_len(&contig.name)?;
        if src_len as u64 != contig.len {
            return Err(IndexError::invalid(
                "reference",
                &contig.name,
                format!("length {} differs from indexed length {}", src_len, contig.len),
            ));
        }
        for &(strand, seq) in &strands {
            let starts = collect_windows(index, &contig.name, src_len, seq, opt.stride)?;
            windows.extend(starts.into_iter().map(|(start, seeds)| Window {
                contig_rank: rank,
                contig: &contig.name,
                start,
                strand,
                seeds,
            }));
        }
    }
    debug!("{} candidate window(s) from seeds", windows.len());

    let scored: Result<Vec<Option<(usize, Candidate)>>> = windows
        .par_iter()
        .map(|win| {
            let seq = match win.strand {
                Strand::Forward => &fwd,
                Strand::Reverse => &rev,
            };
            let end = win.start + seq.len();
            let target = source.fetch(win.contig, win.start, end)?;
            let mismatches = hamming_distance_with(seq, &target, opt.max_mismatches, opt.cost.wildcard)?;
            let aln = global_align_path(seq, &target, &opt.cost);
            let keep = mismatches <= opt.max_mismatches || opt.max_cost.map_or(false, |c| aln.cost <= c);
            Ok(keep.then(|| {
                (
                    win.contig_rank,
                    Candidate {
                        contig: win.contig.to_string(),
                        start: win.start,
                        end,
                        strand: win.strand,
                        seeds: win.seeds,
                        mismatches,
                        cost: aln.cost,
                        cigar: aln.cigar,
                    },
                )
            }))
        })
        .collect();

    let mut hits: Vec<(usize, Candidate)> = scored?.into_iter().flatten().collect();
    hits.sort_by(|(ra, a), (rb, b)| {
        a.cost
            .cmp(&b.cost)
            .then(a.mismatches.cmp(&b.mismatches))
            .then(ra.cmp(rb))
            .then(a.start.cmp(&b.start))
            .then((a.strand as u8).cmp(&(b.strand as u8)))
    });
    Ok(hits.into_iter().map(|(_, c)| c).collect())
}

/// 单条 contig、单条链上的候选窗口起点 → 支持种子数
fn collect_windows(
    index: &KmerIndex,
    contig: &str,
    contig_len: usize,
    query: &[u8],
    stride: usize,
) -> Result<BTreeMap<usize, usize>> {
    let k = index.k();
    let skip_ambiguous = index.params().ambiguity == AmbiguityPolicy::Skip;
    let mut starts: BTreeMap<usize, usize> = BTreeMap::new();
    for qoff in (0..=query.len() - k).step_by(stride) {
        let kmer = &query[qoff..qoff + k];
        if kmer.contains(&dna::WILDCARD) || (skip_ambiguous && dna::first_ambiguous(kmer).is_some()) {
            continue;
        }
        for hit in index.seed_hits(contig, kmer)? {
            let Some(start) = (hit as usize).checked_sub(qoff) else {
                continue;
            };
            if start + query.len() <= contig_len {
                *starts.entry(start).or_insert(0) += 1;
            }
        }
    }
    Ok(starts)
}
