use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::kmer::{KmerCursor, DEFAULT_BATCH};
use super::minimizer::MinimizerSelector;
use crate::error::{IndexError, Result};
use crate::io::SequenceSource;
use crate::util::dna;

/// 含模糊碱基（ACGT 以外）的 k-mer 如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AmbiguityPolicy {
    /// 不建索引（默认）
    #[default]
    Skip,
    /// 原样建索引，N 与其他碱基一样参与比较
    Keep,
}

/// 决定索引内容的参数，随索引一起持久化
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    pub k: usize,
    /// 为 None 时不做稀疏化，所有 k-mer 均入索引
    pub minimizer_width: Option<usize>,
    /// 插入前将 key 替换为正反链规范形式
    pub canonical: bool,
    pub ambiguity: AmbiguityPolicy,
}

impl IndexParams {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            minimizer_width: None,
            canonical: false,
            ambiguity: AmbiguityPolicy::Skip,
        }
    }

    pub fn with_minimizer_width(mut self, w: Option<usize>) -> Self {
        self.minimizer_width = w;
        self
    }

    pub fn with_canonical(mut self, canonical: bool) -> Self {
        self.canonical = canonical;
        self
    }

    pub fn with_ambiguity(mut self, ambiguity: AmbiguityPolicy) -> Self {
        self.ambiguity = ambiguity;
        self
    }

    /// 索引中 key 的长度：稀疏化时为 w，否则为 k
    pub fn key_len(&self) -> usize {
        self.minimizer_width.unwrap_or(self.k)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(IndexError::invalid("k", self.k, "k-mer length must be positive"));
        }
        if let Some(w) = self.minimizer_width {
            if w == 0 || w > self.k {
                return Err(IndexError::invalid(
                    "minimizer_width",
                    w,
                    format!("must satisfy 0 < w <= k (k = {})", self.k),
                ));
            }
        }
        Ok(())
    }
}

/// 构建选项，类似比对阶段的 AlignOpt
#[derive(Debug, Clone)]
pub struct IndexOpt {
    pub params: IndexParams,
    /// rayon 线程数，0 表示使用 rayon 默认值
    pub threads: usize,
    /// 每处理多少个 offset 打印一次进度，0 表示关闭
    pub progress_every: usize,
    /// 每次从 SequenceSource 取的碱基数
    pub batch_size: usize,
}

impl IndexOpt {
    pub fn new(params: IndexParams) -> Self {
        Self {
            params,
            threads: 0,
            progress_every: 1_000_000,
            batch_size: DEFAULT_BATCH,
        }
    }
}

/// 索引文件中的构建元信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 单条 contig 的倒排表：key → 严格递增的位置列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContigIndex {
    pub name: String,
    pub len: u64,
    entries: BTreeMap<Vec<u8>, Vec<u32>>,
}

impl ContigIndex {
    pub fn new(name: impl Into<String>, len: u64) -> Self {
        Self {
            name: name.into(),
            len,
            entries: BTreeMap::new(),
        }
    }

    /// 追加一次出现；同一 key 的位置必须严格递增，否则返回 InvalidParameter
    pub fn insert(&mut self, key: &[u8], pos: u32) -> Result<()> {
        if let Some(list) = self.entries.get_mut(key) {
            if let Some(&last) = list.last() {
                if pos <= last {
                    return Err(IndexError::invalid(
                        "pos",
                        pos,
                        format!("contig '{}': positions must be strictly increasing (last {})", self.name, last),
                    ));
                }
            }
            list.push(pos);
        } else {
            self.entries.insert(key.to_vec(), vec![pos]);
        }
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> &[u32] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// 按 key 字典序遍历
    pub fn entries(&self) -> impl Iterator<Item = (&[u8], &[u32])> {
        self.entries.iter().map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn num_keys(&self) -> usize {
        self.entries.len()
    }

    pub fn num_positions(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// 一致性校验：key 长度、位置有序、位置不越界
    pub(crate) fn check(&self, key_len: usize) -> std::result::Result<(), String> {
        for (key, positions) in &self.entries {
            if key.len() != key_len {
                return Err(format!(
                    "contig '{}': key of length {} (expected {})",
                    self.name,
                    key.len(),
                    key_len
                ));
            }
            if positions.is_empty() {
                return Err(format!("contig '{}': empty position list", self.name));
            }
            if positions.windows(2).any(|w| w[0] >= w[1]) {
                return Err(format!("contig '{}': positions not strictly increasing", self.name));
            }
            let last = positions[positions.len() - 1] as u64;
            if last + key_len as u64 > self.len {
                return Err(format!(
                    "contig '{}': position {} beyond contig length {}",
                    self.name, last, self.len
                ));
            }
        }
        Ok(())
    }
}

/// 索引生命周期：Empty → Building → Built（只读）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Empty,
    Building,
    Built,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    pub contigs: usize,
    pub keys: usize,
    pub positions: usize,
}

/// 全局倒排索引，独占所有 contig 的倒排表。
///
/// 只有 Built 状态下可以查询与保存；Built 之后索引只读，可被多个线程并发查询。
/// 参考序列或 k 变化时应重新构建，而不是修改已有索引。
#[derive(Debug)]
pub struct KmerIndex {
    params: IndexParams,
    state: IndexState,
    source: String,
    meta: IndexMeta,
    contigs: Vec<ContigIndex>,
    by_name: HashMap<String, usize>,
}

impl KmerIndex {
    pub fn new(params: IndexParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            state: IndexState::Empty,
            source: String::new(),
            meta: IndexMeta::default(),
            contigs: Vec::new(),
            by_name: HashMap::new(),
        })
    }

    /// 由已校验的各部分直接组装为 Built 索引（加载文件时使用）
    pub(crate) fn from_parts(
        params: IndexParams,
        source: String,
        meta: IndexMeta,
        contigs: Vec<ContigIndex>,
    ) -> Result<Self> {
        let mut idx = Self::new(params)?;
        idx.source = source;
        idx.meta = meta;
        for c in contigs {
            idx.insert_contig(c)?;
        }
        idx.finish()?;
        Ok(idx)
    }

    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    pub fn k(&self) -> usize {
        self.params.k
    }

    pub fn key_len(&self) -> usize {
        self.params.key_len()
    }

    pub fn state(&self) -> IndexState {
        self.state
    }

    pub fn source_descriptor(&self) -> &str {
        &self.source
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    pub(crate) fn ensure_built(&self) -> Result<()> {
        match self.state {
            IndexState::Built => Ok(()),
            _ => Err(IndexError::NotBuilt),
        }
    }

    /// 手动加入一条已构建好的 contig 倒排表（Empty/Building → Building）。
    ///
    /// 内容与索引参数不一致（key 长度不符、位置无序或越界）时拒绝，
    /// 保证 Built 索引保存后总能重新加载。
    pub fn insert_contig(&mut self, contig: ContigIndex) -> Result<()> {
        if self.state == IndexState::Built {
            return Err(IndexError::AlreadyBuilt);
        }
        if self.by_name.contains_key(&contig.name) {
            return Err(IndexError::invalid("contig", &contig.name, "duplicate contig name"));
        }
        contig
            .check(self.key_len())
            .map_err(|reason| IndexError::invalid("contig", &contig.name, reason))?;
        self.state = IndexState::Building;
        self.by_name.insert(contig.name.clone(), self.contigs.len());
        self.contigs.push(contig);
        Ok(())
    }

    /// 结束构建，进入只读的 Built 状态
    pub fn finish(&mut self) -> Result<()> {
        if self.state == IndexState::Built {
            return Err(IndexError::AlreadyBuilt);
        }
        self.state = IndexState::Built;
        Ok(())
    }

    /// 丢弃所有已插入内容，回到 Empty
    fn clear(&mut self) {
        self.contigs.clear();
        self.by_name.clear();
        self.state = IndexState::Empty;
    }

    pub fn build<S: SequenceSource + ?Sized>(&mut self, source: &S, opt: &IndexOpt) -> Result<()> {
        self.build_with_cancel(source, opt, None)
    }

    /// 从参考序列构建全部 contig 的倒排表。
    ///
    /// 各 contig 相互独立，在 rayon 线程池中并行构建，结果按参考中的顺序合并。
    /// 任一 contig 失败（或被取消）时丢弃全部结果，索引回到 Empty。
    pub fn build_with_cancel<S: SequenceSource + ?Sized>(
        &mut self,
        source: &S,
        opt: &IndexOpt,
        cancel: Option<&AtomicBool>,
    ) -> Result<()> {
        match self.state {
            IndexState::Built => return Err(IndexError::AlreadyBuilt),
            IndexState::Building => {
                return Err(IndexError::invalid("state", "Building", "build() requires an empty index"))
            }
            IndexState::Empty => {}
        }
        if opt.params != self.params {
            return Err(IndexError::invalid(
                "params",
                format!("{:?}", opt.params),
                "build options do not match the index parameters",
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new().num_threads(opt.threads).build()?;
        self.state = IndexState::Building;
        self.source = source.descriptor();

        let names = source.contig_names();
        info!(
            "indexing {} contig(s) from '{}' with k={}{}",
            names.len(),
            self.source,
            self.params.k,
            self.params
                .minimizer_width
                .map(|w| format!(", minimizer width {}", w))
                .unwrap_or_default()
        );

        let params = &self.params;
        let built: Result<Vec<ContigIndex>> = pool.install(|| {
            names
                .par_iter()
                .map(|name| build_contig(source, name, params, opt, cancel))
                .collect()
        });

        let contigs = match built {
            Ok(contigs) => contigs,
            Err(e) => {
                self.clear();
                return Err(e);
            }
        };
        for c in contigs {
            if let Err(e) = self.insert_contig(c) {
                self.clear();
                return Err(e);
            }
        }
        self.finish()?;
        let stats = self.stats();
        info!(
            "index built: {} contig(s), {} distinct keys, {} positions",
            stats.contigs, stats.keys, stats.positions
        );
        Ok(())
    }

    pub fn contigs(&self) -> &[ContigIndex] {
        &self.contigs
    }

    pub fn contig(&self, name: &str) -> Result<&ContigIndex> {
        self.by_name
            .get(name)
            .map(|&i| &self.contigs[i])
            .ok_or_else(|| IndexError::UnknownContig(name.to_string()))
    }

    pub fn contig_names(&self) -> impl Iterator<Item = &str> {
        self.contigs.iter().map(|c| c.name.as_str())
    }

    /// 归一化查询 key，规范化索引下同时取规范形式
    fn lookup_key(&self, key: &[u8]) -> Vec<u8> {
        let norm = dna::normalize_seq(key);
        if self.params.canonical {
            dna::canonical(&norm).into_owned()
        } else {
            norm
        }
    }

    /// 在指定 contig 中查询 key 的位置列表；key 不存在时返回空列表。
    ///
    /// key 长度必须等于索引的 key 长度（非稀疏为 k，稀疏为 w）。
    pub fn query(&self, contig: &str, key: &[u8]) -> Result<&[u32]> {
        self.ensure_built()?;
        let c = self.contig(contig)?;
        let key_len = self.key_len();
        if key.len() != key_len {
            return Err(IndexError::invalid(
                "kmer",
                String::from_utf8_lossy(key),
                format!("length {} does not match index key length {}", key.len(), key_len),
            ));
        }
        Ok(c.get(&self.lookup_key(key)))
    }

    /// 以长度为 k 的 k-mer 取种子候选位置（k-mer 起点）。
    ///
    /// 非稀疏索引等同于 `query`；稀疏索引先选出该 k-mer 的 minimizer，
    /// 查询后按其在 k-mer 内的偏移回推 k-mer 起点，越出 contig 的位置丢弃。
    /// 稀疏索引返回的是待验证的候选，不保证精确匹配。
    pub fn seed_hits(&self, contig: &str, kmer: &[u8]) -> Result<Vec<u32>> {
        let Some(w) = self.params.minimizer_width else {
            return Ok(self.query(contig, kmer)?.to_vec());
        };
        self.ensure_built()?;
        let c = self.contig(contig)?;
        let k = self.params.k;
        if kmer.len() != k {
            return Err(IndexError::invalid(
                "kmer",
                String::from_utf8_lossy(kmer),
                format!("length {} does not match k = {}", kmer.len(), k),
            ));
        }
        let norm = dna::normalize_seq(kmer);
        let mut sel = MinimizerSelector::new(k, w, self.params.canonical)?;
        let (sub, minimizer) = sel.select(0, &norm)?;
        let hits = c
            .get(minimizer)
            .iter()
            .filter_map(|&p| (p as usize).checked_sub(sub))
            .filter(|&start| (start + k) as u64 <= c.len)
            .map(|start| start as u32)
            .collect();
        Ok(hits)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            contigs: self.contigs.len(),
            keys: self.contigs.iter().map(ContigIndex::num_keys).sum(),
            positions: self.contigs.iter().map(ContigIndex::num_positions).sum(),
        }
    }
}

fn check_cancel(cancel: Option<&AtomicBool>) -> Result<()> {
    match cancel {
        Some(flag) if flag.load(Ordering::Relaxed) => Err(IndexError::Cancelled),
        _ => Ok(()),
    }
}

/// 单条 contig 的构建：offset 严格递增地处理，位置列表天然有序
fn build_contig<S: SequenceSource + ?Sized>(
    source: &S,
    name: &str,
    params: &IndexParams,
    opt: &IndexOpt,
    cancel: Option<&AtomicBool>,
) -> Result<ContigIndex> {
    check_cancel(cancel)?;
    let len = source.contig_len(name)?;
    if len > u32::MAX as usize {
        return Err(IndexError::invalid(
            "contig_len",
            len,
            format!("contig '{}' is too long for 32-bit positions", name),
        ));
    }
    let mut contig = ContigIndex::new(name, len as u64);
    if len < params.k {
        warn!("contig '{}' ({} bp) is shorter than k={}, nothing indexed", name, len, params.k);
        return Ok(contig);
    }

    info!("indexing {} ({} bp)", name, len);
    let mut cursor = KmerCursor::new(source, name, params.k)?.with_batch(opt.batch_size);
    let mut selector = match params.minimizer_width {
        Some(w) => Some(MinimizerSelector::new(params.k, w, params.canonical)?),
        None => None,
    };
    let total = cursor.len();
    let batch = opt.batch_size.max(1);
    let mut skipped = 0usize;

    while let Some((off, kmer)) = cursor.next_kmer()? {
        if off != 0 {
            if off % batch == 0 {
                check_cancel(cancel)?;
            }
            if opt.progress_every != 0 && off % opt.progress_every == 0 {
                info!("{}: processed {} / {} k-mers", name, off, total);
            }
        }
        if params.ambiguity == AmbiguityPolicy::Skip && dna::first_ambiguous(kmer).is_some() {
            skipped += 1;
            continue;
        }
        match selector.as_mut() {
            Some(sel) => {
                if let Some((pos, m)) = sel.push(off, kmer)? {
                    contig.insert(m, pos as u32)?;
                }
            }
            None if params.canonical => contig.insert(&dna::canonical(kmer), off as u32)?,
            None => contig.insert(kmer, off as u32)?,
        }
    }

    debug!(
        "{}: {} k-mers, {} skipped as ambiguous, {} distinct keys",
        name,
        total,
        skipped,
        contig.num_keys()
    );
    Ok(contig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Reference;

    fn reference() -> Reference {
        Reference::from_sequences(
            "mem",
            [("chr1", "ACGTACGTTGCA"), ("chr2", "GGGGCCCCAAAA"), ("chr3", "ACNGTACG")],
        )
        .unwrap()
    }

    fn built(params: IndexParams) -> KmerIndex {
        let mut idx = KmerIndex::new(params.clone()).unwrap();
        let mut opt = IndexOpt::new(params);
        opt.threads = 2;
        opt.batch_size = 3;
        idx.build(&reference(), &opt).unwrap();
        idx
    }

    #[test]
    fn every_offset_indexed_once() {
        let idx = built(IndexParams::new(4));
        let c = idx.contig("chr1").unwrap();
        let mut all: Vec<u32> = c.entries().flat_map(|(_, p)| p.iter().copied()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..=8).collect::<Vec<u32>>());
        assert_eq!(idx.query("chr1", b"ACGT").unwrap(), &[0, 4]);
        assert_eq!(idx.query("chr1", b"acgt").unwrap(), &[0, 4]);
        assert!(idx.query("chr1", b"TTTT").unwrap().is_empty());
    }

    #[test]
    fn ambiguous_kmers_skipped_by_default() {
        let idx = built(IndexParams::new(3));
        let c = idx.contig("chr3").unwrap();
        // ACNGTACG：含 N 的 ACN/CNG/NGT 被跳过
        assert_eq!(c.num_positions(), 3);
        assert!(idx.query("chr3", b"CNG").unwrap().is_empty());

        let keep = built(IndexParams::new(3).with_ambiguity(AmbiguityPolicy::Keep));
        assert_eq!(keep.contig("chr3").unwrap().num_positions(), 6);
        assert_eq!(keep.query("chr3", b"CNG").unwrap(), &[1]);
    }

    #[test]
    fn canonical_index_is_strand_independent() {
        let idx = built(IndexParams::new(4).with_canonical(true));
        // chr2 中的 CCAA 与 TTGG 互为反向互补
        assert_eq!(idx.query("chr2", b"TTGG").unwrap(), idx.query("chr2", b"CCAA").unwrap());
        assert_eq!(idx.query("chr2", b"CCAA").unwrap(), &[6]);
    }

    #[test]
    fn minimizer_index_and_seed_hits() {
        let idx = built(IndexParams::new(6).with_minimizer_width(Some(3)));
        assert_eq!(idx.key_len(), 3);
        // key 长度必须为 w
        assert!(matches!(
            idx.query("chr1", b"ACGTAC"),
            Err(IndexError::InvalidParameter { name: "kmer", .. })
        ));
        // ACGTACGTTGCA 中位置 0 和 4 的 ACG 被选为 minimizer
        assert_eq!(idx.query("chr1", b"ACG").unwrap(), &[0, 4]);
        let hits = idx.seed_hits("chr1", b"CGTACG").unwrap();
        // CGTACG 的 minimizer ACG 位于其偏移 3，回推得到 1
        assert_eq!(hits, vec![1]);
    }

    #[test]
    fn lifecycle_is_explicit() {
        let params = IndexParams::new(4);
        let mut idx = KmerIndex::new(params.clone()).unwrap();
        assert_eq!(idx.state(), IndexState::Empty);
        assert!(matches!(idx.query("chr1", b"ACGT"), Err(IndexError::NotBuilt)));

        idx.insert_contig(ContigIndex::new("x", 10)).unwrap();
        assert_eq!(idx.state(), IndexState::Building);
        assert!(matches!(idx.query("x", b"ACGT"), Err(IndexError::NotBuilt)));
        idx.finish().unwrap();
        assert_eq!(idx.state(), IndexState::Built);
        assert!(idx.query("x", b"ACGT").unwrap().is_empty());
        assert!(matches!(idx.insert_contig(ContigIndex::new("y", 1)), Err(IndexError::AlreadyBuilt)));
        assert!(matches!(
            idx.build(&reference(), &IndexOpt::new(params)),
            Err(IndexError::AlreadyBuilt)
        ));
    }

    #[test]
    fn insert_refuses_unordered_positions() {
        let mut c = ContigIndex::new("x", 20);
        c.insert(b"ACGT", 5).unwrap();
        c.insert(b"ACGT", 9).unwrap();
        assert!(matches!(c.insert(b"ACGT", 9), Err(IndexError::InvalidParameter { name: "pos", .. })));
        assert!(matches!(c.insert(b"ACGT", 2), Err(IndexError::InvalidParameter { name: "pos", .. })));
        // 其他 key 不受影响
        c.insert(b"TTTT", 0).unwrap();
        assert_eq!(c.get(b"ACGT"), &[5, 9]);
    }

    #[test]
    fn insert_contig_checks_contents() {
        // key 长度与 k 不符
        let mut c = ContigIndex::new("x", 10);
        c.insert(b"ACG", 0).unwrap();
        let mut idx = KmerIndex::new(IndexParams::new(4)).unwrap();
        assert!(matches!(idx.insert_contig(c), Err(IndexError::InvalidParameter { name: "contig", .. })));
        assert_eq!(idx.state(), IndexState::Empty);
        assert!(idx.contigs().is_empty());

        // 位置越界：3 + 4 > 5
        let mut c = ContigIndex::new("x", 5);
        c.insert(b"ACGT", 3).unwrap();
        assert!(matches!(idx.insert_contig(c), Err(IndexError::InvalidParameter { name: "contig", .. })));

        // 稀疏索引的 key 长度为 w
        let mut sparse = KmerIndex::new(IndexParams::new(4).with_minimizer_width(Some(3))).unwrap();
        let mut c = ContigIndex::new("x", 10);
        c.insert(b"ACG", 0).unwrap();
        sparse.insert_contig(c).unwrap();
        sparse.finish().unwrap();
        assert_eq!(sparse.query("x", b"ACG").unwrap(), &[0]);

        // 合法内容可以保存并重新加载
        let mut c = ContigIndex::new("x", 10);
        c.insert(b"ACGT", 0).unwrap();
        c.insert(b"ACGT", 6).unwrap();
        idx.insert_contig(c).unwrap();
        idx.finish().unwrap();
        let mut buf = Vec::new();
        idx.save_to_writer(&mut buf).unwrap();
        let back = KmerIndex::load_from_reader(&buf[..]).unwrap();
        assert_eq!(back.query("x", b"ACGT").unwrap(), &[0, 6]);
    }

    #[test]
    fn query_errors() {
        let idx = built(IndexParams::new(4));
        assert!(matches!(idx.query("chrX", b"ACGT"), Err(IndexError::UnknownContig(_))));
        assert!(matches!(
            idx.query("chr1", b"ACG"),
            Err(IndexError::InvalidParameter { name: "kmer", .. })
        ));
    }

    #[test]
    fn cancelled_build_leaves_empty_index() {
        let params = IndexParams::new(4);
        let mut idx = KmerIndex::new(params.clone()).unwrap();
        let cancel = AtomicBool::new(true);
        let res = idx.build_with_cancel(&reference(), &IndexOpt::new(params), Some(&cancel));
        assert!(matches!(res, Err(IndexError::Cancelled)));
        assert_eq!(idx.state(), IndexState::Empty);
        assert!(idx.contigs().is_empty());
    }

    #[test]
    fn short_contig_is_kept_empty() {
        let idx = built(IndexParams::new(10));
        assert_eq!(idx.contig("chr3").unwrap().num_keys(), 0);
        assert_eq!(idx.stats().contigs, 3);
    }

    #[test]
    fn rejects_invalid_params() {
        assert!(KmerIndex::new(IndexParams::new(0)).is_err());
        assert!(KmerIndex::new(IndexParams::new(5).with_minimizer_width(Some(6))).is_err());
    }
}
