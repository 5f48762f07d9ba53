use std::collections::VecDeque;

use crate::error::{IndexError, Result};
use crate::util::dna;

/// 单调双端队列实现的 minimizer 选择器。
///
/// 对每个 k-mer，从其 `k - w + 1` 个长度为 w 的子串中选出字典序最小者，
/// 并列时取最靠左的位置。队列中保存 `(绝对位置, 子串)`，子串自前向后单调不减：
///
/// - 前端：位置已滑出当前 k-mer 的候选被弹出；
/// - 后端：新子串入队前，弹出所有**严格大于**它的候选。相等的候选保留，
///   于是较早的位置始终排在前面，实现"最左优先"。
///
/// 相邻 k-mer（offset 连续）每次只入队一个新子串，均摊 O(1)；
/// 不连续时（首个 k-mer，或被模糊碱基策略跳过的 k-mer 之后）清空队列重新填充。
/// `canonical` 开启时比较与输出均使用子串的正反链规范形式。
#[derive(Debug, Clone)]
pub struct MinimizerSelector {
    k: usize,
    w: usize,
    canonical: bool,
    window: VecDeque<(usize, Vec<u8>)>,
    last_kmer: Option<usize>,
    last_emitted: Option<usize>,
}

impl MinimizerSelector {
    pub fn new(k: usize, w: usize, canonical: bool) -> Result<Self> {
        if w == 0 || w > k {
            return Err(IndexError::invalid(
                "minimizer_width",
                w,
                format!("must satisfy 0 < w <= k (k = {})", k),
            ));
        }
        Ok(Self {
            k,
            w,
            canonical,
            window: VecDeque::with_capacity(k - w + 1),
            last_kmer: None,
            last_emitted: None,
        })
    }

    pub fn width(&self) -> usize {
        self.w
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.last_kmer = None;
        self.last_emitted = None;
    }

    fn enter(&mut self, pos: usize, sub: &[u8]) {
        let key = if self.canonical {
            dna::canonical(sub).into_owned()
        } else {
            sub.to_vec()
        };
        while matches!(self.window.back(), Some((_, s)) if *s > key) {
            self.window.pop_back();
        }
        self.window.push_back((pos, key));
    }

    /// 推进到 offset 处的 k-mer，返回其 minimizer 的绝对位置
    fn advance(&mut self, offset: usize, kmer: &[u8]) -> Result<usize> {
        if kmer.len() != self.k {
            return Err(IndexError::invalid(
                "kmer",
                String::from_utf8_lossy(kmer),
                format!("length {} does not match k = {}", kmer.len(), self.k),
            ));
        }
        let span = self.k - self.w;
        if self.last_kmer.map_or(false, |p| p + 1 == offset) {
            self.enter(offset + span, &kmer[span..]);
        } else {
            self.window.clear();
            for i in 0..=span {
                self.enter(offset + i, &kmer[i..i + self.w]);
            }
        }
        self.last_kmer = Some(offset);
        while matches!(self.window.front(), Some(&(pos, _)) if pos < offset) {
            self.window.pop_front();
        }
        // 刚入队的子串位置 >= offset，队列不会为空
        Ok(self.window[0].0)
    }

    /// 当前 k-mer 的 minimizer：(绝对位置, 子串)，每个 k-mer 都有输出
    pub fn select(&mut self, offset: usize, kmer: &[u8]) -> Result<(usize, &[u8])> {
        let pos = self.advance(offset, kmer)?;
        Ok((pos, &self.window[0].1))
    }

    /// 与 `select` 相同，但按位置去重：与上一次输出位置相同时返回 None
    pub fn push(&mut self, offset: usize, kmer: &[u8]) -> Result<Option<(usize, &[u8])>> {
        let pos = self.advance(offset, kmer)?;
        if self.last_emitted == Some(pos) {
            return Ok(None);
        }
        self.last_emitted = Some(pos);
        Ok(Some((pos, &self.window[0].1)))
    }
}

/// 单个 k-mer 的 minimizer：(k-mer 内偏移, 子串)
pub fn minimizer_of(kmer: &[u8], w: usize, canonical: bool) -> Result<(usize, Vec<u8>)> {
    let mut sel = MinimizerSelector::new(kmer.len(), w, canonical)?;
    let (pos, sub) = sel.select(0, kmer)?;
    Ok((pos, sub.to_vec()))
}

/// 整条序列的去重 minimizer 列表：(绝对位置, 子串)
pub fn minimizers(seq: &[u8], k: usize, w: usize, canonical: bool) -> Result<Vec<(usize, Vec<u8>)>> {
    let mut sel = MinimizerSelector::new(k, w, canonical)?;
    let mut out = Vec::new();
    for (off, kmer) in super::kmer::kmers(seq, k)? {
        if let Some((pos, sub)) = sel.push(off, kmer)? {
            out.push((pos, sub.to_vec()));
        }
    }
    Ok(out)
}
