use crate::error::{IndexError, Result};
use crate::io::SequenceSource;

/// 每次向 SequenceSource 批量取的碱基数（另加 k-1 的重叠）
pub const DEFAULT_BATCH: usize = 1 << 16;

pub(crate) fn check_k(k: usize, len: usize) -> Result<()> {
    if k == 0 {
        return Err(IndexError::invalid("k", k, "k-mer length must be positive"));
    }
    if k > len {
        return Err(IndexError::invalid(
            "k",
            k,
            format!("k-mer length exceeds contig length {}", len),
        ));
    }
    Ok(())
}

/// 在一条 contig 上滑动长度为 k 的窗口，按 offset 递增依次给出 (offset, kmer)。
///
/// 内部按批从来源取序列，批与批之间保留 k-1 个碱基的重叠，
/// 因此每个 k-mer 都恰好是从 offset 开始的 k 个连续碱基。
/// `next_kmer` 返回的切片借用内部缓冲区，下一次调用前有效。
pub struct KmerCursor<'a, S: SequenceSource + ?Sized> {
    source: &'a S,
    contig: &'a str,
    k: usize,
    contig_len: usize,
    batch: usize,
    buf: Vec<u8>,
    /// buf[0] 对应的 contig 坐标
    buf_start: usize,
    next: usize,
}

impl<'a, S: SequenceSource + ?Sized> KmerCursor<'a, S> {
    pub fn new(source: &'a S, contig: &'a str, k: usize) -> Result<Self> {
        let contig_len = source.contig_len(contig)?;
        check_k(k, contig_len)?;
        Ok(Self {
            source,
            contig,
            k,
            contig_len,
            batch: DEFAULT_BATCH,
            buf: Vec::new(),
            buf_start: 0,
            next: 0,
        })
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    /// k-mer 总数：contig_len - k + 1
    pub fn len(&self) -> usize {
        self.contig_len - self.k + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 下一个将要产出的 offset
    pub fn offset(&self) -> usize {
        self.next
    }

    /// 回到 contig 起点；已取的缓冲区保留，命中时无需重取
    pub fn reset(&mut self) {
        self.next = 0;
    }

    pub fn next_kmer(&mut self) -> Result<Option<(usize, &[u8])>> {
        let off = self.next;
        if off + self.k > self.contig_len {
            return Ok(None);
        }
        if off < self.buf_start || off + self.k > self.buf_start + self.buf.len() {
            let end = (off + self.batch + self.k - 1).min(self.contig_len);
            let chunk = self.source.fetch(self.contig, off, end)?;
            self.buf.clear();
            self.buf.extend_from_slice(&chunk);
            self.buf_start = off;
            log::trace!("{}: fetched [{}, {})", self.contig, off, end);
        }
        self.next += 1;
        let rel = off - self.buf_start;
        Ok(Some((off, &self.buf[rel..rel + self.k])))
    }
}

/// 内存序列上的 k-mer 枚举；与 `KmerCursor` 相同，k 为 0 或大于序列长度时报错
pub fn kmers(seq: &[u8], k: usize) -> Result<impl Iterator<Item = (usize, &[u8])>> {
    check_k(k, seq.len())?;
    Ok(seq.windows(k).enumerate())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Reference;

    fn collect_all<S: SequenceSource + ?Sized>(cur: &mut KmerCursor<'_, S>) -> Vec<(usize, Vec<u8>)> {
        let mut out = Vec::new();
        while let Some((off, kmer)) = cur.next_kmer().unwrap() {
            out.push((off, kmer.to_vec()));
        }
        out
    }

    #[test]
    fn enumerates_every_offset() {
        let reference = Reference::from_sequences("mem", [("chr1", "ACGTACGTA")]).unwrap();
        let mut cur = KmerCursor::new(&reference, "chr1", 4).unwrap();
        assert_eq!(cur.len(), 6);
        let all = collect_all(&mut cur);
        assert_eq!(all.len(), 6);
        assert_eq!(all[0], (0, b"ACGT".to_vec()));
        assert_eq!(all[5], (5, b"CGTA".to_vec()));
    }

    #[test]
    fn batching_preserves_kmers() {
        let seq = b"ACGTTGCAACGGTCATTAGCNACGT";
        let reference = Reference::from_sequences("mem", [("c", &seq[..])]).unwrap();
        let expected: Vec<(usize, Vec<u8>)> = kmers(seq, 5).unwrap().map(|(o, s)| (o, s.to_vec())).collect();
        for batch in [1, 2, 3, 7, 100] {
            let mut cur = KmerCursor::new(&reference, "c", 5).unwrap().with_batch(batch);
            assert_eq!(collect_all(&mut cur), expected, "batch={}", batch);
        }
    }

    #[test]
    fn restartable() {
        let reference = Reference::from_sequences("mem", [("c", "ACGTAC")]).unwrap();
        let mut cur = KmerCursor::new(&reference, "c", 3).unwrap().with_batch(2);
        let first = collect_all(&mut cur);
        assert!(cur.next_kmer().unwrap().is_none());
        cur.reset();
        assert_eq!(cur.offset(), 0);
        assert_eq!(collect_all(&mut cur), first);
    }

    #[test]
    fn rejects_bad_k() {
        let reference = Reference::from_sequences("mem", [("c", "ACGT")]).unwrap();
        assert!(matches!(
            KmerCursor::new(&reference, "c", 0),
            Err(IndexError::InvalidParameter { name: "k", .. })
        ));
        assert!(matches!(
            KmerCursor::new(&reference, "c", 5),
            Err(IndexError::InvalidParameter { name: "k", .. })
        ));
        // k == 长度时恰好一个 k-mer
        let mut cur = KmerCursor::new(&reference, "c", 4).unwrap();
        assert_eq!(collect_all(&mut cur), vec![(0, b"ACGT".to_vec())]);
    }

    #[test]
    fn slice_kmers_reject_bad_k() {
        assert!(matches!(kmers(b"ACGT", 0), Err(IndexError::InvalidParameter { name: "k", .. })));
        assert!(matches!(kmers(b"ACGT", 5), Err(IndexError::InvalidParameter { name: "k", .. })));
        assert!(matches!(kmers(b"", 1), Err(IndexError::InvalidParameter { name: "k", .. })));
        assert_eq!(kmers(b"ACGT", 4).unwrap().count(), 1);
    }
}
