use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::io::fasta::{FastaReader, FastaRecord};
use crate::util::dna;

/// 参考序列来源：contig 名称、长度，以及按半开区间 [start, end) 取子序列。
///
/// 建索引时各 contig 会被并行处理，因此要求 `Sync`。
pub trait SequenceSource: Sync {
    /// 按参考中的原始顺序返回 contig 名称
    fn contig_names(&self) -> Vec<String>;

    fn contig_len(&self, contig: &str) -> Result<usize>;

    /// 取 [start, end) 子序列，返回值已归一化为 ACGTN
    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Cow<'_, [u8]>>;

    /// 来源标识（通常是文件路径），写入索引文件
    fn descriptor(&self) -> String;
}

/// 整个 FASTA 读入内存的参考序列。
#[derive(Debug, Default)]
pub struct Reference {
    descriptor: String,
    records: Vec<FastaRecord>,
    by_name: HashMap<String, usize>,
}

impl Reference {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let fh = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(fh), path.display().to_string())
    }

    pub fn from_reader<R: BufRead>(reader: R, descriptor: impl Into<String>) -> Result<Self> {
        let mut reader = FastaReader::new(reader);
        let mut reference = Reference {
            descriptor: descriptor.into(),
            ..Default::default()
        };
        while let Some(rec) = reader.next_record()? {
            reference.push(rec)?;
        }
        Ok(reference)
    }

    /// 由内存中的 (名称, 序列) 构造，序列会被归一化
    pub fn from_sequences<N, S, I>(descriptor: impl Into<String>, seqs: I) -> Result<Self>
    where
        N: Into<String>,
        S: AsRef<[u8]>,
        I: IntoIterator<Item = (N, S)>,
    {
        let mut reference = Reference {
            descriptor: descriptor.into(),
            ..Default::default()
        };
        for (name, seq) in seqs {
            reference.push(FastaRecord {
                id: name.into(),
                desc: None,
                seq: dna::normalize_seq(seq.as_ref()),
            })?;
        }
        Ok(reference)
    }

    fn push(&mut self, rec: FastaRecord) -> Result<()> {
        if self.by_name.contains_key(&rec.id) {
            return Err(IndexError::invalid("contig", &rec.id, "duplicate contig name in reference"));
        }
        self.by_name.insert(rec.id.clone(), self.records.len());
        self.records.push(rec);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn total_len(&self) -> usize {
        self.records.iter().map(|r| r.seq.len()).sum()
    }

    /// 整条 contig 序列
    pub fn sequence(&self, contig: &str) -> Result<&[u8]> {
        self.by_name
            .get(contig)
            .map(|&i| self.records[i].seq.as_slice())
            .ok_or_else(|| IndexError::UnknownContig(contig.to_string()))
    }
}

impl SequenceSource for Reference {
    fn contig_names(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    fn contig_len(&self, contig: &str) -> Result<usize> {
        self.sequence(contig).map(<[u8]>::len)
    }

    fn fetch(&self, contig: &str, start: usize, end: usize) -> Result<Cow<'_, [u8]>> {
        let seq = self.sequence(contig)?;
        if start > end || end > seq.len() {
            return Err(IndexError::invalid(
                "range",
                format!("{}:{}-{}", contig, start, end),
                format!("outside contig of length {}", seq.len()),
            ));
        }
        Ok(Cow::Borrowed(&seq[start..end]))
    }

    fn descriptor(&self) -> String {
        self.descriptor.clone()
    }
}
