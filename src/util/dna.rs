use std::borrow::Cow;

/// 比对中可匹配任意碱基的通配符
pub const WILDCARD: u8 = b'.';

/// 归一化：大写，U→T，非 ACGTN 统一映射为 N
pub fn normalize_seq(seq: &[u8]) -> Vec<u8> {
    seq.iter().map(|&b| normalize_base(b)).collect()
}

/// 与 `normalize_seq` 相同，但保留通配符 `.`，用于需要参与打分的查询序列
pub fn normalize_query(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .map(|&b| if b == WILDCARD { b } else { normalize_base(b) })
        .collect()
}

#[inline]
pub fn normalize_base(b: u8) -> u8 {
    match b.to_ascii_uppercase() {
        up @ (b'A' | b'C' | b'G' | b'T') => up,
        b'U' => b'T',
        _ => b'N',
    }
}

/// 是否为 ACGT 以外的模糊碱基（输入应已归一化）
#[inline]
pub fn is_ambiguous(b: u8) -> bool {
    !matches!(b, b'A' | b'C' | b'G' | b'T')
}

/// 返回第一个模糊碱基的位置
pub fn first_ambiguous(seq: &[u8]) -> Option<usize> {
    seq.iter().position(|&b| is_ambiguous(b))
}

#[inline]
pub fn complement(base: u8) -> u8 {
    match base.to_ascii_uppercase() {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' | b'U' => b'A',
        WILDCARD => WILDCARD,
        _ => b'N',
    }
}

pub fn revcomp(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// 正反链无关的规范形式：min(seq, revcomp(seq))，按字节序比较。
/// 不需要翻转时直接借用原序列。
pub fn canonical(seq: &[u8]) -> Cow<'_, [u8]> {
    // 逐位比较 seq[i] 与 revcomp 的第 i 位，首个差异即决定大小
    let n = seq.len();
    for i in 0..n {
        let fwd = seq[i];
        let rev = complement(seq[n - 1 - i]);
        if fwd < rev {
            return Cow::Borrowed(seq);
        }
        if fwd > rev {
            return Cow::Owned(revcomp(seq));
        }
    }
    Cow::Borrowed(seq)
}
