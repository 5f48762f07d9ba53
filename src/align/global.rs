use std::fmt::Write as _;

use crate::util::dna::WILDCARD;

/// 比对打分模型。全局比对只通过该 trait 取代价，
/// 日后替换代价函数（如仿射间隙）无需改动调用方。
pub trait CostModel {
    /// 两个碱基对齐的代价
    fn substitution(&self, a: u8, b: u8) -> u64;
    /// 单个插入/缺失碱基的代价
    fn gap(&self) -> u64;
}

/// 线性间隙代价：错配 `mismatch`，每个 gap 碱基 `gap`，通配符与任意碱基匹配
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinearCost {
    pub mismatch: u32,
    pub gap: u32,
    pub wildcard: Option<u8>,
}

impl LinearCost {
    pub fn new(mismatch: u32, gap: u32) -> Self {
        Self {
            mismatch,
            gap,
            wildcard: Some(WILDCARD),
        }
    }
}

impl Default for LinearCost {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl CostModel for LinearCost {
    #[inline]
    fn substitution(&self, a: u8, b: u8) -> u64 {
        if a == b || self.wildcard.map_or(false, |w| a == w || b == w) {
            0
        } else {
            self.mismatch as u64
        }
    }

    #[inline]
    fn gap(&self) -> u64 {
        self.gap as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalAlignment {
    pub cost: u64,
    /// `=`/`X`/`I`/`D`，I 消耗 x，D 消耗 y
    pub cigar: String,
    /// edit distance（X + I + D）
    pub nm: u32,
}

/// 完整 (m+1) x (n+1) 代价矩阵，行优先展平
fn fill_matrix<C: CostModel + ?Sized>(x: &[u8], y: &[u8], cost: &C) -> Vec<u64> {
    let m = x.len();
    let n = y.len();
    let cols = n + 1;
    let g = cost.gap();
    let mut mat = vec![0u64; (m + 1) * cols];

    for j in 1..=n {
        mat[j] = j as u64 * g;
    }
    for i in 1..=m {
        mat[i * cols] = i as u64 * g;
        for j in 1..=n {
            let diag = mat[(i - 1) * cols + (j - 1)] + cost.substitution(x[i - 1], y[j - 1]);
            let up = mat[(i - 1) * cols + j] + g;
            let left = mat[i * cols + (j - 1)] + g;
            mat[i * cols + j] = diag.min(up).min(left);
        }
    }
    mat
}

/// 线性间隙全局比对（编辑距离）的最小代价
pub fn global_align(x: &[u8], y: &[u8], mismatch_cost: u32, gap_cost: u32) -> u64 {
    global_align_with(x, y, &LinearCost::new(mismatch_cost, gap_cost))
}

pub fn global_align_with<C: CostModel + ?Sized>(x: &[u8], y: &[u8], cost: &C) -> u64 {
    let mat = fill_matrix(x, y, cost);
    mat[x.len() * (y.len() + 1) + y.len()]
}

/// 全局比对并回溯出 CIGAR；并列时优先对角线，其次 I，最后 D
pub fn global_align_path<C: CostModel + ?Sized>(x: &[u8], y: &[u8], cost: &C) -> GlobalAlignment {
    let mat = fill_matrix(x, y, cost);
    let cols = y.len() + 1;
    let g = cost.gap();

    let mut ops: Vec<char> = Vec::with_capacity(x.len() + y.len());
    let mut i = x.len();
    let mut j = y.len();
    while i > 0 || j > 0 {
        let here = mat[i * cols + j];
        if i > 0 && j > 0 {
            let sub = cost.substitution(x[i - 1], y[j - 1]);
            if here == mat[(i - 1) * cols + (j - 1)] + sub {
                ops.push(if sub == 0 { '=' } else { 'X' });
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if i > 0 && here == mat[(i - 1) * cols + j] + g {
            ops.push('I');
            i -= 1;
        } else {
            ops.push('D');
            j -= 1;
        }
    }
    ops.reverse();

    let nm = ops.iter().filter(|&&op| op != '=').count() as u32;
    GlobalAlignment {
        cost: mat[x.len() * cols + y.len()],
        cigar: ops_to_cigar(&ops),
        nm,
    }
}

pub fn ops_to_cigar(ops: &[char]) -> String {
    let mut cigar = String::new();
    let Some((&first, rest)) = ops.split_first() else {
        return cigar;
    };
    let mut cur = first;
    let mut len = 1usize;
    for &op in rest {
        if op == cur {
            len += 1;
        } else {
            let _ = write!(&mut cigar, "{}{}", len, cur);
            cur = op;
            len = 1;
        }
    }
    let _ = write!(&mut cigar, "{}{}", len, cur);
    cigar
}
