use crate::error::{IndexError, Result};

/// 等长序列的错配数，超过 `max` 后立即停止。
///
/// 提前终止时返回值只保证 `> max`，不一定是真实错配数。
pub fn hamming_distance(a: &[u8], b: &[u8], max: usize) -> Result<usize> {
    hamming_distance_with(a, b, max, None)
}

/// 同 `hamming_distance`；`wildcard` 给定时，任一侧为通配符的位置不计错配
pub fn hamming_distance_with(a: &[u8], b: &[u8], max: usize, wildcard: Option<u8>) -> Result<usize> {
    if a.len() != b.len() {
        return Err(IndexError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    let mut mm = 0usize;
    for (x, y) in a.iter().zip(b) {
        if x != y && wildcard.map_or(true, |w| *x != w && *y != w) {
            mm += 1;
            if mm > max {
                break;
            }
        }
    }
    Ok(mm)
}
