//! AVX2 kernels. Callers must have confirmed AVX2 support at runtime.

use core::arch::x86_64::*;

use super::LANE;

/// Truncating per-byte average of whole lanes; returns the number of leading bytes written.
///
/// # Safety
/// The CPU must support AVX2.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn blend_row(prev: &[u8], cur: &mut [u8]) -> usize {
    let n = prev.len().min(cur.len()) / LANE * LANE;
    let one = _mm256_set1_epi8(1);
    let mut x = 0;
    while x < n {
        // SAFETY: x + LANE <= n, which is in bounds for both slices.
        let (a, b) = unsafe {
            (
                _mm256_loadu_si256(prev.as_ptr().add(x).cast()),
                _mm256_loadu_si256(cur.as_ptr().add(x).cast()),
            )
        };
        // avg_epu8 rounds up; subtract the carried low bit to truncate.
        let fix = _mm256_and_si256(_mm256_xor_si256(a, b), one);
        let r = _mm256_sub_epi8(_mm256_avg_epu8(a, b), fix);
        // SAFETY: same bounds as the loads above.
        unsafe { _mm256_storeu_si256(cur.as_mut_ptr().add(x).cast(), r) };
        x += LANE;
    }
    n
}

/// Zero-extend 32 bytes into two 16-lane halves.
#[target_feature(enable = "avx2")]
fn widen(v: __m256i) -> (__m256i, __m256i) {
    (
        _mm256_cvtepu8_epi16(_mm256_castsi256_si128(v)),
        _mm256_cvtepu8_epi16(_mm256_extracti128_si256(v, 1)),
    )
}

/// `(a + 2m + b + 8) >> 4` per 16-bit lane.
#[target_feature(enable = "avx2")]
fn round_sum(a: __m256i, m: __m256i, b: __m256i) -> __m256i {
    let s = _mm256_add_epi16(_mm256_add_epi16(a, b), _mm256_slli_epi16(m, 1));
    _mm256_srli_epi16(_mm256_add_epi16(s, _mm256_set1_epi16(8)), 4)
}

/// `l + 2c + r` for 32 columns starting at `x`, widened to two 16-lane halves.
///
/// # Safety
/// AVX2 must be available and `x >= 1`, `x + LANE < r.len()`.
#[target_feature(enable = "avx2")]
unsafe fn taps(r: &[u8], x: usize) -> (__m256i, __m256i) {
    // SAFETY: reads cover r[x-1 .. x+LANE+1], in bounds per the contract.
    let (l, c, rr) = unsafe {
        (
            _mm256_loadu_si256(r.as_ptr().add(x - 1).cast()),
            _mm256_loadu_si256(r.as_ptr().add(x).cast()),
            _mm256_loadu_si256(r.as_ptr().add(x + 1).cast()),
        )
    };
    let (l_lo, l_hi) = widen(l);
    let (c_lo, c_hi) = widen(c);
    let (r_lo, r_hi) = widen(rr);
    (
        _mm256_add_epi16(_mm256_add_epi16(l_lo, r_lo), _mm256_slli_epi16(c_lo, 1)),
        _mm256_add_epi16(_mm256_add_epi16(l_hi, r_hi), _mm256_slli_epi16(c_hi, 1)),
    )
}

/// Same contract as the portable lane blur: lanes from column 1, returns the first tail column.
///
/// # Safety
/// The CPU must support AVX2; all four slices must have the same length.
#[target_feature(enable = "avx2")]
pub(super) unsafe fn blur_row(above: &[u8], row: &[u8], below: &[u8], out: &mut [u8]) -> usize {
    let end = row.len() - 1;
    let mut x = 1;
    while x + LANE <= end {
        // SAFETY: x >= 1 and x + LANE <= len - 1.
        let ((a_lo, a_hi), (m_lo, m_hi), (b_lo, b_hi)) =
            unsafe { (taps(above, x), taps(row, x), taps(below, x)) };
        let lo = round_sum(a_lo, m_lo, b_lo);
        let hi = round_sum(a_hi, m_hi, b_hi);
        // packus interleaves 128-bit halves; restore byte order.
        let packed = _mm256_permute4x64_epi64(_mm256_packus_epi16(lo, hi), 0xD8);
        // SAFETY: out has the row's length, so x + LANE is in bounds.
        unsafe { _mm256_storeu_si256(out.as_mut_ptr().add(x).cast(), packed) };
        x += LANE;
    }
    x
}
