//! Residual partitioning and Rice parameter search (spec component C4).
//!
//! Mirrors `libflake/rice.c`: for a residual block of length `n` with
//! predictor order `pred_order`, find the partition order `p` in
//! `[pmin,pmax]` and the per-partition Rice parameters `k` that minimize
//! the total coded bit count, using the closed-form cost estimate rather
//! than actually emitting bits.

pub const MAX_RICE_PARAM: u32 = 14;
pub const MAX_PARTITION_ORDER: u32 = 8;
pub const MAX_PARTITIONS: usize = 1 << MAX_PARTITION_ORDER;

/// The winning partition order and one Rice parameter per partition.
#[derive(Debug, Clone)]
pub struct RiceParams {
    pub porder: u32,
    pub params: Vec<u32>,
}

impl RiceParams {
    fn empty() -> Self {
        RiceParams {
            porder: 0,
            params: vec![0],
        }
    }
}

/// Estimated coded bit count for `n` folded values summing to `sum`,
/// Rice-coded with parameter `k`: `(k+1)*n + floor((sum - n/2) / 2^k)`.
fn rice_encode_count(sum: u64, n: u64, k: u32) -> u64 {
    let bias = (sum as i64) - (n as i64 / 2);
    let bias = bias.max(0) as u64;
    n * (k as u64 + 1) + (bias >> k)
}

/// Smallest `k` in `[0, MAX_RICE_PARAM]` minimizing `rice_encode_count`.
/// Ties favor the smallest `k`.
pub fn find_optimal_rice_param(sum: u64, n: u64) -> u32 {
    let mut k_opt = 0;
    let mut best = u64::MAX;
    for k in 0..=MAX_RICE_PARAM {
        let bits = rice_encode_count(sum, n, k);
        if bits < best {
            best = bits;
            k_opt = k;
        }
    }
    k_opt
}

/// Floor(log2(v)), with `log2(0) = 0` (matches `common.h`'s `log2i`).
fn log2i(v: u32) -> u32 {
    if v == 0 {
        return 0;
    }
    31 - v.leading_zeros()
}

/// Clamp a candidate partition order so that every partition holds a
/// whole number of residuals and, when `order > 0`, the first partition
/// (which is short by `order` samples) still holds at least one.
fn get_max_p_order(max_porder: u32, n: u32, order: u32) -> u32 {
    let mut porder = max_porder.min(log2i(n ^ (n.wrapping_sub(1))));
    if order > 0 {
        porder = porder.min(log2i(n / order));
    }
    porder
}

fn zigzag_fold(data: &[i32]) -> Vec<u32> {
    data.iter()
        .map(|&r| (r.wrapping_shl(1) ^ (r >> 31)) as u32)
        .collect()
}

/// `sums[p][j]` = sum of folded residuals in partition `j` at order `p`,
/// for `p` in `[pmin,pmax]`. Built top-down from `pmax` by pairwise
/// folding, per spec.md §4.4 step 2.
fn calc_sums(pmin: u32, pmax: u32, udata: &[u32], n: u32, pred_order: u32) -> Vec<Vec<u64>> {
    let mut sums: Vec<Vec<u64>> = vec![Vec::new(); pmax as usize + 1];

    let parts = 1usize << pmax;
    let mut top = vec![0u64; parts];
    let mut cnt = (n >> pmax) - pred_order;
    let mut offset = 0usize;
    for (i, slot) in top.iter_mut().enumerate() {
        if i == 1 {
            cnt = n >> pmax;
        }
        let start = if i == 0 { pred_order as usize } else { offset };
        let end = start + cnt as usize;
        *slot = udata[start..end].iter().map(|&v| v as u64).sum();
        offset = end;
    }
    sums[pmax as usize] = top;

    for p in (pmin..pmax).rev() {
        let parts = 1usize << p;
        let hi = &sums[p as usize + 1];
        let mut level = vec![0u64; parts];
        for j in 0..parts {
            level[j] = hi[2 * j] + hi[2 * j + 1];
        }
        sums[p as usize] = level;
    }
    sums
}

fn calc_optimal_rice_params(porder: u32, sums: &[u64], n: u32, pred_order: u32) -> (RiceParams, u64) {
    let parts = 1usize << porder;
    let mut params = Vec::with_capacity(parts);
    let mut all_bits = 0u64;
    let mut cnt = (n >> porder) - pred_order;
    for (i, &sum) in sums.iter().enumerate().take(parts) {
        if i == 1 {
            cnt = n >> porder;
        }
        let k = find_optimal_rice_param(sum, cnt as u64);
        all_bits += rice_encode_count(sum, cnt as u64, k);
        params.push(k);
    }
    all_bits += 4 * parts as u64;
    (RiceParams { porder, params }, all_bits)
}

/// Search partition orders `[pmin,pmax]` (already clamped by the caller)
/// and return the winning layout plus its estimated bit count (excluding
/// the fixed per-subframe header bits the caller adds on).
fn calc_rice_params(pmin: u32, pmax: u32, data: &[i32], n: u32, pred_order: u32) -> (RiceParams, u64) {
    if n == 0 {
        return (RiceParams::empty(), 0);
    }
    let udata = zigzag_fold(data);
    let sums = calc_sums(pmin, pmax, &udata, n, pred_order);

    let mut best = calc_optimal_rice_params(pmin, &sums[pmin as usize], n, pred_order);
    for p in (pmin + 1)..=pmax {
        let candidate = calc_optimal_rice_params(p, &sums[p as usize], n, pred_order);
        if candidate.1 <= best.1 {
            best = candidate;
        }
    }
    best
}

/// Total estimated coded size (bits) of a FIXED-prediction subframe at
/// the given order, plus the winning [`RiceParams`].
pub fn calc_rice_params_fixed(
    pmin: u32,
    pmax: u32,
    data: &[i32],
    n: u32,
    pred_order: u32,
    bps: u32,
) -> (RiceParams, u64) {
    let pmin = get_max_p_order(pmin, n, pred_order);
    let pmax = get_max_p_order(pmax, n, pred_order);
    let (rc, bits) = calc_rice_params(pmin, pmax, data, n, pred_order);
    (rc, pred_order as u64 * bps as u64 + 6 + bits)
}

/// Total estimated coded size (bits) of an LPC subframe at the given
/// order/precision, plus the winning [`RiceParams`].
pub fn calc_rice_params_lpc(
    pmin: u32,
    pmax: u32,
    data: &[i32],
    n: u32,
    pred_order: u32,
    bps: u32,
    precision: u32,
) -> (RiceParams, u64) {
    let pmin = get_max_p_order(pmin, n, pred_order);
    let pmax = get_max_p_order(pmax, n, pred_order);
    let (rc, bits) = calc_rice_params(pmin, pmax, data, n, pred_order);
    let header = pred_order as u64 * bps as u64 + 4 + 5 + pred_order as u64 * precision as u64 + 6;
    (rc, header + bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimal_k_is_zero_for_all_zero_residual() {
        let k = find_optimal_rice_param(0, 100);
        assert_eq!(k, 0);
    }

    #[test]
    fn optimal_k_beats_every_other_candidate() {
        let sum = 123_456u64;
        let n = 4096u64;
        let k_opt = find_optimal_rice_param(sum, n);
        let best_bits = rice_encode_count(sum, n, k_opt);
        for k in 0..=MAX_RICE_PARAM {
            assert!(best_bits <= rice_encode_count(sum, n, k));
        }
    }

    #[test]
    fn get_max_p_order_respects_divisibility() {
        // n=4096=2^12, order=0 -> bounded only by pmax and log2(n^(n-1))
        let p = get_max_p_order(8, 4096, 0);
        assert!(p <= 8);
        assert_eq!(4096 % (1 << p), 0);
    }

    #[test]
    fn get_max_p_order_respects_predictor_order_constraint() {
        let n = 4096;
        let order = 100;
        let p = get_max_p_order(8, n, order);
        assert!((n >> p) > order);
    }

    #[test]
    fn zero_residual_block_picks_partition_order_zero_and_k_zero() {
        let data = vec![0i32; 256];
        let (rc, _bits) = calc_rice_params_fixed(0, 8, &data, 256, 2, 16);
        for &k in &rc.params {
            assert_eq!(k, 0);
        }
    }

    #[test]
    fn chosen_partitioning_is_never_worse_than_forcing_order_zero() {
        let data: Vec<i32> = (0..512).map(|i| ((i * 37) % 101) - 50).collect();
        let (_rc, bits_searched) = calc_rice_params_fixed(0, 4, &data, 512, 0, 16);
        let (_rc0, bits_forced_zero) = calc_rice_params_fixed(0, 0, &data, 512, 0, 16);
        assert!(bits_searched <= bits_forced_zero);
    }
}
