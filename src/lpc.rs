//! Linear predictive coding analysis (spec component C5).
//!
//! Mirrors `libflake/lpc.c`: a Welch-windowed autocorrelation feeds a
//! Levinson-Durbin recursion, producing one set of LPC coefficients per
//! order `1..=max_order` in a single pass (later orders reuse earlier
//! partial sums). Every order is quantized, not just the ones a given
//! order-selection strategy ultimately evaluates, since `FLAKE_ORDER_METHOD_LOG`
//! needs coefficients for arbitrary probe orders `calc_rice_params_lpc`
//! wasn't given in the original source. Quantization uses running-error
//! compensated rounding instead of plain truncation, trading a touch of
//! extra arithmetic for lower quantization noise at low precisions.

pub const MAX_LPC_ORDER: u32 = 32;

/// One order's quantized predictor: `order` coefficients plus the shift
/// applied before coefficients are used (`pred = (sum(c[i]*s[i]) >> shift)`).
#[derive(Debug, Clone)]
pub struct LpcCandidate {
    pub order: u32,
    pub coefs: Vec<i32>,
    pub shift: i32,
}

/// Every order's quantized predictor, `1..=max_order`, plus the
/// reflection-coefficient order estimate used by the `Est` search method.
pub struct LpcAnalysis {
    pub candidates: Vec<LpcCandidate>,
    pub estimated_order: u32,
}

impl LpcAnalysis {
    pub fn candidate(&self, order: u32) -> &LpcCandidate {
        &self.candidates[order as usize - 1]
    }
}

/// Welch window: a parabola that tapers both ends of the block to zero.
/// The exact middle sample of an odd-length block is left at the
/// implicit zero fill, matching the reference encoder.
fn apply_welch_window(data: &[i32]) -> Vec<f64> {
    let len = data.len();
    let mut w = vec![0.0f64; len];
    let n2 = len / 2;
    let c = 2.0 / (len as f64 - 1.0);
    for i in 0..n2 {
        let x = c - i as f64 - 1.0;
        let win = 1.0 - x * x;
        w[i] = data[i] as f64 * win;
        w[len - 1 - i] = data[len - 1 - i] as f64 * win;
    }
    w
}

/// Autocorrelation at lags `0..=lag`, computed over the windowed block.
/// Each lag is seeded with a bias of 2.0 so an all-silent block still
/// yields a strictly positive `autoc[0]`, keeping the Levinson-Durbin
/// recursion below from dividing by zero.
fn compute_autocorr(windowed: &[f64], len: usize, lag: usize) -> Vec<f64> {
    let mut data1 = vec![0.0f64; len + 1];
    data1[..len].copy_from_slice(windowed);

    let mut autoc = vec![0.0f64; lag + 1];
    for i in 0..=lag {
        let mut temp = 1.0;
        let mut temp2 = 1.0;
        for j in 0..=(lag - i) {
            temp += data1[j + i] * data1[j];
        }
        let mut j = lag + 1;
        while j <= len - 1 {
            temp += data1[j] * data1[j - i];
            temp2 += data1[j + 1] * data1[j + 1 - i];
            j += 2;
        }
        autoc[i] = temp + temp2;
    }
    autoc
}

/// Levinson-Durbin recursion. Returns `lpc[i]` = the `i+1` coefficients
/// of the order-`(i+1)` predictor, for `i` in `0..max_order`, plus the
/// reflection coefficient magnitude at each step (used for order
/// estimation).
fn compute_lpc_coefs(autoc: &[f64], max_order: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut lpc_tmp = vec![0.0f64; max_order];
    let mut err = autoc[0];
    let mut lpc = vec![Vec::new(); max_order];
    let mut refl = vec![0.0f64; max_order];

    for i in 0..max_order {
        let mut r = -autoc[i + 1];
        for (j, &coef) in lpc_tmp.iter().enumerate().take(i) {
            r -= coef * autoc[i - j];
        }
        r /= err;
        refl[i] = r.abs();
        err *= 1.0 - r * r;

        let i2 = i >> 1;
        lpc_tmp[i] = r;
        let mut j = 0;
        for jj in 0..i2 {
            j = jj;
            let tmp = lpc_tmp[j];
            lpc_tmp[j] += r * lpc_tmp[i - 1 - j];
            lpc_tmp[i - 1 - j] += r * tmp;
        }
        if i % 2 == 1 {
            lpc_tmp[j] += lpc_tmp[j] * r;
        }

        lpc[i] = lpc_tmp[0..=i].iter().map(|&v| -v).collect();
    }
    (lpc, refl)
}

/// First order (counting down from `max_order`) whose reflection
/// coefficient exceeds 0.10, or order 1 if none do.
fn estimate_best_order(refl: &[f64], max_order: usize) -> usize {
    let mut est = 1;
    for i in (0..max_order).rev() {
        if refl[i] > 0.10 {
            est = i + 1;
            break;
        }
    }
    est
}

/// Quantize floating-point LPC coefficients to `precision`-bit signed
/// integers plus a right-shift in `[0,15]`, using running-error feedback:
/// each coefficient's rounding error carries forward into the next
/// coefficient's rounding decision instead of being discarded.
fn quantize_lpc_coefs(lpc_in: &[f64], precision: u32) -> (Vec<i32>, i32) {
    let order = lpc_in.len();
    const MAX_SHIFT: i32 = 15;
    let qmax: i32 = (1 << (precision - 1)) - 1;
    let qmin: i32 = -(1 << (precision - 1));

    let cmax = lpc_in.iter().fold(0.0f64, |a, &b| a.max(b.abs()));
    if cmax * ((1u32 << MAX_SHIFT) as f64) < 1.0 {
        return (vec![0; order], 0);
    }

    let mut sh = MAX_SHIFT;
    while cmax * ((1u32 << sh) as f64) > qmax as f64 && sh > 0 {
        sh -= 1;
    }

    let mut scaled = lpc_in.to_vec();
    if sh == 0 && cmax > qmax as f64 {
        let scale = qmax as f64 / cmax;
        for c in scaled.iter_mut() {
            *c *= scale;
        }
    }

    let mut error = 0.0f64;
    let mut out = Vec::with_capacity(order);
    for &c in &scaled {
        error += c * ((1u32 << sh) as f64);
        let q = (error.round() as i32).clamp(qmin, qmax);
        error -= q as f64;
        out.push(q);
    }
    (out, sh)
}

/// Run the full LPC analysis pipeline over one channel's samples for a
/// single block, producing a quantized predictor for every order
/// `1..=max_order`.
pub fn analyze(samples: &[i32], max_order: u32, precision: u32) -> LpcAnalysis {
    let max_order = max_order as usize;
    let windowed = apply_welch_window(samples);
    let autoc = compute_autocorr(&windowed, samples.len(), max_order);
    let (lpc, refl) = compute_lpc_coefs(&autoc, max_order);
    let estimated_order = estimate_best_order(&refl, max_order) as u32;

    let candidates = (0..max_order)
        .map(|i| {
            let (coefs, shift) = quantize_lpc_coefs(&lpc[i], precision);
            LpcCandidate {
                order: (i + 1) as u32,
                coefs,
                shift,
            }
        })
        .collect();

    LpcAnalysis {
        candidates,
        estimated_order,
    }
}
