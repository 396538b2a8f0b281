//! Predictor search: CONSTANT/VERBATIM detection, fixed-order residual
//! generation, and LPC order selection (spec component C6).
//!
//! Mirrors `libflake/optimize.c`'s `encode_residual` and the
//! `encode_residual_fixed` / `encode_residual_lpc` helpers, plus the
//! seven `FLAKE_ORDER_METHOD_*` search strategies it dispatches to.

use crate::frame::{Subframe, SubframeType};
use crate::lpc::{self, MAX_LPC_ORDER};
use crate::rice;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderMethod {
    Max,
    Est,
    TwoLevel,
    FourLevel,
    EightLevel,
    Search,
    Log,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionType {
    None,
    Fixed,
    Lpc,
}

pub struct ResidualParams {
    pub prediction_type: PredictionType,
    pub order_method: OrderMethod,
    pub min_prediction_order: u32,
    pub max_prediction_order: u32,
    pub min_partition_order: u32,
    pub max_partition_order: u32,
    pub lpc_precision: u32,
}

fn is_constant(samples: &[i32]) -> bool {
    samples.iter().all(|&s| s == samples[0])
}

/// Fixed-order forward difference, orders 0-4, mirroring
/// `encode_residual_fixed`. Warm-up samples are copied verbatim.
fn fixed_residual(samples: &[i32], order: u32) -> Vec<i32> {
    let n = samples.len();
    let mut res = samples.to_vec();
    match order {
        0 => {}
        1 => {
            for i in 1..n {
                res[i] = samples[i] - samples[i - 1];
            }
        }
        2 => {
            for i in 2..n {
                res[i] = samples[i] - 2 * samples[i - 1] + samples[i - 2];
            }
        }
        3 => {
            for i in 3..n {
                res[i] = samples[i] - 3 * samples[i - 1] + 3 * samples[i - 2] - samples[i - 3];
            }
        }
        4 => {
            for i in 4..n {
                res[i] = samples[i] - 4 * samples[i - 1] + 6 * samples[i - 2]
                    - 4 * samples[i - 3]
                    + samples[i - 4];
            }
        }
        _ => unreachable!("fixed order must be 0..=4"),
    }
    res
}

/// LPC residual, 64-bit accumulation, mirroring `encode_residual_lpc`.
fn lpc_residual(samples: &[i32], coefs: &[i32], shift: i32, order: u32) -> Vec<i32> {
    let n = samples.len();
    let order = order as usize;
    let mut res = samples.to_vec();
    for i in order..n {
        let mut pred: i64 = 0;
        for (j, &c) in coefs.iter().enumerate() {
            pred += c as i64 * samples[i - 1 - j] as i64;
        }
        res[i] = (samples[i] as i64 - (pred >> shift)) as i32;
    }
    res
}

/// Search fixed predictor orders `min..=max.min(4)`, returning the
/// winning order, its residual, and its estimated bit cost.
fn search_fixed(
    samples: &[i32],
    p: &ResidualParams,
    bps: u32,
) -> (u32, Vec<i32>, rice::RiceParams, u64) {
    let n = samples.len() as u32;
    let max_order = p.max_prediction_order.min(4).min(n.saturating_sub(1));
    let min_order = p.min_prediction_order.min(max_order);

    let mut best_order = min_order;
    let mut best_bits = u64::MAX;
    let mut best_res = Vec::new();
    let mut best_rc = rice::RiceParams {
        porder: 0,
        params: vec![0],
    };

    for order in min_order..=max_order {
        let res = fixed_residual(samples, order);
        let (rc, bits) =
            rice::calc_rice_params_fixed(p.min_partition_order, p.max_partition_order, &res, n, order, bps);
        if bits < best_bits {
            best_bits = bits;
            best_order = order;
            best_res = res;
            best_rc = rc;
        }
    }
    (best_order, best_res, best_rc, best_bits)
}

fn lpc_candidate_cost(
    samples: &[i32],
    analysis: &lpc::LpcAnalysis,
    order: u32,
    p: &ResidualParams,
    bps: u32,
) -> (Vec<i32>, rice::RiceParams, u64) {
    let cand = analysis.candidate(order);
    let res = lpc_residual(samples, &cand.coefs, cand.shift, order);
    let (rc, bits) = rice::calc_rice_params_lpc(
        p.min_partition_order,
        p.max_partition_order,
        &res,
        samples.len() as u32,
        order,
        bps,
        p.lpc_precision,
    );
    (res, rc, bits)
}

/// Search LPC prediction orders per `p.order_method`, mirroring the
/// `FLAKE_ORDER_METHOD_*` dispatch in `encode_residual`.
fn search_lpc(
    samples: &[i32],
    p: &ResidualParams,
    bps: u32,
) -> (u32, Vec<i32>, rice::RiceParams, Vec<i32>, i32, u64) {
    let max_order = p.max_prediction_order.min(MAX_LPC_ORDER);
    let min_order = p.min_prediction_order.max(1);
    let analysis = lpc::analyze(samples, max_order, p.lpc_precision);

    let eval = |order: u32| -> (Vec<i32>, rice::RiceParams, u64) {
        lpc_candidate_cost(samples, &analysis, order, p, bps)
    };

    let opt_order = match p.order_method {
        OrderMethod::Max => max_order,
        OrderMethod::Est => analysis.estimated_order.clamp(min_order, max_order),
        OrderMethod::TwoLevel | OrderMethod::FourLevel | OrderMethod::EightLevel => {
            let levels: u32 = match p.order_method {
                OrderMethod::TwoLevel => 2,
                OrderMethod::FourLevel => 4,
                OrderMethod::EightLevel => 8,
                _ => unreachable!(),
            };
            let mut best_order = max_order;
            let mut best_bits = u64::MAX;
            for j in 1..=levels {
                let mut order = min_order + (((max_order - min_order + 1) * j) / levels) - 1;
                order = order.max(0).max(min_order - 1).min(max_order - 1);
                let order = order + 1;
                let (_, _, bits) = eval(order);
                if bits < best_bits {
                    best_bits = bits;
                    best_order = order;
                }
            }
            best_order
        }
        OrderMethod::Search => {
            let mut best_order = min_order;
            let mut best_bits = u64::MAX;
            for order in min_order..=max_order {
                let (_, _, bits) = eval(order);
                if bits < best_bits {
                    best_bits = bits;
                    best_order = order;
                }
            }
            best_order
        }
        OrderMethod::Log => {
            // Ternary/log search: probe around a starting estimate with
            // halving step sizes, à la the FFmpeg FLAC encoder's log
            // search. Each probed order is evaluated at most once.
            let mut bits_cache: Vec<Option<u64>> = vec![None; max_order as usize];
            let mut opt_order = min_order as i64 - 1 + (max_order as i64 - min_order as i64) / 3;
            let mut step = 16i64;
            while step > 0 {
                let last = opt_order;
                let mut i = last - step;
                while i <= last + step {
                    if i >= min_order as i64 - 1 && i < max_order as i64 {
                        let idx = i as usize;
                        if bits_cache[idx].is_none() {
                            let (_, _, bits) = eval((i + 1) as u32);
                            bits_cache[idx] = Some(bits);
                        }
                        if bits_cache[idx].unwrap() < bits_cache[opt_order as usize].unwrap_or(u64::MAX)
                        {
                            opt_order = i;
                        }
                    }
                    i += step;
                }
                step >>= 1;
            }
            (opt_order + 1) as u32
        }
    };

    let (res, rc, bits) = eval(opt_order);
    let cand = analysis.candidate(opt_order);
    (opt_order, res, rc, cand.coefs.clone(), cand.shift, bits)
}

/// Analyze one channel's samples and fill in its subframe's predictor,
/// residual, and Rice parameters. Returns the estimated subframe bit
/// cost (used by the caller only for diagnostics; the actual emitted
/// size is whatever `frame::write_frame` produces).
pub fn encode_residual(sub: &mut Subframe, p: &ResidualParams) -> u64 {
    let n = sub.samples.len();

    if is_constant(&sub.samples) {
        sub.kind = SubframeType::Constant;
        sub.residual = vec![sub.samples[0]];
        return sub.obits as u64;
    }

    if n < 5 || p.prediction_type == PredictionType::None {
        sub.kind = SubframeType::Verbatim;
        sub.residual = sub.samples.clone();
        return sub.obits as u64 * n as u64;
    }

    match p.prediction_type {
        PredictionType::None => unreachable!(),
        PredictionType::Fixed => {
            let (order, res, rc, bits) = search_fixed(&sub.samples, p, sub.obits);
            sub.kind = SubframeType::Fixed(order);
            sub.residual = res;
            sub.rc = rc;
            bits
        }
        PredictionType::Lpc => {
            if n as u32 <= p.max_prediction_order {
                let (order, res, rc, bits) = search_fixed(&sub.samples, p, sub.obits);
                sub.kind = SubframeType::Fixed(order);
                sub.residual = res;
                sub.rc = rc;
                return bits;
            }
            let (order, res, rc, coefs, shift, bits) = search_lpc(&sub.samples, p, sub.obits);
            sub.kind = SubframeType::Lpc(order);
            sub.residual = res;
            sub.rc = rc;
            sub.coefs = coefs;
            sub.shift = shift;
            bits
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Subframe;

    fn make_subframe(samples: Vec<i32>) -> Subframe {
        Subframe {
            kind: SubframeType::Verbatim,
            wasted_bits: 0,
            obits: 16,
            residual: samples.clone(),
            samples,
            coefs: Vec::new(),
            shift: 0,
            rc: rice::RiceParams {
                porder: 0,
                params: vec![0],
            },
        }
    }

    fn fixed_params() -> ResidualParams {
        ResidualParams {
            prediction_type: PredictionType::Fixed,
            order_method: OrderMethod::Search,
            min_prediction_order: 0,
            max_prediction_order: 4,
            min_partition_order: 0,
            max_partition_order: 4,
            lpc_precision: 15,
        }
    }

    #[test]
    fn all_zero_mono_block_picks_constant() {
        let mut sub = make_subframe(vec![0; 64]);
        encode_residual(&mut sub, &fixed_params());
        assert_eq!(sub.kind, SubframeType::Constant);
        assert_eq!(sub.residual, vec![0]);
    }

    #[test]
    fn linear_ramp_picks_fixed_order_two_with_zero_residual() {
        let samples: Vec<i32> = (0..64).map(|i| 3 + 2 * i).collect();
        let mut sub = make_subframe(samples);
        encode_residual(&mut sub, &fixed_params());
        assert_eq!(sub.kind, SubframeType::Fixed(2));
        assert!(sub.residual[2..].iter().all(|&r| r == 0));
    }

    #[test]
    fn tiny_block_falls_back_to_verbatim() {
        let mut sub = make_subframe(vec![1, -2, 3]);
        encode_residual(&mut sub, &fixed_params());
        assert_eq!(sub.kind, SubframeType::Verbatim);
    }

    #[test]
    fn lpc_order_selection_methods_agree_on_an_easy_signal() {
        let samples: Vec<i32> = (0..512)
            .map(|i: i32| ((i as f64 * 0.05).sin() * 1000.0) as i32)
            .collect();
        for method in [
            OrderMethod::Max,
            OrderMethod::Est,
            OrderMethod::TwoLevel,
            OrderMethod::FourLevel,
            OrderMethod::EightLevel,
            OrderMethod::Search,
            OrderMethod::Log,
        ] {
            let mut sub = make_subframe(samples.clone());
            let params = ResidualParams {
                prediction_type: PredictionType::Lpc,
                order_method: method,
                min_prediction_order: 1,
                max_prediction_order: 8,
                min_partition_order: 0,
                max_partition_order: 4,
                lpc_precision: 12,
            };
            encode_residual(&mut sub, &params);
            match sub.kind {
                SubframeType::Lpc(order) => assert!(order >= 1 && order <= 8),
                SubframeType::Fixed(_) | SubframeType::Constant | SubframeType::Verbatim => {
                    panic!("expected an LPC subframe for method {:?}", method)
                }
            }
        }
    }

    #[test]
    fn four_level_search_never_beats_full_search_on_bits() {
        let samples: Vec<i32> = (0..512)
            .map(|i: i32| ((i as f64 * 0.05).sin() * 1000.0) as i32)
            .collect();

        let base = ResidualParams {
            prediction_type: PredictionType::Lpc,
            order_method: OrderMethod::Search,
            min_prediction_order: 1,
            max_prediction_order: 8,
            min_partition_order: 0,
            max_partition_order: 4,
            lpc_precision: 12,
        };
        let mut sub_search = make_subframe(samples.clone());
        let bits_search = encode_residual(&mut sub_search, &base);

        let mut four_level = base;
        four_level.order_method = OrderMethod::FourLevel;
        let mut sub_4l = make_subframe(samples);
        let bits_4l = encode_residual(&mut sub_4l, &four_level);

        assert!(bits_search <= bits_4l);
    }
}
