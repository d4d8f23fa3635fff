//! Bitstream features for fixed/rolling classification
//!
//! Every feature is expressed as rolling evidence in [0, 1]: 0 argues for a
//! fixed code, 1 for a rolling code.

use crate::demod::Encoding;
use crate::trace::FrequencyBand;

/// Window for the sliding entropy measure
pub const ENTROPY_WINDOW: usize = 8;

/// Longest bitstream examined by the repetition measure
pub const MAX_ANALYSIS_BITS: usize = 512;

/// Transition rate at or below which a frame reads as fixed
pub const LOW_TRANSITION_RATE: f64 = 0.2;

/// Transition rate at or above which a frame reads as rolling
pub const HIGH_TRANSITION_RATE: f64 = 0.4;

/// Rolling evidence from frame length.
///
/// Below `fixed_below` is 0, above `rolling_above` is 1, and the band between
/// maps linearly onto 0.25..=0.75.
pub fn bit_length_evidence(len: usize, fixed_below: usize, rolling_above: usize) -> f64 {
    if len < fixed_below {
        0.0
    } else if len > rolling_above {
        1.0
    } else if rolling_above == fixed_below {
        0.5
    } else {
        let t = (len - fixed_below) as f64 / (rolling_above - fixed_below) as f64;
        0.25 + 0.5 * t
    }
}

pub fn encoding_evidence(encoding: Encoding) -> f64 {
    match encoding {
        Encoding::Ook => 0.0,
        Encoding::Pwm | Encoding::Manchester => 1.0,
    }
}

/// Rolling evidence from the carrier band. 350-450 MHz, where most rolling
/// remotes sit, leans rolling; other bands are neutral.
pub fn band_evidence(band: FrequencyBand) -> f64 {
    match band {
        FrequencyBand::Mid390 | FrequencyBand::High433 => 1.0,
        FrequencyBand::Low315 | FrequencyBand::Band868 | FrequencyBand::Other => 0.5,
    }
}

/// Fraction of adjacent bit pairs that differ
pub fn transition_rate(bits: &[u8]) -> f64 {
    if bits.len() < 2 {
        return 0.0;
    }
    let transitions = bits.windows(2).filter(|w| w[0] != w[1]).count();
    transitions as f64 / (bits.len() - 1) as f64
}

/// Rolling evidence from bit transitions: 0 up to [`LOW_TRANSITION_RATE`],
/// 1 from [`HIGH_TRANSITION_RATE`], linear between
pub fn transition_evidence(bits: &[u8]) -> f64 {
    let rate = transition_rate(bits);
    ((rate - LOW_TRANSITION_RATE) / (HIGH_TRANSITION_RATE - LOW_TRANSITION_RATE)).clamp(0.0, 1.0)
}

fn binary_entropy(ones: usize, total: usize) -> f64 {
    if total == 0 || ones == 0 || ones == total {
        return 0.0;
    }
    let p = ones as f64 / total as f64;
    let q = 1.0 - p;
    -(p * p.log2() + q * q.log2())
}

/// Mean Shannon entropy over sliding windows of [`ENTROPY_WINDOW`] bits, or of
/// the whole stream when it is shorter. 0 for constant bits, 1 for alternating.
pub fn entropy(bits: &[u8]) -> f64 {
    if bits.len() <= ENTROPY_WINDOW {
        let ones = bits.iter().filter(|&&b| b != 0).count();
        return binary_entropy(ones, bits.len());
    }

    let mut ones = bits[..ENTROPY_WINDOW].iter().filter(|&&b| b != 0).count();
    let mut sum = binary_entropy(ones, ENTROPY_WINDOW);
    for i in ENTROPY_WINDOW..bits.len() {
        if bits[i] != 0 {
            ones += 1;
        }
        if bits[i - ENTROPY_WINDOW] != 0 {
            ones -= 1;
        }
        sum += binary_entropy(ones, ENTROPY_WINDOW);
    }
    sum / (bits.len() - ENTROPY_WINDOW + 1) as f64
}

/// Best self-agreement over lags `1..=n/2`, rescaled so chance (0.5) maps to 0
pub fn periodicity(bits: &[u8]) -> f64 {
    let n = bits.len();
    if n < 4 {
        return 0.0;
    }
    let best = (1..=n / 2)
        .map(|lag| {
            let agree = bits
                .iter()
                .zip(&bits[lag..])
                .filter(|(a, b)| a == b)
                .count();
            agree as f64 / (n - lag) as f64
        })
        .fold(0.0, f64::max);
    ((best - 0.5) / 0.5).max(0.0)
}

/// Length of the longest substring occurring twice without overlap
pub fn longest_repeat(bits: &[u8]) -> usize {
    let n = bits.len();
    // prev[j] / cur[j]: common suffix length of bits[..i] and bits[..j]
    let mut prev = vec![0usize; n + 1];
    let mut cur = vec![0usize; n + 1];
    let mut best = 0;
    for i in 1..=n {
        for j in (i + 1)..=n {
            cur[j] = if bits[i - 1] == bits[j - 1] && prev[j - 1] < j - i {
                prev[j - 1] + 1
            } else {
                0
            };
            best = best.max(cur[j]);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    best
}

/// How much a bitstream repeats itself, in [0, 1]: mean of periodicity and the
/// longest non-overlapping repeat relative to half the length
pub fn repetition(bits: &[u8]) -> f64 {
    let bits = &bits[..bits.len().min(MAX_ANALYSIS_BITS)];
    if bits.len() < 2 {
        return 0.0;
    }
    let half = (bits.len() / 2) as f64;
    let repeat = (longest_repeat(bits) as f64 / half).min(1.0);
    ((periodicity(bits) + repeat) / 2.0).clamp(0.0, 1.0)
}
