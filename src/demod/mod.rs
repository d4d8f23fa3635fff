//! Pulse-to-bit decoding
//!
//! Pipeline: merge same-level pulses into runs, learn short/long timing,
//! then evaluate one or all line codings and keep the most consistent one.

pub mod bits;
pub mod schemes;
pub mod threshold;

pub use bits::{
    bits_to_hex, bits_to_string, bits_to_u64, find_preamble, payload_after_preamble,
    DecodeWarning, DecodedBits, Encoding, FrameSpan,
};
pub use threshold::{PulseClass, PulseTiming, Run};

use tracing::{debug, warn};

use crate::trace::Signal;
use schemes::SchemeOutput;

/// Fits this close to the best one are ties, broken in [`Encoding::ALL`] order
pub const TIE_EPSILON: f64 = 0.02;

/// Symbol count at which the pulse-count factor saturates
const FULL_COUNT_BITS: f64 = 32.0;

/// Cluster separation at which the separation factor saturates
const FULL_SEPARATION: f64 = 0.3;

/// Individually listed noise pulses per decode
const MAX_NOISE_WARNINGS: usize = 16;

/// Noise fraction above which a capture is logged as noisy
const NOISY_CAPTURE: f64 = 0.2;

impl Encoding {
    /// Upper bound on decode confidence under this scheme
    pub fn confidence_ceiling(self) -> f64 {
        match self {
            Self::Ook => 0.9,
            Self::Pwm => 0.95,
            Self::Manchester => 1.0,
        }
    }
}

/// Decode a capture. With `scheme` set only that coding is tried.
///
/// Never fails: a capture with nothing decodable yields empty bits with
/// confidence 0.
pub fn decode(signal: &Signal, scheme: Option<Encoding>) -> DecodedBits {
    let runs = threshold::merge_runs(signal.pulses());
    let timing = match threshold::cluster(&runs) {
        Some(t) => t,
        None => return DecodedBits::empty(scheme.unwrap_or(Encoding::Ook)),
    };
    let classes: Vec<PulseClass> = runs
        .iter()
        .map(|r| timing.classify(r.duration_us, r.high))
        .collect();

    debug!(
        "Timing: short {:.0} us, long {:.0} us, threshold {:.0} us, noise {:.1}%",
        timing.short_us,
        timing.long_us,
        timing.threshold_us,
        timing.noise_fraction * 100.0
    );
    if timing.noise_fraction > NOISY_CAPTURE {
        warn!(
            "Noisy capture at {} Hz: {:.1}% of pulses outside both duration classes",
            signal.frequency(),
            timing.noise_fraction * 100.0
        );
    }

    let mut warnings = noise_warnings(&runs, &classes);
    if !timing.bimodal {
        warnings.push(DecodeWarning::SingleDurationClass);
    }

    let candidates: Vec<(Encoding, SchemeOutput)> = match scheme {
        Some(encoding) => vec![(encoding, run_scheme(encoding, &runs, &classes, &timing))],
        None => Encoding::ALL
            .iter()
            .map(|&encoding| (encoding, run_scheme(encoding, &runs, &classes, &timing)))
            .collect(),
    };
    for (encoding, output) in &candidates {
        debug!(
            "{}: {} bits, fit {:.3}",
            encoding,
            output.bits.len(),
            output.fit
        );
    }

    let (encoding, output) = match select(candidates) {
        Some(chosen) => chosen,
        None => return DecodedBits::empty(scheme.unwrap_or(Encoding::Ook)),
    };

    let confidence = confidence(encoding, &output, &timing);
    warnings.extend(output.warnings);

    debug!(
        "Decoded {} bits as {} (confidence {:.3})",
        output.bits.len(),
        encoding,
        confidence
    );

    DecodedBits::assemble(
        output.bits,
        encoding,
        confidence,
        output.frames,
        Some(timing),
        warnings,
    )
}

fn run_scheme(
    encoding: Encoding,
    runs: &[Run],
    classes: &[PulseClass],
    timing: &PulseTiming,
) -> SchemeOutput {
    match encoding {
        Encoding::Ook => schemes::decode_ook(runs, classes, timing),
        Encoding::Pwm => schemes::decode_pwm(runs, classes, timing),
        Encoding::Manchester => schemes::decode_manchester(runs, classes, timing),
    }
}

/// Highest fit wins; anything within [`TIE_EPSILON`] of it counts as a tie and
/// the earliest candidate is kept.
fn select(candidates: Vec<(Encoding, SchemeOutput)>) -> Option<(Encoding, SchemeOutput)> {
    let best = candidates
        .iter()
        .map(|(_, output)| output.fit)
        .fold(f64::NEG_INFINITY, f64::max);
    candidates
        .into_iter()
        .find(|(_, output)| output.fit >= best - TIE_EPSILON)
}

fn confidence(encoding: Encoding, output: &SchemeOutput, timing: &PulseTiming) -> f64 {
    if output.bits.is_empty() {
        return 0.0;
    }
    let count = (output.bits.len() as f64 / FULL_COUNT_BITS).min(1.0);
    let separation = if timing.bimodal {
        (timing.separation() / FULL_SEPARATION).min(1.0)
    } else {
        0.5
    };
    encoding.confidence_ceiling() * output.fit * count * separation * (1.0 - timing.noise_fraction)
}

fn noise_warnings(runs: &[Run], classes: &[PulseClass]) -> Vec<DecodeWarning> {
    let mut warnings = Vec::new();
    let mut suppressed = 0usize;
    for (run, class) in runs.iter().zip(classes) {
        if *class != PulseClass::Noise {
            continue;
        }
        if warnings.len() < MAX_NOISE_WARNINGS {
            warnings.push(DecodeWarning::NoisePulse {
                index: run.start,
                duration_us: run.duration_us,
            });
        } else {
            suppressed += 1;
        }
    }
    if suppressed > 0 {
        warnings.push(DecodeWarning::NoiseSuppressed { count: suppressed });
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Preset;

    fn signal(durations: &[i32]) -> Signal {
        Signal::from_durations(433_920_000, Preset::Ook650, durations).unwrap()
    }

    fn tristate(bits: &[u8], repeats: usize) -> Vec<i32> {
        let mut out = Vec::new();
        for _ in 0..repeats {
            for &b in bits {
                if b == 1 {
                    out.extend_from_slice(&[1050, -350]);
                } else {
                    out.extend_from_slice(&[350, -1050]);
                }
            }
            out.extend_from_slice(&[350, -10850]);
        }
        out
    }

    const CODE: [u8; 12] = [1, 0, 1, 1, 0, 0, 1, 0, 1, 1, 1, 0];

    #[test]
    fn test_decode_prefers_ook_on_ties() {
        let decoded = decode(&signal(&tristate(&CODE, 3)), None);
        assert_eq!(decoded.encoding(), Encoding::Ook);
        assert_eq!(decoded.len(), 36);
        assert_eq!(decoded.primary_frame(), &CODE);
        assert!(decoded.confidence() > 0.8);
        assert!(decoded.timing().is_some());
    }

    #[test]
    fn test_jittered_capture_stays_ook() {
        let mut durations = tristate(&CODE, 3);
        for (i, d) in durations.iter_mut().enumerate() {
            if d.abs() < 4000 {
                *d += (((i * 37) % 61) as i32 - 30) * d.signum();
            }
        }
        let decoded = decode(&signal(&durations), None);
        assert_eq!(decoded.encoding(), Encoding::Ook);
        assert_eq!(decoded.primary_frame(), &CODE);
    }

    #[test]
    fn test_auto_selects_manchester() {
        let mut durations = Vec::new();
        for _ in 0..3 {
            for &b in &CODE {
                if b == 1 {
                    durations.extend_from_slice(&[500, -500]);
                } else {
                    durations.extend_from_slice(&[-500, 500]);
                }
            }
            durations.push(-6000);
        }
        let decoded = decode(&signal(&durations), None);
        assert_eq!(decoded.encoding(), Encoding::Manchester);
        assert_eq!(decoded.len(), 36);
        assert_eq!(decoded.primary_frame(), &CODE);
        assert!(decoded.warnings().is_empty());
    }

    #[test]
    fn test_forced_scheme_is_used() {
        let decoded = decode(&signal(&tristate(&CODE, 3)), Some(Encoding::Pwm));
        assert_eq!(decoded.encoding(), Encoding::Pwm);
        assert_eq!(decoded.primary_frame(), &CODE);
    }

    #[test]
    fn test_forced_scheme_is_deterministic() {
        let s = signal(&tristate(&CODE, 2));
        assert_eq!(
            decode(&s, Some(Encoding::Manchester)),
            decode(&s, Some(Encoding::Manchester))
        );
    }

    #[test]
    fn test_undecodable_capture_is_empty() {
        // a lone low pulse pairs with nothing and holds no Manchester bit
        let decoded = decode(&signal(&[-500]), None);
        assert!(decoded.is_empty());
        assert_eq!(decoded.confidence(), 0.0);
        assert!(decoded.warnings().contains(&DecodeWarning::SingleDurationClass));
    }

    #[test]
    fn test_noise_warnings_are_capped() {
        let mut durations = Vec::new();
        for _ in 0..20 {
            durations.extend_from_slice(&[350, -1050, 1050, -350, 40, -350]);
        }
        let decoded = decode(&signal(&durations), None);
        let listed = decoded
            .warnings()
            .iter()
            .filter(|w| matches!(w, DecodeWarning::NoisePulse { .. }))
            .count();
        assert_eq!(listed, MAX_NOISE_WARNINGS);
        assert!(decoded
            .warnings()
            .contains(&DecodeWarning::NoiseSuppressed { count: 4 }));
    }

    #[test]
    fn test_select_breaks_ties_in_order() {
        let out = |fit| SchemeOutput {
            bits: vec![1],
            frames: Vec::new(),
            fit,
            warnings: Vec::new(),
        };
        let chosen = select(vec![
            (Encoding::Ook, out(0.50)),
            (Encoding::Pwm, out(0.515)),
            (Encoding::Manchester, out(0.53)),
        ])
        .unwrap();
        assert_eq!(chosen.0, Encoding::Pwm);
    }
}
