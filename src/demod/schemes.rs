//! Per-scheme bit recovery
//!
//! Each decoder works on the merged level runs and their precomputed classes,
//! and reports a `fit` in [0, 1] describing how consistent the capture is with
//! that scheme. Scheme selection and confidence live in the parent module.

use tracing::trace;

use super::bits::{DecodeWarning, FrameSpan};
use super::threshold::{PulseClass, PulseTiming, Run, NOISE_TOLERANCE};

/// Relative difference between neighbouring symbol periods treated as total instability
const PERIOD_TOLERANCE: f64 = 0.25;

/// Output of one scheme decoder
#[derive(Debug, Clone, PartialEq)]
pub struct SchemeOutput {
    pub bits: Vec<u8>,
    pub frames: Vec<FrameSpan>,
    pub fit: f64,
    pub warnings: Vec<DecodeWarning>,
}

impl SchemeOutput {
    fn empty() -> Self {
        Self {
            bits: Vec::new(),
            frames: Vec::new(),
            fit: 0.0,
            warnings: Vec::new(),
        }
    }
}

/// Accumulates bits and records frame boundaries
#[derive(Default)]
struct FrameBuilder {
    bits: Vec<u8>,
    frames: Vec<FrameSpan>,
    start: usize,
}

impl FrameBuilder {
    fn push(&mut self, bit: u8) {
        self.bits.push(bit);
    }

    fn flush(&mut self) {
        let len = self.bits.len() - self.start;
        if len > 0 {
            self.frames.push(FrameSpan {
                start: self.start,
                len,
            });
        }
        self.start = self.bits.len();
    }

    fn finish(mut self) -> (Vec<u8>, Vec<FrameSpan>) {
        self.flush();
        (self.bits, self.frames)
    }
}

/// A high run immediately followed by a low run, both inliers
#[derive(Debug, Clone, Copy)]
struct Symbol {
    mark_us: u32,
    space_us: u32,
    mark: PulseClass,
    space: PulseClass,
}

impl Symbol {
    fn period_us(&self) -> f64 {
        self.mark_us as f64 + self.space_us as f64
    }
}

struct Pairing {
    /// Symbols grouped by frame. Frames are never empty.
    frames: Vec<Vec<Symbol>>,
    /// Data runs that could not be paired
    orphans: usize,
    /// Short and long runs seen, paired or not
    data_runs: usize,
}

impl Pairing {
    fn symbol_count(&self) -> usize {
        self.frames.iter().map(Vec::len).sum()
    }

    fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.frames.iter().flatten()
    }

    /// Fraction of data runs that ended up inside a symbol
    fn paired_fraction(&self) -> f64 {
        if self.data_runs == 0 {
            return 0.0;
        }
        (2 * self.symbol_count()) as f64 / self.data_runs as f64
    }
}

fn pair_symbols(runs: &[Run], classes: &[PulseClass]) -> Pairing {
    let mut frames: Vec<Vec<Symbol>> = Vec::new();
    let mut current: Vec<Symbol> = Vec::new();
    let mut orphans = 0usize;
    let data_runs = classes.iter().filter(|c| c.is_data()).count();

    let mut i = 0;
    while i < runs.len() {
        let class = classes[i];
        if class == PulseClass::Gap {
            if !current.is_empty() {
                frames.push(std::mem::take(&mut current));
            }
            i += 1;
            continue;
        }

        let pairs_with_next = runs[i].high
            && class.is_data()
            && runs
                .get(i + 1)
                .map_or(false, |next| !next.high && classes[i + 1].is_data());

        if pairs_with_next {
            current.push(Symbol {
                mark_us: runs[i].duration_us,
                space_us: runs[i + 1].duration_us,
                mark: class,
                space: classes[i + 1],
            });
            i += 2;
        } else {
            if class.is_data() {
                orphans += 1;
            }
            i += 1;
        }
    }
    if !current.is_empty() {
        frames.push(current);
    }

    Pairing {
        frames,
        orphans,
        data_runs,
    }
}

/// 1 when neighbouring symbols share the same period, falling to 0 as the mean
/// relative difference reaches [`PERIOD_TOLERANCE`]
fn period_stability(pairing: &Pairing) -> f64 {
    let mut total = 0.0;
    let mut n = 0usize;
    for frame in &pairing.frames {
        for pair in frame.windows(2) {
            let a = pair[0].period_us();
            let b = pair[1].period_us();
            total += (a - b).abs() / a.max(b);
            n += 1;
        }
    }
    if n == 0 {
        return 1.0;
    }
    1.0 - (total / n as f64 / PERIOD_TOLERANCE).min(1.0)
}

/// 1 when every duration sits on its expected width, 0 at the noise tolerance
fn tightness(samples: impl Iterator<Item = (f64, f64)>) -> f64 {
    let (sum, n) = samples.fold((0.0, 0usize), |(sum, n), (d, expected)| {
        (sum + (d - expected).abs() / expected, n + 1)
    });
    if n == 0 {
        return 0.0;
    }
    1.0 - (sum / n as f64 / NOISE_TOLERANCE).min(1.0)
}

/// Timing tightness of every mark and space against its class centroid.
/// Shared by OOK and PWM.
fn symbol_tightness(pairing: &Pairing, timing: &PulseTiming) -> f64 {
    tightness(pairing.symbols().flat_map(|s| {
        [(s.mark_us, s.mark), (s.space_us, s.space)]
            .into_iter()
            .filter_map(move |(us, class)| {
                timing
                    .centroid(class)
                    .map(|expected| (us as f64, expected))
            })
    }))
}

fn orphan_warning(pairing: &Pairing, warnings: &mut Vec<DecodeWarning>) {
    if pairing.orphans > 0 {
        warnings.push(DecodeWarning::OrphanPulses {
            count: pairing.orphans,
        });
    }
}

fn pairing_frames(pairing: &Pairing, bit: impl Fn(&Symbol) -> u8) -> (Vec<u8>, Vec<FrameSpan>) {
    let mut builder = FrameBuilder::default();
    for frame in &pairing.frames {
        for symbol in frame {
            builder.push(bit(symbol));
        }
        builder.flush();
    }
    builder.finish()
}

/// On-off keying: a long mark is a 1, a short mark a 0
pub fn decode_ook(runs: &[Run], classes: &[PulseClass], timing: &PulseTiming) -> SchemeOutput {
    let pairing = pair_symbols(runs, classes);
    if pairing.symbol_count() == 0 {
        return SchemeOutput::empty();
    }

    let (bits, frames) = pairing_frames(&pairing, |s| u8::from(s.mark == PulseClass::Long));

    let timing_fit = symbol_tightness(&pairing, timing);
    let stability = period_stability(&pairing);
    let fit = pairing.paired_fraction() * stability * timing_fit;

    trace!(
        "OOK: {} symbols, stability {:.3}, tightness {:.3}",
        pairing.symbol_count(),
        stability,
        timing_fit
    );

    let mut warnings = Vec::new();
    orphan_warning(&pairing, &mut warnings);

    SchemeOutput {
        bits,
        frames,
        fit,
        warnings,
    }
}

/// Pulse-width: a 1 when the space is the shorter half of the symbol
pub fn decode_pwm(runs: &[Run], classes: &[PulseClass], timing: &PulseTiming) -> SchemeOutput {
    let pairing = pair_symbols(runs, classes);
    let symbols = pairing.symbol_count();
    if symbols == 0 {
        return SchemeOutput::empty();
    }

    let (bits, frames) = pairing_frames(&pairing, |s| u8::from(s.space_us < s.mark_us));

    let misaligned = pairing.symbols().filter(|s| s.mark == s.space).count();
    let aligned = (symbols - misaligned) as f64 / symbols as f64;
    let timing_fit = symbol_tightness(&pairing, timing);
    let stability = period_stability(&pairing);
    let fit = pairing.paired_fraction() * aligned * stability * timing_fit;

    trace!(
        "PWM: {} symbols, {} misaligned, stability {:.3}, tightness {:.3}",
        symbols,
        misaligned,
        stability,
        timing_fit
    );

    let mut warnings = Vec::new();
    orphan_warning(&pairing, &mut warnings);
    if misaligned > 0 {
        warnings.push(DecodeWarning::MisalignedSymbols { count: misaligned });
    }

    SchemeOutput {
        bits,
        frames,
        fit,
        warnings,
    }
}

/// Half-bit cell decoder state for Manchester
#[derive(Default)]
struct CellDecoder {
    cells: Vec<bool>,
    total_cells: usize,
    violations: usize,
}

impl CellDecoder {
    /// Pair buffered cells into bits. (high, low) is 1, (low, high) is 0; a
    /// pair of equal cells drops one cell to resynchronize.
    fn drain(&mut self, out: &mut FrameBuilder, complete_trailing_high: bool) {
        let cells = std::mem::take(&mut self.cells);
        self.total_cells += cells.len();

        let mut i = 0;
        while i + 1 < cells.len() {
            match (cells[i], cells[i + 1]) {
                (true, false) => {
                    out.push(1);
                    i += 2;
                }
                (false, true) => {
                    out.push(0);
                    i += 2;
                }
                _ => {
                    self.violations += 1;
                    i += 1;
                }
            }
        }
        // The low half of a final 1 is absorbed into the following gap
        if i + 1 == cells.len() && cells[i] && complete_trailing_high {
            out.push(1);
        }
    }
}

/// Manchester: short runs are one half-bit cell, long runs two
pub fn decode_manchester(
    runs: &[Run],
    classes: &[PulseClass],
    timing: &PulseTiming,
) -> SchemeOutput {
    let mut builder = FrameBuilder::default();
    let mut decoder = CellDecoder::default();

    for (run, &class) in runs.iter().zip(classes) {
        match class {
            PulseClass::Short => decoder.cells.push(run.high),
            PulseClass::Long => {
                decoder.cells.push(run.high);
                decoder.cells.push(run.high);
            }
            PulseClass::Gap => {
                decoder.drain(&mut builder, true);
                builder.flush();
            }
            PulseClass::Noise => {
                decoder.drain(&mut builder, false);
                decoder.violations += 1;
            }
        }
    }
    decoder.drain(&mut builder, true);
    let (bits, frames) = builder.finish();

    if bits.is_empty() {
        return SchemeOutput::empty();
    }

    let ratio_fit = if timing.bimodal {
        1.0 - (timing.ratio() - 2.0).abs().min(1.0)
    } else {
        0.5
    };
    let coverage = if decoder.total_cells > 0 {
        (2 * bits.len()) as f64 / decoder.total_cells as f64
    } else {
        0.0
    };
    let cell_us = timing.short_us;
    let consistency = tightness(runs.iter().zip(classes).filter_map(|(run, class)| {
        let cells = match class {
            PulseClass::Short => 1.0,
            PulseClass::Long => 2.0,
            PulseClass::Gap | PulseClass::Noise => return None,
        };
        Some((run.duration_us as f64, cells * cell_us))
    }));
    let fit = ratio_fit * coverage.min(1.0) * consistency;

    trace!(
        "Manchester: {} bits, {} violations, ratio fit {:.3}, coverage {:.3}, consistency {:.3}",
        bits.len(),
        decoder.violations,
        ratio_fit,
        coverage,
        consistency
    );

    let mut warnings = Vec::new();
    if decoder.violations > 0 {
        warnings.push(DecodeWarning::ManchesterViolations {
            count: decoder.violations,
        });
    }

    SchemeOutput {
        bits,
        frames,
        fit,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demod::threshold::{cluster, merge_runs};
    use crate::trace::Pulse;

    fn prepare(durations: &[i32]) -> (Vec<Run>, Vec<PulseClass>, PulseTiming) {
        let pulses: Vec<Pulse> = durations.iter().map(|&d| Pulse::new(d).unwrap()).collect();
        let runs = merge_runs(&pulses);
        let timing = cluster(&runs).unwrap();
        let classes = runs
            .iter()
            .map(|r| timing.classify(r.duration_us, r.high))
            .collect();
        (runs, classes, timing)
    }

    /// PT2262 style: 0 = short mark + long space, 1 = long mark + short space
    fn tristate_frame(bits: &[u8]) -> Vec<i32> {
        let mut out = Vec::new();
        for &b in bits {
            if b == 1 {
                out.extend_from_slice(&[1050, -350]);
            } else {
                out.extend_from_slice(&[350, -1050]);
            }
        }
        out.extend_from_slice(&[350, -10850]);
        out
    }

    /// Manchester cells of `te`: 1 = high then low, 0 = low then high
    fn manchester_frame(bits: &[u8], te: i32) -> Vec<i32> {
        let mut levels = Vec::new();
        for &b in bits {
            if b == 1 {
                levels.extend_from_slice(&[te, -te]);
            } else {
                levels.extend_from_slice(&[-te, te]);
            }
        }
        levels.push(-te * 12);
        levels
    }

    #[test]
    fn test_ook_bits_and_frames() {
        let bits = [1, 0, 1, 1, 0, 0, 1, 0];
        let mut durations = tristate_frame(&bits);
        durations.extend(tristate_frame(&bits));
        let (runs, classes, timing) = prepare(&durations);

        let out = decode_ook(&runs, &classes, &timing);
        assert_eq!(out.bits, [bits, bits].concat());
        assert_eq!(out.frames.len(), 2);
        assert_eq!(out.frames[1], FrameSpan { start: 8, len: 8 });
        // the sync mark before each gap is left unpaired
        assert!(out.fit > 0.9);
        assert!(out
            .warnings
            .contains(&DecodeWarning::OrphanPulses { count: 2 }));
    }

    #[test]
    fn test_pwm_agrees_with_ook_on_complementary_symbols() {
        let bits = [0, 1, 1, 0, 1, 0, 0, 1];
        let (runs, classes, timing) = prepare(&tristate_frame(&bits));
        let ook = decode_ook(&runs, &classes, &timing);
        let pwm = decode_pwm(&runs, &classes, &timing);
        assert_eq!(ook.bits, pwm.bits);
        assert!((ook.fit - pwm.fit).abs() < 1e-9);
    }

    #[test]
    fn test_jitter_does_not_split_ook_and_pwm() {
        let bits = [1, 0, 1, 0, 0, 1, 0, 1, 1, 1, 0, 0];
        let mut durations = tristate_frame(&bits);
        durations.extend(tristate_frame(&bits));
        for (i, d) in durations.iter_mut().enumerate() {
            if d.abs() < 4000 {
                *d += (((i * 37) % 61) as i32 - 30) * d.signum();
            }
        }
        let (runs, classes, timing) = prepare(&durations);
        let ook = decode_ook(&runs, &classes, &timing);
        let pwm = decode_pwm(&runs, &classes, &timing);
        assert_eq!(ook.bits, [bits, bits].concat());
        assert_eq!(ook.bits, pwm.bits);
        assert!(ook.fit < 1.0);
        assert!((ook.fit - pwm.fit).abs() < 1e-9);
    }

    #[test]
    fn test_pwm_flags_misaligned_symbols() {
        let (runs, classes, timing) =
            prepare(&[400, -800, 800, -400, 400, -400, 400, -800, 800, -400, 800, -800]);
        let out = decode_pwm(&runs, &classes, &timing);
        assert_eq!(out.bits.len(), 6);
        assert!(out
            .warnings
            .contains(&DecodeWarning::MisalignedSymbols { count: 2 }));
        assert!(out.fit < 0.7);
    }

    #[test]
    fn test_manchester_decodes_transitions() {
        let bits = [1, 0, 0, 1, 1, 1, 0, 1, 0, 0, 1, 1];
        let (runs, classes, timing) = prepare(&manchester_frame(&bits, 640));
        let out = decode_manchester(&runs, &classes, &timing);
        assert_eq!(out.bits, bits);
        assert!(out.warnings.is_empty());
        assert!(out.fit > 0.9);
    }

    #[test]
    fn test_manchester_rejects_three_to_one_timing() {
        let (runs, classes, timing) = prepare(&tristate_frame(&[1, 0, 0, 1, 1, 0]));
        let out = decode_manchester(&runs, &classes, &timing);
        assert_eq!(out.fit, 0.0);
    }

    #[test]
    fn test_period_stability_penalizes_manchester_for_ook() {
        let bits = [1, 0, 0, 1, 1, 1, 0, 1, 0, 0, 1, 1, 0, 1, 1, 0];
        let (runs, classes, timing) = prepare(&manchester_frame(&bits, 640));
        let ook = decode_ook(&runs, &classes, &timing);
        let manchester = decode_manchester(&runs, &classes, &timing);
        assert!(manchester.fit > ook.fit + 0.3);
    }
}
