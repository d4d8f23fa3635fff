//! Pulse duration thresholding
//!
//! Pulse magnitudes are split into a short and a long class with a trimmed
//! two-centroid k-means, seeded at the two densest duration values. Seeding
//! and iteration are fixed, so the same pulses always give the same timing.

use serde::{Deserialize, Serialize};

use crate::trace::Pulse;

/// Maximum relative deviation from a centroid for a pulse to belong to it
pub const NOISE_TOLERANCE: f64 = 0.6;

/// A low pulse this many times the long centroid separates frames
pub const GAP_FACTOR: f64 = 4.0;

/// Long/short ratio below which the capture is treated as one class
const MIN_CLASS_RATIO: f64 = 1.3;

/// Widest long/short ratio considered when seeding the second class, so
/// frame gaps never seed a centroid
const MAX_SEED_RATIO: f64 = 5.0;

/// Relative window used to find dense duration values for seeding
const SEED_WINDOW: f64 = 0.2;

const MAX_ITERATIONS: usize = 32;

/// Learned pulse timing for one capture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PulseTiming {
    /// Short class centroid in microseconds
    pub short_us: f64,
    /// Long class centroid in microseconds
    pub long_us: f64,
    /// Midpoint between the two centroids
    pub threshold_us: f64,
    /// Fraction of pulses outside both classes (frame gaps excluded)
    pub noise_fraction: f64,
    /// False when only one duration class exists and `long_us` is synthetic
    pub bimodal: bool,
}

/// Class of one pulse under a [`PulseTiming`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseClass {
    Short,
    Long,
    /// Long low pulse between frames
    Gap,
    Noise,
}

impl PulseClass {
    /// Short or long, i.e. carries symbol information
    pub fn is_data(self) -> bool {
        matches!(self, Self::Short | Self::Long)
    }
}

impl PulseTiming {
    fn from_centroids(short_us: f64, long_us: f64, bimodal: bool) -> Self {
        Self {
            short_us,
            long_us,
            threshold_us: (short_us + long_us) / 2.0,
            noise_fraction: 0.0,
            bimodal,
        }
    }

    pub fn classify(&self, duration_us: u32, high: bool) -> PulseClass {
        let d = duration_us as f64;
        let (centroid, class) = if d < self.threshold_us {
            (self.short_us, PulseClass::Short)
        } else {
            (self.long_us, PulseClass::Long)
        };

        if within(d, centroid) {
            class
        } else if !high && d >= self.long_us * GAP_FACTOR {
            PulseClass::Gap
        } else {
            PulseClass::Noise
        }
    }

    /// Centroid of a data class
    pub fn centroid(&self, class: PulseClass) -> Option<f64> {
        match class {
            PulseClass::Short => Some(self.short_us),
            PulseClass::Long => Some(self.long_us),
            PulseClass::Gap | PulseClass::Noise => None,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.long_us / self.short_us
    }

    /// Normalized distance between the clusters, in [0, 1)
    pub fn separation(&self) -> f64 {
        (self.long_us - self.short_us) / (self.long_us + self.short_us)
    }
}

/// A maximal run of one level. Adjacent same-level pulses are merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    /// Index of the first pulse in the run
    pub start: usize,
    pub duration_us: u32,
    pub high: bool,
}

pub fn merge_runs(pulses: &[Pulse]) -> Vec<Run> {
    let mut runs: Vec<Run> = Vec::with_capacity(pulses.len());
    for (idx, pulse) in pulses.iter().enumerate() {
        match runs.last_mut() {
            Some(last) if last.high == pulse.is_high() => {
                last.duration_us = last.duration_us.saturating_add(pulse.duration_us());
            }
            _ => runs.push(Run {
                start: idx,
                duration_us: pulse.duration_us(),
                high: pulse.is_high(),
            }),
        }
    }
    runs
}

/// Learn short/long timing from a run sequence. `None` for no runs.
pub fn cluster(runs: &[Run]) -> Option<PulseTiming> {
    if runs.is_empty() {
        return None;
    }

    let mut sorted: Vec<f64> = runs.iter().map(|r| r.duration_us as f64).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let (first, _) = densest(&sorted, |_| true);
    let second = densest(&sorted, |d| {
        let ratio = d.max(first) / d.min(first);
        ratio >= MIN_CLASS_RATIO && ratio <= MAX_SEED_RATIO
    });

    let mut timing = match second {
        (_, 0) => single_class(&sorted, first),
        (other, _) => {
            let mut short = first.min(other);
            let mut long = first.max(other);
            for _ in 0..MAX_ITERATIONS {
                let (mut s_sum, mut s_n, mut l_sum, mut l_n) = (0.0, 0usize, 0.0, 0usize);

                for &d in &sorted {
                    // Relative distance so classes of different width are judged alike
                    let ds = (d - short).abs() / short;
                    let dl = (d - long).abs() / long;
                    if ds <= dl {
                        if ds <= NOISE_TOLERANCE {
                            s_sum += d;
                            s_n += 1;
                        }
                    } else if dl <= NOISE_TOLERANCE {
                        l_sum += d;
                        l_n += 1;
                    }
                }

                let next_short = if s_n > 0 { s_sum / s_n as f64 } else { short };
                let next_long = if l_n > 0 { l_sum / l_n as f64 } else { long };
                let settled = (next_short - short).abs() < 0.5 && (next_long - long).abs() < 0.5;
                short = next_short;
                long = next_long;
                if settled {
                    break;
                }
            }

            if long < short * MIN_CLASS_RATIO {
                single_class(&sorted, first)
            } else {
                PulseTiming::from_centroids(short, long, true)
            }
        }
    };

    let noise = runs
        .iter()
        .filter(|r| timing.classify(r.duration_us, r.high) == PulseClass::Noise)
        .count();
    timing.noise_fraction = noise as f64 / runs.len() as f64;

    Some(timing)
}

fn single_class(sorted: &[f64], mode: f64) -> PulseTiming {
    let (sum, n) = sorted
        .iter()
        .filter(|&&d| within(d, mode))
        .fold((0.0, 0usize), |(sum, n), &d| (sum + d, n + 1));
    let short = if n > 0 { sum / n as f64 } else { mode };
    PulseTiming::from_centroids(short, short * 2.0, false)
}

#[inline]
fn within(d: f64, centroid: f64) -> bool {
    centroid > 0.0 && (d - centroid).abs() / centroid <= NOISE_TOLERANCE
}

/// Duration with the most neighbours within [`SEED_WINDOW`] among those
/// accepted by `eligible`, and that neighbour count. Ties keep the shorter.
fn densest(sorted: &[f64], eligible: impl Fn(f64) -> bool) -> (f64, usize) {
    let mut best = (0.0, 0usize);
    let mut prev = f64::NAN;
    for &d in sorted {
        if d == prev || !eligible(d) {
            continue;
        }
        prev = d;
        let lo = sorted.partition_point(|&v| v < d * (1.0 - SEED_WINDOW));
        let hi = sorted.partition_point(|&v| v <= d * (1.0 + SEED_WINDOW));
        if hi - lo > best.1 {
            best = (d, hi - lo);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs_from(durations: &[i32]) -> Vec<Run> {
        let pulses: Vec<Pulse> = durations.iter().map(|&d| Pulse::new(d).unwrap()).collect();
        merge_runs(&pulses)
    }

    #[test]
    fn test_merge_runs() {
        let runs = runs_from(&[300, 200, -900, 900, -100, -200]);
        assert_eq!(runs.len(), 4);
        assert_eq!(runs[0].duration_us, 500);
        assert_eq!(runs[3].duration_us, 300);
        assert_eq!(runs[3].start, 4);
        assert!(!runs[3].high);
    }

    #[test]
    fn test_cluster_two_classes() {
        let runs = runs_from(&[350, -1050, 1050, -350, 350, -1050, 1050, -350, 350, -10850]);
        let timing = cluster(&runs).unwrap();
        assert!(timing.bimodal);
        assert!((timing.short_us - 350.0).abs() < 1.0);
        assert!((timing.long_us - 1050.0).abs() < 1.0);
        assert!((timing.threshold_us - 700.0).abs() < 1.0);
        // the trailing gap is a frame separator, not noise
        assert_eq!(timing.noise_fraction, 0.0);
        assert_eq!(timing.classify(10850, false), PulseClass::Gap);
        assert_eq!(timing.classify(10850, true), PulseClass::Noise);
    }

    #[test]
    fn test_cluster_ignores_outliers() {
        let mut durations = Vec::new();
        for i in 0..20 {
            if i % 2 == 0 {
                durations.extend_from_slice(&[400, -800]);
            } else {
                durations.extend_from_slice(&[800, -400]);
            }
        }
        durations[7] = -2500;
        durations[12] = 60;
        let timing = cluster(&runs_from(&durations)).unwrap();
        assert!((timing.short_us - 400.0).abs() < 1.0);
        assert!((timing.long_us - 800.0).abs() < 1.0);
        assert_eq!(timing.classify(60, true), PulseClass::Noise);
        assert!((timing.noise_fraction - 2.0 / 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_cluster_single_class() {
        let timing = cluster(&runs_from(&[500, -510, 490, -500, 505, -495])).unwrap();
        assert!(!timing.bimodal);
        assert!((timing.ratio() - 2.0).abs() < 1e-9);
        assert_eq!(timing.classify(500, true), PulseClass::Short);
    }

    #[test]
    fn test_cluster_empty() {
        assert!(cluster(&[]).is_none());
    }
}
