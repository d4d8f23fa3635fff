//! Fixed vs rolling code classification
//!
//! A fixed weighted-feature model. Each feature yields rolling evidence in
//! [0, 1]; the score is the weighted mean and confidence is its distance from
//! the undecided middle.

pub mod features;

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::demod::DecodedBits;
use crate::protocol::{best_match, CodeKind, ProtocolMatch};
use crate::trace::Signal;

pub const BIT_LENGTH_WEIGHT: f64 = 0.30;
pub const ENCODING_WEIGHT: f64 = 0.20;
pub const ENTROPY_WEIGHT: f64 = 0.15;
pub const REPETITION_WEIGHT: f64 = 0.15;
pub const TRANSITION_WEIGHT: f64 = 0.10;
pub const BAND_WEIGHT: f64 = 0.05;
/// Cap on the known-protocol prior, scaled by match confidence
pub const PRIOR_WEIGHT_CAP: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalType {
    Fixed,
    Rolling,
    Ambiguous,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => f.write_str("Fixed"),
            Self::Rolling => f.write_str("Rolling"),
            Self::Ambiguous => f.write_str("Ambiguous"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    BitLength,
    Encoding,
    Entropy,
    Repetition,
    Transitions,
    FrequencyBand,
    ProtocolPrior,
}

impl Feature {
    pub fn name(self) -> &'static str {
        match self {
            Self::BitLength => "bit length",
            Self::Encoding => "encoding",
            Self::Entropy => "entropy",
            Self::Repetition => "repetition",
            Self::Transitions => "transitions",
            Self::FrequencyBand => "frequency band",
            Self::ProtocolPrior => "protocol prior",
        }
    }
}

/// One feature's share of the decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: Feature,
    /// Rolling evidence in [0, 1]
    pub evidence: f64,
    pub weight: f64,
    /// Human-readable reading of the feature
    pub note: String,
}

impl FeatureContribution {
    /// Signed weighted pull: positive toward rolling, negative toward fixed
    pub fn pull(&self) -> f64 {
        (self.evidence - 0.5) * self.weight
    }
}

/// Tunable bands and threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Frames shorter than this are strong fixed-code evidence
    pub fixed_below_bits: usize,
    /// Frames longer than this are strong rolling-code evidence
    pub rolling_above_bits: usize,
    /// Minimum confidence for a Fixed or Rolling verdict
    pub decision_threshold: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fixed_below_bits: 40,
            rolling_above_bits: 64,
            decision_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub signal_type: SignalType,
    pub confidence: f64,
    /// Aggregate rolling evidence in [0, 1]
    pub score: f64,
    pub rationale: Vec<String>,
    pub contributions: Vec<FeatureContribution>,
}

impl Classification {
    fn no_bits() -> Self {
        Self {
            signal_type: SignalType::Ambiguous,
            confidence: 0.0,
            score: 0.5,
            rationale: vec!["no decoded bits".to_string()],
            contributions: Vec::new(),
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Signal type: {} (confidence {:.1}%, score {:.3})",
            self.signal_type,
            self.confidence * 100.0,
            self.score
        )?;
        for reason in &self.rationale {
            writeln!(f, "  - {}", reason)?;
        }
        for c in &self.contributions {
            writeln!(
                f,
                "  {:<15} evidence {:.3} x weight {:.3}",
                c.feature.name(),
                c.evidence,
                c.weight
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify with an explicit protocol prior. Unknown or absent priors are ignored.
    pub fn classify(
        &self,
        signal: &Signal,
        decoded: &DecodedBits,
        prior: Option<&ProtocolMatch>,
    ) -> Classification {
        if decoded.is_empty() {
            return Classification::no_bits();
        }

        let contributions = self.features(signal, decoded, prior);
        let total_weight: f64 = contributions.iter().map(|c| c.weight).sum();
        let score = contributions
            .iter()
            .map(|c| c.evidence * c.weight)
            .sum::<f64>()
            / total_weight;
        let confidence = score.max(1.0 - score);

        let signal_type = if confidence < self.config.decision_threshold {
            SignalType::Ambiguous
        } else if score > 0.5 {
            SignalType::Rolling
        } else {
            SignalType::Fixed
        };

        let rationale = rationale(signal_type, &contributions);

        debug!(
            "Classified {} Hz capture as {} (score {:.3}, confidence {:.3})",
            signal.frequency(),
            signal_type,
            score,
            confidence
        );

        Classification {
            signal_type,
            confidence,
            score,
            rationale,
            contributions,
        }
    }

    fn features(
        &self,
        signal: &Signal,
        decoded: &DecodedBits,
        prior: Option<&ProtocolMatch>,
    ) -> Vec<FeatureContribution> {
        let frame = decoded.primary_frame();
        let cfg = &self.config;
        let mut out = Vec::with_capacity(7);

        let length = features::bit_length_evidence(
            frame.len(),
            cfg.fixed_below_bits,
            cfg.rolling_above_bits,
        );
        out.push(FeatureContribution {
            feature: Feature::BitLength,
            evidence: length,
            weight: BIT_LENGTH_WEIGHT,
            note: format!("{}-bit frame", frame.len()),
        });

        out.push(FeatureContribution {
            feature: Feature::Encoding,
            evidence: features::encoding_evidence(decoded.encoding()),
            weight: ENCODING_WEIGHT,
            note: format!("{} encoding", decoded.encoding()),
        });

        let entropy = features::entropy(frame);
        out.push(FeatureContribution {
            feature: Feature::Entropy,
            evidence: entropy,
            weight: ENTROPY_WEIGHT,
            note: format!("bit entropy {:.2}", entropy),
        });

        let repetition = features::repetition(frame);
        out.push(FeatureContribution {
            feature: Feature::Repetition,
            evidence: 1.0 - repetition,
            weight: REPETITION_WEIGHT,
            note: format!("internal repetition {:.2}", repetition),
        });

        let rate = features::transition_rate(frame);
        out.push(FeatureContribution {
            feature: Feature::Transitions,
            evidence: features::transition_evidence(frame),
            weight: TRANSITION_WEIGHT,
            note: format!("transition rate {:.2}", rate),
        });

        out.push(FeatureContribution {
            feature: Feature::FrequencyBand,
            evidence: features::band_evidence(signal.band()),
            weight: BAND_WEIGHT,
            note: format!("{:.2} MHz carrier", signal.frequency() as f64 / 1e6),
        });

        if let Some(m) = prior.filter(|m| !m.is_unknown()) {
            if let Some(kind) = m.kind {
                let evidence = match kind {
                    CodeKind::Fixed => 0.0,
                    CodeKind::Rolling => 1.0,
                };
                out.push(FeatureContribution {
                    feature: Feature::ProtocolPrior,
                    evidence,
                    weight: PRIOR_WEIGHT_CAP * m.confidence.clamp(0.0, 1.0),
                    note: format!("{} is a {} code protocol", m.name, kind),
                });
            }
        }

        out
    }
}

/// Reasons for the verdict, strongest first. Only features pulling toward the
/// decided side are listed; an ambiguous verdict lists every feature that pulled.
fn rationale(signal_type: SignalType, contributions: &[FeatureContribution]) -> Vec<String> {
    let mut pulling: Vec<(f64, &FeatureContribution)> = contributions
        .iter()
        .filter_map(|c| {
            let toward = match signal_type {
                SignalType::Rolling => c.pull(),
                SignalType::Fixed => -c.pull(),
                SignalType::Ambiguous => c.pull().abs(),
            };
            (toward > 0.0).then_some((toward, c))
        })
        .collect();
    pulling.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut lines: Vec<String> = pulling
        .into_iter()
        .map(|(_, c)| {
            let side = if c.pull() > 0.0 { "rolling" } else { "fixed" };
            format!("{} suggests {} code", c.note, side)
        })
        .collect();
    if signal_type == SignalType::Ambiguous {
        lines.push("classification uncertain due to mixed indicators".to_string());
    }
    lines
}

/// Classify using the best built-in protocol match as prior
pub fn classify(signal: &Signal, decoded: &DecodedBits) -> Classification {
    let prior = best_match(signal, decoded);
    Classifier::default().classify(signal, decoded, Some(&prior))
}
