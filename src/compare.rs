//! Same-transmitter estimation for two analyzed captures
//!
//! Each factor scores agreement in [0, 1] with a fixed weight. A factor whose
//! data is missing on either side is reported as unavailable and left out of
//! the weighted mean, so absent evidence never counts as a mismatch.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::analysis::Analysis;
use crate::classifier::SignalType;
use crate::protocol::{ProtocolMatch, Registry};

pub const FREQUENCY_WEIGHT: f64 = 0.25;
pub const PROTOCOL_WEIGHT: f64 = 0.30;
pub const FIELDS_WEIGHT: f64 = 0.30;
pub const ENCODING_WEIGHT: f64 = 0.15;
pub const BIT_LENGTH_WEIGHT: f64 = 0.10;
pub const SIGNAL_TYPE_WEIGHT: f64 = 0.10;

/// Carrier frequencies closer than this count as equal
pub const FREQUENCY_TOLERANCE_HZ: u64 = 1_000;

/// Frame lengths this close count as equal
pub const BIT_LENGTH_TOLERANCE: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorKind {
    Frequency,
    Protocol,
    Fields,
    Encoding,
    BitLength,
    SignalType,
}

impl FactorKind {
    pub fn weight(self) -> f64 {
        match self {
            Self::Frequency => FREQUENCY_WEIGHT,
            Self::Protocol => PROTOCOL_WEIGHT,
            Self::Fields => FIELDS_WEIGHT,
            Self::Encoding => ENCODING_WEIGHT,
            Self::BitLength => BIT_LENGTH_WEIGHT,
            Self::SignalType => SIGNAL_TYPE_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Match,
    Mismatch,
    /// Data missing on at least one side; excluded from the probability
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonFactor {
    pub kind: FactorKind,
    pub outcome: Outcome,
    /// Agreement in [0, 1]; 0 when unavailable
    pub score: f64,
    pub detail: String,
}

impl ComparisonFactor {
    fn scored(kind: FactorKind, score: f64, detail: String) -> Self {
        let outcome = if score >= 0.5 {
            Outcome::Match
        } else {
            Outcome::Mismatch
        };
        Self {
            kind,
            outcome,
            score,
            detail,
        }
    }

    fn matched(kind: FactorKind, equal: bool, detail: String) -> Self {
        Self::scored(kind, if equal { 1.0 } else { 0.0 }, detail)
    }

    fn unavailable(kind: FactorKind, detail: &str) -> Self {
        Self {
            kind,
            outcome: Outcome::Unavailable,
            score: 0.0,
            detail: detail.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.outcome != Outcome::Unavailable
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Same-device probability in [0, 1]
    pub probability: f64,
    pub factors: Vec<ComparisonFactor>,
}

impl fmt::Display for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Same-device probability: {:.1}%",
            self.probability * 100.0
        )?;
        for factor in &self.factors {
            writeln!(
                f,
                "  {:<11} {:<11} {}",
                format!("{:?}", factor.kind),
                format!("{:?}", factor.outcome),
                factor.detail
            )?;
        }
        Ok(())
    }
}

fn known(analysis: &Analysis) -> Option<&ProtocolMatch> {
    analysis.best_match().filter(|m| !m.is_unknown())
}

fn field_overlap(registry: &Registry, a: &ProtocolMatch, b: &ProtocolMatch) -> ComparisonFactor {
    let mut shared = 0usize;
    let mut equal = 0usize;
    let mut names = Vec::new();
    for (name, value) in &a.fields {
        if !registry.is_stable_field(a.name, name) || !registry.is_stable_field(b.name, name) {
            continue;
        }
        if let Some(other) = b.fields.get(name) {
            shared += 1;
            names.push(name.as_str());
            if other.value == value.value && other.binary == value.binary {
                equal += 1;
            }
        }
    }
    if shared == 0 {
        return ComparisonFactor::unavailable(FactorKind::Fields, "no shared identity fields");
    }
    ComparisonFactor::scored(
        FactorKind::Fields,
        equal as f64 / shared as f64,
        format!("{}/{} identical ({})", equal, shared, names.join(", ")),
    )
}

/// Compare against the built-in registry's field definitions
pub fn compare(a: &Analysis, b: &Analysis) -> ComparisonResult {
    compare_with(Registry::builtin(), a, b)
}

/// Estimate whether two captures came from the same transmitter.
/// Symmetric: swapping `a` and `b` gives the same probability.
pub fn compare_with(registry: &Registry, a: &Analysis, b: &Analysis) -> ComparisonResult {
    let mut factors = Vec::with_capacity(6);

    let (fa, fb) = (a.signal.frequency(), b.signal.frequency());
    factors.push(ComparisonFactor::matched(
        FactorKind::Frequency,
        fa.abs_diff(fb) <= FREQUENCY_TOLERANCE_HZ,
        format!("{} Hz vs {} Hz", fa.min(fb), fa.max(fb)),
    ));

    match (known(a), known(b)) {
        (Some(ma), Some(mb)) => {
            factors.push(ComparisonFactor::matched(
                FactorKind::Protocol,
                ma.name == mb.name,
                if ma.name == mb.name {
                    format!("both {}", ma.name)
                } else {
                    format!("{} vs {}", ma.name.min(mb.name), ma.name.max(mb.name))
                },
            ));
            factors.push(field_overlap(registry, ma, mb));
        }
        _ => {
            factors.push(ComparisonFactor::unavailable(
                FactorKind::Protocol,
                "protocol unknown on at least one side",
            ));
            factors.push(ComparisonFactor::unavailable(
                FactorKind::Fields,
                "protocol unknown on at least one side",
            ));
        }
    }

    if a.decoded.is_empty() || b.decoded.is_empty() {
        factors.push(ComparisonFactor::unavailable(FactorKind::Encoding, "no decoded bits"));
        factors.push(ComparisonFactor::unavailable(FactorKind::BitLength, "no decoded bits"));
    } else {
        let (ea, eb) = (a.decoded.encoding(), b.decoded.encoding());
        factors.push(ComparisonFactor::matched(
            FactorKind::Encoding,
            ea == eb,
            format!("{} vs {}", ea.min(eb), ea.max(eb)),
        ));
        let (la, lb) = (a.decoded.primary_frame().len(), b.decoded.primary_frame().len());
        factors.push(ComparisonFactor::matched(
            FactorKind::BitLength,
            la.abs_diff(lb) <= BIT_LENGTH_TOLERANCE,
            format!("{} vs {} bits", la.min(lb), la.max(lb)),
        ));
    }

    let (ta, tb) = (a.classification.signal_type, b.classification.signal_type);
    if ta == SignalType::Ambiguous || tb == SignalType::Ambiguous {
        factors.push(ComparisonFactor::unavailable(
            FactorKind::SignalType,
            "classification ambiguous on at least one side",
        ));
    } else {
        factors.push(ComparisonFactor::matched(
            FactorKind::SignalType,
            ta == tb,
            if ta == tb {
                format!("both {}", ta)
            } else {
                "fixed vs rolling".to_string()
            },
        ));
    }

    let (sum, weight) = factors
        .iter()
        .filter(|f| f.is_available())
        .fold((0.0, 0.0), |(sum, weight), f| {
            let w = f.kind.weight();
            (sum + f.score * w, weight + w)
        });
    let probability = if weight > 0.0 { sum / weight } else { 0.0 };

    debug!(
        "Comparison: probability {:.3} over {} factors",
        probability,
        factors.iter().filter(|f| f.is_available()).count()
    );

    ComparisonResult {
        probability,
        factors,
    }
}
