//! Signature scoring
//!
//! Each registry entry is scored from five weighted factors. Weights sum to 1
//! and a capture must fit a signature's bit length to reach
//! [`MATCH_THRESHOLD`]; every other factor together tops out at 0.60.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use super::fields::{extract_with, FieldValue};
use super::registry::{CodeKind, ProtocolName, Registry, Signature};
use crate::demod::{bits_to_string, find_preamble, DecodedBits};
use crate::trace::Signal;

/// Minimum score for a signature to be reported
pub const MATCH_THRESHOLD: f64 = 0.65;

pub const BIT_LENGTH_WEIGHT: f64 = 0.40;
pub const ENCODING_WEIGHT: f64 = 0.25;
pub const PREAMBLE_WEIGHT: f64 = 0.15;
pub const TIMING_WEIGHT: f64 = 0.10;
pub const FREQUENCY_WEIGHT: f64 = 0.10;

/// Encoding credit for a compatible alternate
const COMPATIBLE_ENCODING: f64 = 0.5;

/// Preamble credit when the pattern appears away from its offset
const MISPLACED_PREAMBLE: f64 = 0.5;

/// Scores closer than this are treated as equal
const SCORE_EPSILON: f64 = 1e-9;

/// One candidate protocol for a capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMatch {
    pub name: ProtocolName,
    pub confidence: f64,
    /// Fixed/rolling nature of the protocol, `None` when unknown
    pub kind: Option<CodeKind>,
    /// Filled in for the top-ranked match(es) only
    pub fields: BTreeMap<String, FieldValue>,
    /// Factors that contributed to the score
    pub reasons: Vec<String>,
}

impl ProtocolMatch {
    pub fn unknown() -> Self {
        Self {
            name: ProtocolName::Unknown,
            confidence: 0.0,
            kind: None,
            fields: BTreeMap::new(),
            reasons: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == ProtocolName::Unknown
    }
}

/// Per-factor scores, each in [0, 1] before weighting
#[derive(Debug, Clone, Copy, PartialEq)]
struct FactorScores {
    bit_length: f64,
    encoding: f64,
    preamble: f64,
    timing: f64,
    frequency: f64,
}

impl FactorScores {
    fn total(&self) -> f64 {
        self.bit_length * BIT_LENGTH_WEIGHT
            + self.encoding * ENCODING_WEIGHT
            + self.preamble * PREAMBLE_WEIGHT
            + self.timing * TIMING_WEIGHT
            + self.frequency * FREQUENCY_WEIGHT
    }
}

fn bit_length_fit(signature: &Signature, len: usize) -> f64 {
    let (lo, hi) = (*signature.bits.start(), *signature.bits.end());
    let distance = if len < lo {
        lo - len
    } else if len > hi {
        len - hi
    } else {
        return 1.0;
    };
    if distance > signature.bit_tolerance {
        0.0
    } else {
        1.0 - distance as f64 / (signature.bit_tolerance + 1) as f64
    }
}

fn score(signature: &Signature, signal: &Signal, decoded: &DecodedBits) -> (FactorScores, Vec<String>) {
    let frame = decoded.primary_frame();
    let mut reasons = Vec::new();

    let bit_length = bit_length_fit(signature, frame.len());
    if bit_length >= 1.0 {
        reasons.push(format!("frame length {} bits matches", frame.len()));
    } else if bit_length > 0.0 {
        reasons.push(format!(
            "frame length {} bits close to expected {}..={}",
            frame.len(),
            signature.bits.start(),
            signature.bits.end()
        ));
    }

    let encoding = if decoded.encoding() == signature.encoding {
        reasons.push(format!("encoding {} matches", decoded.encoding()));
        1.0
    } else if signature.compatible.contains(&decoded.encoding()) {
        reasons.push(format!(
            "encoding {} compatible with {}",
            decoded.encoding(),
            signature.encoding
        ));
        COMPATIBLE_ENCODING
    } else {
        0.0
    };

    let preamble = match signature.preamble {
        None => 1.0,
        Some(p) => {
            let end = p.offset + p.pattern.len();
            if end <= frame.len() && &frame[p.offset..end] == p.pattern {
                reasons.push(format!(
                    "preamble {} at offset {}",
                    bits_to_string(p.pattern),
                    p.offset
                ));
                1.0
            } else if let Some(at) = find_preamble(frame, p.pattern) {
                reasons.push(format!(
                    "preamble {} found at offset {} (expected {})",
                    bits_to_string(p.pattern),
                    at,
                    p.offset
                ));
                MISPLACED_PREAMBLE
            } else {
                0.0
            }
        }
    };

    let timing = match (signature.te_us, decoded.timing()) {
        (Some(te), Some(timing)) => {
            let te = te as f64;
            let deviation = (timing.short_us - te).abs() / te;
            let tol = signature.te_tolerance;
            let fit = if deviation <= tol {
                1.0
            } else {
                (1.0 - (deviation - tol) / tol).max(0.0)
            };
            if fit > 0.0 {
                reasons.push(format!(
                    "short pulse {:.0} us near te {:.0} us",
                    timing.short_us, te
                ));
            }
            fit
        }
        _ => 1.0,
    };

    let frequency = if signature.bands.is_empty() {
        1.0
    } else if signature.bands.contains(&signal.band()) {
        reasons.push(format!("frequency {} Hz in expected band", signal.frequency()));
        1.0
    } else {
        0.0
    };

    (
        FactorScores {
            bit_length,
            encoding,
            preamble,
            timing,
            frequency,
        },
        reasons,
    )
}

impl Registry {
    /// Rank every signature against a decoded capture.
    ///
    /// Matches below [`MATCH_THRESHOLD`] are dropped, the rest sorted by
    /// descending confidence with registry order kept on ties. Fields are
    /// extracted for every match sharing the top score.
    pub fn identify(&self, signal: &Signal, decoded: &DecodedBits) -> Vec<ProtocolMatch> {
        if decoded.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<ProtocolMatch> = Vec::new();
        for signature in self.entries() {
            let (factors, reasons) = score(signature, signal, decoded);
            let total = factors.total();
            trace!("{}: {:?} -> {:.3}", signature.name, factors, total);
            if total + SCORE_EPSILON < MATCH_THRESHOLD {
                continue;
            }
            matches.push(ProtocolMatch {
                name: signature.name,
                confidence: total.clamp(0.0, 1.0),
                kind: Some(signature.kind),
                fields: BTreeMap::new(),
                reasons,
            });
        }

        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        if let Some(top) = matches.first().map(|m| m.confidence) {
            for m in matches
                .iter_mut()
                .take_while(|m| top - m.confidence < SCORE_EPSILON)
            {
                if let Some(signature) = self.get(m.name) {
                    m.fields = extract_with(signature, decoded);
                }
            }
        }

        debug!(
            "Protocol candidates: {}",
            matches
                .iter()
                .map(|m| format!("{} {:.2}", m.name, m.confidence))
                .collect::<Vec<_>>()
                .join(", ")
        );

        matches
    }

    /// Top-ranked match, or [`ProtocolMatch::unknown`]
    pub fn best_match(&self, signal: &Signal, decoded: &DecodedBits) -> ProtocolMatch {
        self.identify(signal, decoded)
            .into_iter()
            .next()
            .unwrap_or_else(ProtocolMatch::unknown)
    }
}

/// [`Registry::identify`] against the built-in registry
pub fn identify_protocol(signal: &Signal, decoded: &DecodedBits) -> Vec<ProtocolMatch> {
    Registry::builtin().identify(signal, decoded)
}

/// [`Registry::best_match`] against the built-in registry
pub fn best_match(signal: &Signal, decoded: &DecodedBits) -> ProtocolMatch {
    Registry::builtin().best_match(signal, decoded)
}
