//! Decoded bitstream types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::threshold::PulseTiming;

/// Line coding used to turn pulses into bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Encoding {
    Ook,
    Pwm,
    Manchester,
}

impl Encoding {
    /// Every scheme, simplest explanation first. Auto-detection breaks ties in this order.
    pub const ALL: [Encoding; 3] = [Encoding::Ook, Encoding::Pwm, Encoding::Manchester];

    pub fn name(self) -> &'static str {
        match self {
            Self::Ook => "OOK",
            Self::Pwm => "PWM",
            Self::Manchester => "Manchester",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ook" => Ok(Self::Ook),
            "pwm" => Ok(Self::Pwm),
            "manchester" | "mc" => Ok(Self::Manchester),
            other => Err(format!("unknown encoding {:?}", other)),
        }
    }
}

/// Non-fatal decode problems, attached to the result instead of raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeWarning {
    /// Pulse outside both duration clusters, excluded from decoding
    NoisePulse { index: usize, duration_us: u32 },
    /// Further noise pulses not listed individually
    NoiseSuppressed { count: usize },
    /// Only one pulse duration class was found
    SingleDurationClass,
    /// Pulses that could not be paired into a symbol
    OrphanPulses { count: usize },
    /// PWM symbols whose two pulses had no usable width contrast
    MisalignedSymbols { count: usize },
    /// Manchester cells that did not form a valid transition
    ManchesterViolations { count: usize },
}

impl fmt::Display for DecodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoisePulse { index, duration_us } => {
                write!(f, "noise pulse #{} ({} us) excluded", index, duration_us)
            }
            Self::NoiseSuppressed { count } => write!(f, "{} more noise pulses excluded", count),
            Self::SingleDurationClass => f.write_str("single pulse duration class"),
            Self::OrphanPulses { count } => write!(f, "{} unpaired pulses skipped", count),
            Self::MisalignedSymbols { count } => write!(f, "{} misaligned PWM symbols", count),
            Self::ManchesterViolations { count } => {
                write!(f, "{} Manchester violations", count)
            }
        }
    }
}

/// A run of bits between two frame gaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSpan {
    pub start: usize,
    pub len: usize,
}

/// Result of decoding one capture.
///
/// An empty bitstream is a valid outcome and always carries confidence 0.
/// Only built through [`DecodedBits::assemble`], which normalizes bits and
/// confidence and picks the primary frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedBits {
    bits: Vec<u8>,
    encoding: Encoding,
    confidence: f64,
    hex: String,
    frames: Vec<FrameSpan>,
    #[serde(skip)]
    primary: Option<FrameSpan>,
    timing: Option<PulseTiming>,
    warnings: Vec<DecodeWarning>,
}

impl DecodedBits {
    /// Wrap an already-decoded bitstream as a single frame.
    ///
    /// Any non-zero byte counts as a 1 bit.
    pub fn new(bits: Vec<u8>, encoding: Encoding, confidence: f64) -> Self {
        let len = bits.len();
        let frames = if len > 0 {
            vec![FrameSpan { start: 0, len }]
        } else {
            Vec::new()
        };
        Self::assemble(bits, encoding, confidence, frames, None, Vec::new())
    }

    pub fn empty(encoding: Encoding) -> Self {
        Self::new(Vec::new(), encoding, 0.0)
    }

    pub(crate) fn assemble(
        bits: Vec<u8>,
        encoding: Encoding,
        confidence: f64,
        frames: Vec<FrameSpan>,
        timing: Option<PulseTiming>,
        warnings: Vec<DecodeWarning>,
    ) -> Self {
        let bits: Vec<u8> = bits.into_iter().map(|b| u8::from(b != 0)).collect();
        let confidence = if bits.is_empty() || !confidence.is_finite() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        let hex = bits_to_hex(&bits);
        let primary = primary_span(&frames).filter(|span| span.start + span.len <= bits.len());
        Self {
            bits,
            encoding,
            confidence,
            hex,
            frames,
            primary,
            timing,
            warnings,
        }
    }

    pub fn bits(&self) -> &[u8] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Uppercase hex, MSB first, zero-padded to a whole nibble
    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn frames(&self) -> &[FrameSpan] {
        &self.frames
    }

    pub fn timing(&self) -> Option<&PulseTiming> {
        self.timing.as_ref()
    }

    pub fn warnings(&self) -> &[DecodeWarning] {
        &self.warnings
    }

    /// The representative frame: the most common frame length, first
    /// occurrence. Ties go to the longer frame.
    pub fn primary_frame(&self) -> &[u8] {
        match self.primary {
            Some(span) => &self.bits[span.start..span.start + span.len],
            None => &self.bits,
        }
    }

    /// Bits rendered as a `0`/`1` string
    pub fn bit_string(&self) -> String {
        bits_to_string(&self.bits)
    }
}

/// Most common frame length, longer on ties, at its first occurrence
fn primary_span(frames: &[FrameSpan]) -> Option<FrameSpan> {
    // length -> (count, first index)
    let mut lengths: HashMap<usize, (usize, usize)> = HashMap::new();
    for (idx, span) in frames.iter().enumerate() {
        lengths.entry(span.len).or_insert((0, idx)).0 += 1;
    }
    lengths
        .into_iter()
        .max_by_key(|&(len, (count, _))| (count, len))
        .map(|(_, (_, first))| frames[first])
}

/// Render bits as `0`/`1` characters
pub fn bits_to_string(bits: &[u8]) -> String {
    bits.iter().map(|&b| if b != 0 { '1' } else { '0' }).collect()
}

/// Pack bits MSB first and render as uppercase hex, one digit per nibble
pub fn bits_to_hex(bits: &[u8]) -> String {
    if bits.is_empty() {
        return String::new();
    }

    let mut bytes = vec![0u8; (bits.len() + 7) / 8];
    for (bit_idx, &bit) in bits.iter().enumerate() {
        if bit != 0 {
            let byte_idx = bit_idx / 8;
            let bit_pos = 7 - (bit_idx % 8);
            bytes[byte_idx] |= 1 << bit_pos;
        }
    }

    let mut hex = hex::encode_upper(bytes);
    hex.truncate((bits.len() + 3) / 4);
    hex
}

/// Unsigned value of a bit slice, MSB first. Slices longer than 64 bits keep
/// the low 64.
pub fn bits_to_u64(bits: &[u8]) -> u64 {
    bits.iter()
        .fold(0u64, |acc, &b| (acc << 1) | u64::from(b != 0))
}

/// Index of the first occurrence of `pattern` in `bits`
pub fn find_preamble(bits: &[u8], pattern: &[u8]) -> Option<usize> {
    if pattern.is_empty() || bits.len() < pattern.len() {
        return None;
    }
    bits.windows(pattern.len()).position(|w| w == pattern)
}

/// Bits following the first occurrence of `pattern`, at most `len` of them
pub fn payload_after_preamble<'a>(bits: &'a [u8], pattern: &[u8], len: usize) -> Option<&'a [u8]> {
    let start = find_preamble(bits, pattern)? + pattern.len();
    let end = (start + len).min(bits.len());
    Some(&bits[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_to_hex() {
        assert_eq!(bits_to_hex(&[]), "");
        assert_eq!(bits_to_hex(&[1, 0, 1, 0]), "A");
        assert_eq!(bits_to_hex(&[1, 1, 1, 1, 0, 0, 0, 0, 1]), "F08");
        // 24 bits -> 6 digits
        let bits: Vec<u8> = hex::decode("A5C3F0")
            .unwrap()
            .iter()
            .flat_map(|byte| (0..8).rev().map(move |i| (byte >> i) & 1))
            .collect();
        assert_eq!(bits_to_hex(&bits), "A5C3F0");
    }

    #[test]
    fn test_bits_to_u64() {
        assert_eq!(bits_to_u64(&[1, 0, 1, 1]), 0b1011);
        assert_eq!(bits_to_u64(&[]), 0);
    }

    #[test]
    fn test_find_preamble() {
        let bits = [0, 0, 1, 0, 1, 0, 1, 0, 1, 1];
        assert_eq!(find_preamble(&bits, &[1, 0, 1, 0, 1, 0]), Some(2));
        assert_eq!(find_preamble(&bits, &[1, 1, 1]), None);
        assert_eq!(find_preamble(&bits, &[]), None);

        assert_eq!(
            payload_after_preamble(&bits, &[1, 0, 1, 0, 1, 0], 8),
            Some(&[1, 0, 1, 1][..])
        );
        assert_eq!(payload_after_preamble(&bits, &[1, 1, 1], 4), None);
    }

    #[test]
    fn test_empty_bits_have_zero_confidence() {
        let decoded = DecodedBits::new(Vec::new(), Encoding::Pwm, 0.8);
        assert!(decoded.is_empty());
        assert_eq!(decoded.confidence(), 0.0);
        assert_eq!(decoded.hex(), "");
        assert!(decoded.primary_frame().is_empty());
    }

    #[test]
    fn test_confidence_clamped() {
        let decoded = DecodedBits::new(vec![1, 0], Encoding::Ook, 1.7);
        assert_eq!(decoded.confidence(), 1.0);
        assert_eq!(decoded.bit_string(), "10");
    }

    #[test]
    fn test_primary_frame_picks_most_common_length() {
        let bits = vec![1, 1, 0, 0, 0, 1, 0, 1, 0, 1, 0];
        let frames = vec![
            FrameSpan { start: 0, len: 3 },
            FrameSpan { start: 3, len: 4 },
            FrameSpan { start: 7, len: 4 },
        ];
        let decoded =
            DecodedBits::assemble(bits, Encoding::Ook, 0.5, frames, None, Vec::new());
        assert_eq!(decoded.primary_frame(), &[0, 0, 1, 0]);
    }

    #[test]
    fn test_primary_frame_ties_go_to_longer() {
        let bits = vec![1, 1, 0, 0, 1, 0, 1, 1, 1];
        let frames = vec![
            FrameSpan { start: 0, len: 2 },
            FrameSpan { start: 2, len: 3 },
            FrameSpan { start: 5, len: 2 },
            FrameSpan { start: 7, len: 2 },
        ];
        let decoded =
            DecodedBits::assemble(bits.clone(), Encoding::Ook, 0.5, frames, None, Vec::new());
        assert_eq!(decoded.primary_frame(), &[1, 1]);

        let frames = vec![
            FrameSpan { start: 0, len: 2 },
            FrameSpan { start: 2, len: 3 },
            FrameSpan { start: 5, len: 4 },
        ];
        let decoded = DecodedBits::assemble(bits, Encoding::Ook, 0.5, frames, None, Vec::new());
        assert_eq!(decoded.primary_frame(), &[0, 1, 1, 1]);
    }

    #[test]
    fn test_primary_frame_over_many_frames() {
        // 60k frames: 59_999 of eight bits and one of nine
        let mut bits = Vec::new();
        let mut frames = Vec::new();
        for i in 0..60_000usize {
            let len = if i == 0 { 9 } else { 8 };
            frames.push(FrameSpan {
                start: bits.len(),
                len,
            });
            bits.extend((0..len).map(|b| ((i + b) % 2) as u8));
        }
        let decoded = DecodedBits::assemble(bits, Encoding::Ook, 0.5, frames, None, Vec::new());
        assert_eq!(decoded.primary_frame(), &[1, 0, 1, 0, 1, 0, 1, 0]);
        assert_eq!(decoded.frames().len(), 60_000);
    }

    #[test]
    fn test_decoded_bits_serialize() {
        let decoded = DecodedBits::new(vec![1, 0, 1, 0], Encoding::Pwm, 0.7);
        let json = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json["hex"], "A");
        assert_eq!(json["encoding"], "Pwm");
        assert_eq!(json["frames"][0]["len"], 4);
        assert!(json.get("primary").is_none());
    }

    #[test]
    fn test_encoding_from_str() {
        assert_eq!("PWM".parse::<Encoding>(), Ok(Encoding::Pwm));
        assert_eq!("mc".parse::<Encoding>(), Ok(Encoding::Manchester));
        assert!("fsk".parse::<Encoding>().is_err());
    }
}
