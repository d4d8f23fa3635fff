//! Known remote-control protocol signatures

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

use crate::demod::Encoding;
use crate::trace::FrequencyBand;

/// Protocols the identifier knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolName {
    Princeton,
    FixedCode,
    Came,
    NiceFlo,
    Linear,
    HormannHsm,
    Chamberlain,
    SomfyTelis,
    FaacSlh,
    KeeLoq,
    Unknown,
}

impl ProtocolName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Princeton => "Princeton",
            Self::FixedCode => "Fixed Code",
            Self::Came => "CAME",
            Self::NiceFlo => "Nice FLO",
            Self::Linear => "Linear",
            Self::HormannHsm => "Hormann HSM",
            Self::Chamberlain => "Chamberlain",
            Self::SomfyTelis => "Somfy Telis",
            Self::FaacSlh => "FAAC SLH",
            Self::KeeLoq => "KeeLoq",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a protocol retransmits the same code or a fresh one per press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeKind {
    Fixed,
    Rolling,
}

impl fmt::Display for CodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => f.write_str("fixed"),
            Self::Rolling => f.write_str("rolling"),
        }
    }
}

/// Named bit range inside a frame, `start..end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub start: usize,
    pub end: usize,
    pub label: &'static str,
    /// Identifies the transmitter rather than the press, e.g. an address or serial
    pub stable: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, start: usize, end: usize, label: &'static str) -> Self {
        Self {
            name,
            start,
            end,
            label,
            stable: false,
        }
    }

    pub const fn stable(mut self) -> Self {
        self.stable = true;
        self
    }

    pub fn width(&self) -> usize {
        self.end - self.start
    }
}

/// Sync pattern expected at a fixed bit offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Preamble {
    pub pattern: &'static [u8],
    pub offset: usize,
}

/// Matching rules for one protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signature {
    pub name: ProtocolName,
    pub description: &'static str,
    /// Accepted frame lengths in bits
    pub bits: RangeInclusive<usize>,
    /// Bits outside `bits` after which the length factor reaches 0
    pub bit_tolerance: usize,
    pub encoding: Encoding,
    /// Encodings that decode this protocol's symbols equally well
    pub compatible: &'static [Encoding],
    pub preamble: Option<Preamble>,
    /// Nominal short pulse in microseconds
    pub te_us: Option<u32>,
    /// Relative te deviation still counted as a full match
    pub te_tolerance: f64,
    /// Empty means any band
    pub bands: &'static [FrequencyBand],
    pub kind: CodeKind,
    pub fields: &'static [FieldSpec],
}

impl Signature {
    fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const TE_TOLERANCE: f64 = 0.3;
const BIT_TOLERANCE: usize = 4;

const AM_BANDS: &[FrequencyBand] = &[
    FrequencyBand::Low315,
    FrequencyBand::Mid390,
    FrequencyBand::High433,
];
const EU_BANDS: &[FrequencyBand] = &[FrequencyBand::High433, FrequencyBand::Band868];
const US_BANDS: &[FrequencyBand] = &[FrequencyBand::Low315, FrequencyBand::Mid390];

const PRINCETON_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("address", 0, 16, "Device address (DIP switches)").stable(),
    FieldSpec::new("data", 16, 24, "Button data"),
];
const FIXED_CODE_FIELDS: &[FieldSpec] = &[FieldSpec::new("code", 0, 24, "Fixed code word").stable()];
const CAME_FIELDS: &[FieldSpec] = &[FieldSpec::new("device_code", 0, 12, "Device code").stable()];
const NICE_FLO_FIELDS: &[FieldSpec] = &[FieldSpec::new("code", 0, 12, "Fixed code").stable()];
const LINEAR_FIELDS: &[FieldSpec] = &[FieldSpec::new("code", 0, 10, "DIP switch code").stable()];
const HORMANN_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("sync", 0, 8, "Start pattern"),
    FieldSpec::new("serial", 8, 36, "Transmitter serial").stable(),
    FieldSpec::new("button", 36, 44, "Button code"),
];
const CHAMBERLAIN_FIELDS: &[FieldSpec] = &[FieldSpec::new("code", 0, 32, "Rolling code word")];
const SOMFY_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("key", 0, 8, "Encryption key byte"),
    FieldSpec::new("control", 8, 12, "Button command"),
    FieldSpec::new("checksum", 12, 16, "Frame checksum"),
    FieldSpec::new("counter", 16, 32, "Rolling counter"),
    FieldSpec::new("address", 32, 56, "Remote address").stable(),
];
const FAAC_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("serial", 0, 28, "Transmitter serial").stable(),
    FieldSpec::new("button", 28, 32, "Button code"),
    FieldSpec::new("encrypted", 32, 64, "Encrypted hopping code"),
];
const KEELOQ_FIELDS: &[FieldSpec] = &[
    FieldSpec::new("encrypted", 0, 32, "Encrypted hopping code"),
    FieldSpec::new("serial", 32, 60, "Transmitter serial").stable(),
    FieldSpec::new("button", 60, 64, "Button status"),
    FieldSpec::new("status", 64, 66, "Battery low / repeat flags"),
];

fn builtin_signatures() -> Vec<Signature> {
    vec![
        Signature {
            name: ProtocolName::Princeton,
            description: "Princeton PT2262/PT2272 fixed code",
            bits: 24..=24,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Ook,
            compatible: &[Encoding::Pwm],
            preamble: None,
            te_us: Some(350),
            te_tolerance: TE_TOLERANCE,
            bands: AM_BANDS,
            kind: CodeKind::Fixed,
            fields: PRINCETON_FIELDS,
        },
        Signature {
            name: ProtocolName::FixedCode,
            description: "Generic fixed code with alternating sync",
            bits: 24..=24,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Ook,
            compatible: &[Encoding::Pwm],
            preamble: Some(Preamble {
                pattern: &[1, 0, 1, 0, 1, 0],
                offset: 0,
            }),
            te_us: None,
            te_tolerance: TE_TOLERANCE,
            bands: AM_BANDS,
            kind: CodeKind::Fixed,
            fields: FIXED_CODE_FIELDS,
        },
        Signature {
            name: ProtocolName::Came,
            description: "CAME gate remote",
            bits: 12..=12,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Ook,
            compatible: &[Encoding::Pwm],
            preamble: None,
            te_us: Some(320),
            te_tolerance: TE_TOLERANCE,
            bands: EU_BANDS,
            kind: CodeKind::Fixed,
            fields: CAME_FIELDS,
        },
        Signature {
            name: ProtocolName::NiceFlo,
            description: "Nice FLO gate remote",
            bits: 12..=12,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Ook,
            compatible: &[Encoding::Pwm],
            preamble: None,
            te_us: Some(700),
            te_tolerance: TE_TOLERANCE,
            bands: EU_BANDS,
            kind: CodeKind::Fixed,
            fields: NICE_FLO_FIELDS,
        },
        Signature {
            name: ProtocolName::Linear,
            description: "Linear garage door opener",
            bits: 10..=10,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Ook,
            compatible: &[Encoding::Pwm],
            preamble: None,
            te_us: Some(500),
            te_tolerance: TE_TOLERANCE,
            bands: US_BANDS,
            kind: CodeKind::Fixed,
            fields: LINEAR_FIELDS,
        },
        Signature {
            name: ProtocolName::HormannHsm,
            description: "Hormann HSM garage door opener",
            bits: 44..=44,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Pwm,
            compatible: &[Encoding::Ook],
            preamble: Some(Preamble {
                pattern: &[1, 1, 1, 1, 1, 1, 1, 1],
                offset: 0,
            }),
            te_us: Some(500),
            te_tolerance: TE_TOLERANCE,
            bands: EU_BANDS,
            kind: CodeKind::Fixed,
            fields: HORMANN_FIELDS,
        },
        Signature {
            name: ProtocolName::Chamberlain,
            description: "Chamberlain garage door opener",
            bits: 32..=32,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Pwm,
            compatible: &[Encoding::Ook],
            preamble: None,
            te_us: Some(500),
            te_tolerance: TE_TOLERANCE,
            bands: US_BANDS,
            kind: CodeKind::Rolling,
            fields: CHAMBERLAIN_FIELDS,
        },
        Signature {
            name: ProtocolName::SomfyTelis,
            description: "Somfy RTS Telis rolling code",
            bits: 56..=56,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Manchester,
            compatible: &[],
            preamble: None,
            te_us: Some(640),
            te_tolerance: TE_TOLERANCE,
            bands: EU_BANDS,
            kind: CodeKind::Rolling,
            fields: SOMFY_FIELDS,
        },
        Signature {
            name: ProtocolName::FaacSlh,
            description: "FAAC SLH rolling code",
            bits: 64..=64,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Pwm,
            compatible: &[Encoding::Ook],
            preamble: None,
            te_us: Some(255),
            te_tolerance: TE_TOLERANCE,
            bands: EU_BANDS,
            kind: CodeKind::Rolling,
            fields: FAAC_FIELDS,
        },
        Signature {
            name: ProtocolName::KeeLoq,
            description: "Microchip KeeLoq (HCS200/HCS301) rolling code",
            bits: 66..=66,
            bit_tolerance: BIT_TOLERANCE,
            encoding: Encoding::Pwm,
            compatible: &[Encoding::Ook],
            preamble: Some(Preamble {
                pattern: &[1, 0, 1, 0, 1, 0, 1, 0],
                offset: 0,
            }),
            te_us: Some(400),
            te_tolerance: TE_TOLERANCE,
            bands: AM_BANDS,
            kind: CodeKind::Rolling,
            fields: KEELOQ_FIELDS,
        },
    ]
}

/// Immutable signature table, shared by reference between analysis runs
#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    entries: Vec<Signature>,
}

static BUILTIN: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn new(entries: Vec<Signature>) -> Self {
        Self { entries }
    }

    /// Process-wide table of the built-in protocols
    pub fn builtin() -> &'static Registry {
        BUILTIN.get_or_init(|| Registry::new(builtin_signatures()))
    }

    pub fn entries(&self) -> &[Signature] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: ProtocolName) -> Option<&Signature> {
        self.entries.iter().find(|s| s.name == name)
    }

    /// Whether `field` of protocol `name` identifies the transmitter
    pub fn is_stable_field(&self, name: ProtocolName, field: &str) -> bool {
        self.get(name)
            .and_then(|s| s.field(field))
            .map_or(false, |f| f.stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = Registry::builtin();
        assert_eq!(registry.len(), 10);
        assert!(std::ptr::eq(registry, Registry::builtin()));

        let princeton = registry.get(ProtocolName::Princeton).unwrap();
        assert_eq!(princeton.encoding, Encoding::Ook);
        assert_eq!(princeton.kind, CodeKind::Fixed);
        assert!(registry.get(ProtocolName::Unknown).is_none());
    }

    #[test]
    fn test_builtin_preambles() {
        let registry = Registry::builtin();
        let keeloq = registry.get(ProtocolName::KeeLoq).unwrap().preamble.unwrap();
        assert_eq!(keeloq.pattern, &[1, 0, 1, 0, 1, 0, 1, 0]);
        let fixed = registry.get(ProtocolName::FixedCode).unwrap();
        assert_eq!(fixed.preamble.unwrap().pattern, &[1, 0, 1, 0, 1, 0]);
        assert_eq!(fixed.bits, 24..=24);
        assert_eq!(fixed.kind, CodeKind::Fixed);
        // Princeton is listed first so it wins ties against the generic entry
        let order: Vec<ProtocolName> = registry.entries().iter().map(|s| s.name).collect();
        assert_eq!(&order[..2], &[ProtocolName::Princeton, ProtocolName::FixedCode]);
    }

    #[test]
    fn test_field_layouts_fit_frames() {
        for signature in Registry::builtin().entries() {
            let max_bits = *signature.bits.end();
            for field in signature.fields {
                assert!(field.start < field.end, "{} {}", signature.name, field.name);
                assert!(field.end <= max_bits, "{} {}", signature.name, field.name);
                assert!(field.width() <= 64);
            }
        }
    }

    #[test]
    fn test_stable_fields() {
        let registry = Registry::builtin();
        assert!(registry.is_stable_field(ProtocolName::Princeton, "address"));
        assert!(!registry.is_stable_field(ProtocolName::Princeton, "data"));
        assert!(registry.is_stable_field(ProtocolName::KeeLoq, "serial"));
        assert!(!registry.is_stable_field(ProtocolName::Unknown, "address"));
    }

    #[test]
    fn test_protocol_name_display() {
        assert_eq!(ProtocolName::NiceFlo.to_string(), "Nice FLO");
        assert_eq!(ProtocolName::Unknown.to_string(), "unknown");
        assert!(!ProtocolName::Unknown.is_known());
    }
}
