//! Field extraction from decoded frames

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::registry::{ProtocolName, Registry, Signature};
use crate::demod::{bits_to_string, bits_to_u64, DecodedBits};

/// One named bit range sliced out of a frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    /// Unsigned value, MSB first
    pub value: u64,
    /// The same bits as a `0`/`1` string
    pub binary: String,
    pub start: usize,
    pub end: usize,
    /// Human-readable meaning of the field
    pub label: String,
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = (self.end - self.start + 3) / 4;
        write!(
            f,
            "0x{:0width$X} ({}) [{}..{}] {}",
            self.value,
            self.binary,
            self.start,
            self.end,
            self.label,
            width = digits
        )
    }
}

/// Slice the representative frame of `decoded` at the declared field ranges.
/// Fields running past the end of the frame are left out.
pub fn extract_with(signature: &Signature, decoded: &DecodedBits) -> BTreeMap<String, FieldValue> {
    let frame = decoded.primary_frame();
    signature
        .fields
        .iter()
        .filter(|field| field.end <= frame.len())
        .map(|field| {
            let bits = &frame[field.start..field.end];
            let value = FieldValue {
                value: bits_to_u64(bits),
                binary: bits_to_string(bits),
                start: field.start,
                end: field.end,
                label: field.label.to_string(),
            };
            (field.name.to_string(), value)
        })
        .collect()
}

impl Registry {
    /// Fields of `name` found in `decoded`. Empty for unknown protocols.
    pub fn extract_fields(
        &self,
        decoded: &DecodedBits,
        name: ProtocolName,
    ) -> BTreeMap<String, FieldValue> {
        match self.get(name) {
            Some(signature) => extract_with(signature, decoded),
            None => BTreeMap::new(),
        }
    }
}

/// [`Registry::extract_fields`] against the built-in registry
pub fn extract_fields(decoded: &DecodedBits, name: ProtocolName) -> BTreeMap<String, FieldValue> {
    Registry::builtin().extract_fields(decoded, name)
}
