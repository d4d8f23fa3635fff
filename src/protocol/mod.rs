//! Protocol identification
//!
//! Decoded frames are scored against an immutable [`Registry`] of known
//! remote-control protocols. The built-in table is created once and shared
//! read-only; custom tables can be built with [`Registry::new`].

mod fields;
mod identify;
mod registry;

pub use fields::{extract_fields, FieldValue};
pub use identify::{
    best_match, identify_protocol, ProtocolMatch, BIT_LENGTH_WEIGHT, ENCODING_WEIGHT,
    FREQUENCY_WEIGHT, MATCH_THRESHOLD, PREAMBLE_WEIGHT, TIMING_WEIGHT,
};
pub use registry::{CodeKind, FieldSpec, Preamble, ProtocolName, Registry, Signature};
