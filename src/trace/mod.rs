//! Capture loading
//!
//! Turns RAW capture text into a [`Signal`]: header metadata plus the signed
//! pulse durations recorded by the capture device.

pub mod reader;
mod types;

pub use reader::{parse, read_file, read_from};
pub use types::{FrequencyBand, Preset, Pulse, Signal, SignalStats, RAW_PROTOCOL};
