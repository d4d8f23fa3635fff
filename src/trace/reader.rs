//! Capture text parser
//!
//! Header lines are `Key: value` pairs; pulse data follows on one or more
//! `RAW_Data:` lines of whitespace-separated signed integers.

use std::fs::File;
use std::io::Read;
use std::num::IntErrorKind;
use std::path::Path;
use tracing::{debug, trace};

use super::types::{Preset, Pulse, Signal};
use crate::error::{ParseError, Result};

const RAW_DATA_KEY: &str = "RAW_Data";

/// Parse capture text into a [`Signal`]. Malformed input is rejected whole.
pub fn parse(text: &str) -> std::result::Result<Signal, ParseError> {
    let mut frequency: Option<u64> = None;
    let mut preset = Preset::Unspecified;
    let mut protocol: Option<String> = None;
    let mut filetype: Option<String> = None;
    let mut version: Option<u32> = None;
    let mut extra: Vec<(String, String)> = Vec::new();
    let mut pulses: Vec<Pulse> = Vec::new();
    let mut seen_raw = false;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ParseError::MalformedMetadata {
                line: line_no,
                text: line.to_string(),
            })?;
        let key = key.trim();
        let value = value.trim();

        if key == RAW_DATA_KEY {
            seen_raw = true;
            parse_pulse_line(value, line_no, &mut pulses)?;
            continue;
        }

        if seen_raw {
            return Err(ParseError::MetadataAfterRawData {
                line: line_no,
                key: key.to_string(),
            });
        }

        match key {
            "Frequency" => {
                let hz = value
                    .parse::<u64>()
                    .map_err(|_| ParseError::InvalidFrequency {
                        line: line_no,
                        value: value.to_string(),
                    })?;
                frequency = Some(hz);
            }
            "Preset" => preset = Preset::from_label(value),
            "Protocol" => protocol = Some(value.to_string()),
            "Filetype" => filetype = Some(value.to_string()),
            "Version" => match value.parse::<u32>() {
                Ok(v) => version = Some(v),
                // Keep odd version strings rather than dropping them
                Err(_) => extra.push((key.to_string(), value.to_string())),
            },
            _ => {
                trace!("Preserving unknown header key {:?}", key);
                extra.push((key.to_string(), value.to_string()));
            }
        }
    }

    let frequency = frequency.ok_or(ParseError::MissingFrequency)?;
    if !seen_raw {
        return Err(ParseError::MissingRawData);
    }

    let mut signal = Signal::new(frequency, preset, pulses)?;
    if let Some(protocol) = protocol {
        signal = signal.with_protocol(protocol);
    }
    if let Some(filetype) = filetype {
        signal = signal.with_filetype(filetype);
    }
    if let Some(version) = version {
        signal = signal.with_version(version);
    }
    for (key, value) in extra {
        signal = signal.with_extra(key, value);
    }

    debug!(
        "Parsed capture: {} Hz, preset {}, {} pulses",
        signal.frequency(),
        signal.preset(),
        signal.pulses().len()
    );

    Ok(signal)
}

/// Parse one `RAW_Data:` payload and append its pulses
fn parse_pulse_line(
    value: &str,
    line_no: usize,
    pulses: &mut Vec<Pulse>,
) -> std::result::Result<(), ParseError> {
    for token in value.split_whitespace() {
        let signed = token.parse::<i32>().map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => ParseError::PulseOutOfRange {
                line: line_no,
                token: token.to_string(),
            },
            _ => ParseError::InvalidPulse {
                line: line_no,
                token: token.to_string(),
            },
        })?;
        let pulse = Pulse::new(signed).ok_or(ParseError::ZeroDuration { line: line_no })?;
        pulses.push(pulse);
    }
    Ok(())
}

/// Read a whole capture from a stream, then parse it
pub fn read_from<R: Read>(mut reader: R) -> Result<Signal> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;
    Ok(parse(&text)?)
}

/// Load a capture file. The handle is released before parsing starts.
pub fn read_file(path: impl AsRef<Path>) -> Result<Signal> {
    let text = {
        let mut file = File::open(path.as_ref())?;
        let mut text = String::new();
        file.read_to_string(&mut text)?;
        text
    };
    Ok(parse(&text)?)
}
