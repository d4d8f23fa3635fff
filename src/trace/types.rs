//! Capture data types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::num::NonZeroI32;

use crate::error::ParseError;

/// Protocol field value used by captures that carry raw pulses only
pub const RAW_PROTOCOL: &str = "RAW";

/// Radio preset the capture was recorded with
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Preset {
    Ook270,
    Ook650,
    Fsk238,
    Fsk476,
    Msk,
    Gfsk,
    Custom,
    /// No `Preset` line in the capture
    Unspecified,
    Other(String),
}

impl Preset {
    /// Map a preset label from a capture header
    pub fn from_label(label: &str) -> Self {
        match label {
            "FuriHalSubGhzPresetOok270Async" => Self::Ook270,
            "FuriHalSubGhzPresetOok650Async" => Self::Ook650,
            "FuriHalSubGhzPreset2FSKDev238Async" => Self::Fsk238,
            "FuriHalSubGhzPreset2FSKDev476Async" => Self::Fsk476,
            "FuriHalSubGhzPresetMSK99_97KbAsync" => Self::Msk,
            "FuriHalSubGhzPresetGFSK9_99KbAsync" => Self::Gfsk,
            "FuriHalSubGhzPresetCustom" => Self::Custom,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Ook270 => "FuriHalSubGhzPresetOok270Async",
            Self::Ook650 => "FuriHalSubGhzPresetOok650Async",
            Self::Fsk238 => "FuriHalSubGhzPreset2FSKDev238Async",
            Self::Fsk476 => "FuriHalSubGhzPreset2FSKDev476Async",
            Self::Msk => "FuriHalSubGhzPresetMSK99_97KbAsync",
            Self::Gfsk => "FuriHalSubGhzPresetGFSK9_99KbAsync",
            Self::Custom => "FuriHalSubGhzPresetCustom",
            Self::Unspecified => "",
            Self::Other(label) => label,
        }
    }

    /// Whether the preset is amplitude (on/off) modulated
    pub fn is_ook(&self) -> bool {
        matches!(self, Self::Ook270 | Self::Ook650)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// ISM band a carrier frequency falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyBand {
    /// 300-350 MHz (315 MHz remotes)
    Low315,
    /// 350-400 MHz (390 MHz garage openers)
    Mid390,
    /// 400-450 MHz (433.92 MHz remotes)
    High433,
    /// 850-930 MHz (868/915 MHz)
    Band868,
    Other,
}

impl FrequencyBand {
    pub fn from_hz(hz: u64) -> Self {
        match hz {
            300_000_000..=349_999_999 => Self::Low315,
            350_000_000..=399_999_999 => Self::Mid390,
            400_000_000..=450_000_000 => Self::High433,
            850_000_000..=930_000_000 => Self::Band868,
            _ => Self::Other,
        }
    }
}

/// One level run of a capture in microseconds.
///
/// Positive durations are high (carrier on), negative durations are low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pulse(NonZeroI32);

impl Pulse {
    /// Returns `None` for a zero duration
    pub fn new(signed_us: i32) -> Option<Self> {
        NonZeroI32::new(signed_us).map(Self)
    }

    #[inline]
    pub fn is_high(self) -> bool {
        self.0.get() > 0
    }

    #[inline]
    pub fn duration_us(self) -> u32 {
        self.0.get().unsigned_abs()
    }

    #[inline]
    pub fn signed_us(self) -> i32 {
        self.0.get()
    }
}

/// A parsed capture: header metadata plus the raw pulse sequence.
///
/// The pulse list is never empty and contains no zero durations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    frequency: u64,
    preset: Preset,
    protocol: String,
    filetype: Option<String>,
    version: Option<u32>,
    extra: BTreeMap<String, String>,
    pulses: Vec<Pulse>,
}

impl Signal {
    pub fn new(frequency: u64, preset: Preset, pulses: Vec<Pulse>) -> Result<Self, ParseError> {
        if pulses.is_empty() {
            return Err(ParseError::EmptyPulses);
        }
        Ok(Self {
            frequency,
            preset,
            protocol: RAW_PROTOCOL.to_string(),
            filetype: None,
            version: None,
            extra: BTreeMap::new(),
            pulses,
        })
    }

    /// Build a signal from signed microsecond durations, rejecting zeros
    pub fn from_durations(
        frequency: u64,
        preset: Preset,
        durations: &[i32],
    ) -> Result<Self, ParseError> {
        let pulses = durations
            .iter()
            .enumerate()
            .map(|(index, &d)| Pulse::new(d).ok_or(ParseError::ZeroPulse { index }))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(frequency, preset, pulses)
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn with_filetype(mut self, filetype: impl Into<String>) -> Self {
        self.filetype = Some(filetype.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Attach a header key the analyzer does not interpret
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn frequency(&self) -> u64 {
        self.frequency
    }

    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn filetype(&self) -> Option<&str> {
        self.filetype.as_deref()
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Header keys preserved verbatim from the capture
    pub fn extra(&self) -> &BTreeMap<String, String> {
        &self.extra
    }

    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses
    }

    pub fn band(&self) -> FrequencyBand {
        FrequencyBand::from_hz(self.frequency)
    }

    /// Pulses as `(duration_us, high)` pairs
    pub fn levels(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.pulses.iter().map(|p| (p.duration_us(), p.is_high()))
    }

    /// Basic statistics over the pulse magnitudes
    pub fn stats(&self) -> SignalStats {
        let mut min_us = u32::MAX;
        let mut max_us = 0u32;
        let mut total_us = 0u64;
        let mut high_us = 0u64;

        for (duration, high) in self.levels() {
            min_us = min_us.min(duration);
            max_us = max_us.max(duration);
            total_us += duration as u64;
            if high {
                high_us += duration as u64;
            }
        }

        SignalStats {
            total_pulses: self.pulses.len(),
            min_us,
            max_us,
            mean_us: total_us as f64 / self.pulses.len() as f64,
            duration_ms: total_us as f64 / 1000.0,
            duty_cycle: high_us as f64 / total_us as f64,
            band: self.band(),
        }
    }
}

/// Summary statistics for a capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalStats {
    pub total_pulses: usize,
    pub min_us: u32,
    pub max_us: u32,
    pub mean_us: f64,
    pub duration_ms: f64,
    /// Fraction of total time spent high
    pub duty_cycle: f64,
    pub band: FrequencyBand,
}

impl fmt::Display for SignalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pulses, {}-{} us (mean {:.1}), {:.2} ms, duty {:.2}, band {:?}",
            self.total_pulses,
            self.min_us,
            self.max_us,
            self.mean_us,
            self.duration_ms,
            self.duty_cycle,
            self.band
        )
    }
}
