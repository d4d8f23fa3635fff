//! Configuration loaded from environment variables

use std::str::FromStr;

use crate::classifier::ClassifierConfig;
use crate::demod::Encoding;

/// Report rendering for the binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown output format {:?}", other)),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker threads for batch analysis
    pub workers: usize,

    /// Force one line coding instead of auto-detection
    pub encoding: Option<Encoding>,

    /// Frames shorter than this lean fixed
    pub fixed_below_bits: usize,

    /// Frames longer than this lean rolling
    pub rolling_above_bits: usize,

    /// Minimum confidence for a Fixed or Rolling verdict
    pub decision_threshold: f64,

    pub output: OutputFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from any key lookup. Unset or unparsable values fall back to defaults.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ClassifierConfig::default();
        Self {
            workers: var("SUBGHZ_WORKERS")
                .and_then(|s| s.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or_else(|| {
                    std::thread::available_parallelism()
                        .map(|n| n.get())
                        .unwrap_or(1)
                }),

            encoding: var("SUBGHZ_ENCODING").and_then(|s| s.parse().ok()),

            fixed_below_bits: var("SUBGHZ_FIXED_BELOW_BITS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fixed_below_bits),

            rolling_above_bits: var("SUBGHZ_ROLLING_ABOVE_BITS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.rolling_above_bits),

            decision_threshold: var("SUBGHZ_DECISION_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .filter(|t: &f64| (0.5..=1.0).contains(t))
                .unwrap_or(defaults.decision_threshold),

            output: var("SUBGHZ_OUTPUT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(OutputFormat::Text),
        }
    }

    pub fn classifier_config(&self) -> ClassifierConfig {
        // an inverted band would make every length both fixed and rolling
        let rolling_above_bits = self.rolling_above_bits.max(self.fixed_below_bits);
        ClassifierConfig {
            fixed_below_bits: self.fixed_below_bits,
            rolling_above_bits,
            decision_threshold: self.decision_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert!(config.workers >= 1);
        assert_eq!(config.encoding, None);
        assert_eq!(config.output, OutputFormat::Text);
        let classifier = config.classifier_config();
        assert_eq!(classifier.fixed_below_bits, 40);
        assert_eq!(classifier.rolling_above_bits, 64);
        assert_eq!(classifier.decision_threshold, 0.6);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SUBGHZ_WORKERS", "3"),
            ("SUBGHZ_ENCODING", "manchester"),
            ("SUBGHZ_FIXED_BELOW_BITS", "32"),
            ("SUBGHZ_ROLLING_ABOVE_BITS", "56"),
            ("SUBGHZ_DECISION_THRESHOLD", "0.7"),
            ("SUBGHZ_OUTPUT", "JSON"),
        ]));
        assert_eq!(config.workers, 3);
        assert_eq!(config.encoding, Some(Encoding::Manchester));
        assert_eq!(config.fixed_below_bits, 32);
        assert_eq!(config.rolling_above_bits, 56);
        assert_eq!(config.decision_threshold, 0.7);
        assert_eq!(config.output, OutputFormat::Json);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("SUBGHZ_WORKERS", "0"),
            ("SUBGHZ_ENCODING", "fsk"),
            ("SUBGHZ_DECISION_THRESHOLD", "0.2"),
            ("SUBGHZ_OUTPUT", "yaml"),
        ]));
        assert!(config.workers >= 1);
        assert_eq!(config.encoding, None);
        assert_eq!(config.decision_threshold, 0.6);
        assert_eq!(config.output, OutputFormat::Text);
    }

    #[test]
    fn test_inverted_band_is_clamped() {
        let config = Config::from_lookup(lookup(&[
            ("SUBGHZ_FIXED_BELOW_BITS", "48"),
            ("SUBGHZ_ROLLING_ABOVE_BITS", "20"),
        ]));
        let classifier = config.classifier_config();
        assert_eq!(classifier.rolling_above_bits, 48);
    }
}
