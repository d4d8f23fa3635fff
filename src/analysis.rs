//! One complete pipeline run over a capture

use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::classifier::{Classification, Classifier};
use crate::demod::{self, DecodedBits, Encoding};
use crate::protocol::{ProtocolMatch, Registry};
use crate::trace::Signal;

/// Everything learned about one capture
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub signal: Signal,
    pub decoded: DecodedBits,
    /// Ranked protocol candidates above the match threshold
    pub matches: Vec<ProtocolMatch>,
    pub classification: Classification,
}

impl Analysis {
    /// Top protocol candidate, if any cleared the threshold
    pub fn best_match(&self) -> Option<&ProtocolMatch> {
        self.matches.first()
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Frequency: {} Hz  Preset: {}  Protocol field: {}",
            self.signal.frequency(),
            self.signal.preset(),
            self.signal.protocol()
        )?;
        writeln!(f, "Pulses: {}", self.signal.stats())?;
        writeln!(
            f,
            "Decoded: {} bits {} (confidence {:.1}%) hex {}",
            self.decoded.len(),
            self.decoded.encoding(),
            self.decoded.confidence() * 100.0,
            if self.decoded.is_empty() { "-" } else { self.decoded.hex() }
        )?;
        for warning in self.decoded.warnings() {
            writeln!(f, "  warning: {}", warning)?;
        }
        match self.best_match() {
            Some(m) => {
                writeln!(f, "Protocol: {} ({:.1}%)", m.name, m.confidence * 100.0)?;
                for (name, value) in &m.fields {
                    writeln!(f, "  {:<12} {}", name, value)?;
                }
            }
            None => writeln!(f, "Protocol: unknown")?,
        }
        write!(f, "{}", self.classification)
    }
}

/// Pipeline settings shared by every run. Holds the registry by reference so
/// one table serves any number of threads.
#[derive(Debug, Clone)]
pub struct Analyzer<'r> {
    registry: &'r Registry,
    classifier: Classifier,
    scheme: Option<Encoding>,
}

impl Default for Analyzer<'static> {
    fn default() -> Self {
        Self::new(Registry::builtin())
    }
}

impl<'r> Analyzer<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            classifier: Classifier::default(),
            scheme: None,
        }
    }

    /// Force one line coding instead of auto-detection
    pub fn with_scheme(mut self, scheme: Option<Encoding>) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn run(&self, signal: Signal) -> Analysis {
        let decoded = demod::decode(&signal, self.scheme);
        let matches = self.registry.identify(&signal, &decoded);
        let classification = self.classifier.classify(&signal, &decoded, matches.first());

        debug!(
            "Analysis: {} bits, {} protocol candidates, {}",
            decoded.len(),
            matches.len(),
            classification.signal_type
        );

        Analysis {
            signal,
            decoded,
            matches,
            classification,
        }
    }
}

/// Decode, identify and classify with the built-in registry and defaults
pub fn analyze(signal: Signal) -> Analysis {
    Analyzer::default().run(signal)
}
