//! Sub-GHz capture analyzer
//!
//! Reads RAW pulse captures, recovers bits under OOK, PWM or Manchester line
//! coding, identifies the remote protocol, classifies the code as fixed or
//! rolling and estimates whether two captures came from one transmitter.
//!
//! ```no_run
//! let signal = subghz_analyzer::read_file("garage.sub")?;
//! let analysis = subghz_analyzer::analyze(signal);
//! println!("{}", analysis);
//! # Ok::<(), subghz_analyzer::Error>(())
//! ```

pub mod analysis;
pub mod batch;
pub mod classifier;
pub mod compare;
pub mod config;
pub mod demod;
pub mod error;
pub mod protocol;
pub mod trace;

pub use analysis::{analyze, Analysis, Analyzer};
pub use batch::{BatchRunner, BatchStats, FileReport};
pub use classifier::{classify, Classification, Classifier, ClassifierConfig, SignalType};
pub use compare::{compare, compare_with, ComparisonFactor, ComparisonResult, FactorKind, Outcome};
pub use config::{Config, OutputFormat};
pub use demod::{decode, DecodeWarning, DecodedBits, Encoding};
pub use error::{Error, ParseError, Result};
pub use protocol::{
    best_match, extract_fields, identify_protocol, CodeKind, FieldValue, ProtocolMatch,
    ProtocolName, Registry,
};
pub use trace::{parse, read_file, read_from, Preset, Pulse, Signal};
