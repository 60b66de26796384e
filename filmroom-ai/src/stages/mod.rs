//! The three provider passes
//!
//! ## Stage 1: Segmentation
//! One request over the whole source, parsed into raw markers and sanitized
//! into AnalysisUnits.
//!
//! ## Stage 2: Deep Analysis
//! One request per unit, strictly sequential, each success checkpointed.
//!
//! ## Stage 3: Verification
//! One request over a compact projection of every Stage 2 record, parsed
//! into VerificationReports.

pub mod deep_analysis;
pub mod segmentation;
pub mod verification;

pub use deep_analysis::{DeepAnalysisOutcome, DeepAnalyzer, UnitPhase};
pub use segmentation::Segmenter;
pub use verification::Verifier;
