// Hashing and string matching for delta computation.
//
// This module provides:
// - A rolling Adler-style checksum over fixed-size blocks
// - A block table (source blocks keyed by checksum) and a quadgram multimap
// - The `DeltaMatcher` strategy trait with two implementations:
//   `XdeltaMatcher` (rolling block matching) and `VdeltaMatcher`
//   (quadgram matching over source ++ target)

pub mod config;
pub mod matching;
pub mod rolling;
pub mod table;
pub mod vdelta;
pub mod xdelta;

pub use config::{Algorithm, MatcherConfig};
pub use matching::{DeltaMatcher, diff, matcher_for};
pub use vdelta::VdeltaMatcher;
pub use xdelta::XdeltaMatcher;
