//! svndelta: svndiff binary deltas in Rust.
//!
//! The crate provides:
//! - The instruction and window model (`window`)
//! - Two diff strategies behind one trait (`hash`)
//! - Window application, in memory or streamed (`apply`)
//! - The svndiff wire format, versions 0 to 2 (`svndiff`)
//! - Delta composition (`compose`)
//! - A pull-based window producer over two readers (`stream`)
//! - Whole-buffer and file-oriented helpers (`engine`, `io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use svndelta::engine;
//!
//! let source = b"hello old world";
//! let target = b"hello new world";
//!
//! let mut delta = Vec::new();
//! engine::encode(source, target, &mut delta).unwrap();
//! let decoded = engine::decode(source, &delta).unwrap();
//! assert_eq!(decoded, target);
//! ```

pub mod apply;
pub mod compose;
pub mod engine;
pub mod hash;
pub mod io;
pub mod stream;
pub mod svndiff;
pub mod window;

#[cfg(feature = "cli")]
pub mod cli;
