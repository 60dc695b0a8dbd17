// Whole-buffer delta engine.
//
// Ties the pieces together for callers that hold everything in memory:
//   - `encode` runs the streaming producer over two buffers and writes svndiff
//   - `decode` feeds an svndiff stream through the decoder and applier
//   - `compose` turns two svndiff streams into one

use thiserror::Error;

use crate::apply::{ApplyError, ApplyStream};
use crate::compose::{ComposeError, compose_deltas};
use crate::stream::{DeltaStream, StreamConfig, StreamError};
use crate::svndiff::decoder::{DecodeError, DecoderOptions, StreamDecoder, decode_all};
use crate::svndiff::encoder::{EncodeError, SvndiffEncoder};
use crate::svndiff::header::SvndiffVersion;
use crate::svndiff::secondary::DEFAULT_COMPRESSION_LEVEL;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for delta encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Wire format version (selects section compression).
    pub version: SvndiffVersion,
    /// Compression level (0-9) for zlib sections.
    pub compression_level: u32,
    /// Window size and matching strategy.
    pub stream: StreamConfig,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            version: SvndiffVersion::V0,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            stream: StreamConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Any failure of the whole-buffer helpers.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),
    #[error("delta stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("compose error: {0}")]
    Compose(#[from] ComposeError),
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encode a delta from `source` to `target` as svndiff0, appending to
/// `output`.
pub fn encode(source: &[u8], target: &[u8], output: &mut Vec<u8>) -> Result<(), EngineError> {
    encode_with_options(source, target, output, &EncodeOptions::default()).map(|_| ())
}

/// Encode with custom options.  Returns the number of windows written.
pub fn encode_with_options(
    source: &[u8],
    target: &[u8],
    output: &mut Vec<u8>,
    opts: &EncodeOptions,
) -> Result<u64, EngineError> {
    opts.stream.validate()?;
    let mut encoder = SvndiffEncoder::with_level(output, opts.version, opts.compression_level)?;
    for window in DeltaStream::new(source, target, opts.stream) {
        encoder.write_window(&window?)?;
    }
    let windows = encoder.windows();
    encoder.finish()?;
    Ok(windows)
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Reconstruct the target from `source` and an svndiff stream.
pub fn decode(source: &[u8], delta: &[u8]) -> Result<Vec<u8>, EngineError> {
    decode_with_options(source, delta, DecoderOptions::default())
}

/// Decode with custom decoder options.
pub fn decode_with_options(
    source: &[u8],
    delta: &[u8],
    options: DecoderOptions,
) -> Result<Vec<u8>, EngineError> {
    let mut decoder = StreamDecoder::with_options(options);
    decoder.push(delta)?;
    let mut applier = ApplyStream::new(source, Vec::new());
    while let Some(window) = decoder.next_window()? {
        applier.apply(&window)?;
    }
    decoder.finish()?;
    let (target, _, _) = applier.finish()?;
    Ok(target)
}

// ---------------------------------------------------------------------------
// Compose
// ---------------------------------------------------------------------------

/// Combine `delta_a` (base -> mid) and `delta_b` (mid -> final) into one
/// svndiff stream base -> final, written with `version`.
pub fn compose(
    delta_a: &[u8],
    delta_b: &[u8],
    version: SvndiffVersion,
) -> Result<Vec<u8>, EngineError> {
    let (_, a) = decode_all(delta_a)?;
    let (_, b) = decode_all(delta_b)?;
    let windows = compose_deltas(&a, &b)?;
    let mut encoder = SvndiffEncoder::new(Vec::new(), version)?;
    for window in &windows {
        encoder.write_window(window)?;
    }
    Ok(encoder.finish()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
