// File-level helpers for delta encoding, decoding and composition.
//
// `encode_file()`, `decode_file()` and `compose_files()` wrap the
// streaming pieces with buffered file I/O and compute SHA-256 checksums
// of the data flowing through them.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::debug;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::apply::{ApplyError, ApplyStream};
use crate::compose::{ComposeError, compose_deltas};
use crate::engine::EncodeOptions;
use crate::stream::{DeltaStream, StreamError};
use crate::svndiff::decoder::{DecodeError, DecoderOptions, StreamDecoder, decode_all};
use crate::svndiff::encoder::{EncodeError, SvndiffEncoder};
use crate::svndiff::header::SvndiffVersion;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `encode_file()`.
#[derive(Debug, Clone)]
pub struct EncodeStats {
    /// Source file size in bytes.
    pub source_size: u64,
    /// Target file size in bytes.
    pub target_size: u64,
    /// Delta output size in bytes.
    pub delta_size: u64,
    /// Number of svndiff windows written.
    pub windows: u64,
    pub source_sha256: [u8; 32],
    pub target_sha256: [u8; 32],
}

/// Statistics returned by `decode_file()`.
#[derive(Debug, Clone)]
pub struct DecodeStats {
    pub source_size: u64,
    pub delta_size: u64,
    /// Reconstructed output size in bytes.
    pub output_size: u64,
    /// Number of svndiff windows applied.
    pub windows: u64,
    pub output_sha256: [u8; 32],
}

/// Statistics returned by `compose_files()`.
#[derive(Debug, Clone)]
pub struct ComposeStats {
    /// Windows in the first and second input deltas.
    pub windows_a: u64,
    pub windows_b: u64,
    /// Windows in the composed delta.
    pub windows: u64,
    pub delta_size: u64,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
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

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// encode_file
// ---------------------------------------------------------------------------

/// Encode a delta between a source file and a target file, writing the
/// svndiff stream to `delta_path`.
///
/// Both inputs are streamed; only the current source view and target
/// chunk are held in memory.
pub fn encode_file(
    source_path: &Path,
    target_path: &Path,
    delta_path: &Path,
    opts: &EncodeOptions,
) -> Result<EncodeStats, IoError> {
    opts.stream.validate()?;
    let source_file = File::open(source_path)?;
    let source_size = source_file.metadata()?.len();
    let mut source = HashingReader::new(BufReader::with_capacity(BUF_SIZE, source_file));

    let target_file = File::open(target_path)?;
    let target_size = target_file.metadata()?.len();
    let mut target = HashingReader::new(BufReader::with_capacity(BUF_SIZE, target_file));

    let delta_writer = BufWriter::with_capacity(BUF_SIZE, File::create(delta_path)?);
    let mut encoder = SvndiffEncoder::with_level(delta_writer, opts.version, opts.compression_level)?;

    let mut stream = DeltaStream::new(&mut source, &mut target, opts.stream);
    for window in stream.by_ref() {
        encoder.write_window(&window?)?;
    }
    drop(stream);
    let windows = encoder.windows();

    let delta_size = encoder
        .finish()?
        .into_inner()
        .map_err(|e| e.into_error())?
        .metadata()?
        .len();

    // Source bytes past the last window were never read by the stream.
    io::copy(&mut source, &mut io::sink())?;

    debug!("encoded {} into {windows} windows", target_path.display());

    Ok(EncodeStats {
        source_size,
        target_size,
        delta_size,
        windows,
        source_sha256: source.finish(),
        target_sha256: target.finish(),
    })
}

// ---------------------------------------------------------------------------
// decode_file
// ---------------------------------------------------------------------------

/// Apply the svndiff delta at `delta_path` to a source file, writing the
/// reconstructed target to `output_path`.
pub fn decode_file(
    source_path: &Path,
    delta_path: &Path,
    output_path: &Path,
    options: DecoderOptions,
) -> Result<DecodeStats, IoError> {
    let source_file = File::open(source_path)?;
    let source_size = source_file.metadata()?.len();
    let source = BufReader::with_capacity(BUF_SIZE, source_file);

    let mut delta_file = File::open(delta_path)?;
    let delta_size = delta_file.metadata()?.len();

    let output = BufWriter::with_capacity(BUF_SIZE, File::create(output_path)?);
    let mut applier = ApplyStream::new(source, output);
    let mut decoder = StreamDecoder::with_options(options);

    let mut buf = vec![0u8; BUF_SIZE];
    loop {
        let n = delta_file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        decoder.push(&buf[..n])?;
        while let Some(window) = decoder.next_window()? {
            applier.apply(&window)?;
        }
    }
    decoder.finish()?;

    let windows = applier.windows();
    let (_, output_size, output_sha256) = applier.finish()?;
    debug!("decoded {} from {windows} windows", output_path.display());

    Ok(DecodeStats {
        source_size,
        delta_size,
        output_size,
        windows,
        output_sha256,
    })
}

// ---------------------------------------------------------------------------
// compose_files
// ---------------------------------------------------------------------------

/// Compose the deltas at `delta_a` (base -> mid) and `delta_b`
/// (mid -> final) into one delta at `output_path`.
pub fn compose_files(
    delta_a: &Path,
    delta_b: &Path,
    output_path: &Path,
    version: SvndiffVersion,
) -> Result<ComposeStats, IoError> {
    let (_, a) = decode_all(&std::fs::read(delta_a)?)?;
    let (_, b) = decode_all(&std::fs::read(delta_b)?)?;
    let composed = compose_deltas(&a, &b)?;

    let writer = BufWriter::with_capacity(BUF_SIZE, File::create(output_path)?);
    let mut encoder = SvndiffEncoder::new(writer, version)?;
    for window in &composed {
        encoder.write_window(window)?;
    }
    let delta_size = encoder
        .finish()?
        .into_inner()
        .map_err(|e| e.into_error())?
        .metadata()?
        .len();

    Ok(ComposeStats {
        windows_a: a.len() as u64,
        windows_b: b.len() as u64,
        windows: composed.len() as u64,
        delta_size,
    })
}

// ---------------------------------------------------------------------------
// Hashing reader
// ---------------------------------------------------------------------------

struct HashingReader<R: Read> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> [u8; 32] {
        self.hasher.finalize().into()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamConfig;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn encode_decode_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let source_data = b"The quick brown fox jumps over the lazy dog. 1234567890";
        let target_data = b"The quick brown cat sits on the lazy mat. 1234567890!!!";

        let source_path = write_file(&dir, "source.bin", source_data);
        let target_path = write_file(&dir, "target.bin", target_data);
        let delta_path = dir.path().join("delta.svndiff");
        let output_path = dir.path().join("output.bin");

        let enc = encode_file(
            &source_path,
            &target_path,
            &delta_path,
            &EncodeOptions::default(),
        )
        .unwrap();
        assert_eq!(enc.source_size, source_data.len() as u64);
        assert_eq!(enc.target_size, target_data.len() as u64);
        assert_eq!(enc.windows, 1);
        assert_eq!(enc.delta_size, std::fs::metadata(&delta_path).unwrap().len());
        assert_eq!(enc.source_sha256, <[u8; 32]>::from(Sha256::digest(source_data)));

        let dec = decode_file(
            &source_path,
            &delta_path,
            &output_path,
            DecoderOptions::default(),
        )
        .unwrap();
        assert_eq!(dec.output_size, target_data.len() as u64);
        assert_eq!(dec.windows, 1);
        assert_eq!(dec.output_sha256, enc.target_sha256);
        assert_eq!(std::fs::read(&output_path).unwrap(), target_data);
    }

    #[test]
    fn source_digest_covers_unread_tail() {
        let dir = tempfile::tempdir().unwrap();
        let source_data = vec![7u8; 10_000];
        let source_path = write_file(&dir, "source.bin", &source_data);
        let target_path = write_file(&dir, "target.bin", b"short");
        let delta_path = dir.path().join("delta.svndiff");

        let opts = EncodeOptions {
            stream: StreamConfig {
                window_size: 100,
                ..StreamConfig::default()
            },
            ..EncodeOptions::default()
        };
        let enc = encode_file(&source_path, &target_path, &delta_path, &opts).unwrap();
        assert_eq!(enc.source_sha256, <[u8; 32]>::from(Sha256::digest(&source_data)));
    }

    #[test]
    #[cfg(feature = "zlib")]
    fn multi_window_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let source_data: Vec<u8> = (0..=255u8).cycle().take(1 << 18).collect();
        let mut target_data = source_data.clone();
        for i in (0..target_data.len()).step_by(4096) {
            target_data[i] = target_data[i].wrapping_add(1);
        }

        let source_path = write_file(&dir, "source.bin", &source_data);
        let target_path = write_file(&dir, "target.bin", &target_data);
        let delta_path = dir.path().join("delta.svndiff");
        let output_path = dir.path().join("output.bin");

        let opts = EncodeOptions {
            version: SvndiffVersion::V1,
            stream: StreamConfig {
                window_size: 16 * 1024,
                ..StreamConfig::default()
            },
            ..EncodeOptions::default()
        };
        let enc = encode_file(&source_path, &target_path, &delta_path, &opts).unwrap();
        assert_eq!(enc.windows, 16);
        assert!(enc.delta_size < enc.target_size / 4);

        let dec = decode_file(
            &source_path,
            &delta_path,
            &output_path,
            DecoderOptions::default(),
        )
        .unwrap();
        assert_eq!(dec.windows, 16);
        assert_eq!(std::fs::read(&output_path).unwrap(), target_data);
    }

    #[test]
    fn compose_files_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let base = b"alpha beta gamma delta epsilon zeta eta theta".repeat(8);
        let mut mid = base.clone();
        mid.extend_from_slice(b" iota");
        let target = [&mid[40..], b"kappa".as_slice()].concat();

        let base_path = write_file(&dir, "base", &base);
        let mid_path = write_file(&dir, "mid", &mid);
        let target_path = write_file(&dir, "target", &target);
        let ab = dir.path().join("ab.svndiff");
        let bc = dir.path().join("bc.svndiff");
        let ac = dir.path().join("ac.svndiff");
        let out = dir.path().join("out");

        let opts = EncodeOptions::default();
        encode_file(&base_path, &mid_path, &ab, &opts).unwrap();
        encode_file(&mid_path, &target_path, &bc, &opts).unwrap();
        let stats = compose_files(&ab, &bc, &ac, SvndiffVersion::V0).unwrap();
        assert_eq!((stats.windows_a, stats.windows_b, stats.windows), (1, 1, 1));

        decode_file(&base_path, &ac, &out, DecoderOptions::default()).unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), target);
    }

    #[test]
    fn missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let target_path = write_file(&dir, "target.bin", b"data");
        let result = encode_file(
            &dir.path().join("absent"),
            &target_path,
            &dir.path().join("delta"),
            &EncodeOptions::default(),
        );
        assert!(matches!(result, Err(IoError::Io(_))));
    }
}
