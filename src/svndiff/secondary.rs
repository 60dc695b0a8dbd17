// Section compression for svndiff versions 1 and 2.
//
// Each section is stored as varint(original length) followed by either
// the raw bytes or the compressed payload.  The decoder tells them apart
// by size: a payload exactly as long as the original is raw.
//
// Codecs:
//   - zlib (version 1, via flate2, feature `zlib`)
//   - LZ4 block format (version 2, via lz4_flex, feature `lz4`)

use std::io;

use super::decoder::DecodeError;
use super::header::SvndiffVersion;
use super::varint;

/// zlib sections shorter than this are always stored raw.
pub const ZLIB_MIN_COMPRESS_SIZE: usize = 512;

/// Default zlib level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 5;

// ---------------------------------------------------------------------------
// SectionCodec trait
// ---------------------------------------------------------------------------

/// Compressor for one svndiff section kind.
pub trait SectionCodec: Send + Sync {
    /// The stream version whose sections this codec writes.
    fn version(&self) -> SvndiffVersion;

    /// Compress `data`.  The caller keeps the raw bytes if the result is
    /// not smaller.
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Decompress a payload that must expand to exactly `orig_len` bytes.
    fn decompress(&self, data: &[u8], orig_len: usize) -> Result<Vec<u8>, DecodeError>;

    /// Whether `data` is worth compressing at all.
    fn should_compress(&self, data: &[u8]) -> bool {
        !data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// zlib
// ---------------------------------------------------------------------------

/// zlib codec for svndiff1.
#[cfg(feature = "zlib")]
#[derive(Debug, Clone, Copy)]
pub struct ZlibCodec {
    level: u32,
}

#[cfg(feature = "zlib")]
impl ZlibCodec {
    /// Create a codec with the given level (0-9; 0 stores raw).
    pub fn new(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

#[cfg(feature = "zlib")]
impl Default for ZlibCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

#[cfg(feature = "zlib")]
impl SectionCodec for ZlibCodec {
    fn version(&self) -> SvndiffVersion {
        SvndiffVersion::V1
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        use flate2::write::ZlibEncoder;
        use io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8], orig_len: usize) -> Result<Vec<u8>, DecodeError> {
        use flate2::read::ZlibDecoder;
        use io::Read;

        let mut output = Vec::with_capacity(orig_len);
        ZlibDecoder::new(data)
            .take(orig_len as u64 + 1)
            .read_to_end(&mut output)
            .map_err(|e| DecodeError::Decompression(format!("zlib: {e}")))?;
        Ok(output)
    }

    fn should_compress(&self, data: &[u8]) -> bool {
        self.level > 0 && data.len() >= ZLIB_MIN_COMPRESS_SIZE
    }
}

// ---------------------------------------------------------------------------
// LZ4
// ---------------------------------------------------------------------------

/// LZ4 block codec for svndiff2.
#[cfg(feature = "lz4")]
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4Codec;

#[cfg(feature = "lz4")]
impl SectionCodec for Lz4Codec {
    fn version(&self) -> SvndiffVersion {
        SvndiffVersion::V2
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(lz4_flex::compress(data))
    }

    fn decompress(&self, data: &[u8], orig_len: usize) -> Result<Vec<u8>, DecodeError> {
        lz4_flex::decompress(data, orig_len)
            .map_err(|e| DecodeError::Decompression(format!("lz4: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// The codec for `version`'s sections.  `Ok(None)` for version 0; an
/// error if the needed codec was not compiled in.
#[allow(unused_variables)]
pub fn codec_for(
    version: SvndiffVersion,
    level: u32,
) -> Result<Option<Box<dyn SectionCodec>>, DecodeError> {
    match version {
        SvndiffVersion::V0 => Ok(None),
        #[cfg(feature = "zlib")]
        SvndiffVersion::V1 => Ok(Some(Box::new(ZlibCodec::new(level)))),
        #[cfg(feature = "lz4")]
        SvndiffVersion::V2 => Ok(Some(Box::new(Lz4Codec))),
        #[allow(unreachable_patterns)]
        other => Err(DecodeError::Decompression(format!(
            "{other} support is not compiled in"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Section helpers
// ---------------------------------------------------------------------------

/// Append `data` to `out` as a length-prefixed section, compressed when
/// that makes it smaller.
pub fn compress_section(
    codec: &dyn SectionCodec,
    data: &[u8],
    out: &mut Vec<u8>,
) -> io::Result<()> {
    varint::push_u64(out, data.len() as u64);
    if codec.should_compress(data) {
        let compressed = codec.compress(data)?;
        if compressed.len() < data.len() {
            out.extend_from_slice(&compressed);
            return Ok(());
        }
    }
    out.extend_from_slice(data);
    Ok(())
}

/// Decode a length-prefixed section, refusing to expand past `limit`.
pub fn decompress_section(
    codec: &dyn SectionCodec,
    wire: &[u8],
    limit: usize,
) -> Result<Vec<u8>, DecodeError> {
    let (orig_len, used) = varint::read_u64(wire)?;
    let orig_len = usize::try_from(orig_len)
        .ok()
        .filter(|&n| n <= limit)
        .ok_or(DecodeError::CorruptWindow("section too large"))?;

    let payload = &wire[used..];
    if payload.len() == orig_len {
        return Ok(payload.to_vec());
    }

    let out = codec.decompress(payload, orig_len)?;
    if out.len() != orig_len {
        return Err(DecodeError::Decompression(format!(
            "section expanded to {} bytes, expected {orig_len}",
            out.len()
        )));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
