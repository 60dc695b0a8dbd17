// svndiff encoding.
//
// `encode_window` serializes one window; `SvndiffEncoder` wraps a writer,
// emits the stream header before the first window (or at `finish` for a
// stream with no windows) and then each window in turn.

use std::io::{self, Write};

use log::debug;
use thiserror::Error;

use super::header::{SvndiffVersion, WindowHeader, write_header};
use super::secondary::{self, DEFAULT_COMPRESSION_LEVEL, SectionCodec};
use super::varint;
use crate::window::{Action, Instruction, Window};

/// Errors raised while encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("compression error: {0}")]
    Compression(String),
}

// ---------------------------------------------------------------------------
// Instruction encoding
// ---------------------------------------------------------------------------

/// Append the encoding of one instruction.  Insert offsets are implicit.
#[inline]
pub fn encode_instruction(op: &Instruction, out: &mut Vec<u8>) {
    let selector = op.action().code() << 6;
    let length = op.length();
    if length <= 0x3F {
        out.push(selector | length as u8);
    } else {
        out.push(selector);
        varint::push_u64(out, length as u64);
    }
    if op.action() != Action::New {
        varint::push_u64(out, op.offset() as u64);
    }
}

/// Append the encoded instruction section of `window`.
pub fn encode_instructions(window: &Window, out: &mut Vec<u8>) {
    for op in window.ops() {
        encode_instruction(op, out);
    }
}

/// The new-data section in the order the instructions consume it.
///
/// The wire format addresses new data implicitly, front to back, so a
/// window whose inserts read out of order is linearized here.
fn sequential_new_data(window: &Window) -> std::borrow::Cow<'_, [u8]> {
    if window.has_sequential_new_data() {
        return std::borrow::Cow::Borrowed(window.new_data());
    }
    let mut data = Vec::with_capacity(window.target_view_len());
    for op in window.ops() {
        if let Instruction::Insert { offset, length } = *op {
            data.extend_from_slice(&window.new_data()[offset..offset + length]);
        }
    }
    std::borrow::Cow::Owned(data)
}

/// Append the complete encoding of `window` (header and sections).
pub fn encode_window(
    window: &Window,
    codec: Option<&dyn SectionCodec>,
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    let mut ins = Vec::with_capacity(window.ops().len() * 3);
    encode_instructions(window, &mut ins);
    let new_data = sequential_new_data(window);

    let (ins, new) = match codec {
        None => (ins, new_data.into_owned()),
        Some(codec) => {
            let mut ins_wire = Vec::with_capacity(ins.len() + varint::MAX_VARINT_LEN);
            secondary::compress_section(codec, &ins, &mut ins_wire)?;
            let mut new_wire = Vec::with_capacity(new_data.len() + varint::MAX_VARINT_LEN);
            secondary::compress_section(codec, &new_data, &mut new_wire)?;
            (ins_wire, new_wire)
        }
    };

    let header = WindowHeader {
        sview_offset: window.source_view_offset(),
        sview_len: window.source_view_len(),
        tview_len: window.target_view_len(),
        ins_len: ins.len(),
        new_len: new.len(),
        header_len: 0,
    };
    header.encode(out);
    out.extend_from_slice(&ins);
    out.extend_from_slice(&new);
    Ok(())
}

// ---------------------------------------------------------------------------
// Stream encoder
// ---------------------------------------------------------------------------

/// Writes an svndiff stream window by window.
pub struct SvndiffEncoder<W: Write> {
    writer: W,
    version: SvndiffVersion,
    codec: Option<Box<dyn SectionCodec>>,
    header_written: bool,
    windows: u64,
    bytes_written: u64,
    buf: Vec<u8>,
}

impl<W: Write> SvndiffEncoder<W> {
    /// Encoder for `version` at the default compression level.
    pub fn new(writer: W, version: SvndiffVersion) -> Result<Self, EncodeError> {
        Self::with_level(writer, version, DEFAULT_COMPRESSION_LEVEL)
    }

    /// Encoder for `version`; `level` applies to zlib sections.
    pub fn with_level(writer: W, version: SvndiffVersion, level: u32) -> Result<Self, EncodeError> {
        let codec = secondary::codec_for(version, level)
            .map_err(|e| EncodeError::Compression(e.to_string()))?;
        Ok(Self {
            writer,
            version,
            codec,
            header_written: false,
            windows: 0,
            bytes_written: 0,
            buf: Vec::new(),
        })
    }

    pub fn version(&self) -> SvndiffVersion {
        self.version
    }

    fn ensure_header(&mut self) -> io::Result<()> {
        if !self.header_written {
            write_header(&mut self.writer, self.version)?;
            self.header_written = true;
            self.bytes_written += super::header::HEADER_LEN as u64;
        }
        Ok(())
    }

    /// Encode and write one window.
    pub fn write_window(&mut self, window: &Window) -> Result<(), EncodeError> {
        self.ensure_header()?;
        self.buf.clear();
        encode_window(window, self.codec.as_deref(), &mut self.buf)?;
        self.writer.write_all(&self.buf)?;
        self.bytes_written += self.buf.len() as u64;
        self.windows += 1;
        debug!(
            "encoded window {}: source [{}, +{}), target {} bytes, {} ops, {} wire bytes",
            self.windows,
            window.source_view_offset(),
            window.source_view_len(),
            window.target_view_len(),
            window.ops().len(),
            self.buf.len()
        );
        Ok(())
    }

    /// Windows written so far.
    pub fn windows(&self) -> u64 {
        self.windows
    }

    /// Bytes written so far, header included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// End the stream: write the header if no window was written, flush,
    /// and return the writer.  No trailer follows the last window.
    pub fn finish(mut self) -> Result<W, EncodeError> {
        self.ensure_header()?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Encode a complete stream into memory.
pub fn encode_all(windows: &[Window], version: SvndiffVersion) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = SvndiffEncoder::new(Vec::new(), version)?;
    for window in windows {
        encoder.write_window(window)?;
    }
    encoder.finish()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
