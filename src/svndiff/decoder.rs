// svndiff decoding.
//
// `StreamDecoder` is push-based: feed it byte chunks of any size and pull
// complete windows out.  It returns `Ok(None)` whenever more input is
// needed, so it never blocks.  `read_window` and `skip_window` are the
// blocking counterparts for `Read` sources.

use std::io::{self, Read};

use log::{debug, warn};
use thiserror::Error;

use super::header::{HEADER_LEN, MAX_WINDOW_HEADER_LEN, SvndiffVersion, WindowHeader, read_header};
use super::secondary::{self, SectionCodec};
use super::varint::{self, VarIntError};
use crate::window::{Action, Instruction, InvalidOps, OpsValidator, Window};

/// Errors raised while decoding svndiff data.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("svndiff has invalid header {0:02x?}")]
    InvalidHeader([u8; HEADER_LEN]),
    #[error("malformed integer: {0}")]
    VarInt(#[from] VarIntError),
    #[error("invalid diff stream in window {window}: {source}")]
    InvalidOps {
        window: u64,
        #[source]
        source: InvalidOps,
    },
    #[error("svndiff contains corrupt window header: {0}")]
    CorruptWindow(&'static str),
    #[error("svndiff has backwards-sliding source views at window {window}")]
    BackwardSlidingView { window: u64 },
    #[error("unexpected end of svndiff input ({0})")]
    UnexpectedEnd(&'static str),
    #[error("decompression of svndiff data failed: {0}")]
    Decompression(String),
}

/// Decoder behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Fail `finish` when input ends inside the header or a window.
    pub error_on_early_close: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            error_on_early_close: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Instruction decoding
// ---------------------------------------------------------------------------

/// Decode and validate an instruction section.
///
/// Insert offsets are assigned sequentially.  Every new-data byte must be
/// consumed and the instructions must fill the target view exactly.
pub fn decode_instructions(
    ins: &[u8],
    sview_len: usize,
    tview_len: usize,
    new_len: usize,
) -> Result<Vec<Instruction>, InvalidOps> {
    let mut validator = OpsValidator::new(sview_len, tview_len, new_len);
    let mut ops = Vec::with_capacity(ins.len() / 2);
    let mut pos = 0;
    let mut npos = 0usize;

    while pos < ins.len() {
        let index = ops.len();
        let selector = ins[pos];
        pos += 1;

        let action = Action::from_code(selector >> 6).ok_or(InvalidOps::Undecodable { index })?;
        let mut length = usize::from(selector & 0x3F);
        if length == 0 {
            let (v, used) = read_operand(&ins[pos..], index)?;
            length = v;
            pos += used;
        }
        let offset = match action {
            Action::New => npos,
            Action::Source | Action::Target => {
                let (v, used) = read_operand(&ins[pos..], index)?;
                pos += used;
                v
            }
        };

        let op = Instruction::new(action, offset, length);
        validator.check(index, &op)?;
        if action == Action::New {
            npos += length;
        }
        ops.push(op);
    }

    validator.finish(true)?;
    Ok(ops)
}

fn read_operand(data: &[u8], index: usize) -> Result<(usize, usize), InvalidOps> {
    match varint::read_u64(data) {
        Ok((v, used)) => usize::try_from(v)
            .map(|v| (v, used))
            .map_err(|_| InvalidOps::OffsetOverflow { index }),
        Err(_) => Err(InvalidOps::Undecodable { index }),
    }
}

/// Turn a header and its on-wire sections into a validated window.
fn build_window(
    header: &WindowHeader,
    codec: Option<&dyn SectionCodec>,
    ins_wire: &[u8],
    new_wire: &[u8],
    window_index: u64,
) -> Result<Window, DecodeError> {
    let (ins, new_data) = match codec {
        None => (ins_wire.to_vec(), new_wire.to_vec()),
        Some(codec) => (
            secondary::decompress_section(
                codec,
                ins_wire,
                header.tview_len.saturating_mul(super::header::MAX_INSTRUCTION_LEN),
            )?,
            secondary::decompress_section(codec, new_wire, header.tview_len)?,
        ),
    };

    let ops = decode_instructions(&ins, header.sview_len, header.tview_len, new_data.len())
        .map_err(|source| DecodeError::InvalidOps {
            window: window_index,
            source,
        })?;

    Ok(Window::from_trusted_parts(
        header.sview_offset,
        header.sview_len,
        header.tview_len,
        ops,
        new_data,
    ))
}

// ---------------------------------------------------------------------------
// Push decoder
// ---------------------------------------------------------------------------

/// Input buffer with a consumed-prefix cursor.
#[derive(Debug, Default)]
struct CursorBuf {
    buf: Vec<u8>,
    start: usize,
}

impl CursorBuf {
    fn available(&self) -> &[u8] {
        &self.buf[self.start..]
    }

    fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn consume(&mut self, n: usize) {
        self.start += n;
        if self.start >= self.buf.len() {
            self.buf.clear();
            self.start = 0;
        } else if self.start > 4096 && self.start * 2 > self.buf.len() {
            self.buf.drain(..self.start);
            self.start = 0;
        }
    }
}

/// Incremental svndiff parser.
///
/// ```
/// use svndelta::svndiff::StreamDecoder;
///
/// let mut decoder = StreamDecoder::new();
/// decoder.push(b"SVN\0").unwrap();
/// decoder.push(&[0, 0, 3, 1, 3, 0x83]).unwrap();
/// assert!(decoder.next_window().unwrap().is_none());
/// decoder.push(b"abc").unwrap();
/// let window = decoder.next_window().unwrap().unwrap();
/// assert_eq!(window.new_data(), b"abc");
/// decoder.finish().unwrap();
/// ```
pub struct StreamDecoder {
    options: DecoderOptions,
    header: [u8; HEADER_LEN],
    header_bytes: usize,
    version: Option<SvndiffVersion>,
    codec: Option<Box<dyn SectionCodec>>,
    buf: CursorBuf,
    pending: Option<WindowHeader>,
    last_view: Option<(u64, usize)>,
    windows: u64,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::with_options(DecoderOptions::default())
    }

    pub fn with_options(options: DecoderOptions) -> Self {
        Self {
            options,
            header: [0; HEADER_LEN],
            header_bytes: 0,
            version: None,
            codec: None,
            buf: CursorBuf::default(),
            pending: None,
            last_view: None,
            windows: 0,
        }
    }

    /// The stream version, once the header has been seen.
    pub fn version(&self) -> Option<SvndiffVersion> {
        self.version
    }

    /// Windows returned so far.
    pub fn windows(&self) -> u64 {
        self.windows
    }

    /// Buffer `chunk`.  The header is validated as soon as it completes,
    /// even if it arrives split across chunks.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        let mut input = chunk;
        if self.header_bytes < HEADER_LEN {
            let take = (HEADER_LEN - self.header_bytes).min(input.len());
            self.header[self.header_bytes..self.header_bytes + take]
                .copy_from_slice(&input[..take]);
            self.header_bytes += take;
            input = &input[take..];

            if self.header_bytes == HEADER_LEN {
                let version = SvndiffVersion::from_header(&self.header)?;
                self.codec = secondary::codec_for(version, 0)?;
                self.version = Some(version);
            }
        }
        if !input.is_empty() {
            self.buf.push(input);
        }
        Ok(())
    }

    /// Parse the next complete window, or `Ok(None)` if more input is
    /// needed.
    pub fn next_window(&mut self) -> Result<Option<Window>, DecodeError> {
        if self.version.is_none() {
            return Ok(None);
        }

        let header = match self.pending {
            Some(header) => header,
            None => {
                let avail = self.buf.available();
                let Some(header) = WindowHeader::try_parse(avail)? else {
                    if avail.len() > MAX_WINDOW_HEADER_LEN {
                        return Err(DecodeError::CorruptWindow("window header too long"));
                    }
                    return Ok(None);
                };
                self.pending = Some(header);
                header
            }
        };

        let needed = header
            .total_len()
            .ok_or(DecodeError::CorruptWindow("window size overflows"))?;
        let avail = self.buf.available();
        if avail.len() < needed {
            return Ok(None);
        }
        self.pending = None;

        let index = self.windows;
        let ins_start = header.header_len;
        let new_start = ins_start + header.ins_len;
        let window = build_window(
            &header,
            self.codec.as_deref(),
            &avail[ins_start..new_start],
            &avail[new_start..needed],
            index,
        )?;
        self.buf.consume(needed);

        if header.sview_len > 0 {
            let end = header.sview_offset + header.sview_len as u64;
            if let Some((last_offset, last_len)) = self.last_view
                && (header.sview_offset < last_offset || end < last_offset + last_len as u64)
            {
                return Err(DecodeError::BackwardSlidingView { window: index });
            }
            self.last_view = Some((header.sview_offset, header.sview_len));
        }

        self.windows += 1;
        debug!(
            "decoded window {}: source [{}, +{}), target {} bytes, {} ops, {} new bytes",
            self.windows,
            window.source_view_offset(),
            window.source_view_len(),
            window.target_view_len(),
            window.ops().len(),
            window.new_data().len()
        );
        Ok(Some(window))
    }

    /// Declare end of input.  Leftover bytes are an error unless
    /// `error_on_early_close` is off.
    pub fn finish(&self) -> Result<(), DecodeError> {
        let reason = if self.header_bytes < HEADER_LEN {
            "missing header"
        } else if self.pending.is_some() || !self.buf.available().is_empty() {
            "truncated window"
        } else {
            return Ok(());
        };

        if self.options.error_on_early_close {
            return Err(DecodeError::UnexpectedEnd(reason));
        }
        warn!(
            "svndiff input ended early ({reason}); {} bytes discarded",
            self.buf.available().len()
        );
        Ok(())
    }
}

/// Decode a complete in-memory stream.
pub fn decode_all(bytes: &[u8]) -> Result<(SvndiffVersion, Vec<Window>), DecodeError> {
    let mut decoder = StreamDecoder::new();
    decoder.push(bytes)?;
    let mut windows = Vec::new();
    while let Some(window) = decoder.next_window()? {
        windows.push(window);
    }
    decoder.finish()?;
    let version = decoder
        .version()
        .ok_or(DecodeError::UnexpectedEnd("missing header"))?;
    Ok((version, windows))
}

// ---------------------------------------------------------------------------
// Blocking readers
// ---------------------------------------------------------------------------

/// Read the stream header from `reader`.
pub fn read_stream_header<R: Read>(reader: &mut R) -> Result<SvndiffVersion, DecodeError> {
    read_header(reader)
}

fn read_section<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>, DecodeError> {
    let mut buf = Vec::with_capacity(len);
    let got = reader.take(len as u64).read_to_end(&mut buf)?;
    if got < len {
        return Err(DecodeError::UnexpectedEnd("truncated window"));
    }
    Ok(buf)
}

/// Read one window after the stream header.  Returns `Ok(None)` at a
/// clean end of input.
pub fn read_window<R: Read>(
    reader: &mut R,
    version: SvndiffVersion,
) -> Result<Option<Window>, DecodeError> {
    let Some(header) = WindowHeader::read(reader)? else {
        return Ok(None);
    };
    let ins = read_section(reader, header.ins_len)?;
    let new = read_section(reader, header.new_len)?;
    let codec = secondary::codec_for(version, 0)?;
    build_window(&header, codec.as_deref(), &ins, &new, 0).map(Some)
}

/// Discard one window without decoding its instructions.  Returns
/// `Ok(false)` at a clean end of input.
pub fn skip_window<R: Read>(reader: &mut R, _version: SvndiffVersion) -> Result<bool, DecodeError> {
    let Some(header) = WindowHeader::read(reader)? else {
        return Ok(false);
    };
    let len = (header.ins_len as u64) + (header.new_len as u64);
    let skipped = io::copy(&mut reader.take(len), &mut io::sink())?;
    if skipped < len {
        return Err(DecodeError::UnexpectedEnd("truncated window"));
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
