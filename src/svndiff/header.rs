// svndiff stream header and per-window headers.
//
// Stream header: "SVN" followed by a version byte.  Window header: five
// varints (source view offset, source view length, target view length,
// instruction section length, new-data section length).  In versions 1
// and 2 the two section lengths count the on-wire bytes, which may be
// compressed.

use std::io::{self, Read, Write};

use super::decoder::DecodeError;
use super::varint::{self, MAX_VARINT_LEN};

pub const MAGIC: [u8; 3] = *b"SVN";

/// Length of the stream header.
pub const HEADER_LEN: usize = 4;

/// Largest source or target view accepted by the decoder (16 MiB).
pub const HARD_MAX_WINSIZE: usize = 1 << 24;

/// Longest encoding of one instruction: selector, length and offset.
pub const MAX_INSTRUCTION_LEN: usize = 2 * MAX_VARINT_LEN + 1;

/// Longest window header: five varints.
pub const MAX_WINDOW_HEADER_LEN: usize = 5 * MAX_VARINT_LEN;

// ---------------------------------------------------------------------------
// Version
// ---------------------------------------------------------------------------

/// svndiff format version, stored in the fourth header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SvndiffVersion {
    /// Uncompressed sections.
    #[default]
    V0 = 0,
    /// zlib-compressed sections.
    V1 = 1,
    /// LZ4-compressed sections.
    V2 = 2,
}

impl SvndiffVersion {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::V0),
            1 => Some(Self::V1),
            2 => Some(Self::V2),
            _ => None,
        }
    }

    pub fn byte(self) -> u8 {
        self as u8
    }

    /// The four-byte stream header for this version.
    pub fn header(self) -> [u8; HEADER_LEN] {
        [MAGIC[0], MAGIC[1], MAGIC[2], self.byte()]
    }

    /// True if sections carry a length prefix and may be compressed.
    pub fn has_compressed_sections(self) -> bool {
        self != Self::V0
    }

    /// Parse a complete stream header.
    pub fn from_header(header: &[u8; HEADER_LEN]) -> Result<Self, DecodeError> {
        if header[..3] != MAGIC {
            return Err(DecodeError::InvalidHeader(*header));
        }
        Self::from_byte(header[3]).ok_or(DecodeError::InvalidHeader(*header))
    }
}

impl std::fmt::Display for SvndiffVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "svndiff{}", self.byte())
    }
}

/// Write the stream header for `version`.
pub fn write_header<W: Write>(w: &mut W, version: SvndiffVersion) -> io::Result<()> {
    w.write_all(&version.header())
}

/// Read and validate a stream header from a blocking source.
pub fn read_header<R: Read>(r: &mut R) -> Result<SvndiffVersion, DecodeError> {
    let mut header = [0u8; HEADER_LEN];
    r.read_exact(&mut header).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => DecodeError::UnexpectedEnd("missing header"),
        _ => DecodeError::Io(e),
    })?;
    SvndiffVersion::from_header(&header)
}

// ---------------------------------------------------------------------------
// Window header
// ---------------------------------------------------------------------------

/// Parsed window header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHeader {
    pub sview_offset: u64,
    pub sview_len: usize,
    pub tview_len: usize,
    /// On-wire length of the instruction section.
    pub ins_len: usize,
    /// On-wire length of the new-data section.
    pub new_len: usize,
    /// Bytes the header itself occupied.
    pub header_len: usize,
}

impl WindowHeader {
    /// Check raw header values against the size limits and for overflow.
    pub fn from_values(values: [u64; 5], header_len: usize) -> Result<Self, DecodeError> {
        let [sview_offset, sview_len, tview_len, ins_len, new_len] = values;
        let narrow = |v: u64| {
            usize::try_from(v).map_err(|_| DecodeError::CorruptWindow("length overflows usize"))
        };
        let sview_len = narrow(sview_len)?;
        let tview_len = narrow(tview_len)?;
        let ins_len = narrow(ins_len)?;
        let new_len = narrow(new_len)?;

        if tview_len > HARD_MAX_WINSIZE
            || sview_len > HARD_MAX_WINSIZE
            || new_len > HARD_MAX_WINSIZE + MAX_VARINT_LEN
            || ins_len > HARD_MAX_WINSIZE * MAX_INSTRUCTION_LEN
        {
            return Err(DecodeError::CorruptWindow("window too large"));
        }
        if sview_offset.checked_add(sview_len as u64).is_none() {
            return Err(DecodeError::CorruptWindow("source view overflows"));
        }

        Ok(Self {
            sview_offset,
            sview_len,
            tview_len,
            ins_len,
            new_len,
            header_len,
        })
    }

    /// Parse a header from the start of `input`.  Returns `Ok(None)` if
    /// `input` ends before the header does.
    pub fn try_parse(input: &[u8]) -> Result<Option<Self>, DecodeError> {
        let mut values = [0u64; 5];
        let mut pos = 0;
        for value in &mut values {
            let Some((v, used)) = varint::try_read_u64(&input[pos..])? else {
                return Ok(None);
            };
            *value = v;
            pos += used;
        }
        Self::from_values(values, pos).map(Some)
    }

    /// Read a header from a blocking source.  Returns `Ok(None)` on a clean
    /// end of input before the first byte.
    pub fn read<R: Read>(r: &mut R) -> Result<Option<Self>, DecodeError> {
        let mut first = [0u8; 1];
        loop {
            match r.read(&mut first) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let mut raw = Vec::with_capacity(MAX_WINDOW_HEADER_LEN);
        raw.push(first[0]);
        let mut complete = 0;
        while complete < 5 {
            if let Some(&last) = raw.last()
                && last & 0x80 == 0
            {
                complete += 1;
                if complete == 5 {
                    break;
                }
            }
            if raw.len() >= MAX_WINDOW_HEADER_LEN {
                return Err(DecodeError::CorruptWindow("window header too long"));
            }
            r.read_exact(&mut first).map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => {
                    DecodeError::UnexpectedEnd("truncated window header")
                }
                _ => DecodeError::Io(e),
            })?;
            raw.push(first[0]);
        }

        Self::try_parse(&raw)?
            .ok_or(DecodeError::UnexpectedEnd("truncated window header"))
            .map(Some)
    }

    /// Append the encoded header to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        varint::push_u64(out, self.sview_offset);
        varint::push_u64(out, self.sview_len as u64);
        varint::push_u64(out, self.tview_len as u64);
        varint::push_u64(out, self.ins_len as u64);
        varint::push_u64(out, self.new_len as u64);
    }

    /// Total bytes of header plus both sections.
    pub fn total_len(&self) -> Option<usize> {
        self.header_len
            .checked_add(self.ins_len)?
            .checked_add(self.new_len)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
