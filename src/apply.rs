// Window application.
//
// `apply_window` rebuilds one target view from its source view.
// `ApplyStream` drives a whole window sequence against a forward-only
// source reader, keeping only the current source view in memory.

use std::io::{self, Read, Write};

use log::debug;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::window::{InvalidOps, Instruction, Window};

/// Errors raised while applying windows.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("source view is {actual} bytes, window expects {expected}")]
    SourceViewMismatch { expected: usize, actual: usize },
    #[error("malformed window: {0}")]
    MalformedWindow(#[from] InvalidOps),
    #[error("source view [{offset}, +{len}) slides backward")]
    BackwardSlidingView { offset: u64, len: usize },
    #[error("source ended at {available} bytes, window needs {needed}")]
    SourceTruncated { needed: u64, available: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Apply `window` to `source_view`, returning the target view.
pub fn apply_window(window: &Window, source_view: &[u8]) -> Result<Vec<u8>, ApplyError> {
    let mut out = Vec::with_capacity(window.target_view_len());
    apply_window_into(window, source_view, &mut out)?;
    Ok(out)
}

/// Apply `window` to `source_view`, appending the target view to `out`.
///
/// Target copies address the bytes this call appends, not anything `out`
/// held before.  The window is validated before any byte is written.
pub fn apply_window_into(
    window: &Window,
    source_view: &[u8],
    out: &mut Vec<u8>,
) -> Result<(), ApplyError> {
    if source_view.len() != window.source_view_len() {
        return Err(ApplyError::SourceViewMismatch {
            expected: window.source_view_len(),
            actual: source_view.len(),
        });
    }
    window.validate()?;

    let base = out.len();
    out.reserve(window.target_view_len());
    let new_data = window.new_data();

    for op in window.ops() {
        match *op {
            Instruction::CopyFromSource { offset, length } => {
                out.extend_from_slice(&source_view[offset..offset + length]);
            }
            Instruction::Insert { offset, length } => {
                out.extend_from_slice(&new_data[offset..offset + length]);
            }
            Instruction::CopyFromTarget { offset, length } => {
                let from = base + offset;
                if from + length <= out.len() {
                    out.extend_from_within(from..from + length);
                } else {
                    // Overlapping: each byte read may be one this loop wrote.
                    for i in from..from + length {
                        let byte = out[i];
                        out.push(byte);
                    }
                }
            }
        }
    }

    debug_assert_eq!(out.len() - base, window.target_view_len());
    Ok(())
}

// ---------------------------------------------------------------------------
// Streaming application
// ---------------------------------------------------------------------------

/// Applies successive windows against a forward-only source.
///
/// Source views must slide forward: each window's view may not start
/// before, or end before, the previous non-empty one.  Windows with an
/// empty view leave the buffered view alone.  Bytes the views skip over
/// are read and discarded.
pub struct ApplyStream<R: Read, W: Write> {
    source: R,
    writer: W,
    view: Vec<u8>,
    view_offset: u64,
    last_view: Option<(u64, usize)>,
    target: Vec<u8>,
    hasher: Sha256,
    written: u64,
    windows: u64,
}

impl<R: Read, W: Write> ApplyStream<R, W> {
    pub fn new(source: R, writer: W) -> Self {
        Self {
            source,
            writer,
            view: Vec::new(),
            view_offset: 0,
            last_view: None,
            target: Vec::new(),
            hasher: Sha256::new(),
            written: 0,
            windows: 0,
        }
    }

    /// Apply one window and write its target view.
    pub fn apply(&mut self, window: &Window) -> Result<(), ApplyError> {
        let view: &[u8] = if window.source_view_len() == 0 {
            &[]
        } else {
            self.slide_view(window.source_view_offset(), window.source_view_len())?;
            &self.view
        };

        self.target.clear();
        apply_window_into(window, view, &mut self.target)?;
        self.writer.write_all(&self.target)?;
        self.hasher.update(&self.target);
        self.written += self.target.len() as u64;
        self.windows += 1;

        debug!(
            "applied window {}: source [{}, +{}) -> {} bytes",
            self.windows,
            window.source_view_offset(),
            window.source_view_len(),
            self.target.len()
        );
        Ok(())
    }

    /// Total target bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn windows(&self) -> u64 {
        self.windows
    }

    /// Flush the writer and return it with the byte count and SHA-256 of
    /// everything written.
    pub fn finish(mut self) -> Result<(W, u64, [u8; 32]), ApplyError> {
        self.writer.flush()?;
        Ok((self.writer, self.written, self.hasher.finalize().into()))
    }

    fn slide_view(&mut self, offset: u64, len: usize) -> Result<(), ApplyError> {
        let end = offset + len as u64;
        if let Some((last_offset, last_len)) = self.last_view
            && (offset < last_offset || end < last_offset + last_len as u64)
        {
            return Err(ApplyError::BackwardSlidingView { offset, len });
        }
        self.last_view = Some((offset, len));

        let view_end = self.view_offset + self.view.len() as u64;
        if offset >= view_end {
            self.view.clear();
            let gap = offset - view_end;
            if gap > 0 {
                let skipped = io::copy(&mut (&mut self.source).take(gap), &mut io::sink())?;
                if skipped < gap {
                    return Err(ApplyError::SourceTruncated {
                        needed: end,
                        available: view_end + skipped,
                    });
                }
            }
        } else {
            let keep_from = (offset - self.view_offset) as usize;
            self.view.drain(..keep_from);
        }
        self.view_offset = offset;

        let have = self.view_offset + self.view.len() as u64;
        if end > have {
            let want = end - have;
            let got = (&mut self.source)
                .take(want)
                .read_to_end(&mut self.view)? as u64;
            if got < want {
                return Err(ApplyError::SourceTruncated {
                    needed: end,
                    available: have + got,
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
