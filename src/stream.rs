// Streaming delta producer.
//
// `DeltaStream` pulls fixed-size chunks from a source reader and a target
// reader and turns each target chunk into one window.  The tail of the
// source read so far is kept between calls so a window can match against
// source bytes that precede its own chunk.  A digest of every source
// byte read is available once the stream is exhausted.

use std::io::{self, Read};

use log::debug;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::hash::config::DEFAULT_WINDOW_SIZE;
use crate::hash::{Algorithm, DeltaMatcher, MatcherConfig, matcher_for};
use crate::svndiff::header::HARD_MAX_WINSIZE;
use crate::window::Window;

/// Largest accepted `window_size`.  A source view spans the retained
/// tail plus one fresh chunk, so it reaches twice this.
pub const MAX_WINDOW_SIZE: usize = HARD_MAX_WINSIZE / 2;

/// Errors raised by [`DeltaStream`].
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("source digest requested before the stream finished")]
    DigestNotReady,
    #[error("window size {size} outside 1..={max}")]
    WindowSize { size: usize, max: usize },
}

/// Producer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// Target bytes per window.  The first window also reads half this
    /// much extra source.
    pub window_size: usize,
    pub algorithm: Algorithm,
    pub matcher: MatcherConfig,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            algorithm: Algorithm::default(),
            matcher: MatcherConfig::default(),
        }
    }
}

impl StreamConfig {
    /// Check that windows produced with this config can be decoded.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.window_size == 0 || self.window_size > MAX_WINDOW_SIZE {
            return Err(StreamError::WindowSize {
                size: self.window_size,
                max: MAX_WINDOW_SIZE,
            });
        }
        Ok(())
    }
}

/// Lifecycle of a [`DeltaStream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    NotStarted,
    Producing,
    Finished,
}

/// Pull-based window generator over a source and a target reader.
///
/// ```
/// use svndelta::apply::apply_window;
/// use svndelta::stream::{DeltaStream, StreamConfig};
///
/// let source = b"the quick brown fox".as_slice();
/// let target = b"the quick red fox".as_slice();
/// let mut stream = DeltaStream::new(source, target, StreamConfig::default());
/// let window = stream.next_window().unwrap().unwrap();
/// assert_eq!(apply_window(&window, source).unwrap(), target);
/// assert!(stream.next_window().unwrap().is_none());
/// assert_eq!(stream.digest().unwrap().len(), 32);
/// ```
pub struct DeltaStream<S: Read, T: Read, D: Digest = Sha256> {
    source: S,
    target: T,
    matcher: Box<dyn DeltaMatcher>,
    window_size: usize,
    state: StreamState,
    /// Retained source tail followed by the latest source chunk.
    source_buf: Vec<u8>,
    /// Source bytes consumed so far.
    source_pos: u64,
    target_buf: Vec<u8>,
    hasher: Option<D>,
    digest: Option<Vec<u8>>,
    windows: u64,
}

impl<S: Read, T: Read> DeltaStream<S, T, Sha256> {
    /// A stream that fingerprints the source with SHA-256.
    pub fn new(source: S, target: T, config: StreamConfig) -> Self {
        Self::with_matcher(
            source,
            target,
            matcher_for(config.algorithm, config.matcher),
            config.window_size,
        )
    }
}

impl<S: Read, T: Read, D: Digest> DeltaStream<S, T, D> {
    /// A stream driven by any matcher and digest.
    pub fn with_matcher(
        source: S,
        target: T,
        matcher: Box<dyn DeltaMatcher>,
        window_size: usize,
    ) -> Self {
        assert!(
            window_size > 0 && window_size <= MAX_WINDOW_SIZE,
            "window size {window_size} outside 1..={MAX_WINDOW_SIZE}"
        );
        Self {
            source,
            target,
            matcher,
            window_size,
            state: StreamState::NotStarted,
            source_buf: Vec::new(),
            source_pos: 0,
            target_buf: Vec::with_capacity(window_size),
            hasher: Some(D::new()),
            digest: None,
            windows: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Windows produced so far.
    pub fn windows(&self) -> u64 {
        self.windows
    }

    /// Source bytes read so far.
    pub fn source_bytes(&self) -> u64 {
        self.source_pos
    }

    /// Produce the next window, or `None` once the target is exhausted.
    pub fn next_window(&mut self) -> Result<Option<Window>, StreamError> {
        let padding = match self.state {
            StreamState::Finished => return Ok(None),
            StreamState::NotStarted => {
                self.state = StreamState::Producing;
                self.window_size / 2
            }
            StreamState::Producing => 0,
        };

        let kept = self.source_buf.len();
        let want = (self.window_size + padding) as u64;
        let got = (&mut self.source).take(want).read_to_end(&mut self.source_buf)?;
        if let Some(hasher) = self.hasher.as_mut() {
            hasher.update(&self.source_buf[kept..]);
        }
        self.source_pos += got as u64;

        self.target_buf.clear();
        (&mut self.target)
            .take(self.window_size as u64)
            .read_to_end(&mut self.target_buf)?;

        if self.target_buf.is_empty() {
            self.state = StreamState::Finished;
            if let Some(hasher) = self.hasher.take() {
                self.digest = Some(hasher.finalize().to_vec());
            }
            debug!(
                "delta stream finished: {} windows, {} source bytes",
                self.windows, self.source_pos
            );
            return Ok(None);
        }

        let sview_offset = self.source_pos - self.source_buf.len() as u64;
        let window = self
            .matcher
            .diff_window(&self.source_buf, &self.target_buf, sview_offset);

        if self.source_buf.len() > self.window_size {
            let excess = self.source_buf.len() - self.window_size;
            self.source_buf.drain(..excess);
        }

        self.windows += 1;
        debug!(
            "{} window {}: source [{}, +{}) -> {} target bytes, {} ops, {} new",
            self.matcher.name(),
            self.windows,
            window.source_view_offset(),
            window.source_view_len(),
            window.target_view_len(),
            window.ops().len(),
            window.new_data().len()
        );
        Ok(Some(window))
    }

    /// Digest of every source byte read.  Only available once
    /// [`next_window`](Self::next_window) has returned `None`.
    pub fn digest(&self) -> Result<&[u8], StreamError> {
        self.digest.as_deref().ok_or(StreamError::DigestNotReady)
    }
}

impl<S: Read, T: Read, D: Digest> Iterator for DeltaStream<S, T, D> {
    type Item = Result<Window, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_window().transpose()
    }
}
