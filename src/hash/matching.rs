// Matching strategy interface.
//
// A matcher turns a (source, target) pair into the instructions of one
// window.  Both strategies share the byte-comparison helpers below and
// emit through a `WindowBuilder`, which merges contiguous instructions.

use super::config::{Algorithm, MatcherConfig};
use super::vdelta::VdeltaMatcher;
use super::xdelta::XdeltaMatcher;
use crate::window::{Window, WindowBuilder};

/// A strategy that describes `target` in terms of `source`.
pub trait DeltaMatcher {
    /// Short name used in logs and CLI output.
    fn name(&self) -> &'static str;

    /// Append instructions reconstructing `target` to `builder`.
    ///
    /// Source copies address `source` from offset 0.  Every emitted
    /// instruction is non-empty and pending literals are flushed exactly
    /// once at the end.
    fn compute_ops(&self, source: &[u8], target: &[u8], builder: &mut WindowBuilder);

    /// Diff `target` against `source` into a window whose source view
    /// starts at `sview_offset` and covers all of `source`.
    fn diff_window(&self, source: &[u8], target: &[u8], sview_offset: u64) -> Window {
        let mut builder = WindowBuilder::with_capacity(16, target.len() / 8);
        self.compute_ops(source, target, &mut builder);
        debug_assert_eq!(builder.target_len(), target.len());
        builder.finish(sview_offset, source.len())
    }
}

/// Construct the matcher for `algorithm`.
pub fn matcher_for(algorithm: Algorithm, config: MatcherConfig) -> Box<dyn DeltaMatcher> {
    match algorithm {
        Algorithm::Xdelta => Box::new(XdeltaMatcher::new(config)),
        Algorithm::Vdelta => Box::new(VdeltaMatcher::new(config)),
    }
}

/// Diff two buffers with the default strategy and configuration.
pub fn diff(source: &[u8], target: &[u8]) -> Window {
    XdeltaMatcher::default().diff_window(source, target, 0)
}

/// Length of the common prefix of `a` and `b`.
#[inline]
pub fn match_length(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Length of the common suffix of `a` and `b`.
#[inline]
pub fn reverse_match_length(a: &[u8], b: &[u8]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}
