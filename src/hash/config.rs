// Matcher configuration and defaults.

/// Target chunk size read per window by the streaming producer
/// (Subversion's `SVN_DELTA_WINDOW_SIZE`).
pub const DEFAULT_WINDOW_SIZE: usize = 102_400;

/// Source block size for the rolling block matcher.
pub const MATCH_BLOCKSIZE: usize = 64;

/// Shortest match worth a copy instruction.  Anything shorter costs more
/// to encode than the literal bytes.
pub const MIN_MATCH: usize = 4;

/// Default bound on candidates examined per quadgram lookup.  Unbounded,
/// so the quadgram matcher always finds the longest match.
pub const DEFAULT_MAX_CHAIN: usize = usize::MAX;

/// Which matching strategy computes window instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Rolling-checksum block matcher (source copies only).
    #[default]
    Xdelta,
    /// Quadgram multimap matcher (source and target copies).
    Vdelta,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Xdelta => "xdelta",
            Self::Vdelta => "vdelta",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "xdelta" => Some(Self::Xdelta),
            "vdelta" => Some(Self::Vdelta),
            _ => None,
        }
    }
}

/// Tuning parameters shared by the matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Block width for the rolling checksum.
    pub block_size: usize,
    /// Minimum match length emitted as a copy.
    pub min_match: usize,
    /// Maximum candidates examined per quadgram bucket.
    pub max_chain: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            block_size: MATCH_BLOCKSIZE,
            min_match: MIN_MATCH,
            max_chain: DEFAULT_MAX_CHAIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_names_roundtrip() {
        for a in [Algorithm::Xdelta, Algorithm::Vdelta] {
            assert_eq!(Algorithm::from_name(a.name()), Some(a));
        }
        assert_eq!(Algorithm::from_name("bsdiff"), None);
    }

    #[test]
    fn defaults() {
        let cfg = MatcherConfig::default();
        assert_eq!(cfg.block_size, 64);
        assert_eq!(cfg.min_match, MIN_MATCH);
        assert_eq!(Algorithm::default(), Algorithm::Xdelta);
    }
}
