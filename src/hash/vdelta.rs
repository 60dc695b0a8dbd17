// Quadgram matcher over source ++ target.
//
// Every 4-byte key of the source is indexed up front.  The target is then
// scanned left to right: at each position the longest earlier occurrence
// is located through the index and extended by re-keying on the last
// three matched bytes plus the next unmatched one.  Unmatched bytes join
// a pending literal run; they and the tail of every match are indexed as
// the scan passes them, so later target bytes can copy from earlier ones.
//
// Candidates within a bucket are visited in ascending position and a
// candidate replaces the current best only if strictly longer, so ties
// resolve to the lowest examined position.

use log::trace;

use super::config::MatcherConfig;
use super::matching::{DeltaMatcher, match_length};
use super::table::{QuadgramIndex, quadgram};
use crate::window::WindowBuilder;

const KEY_SIZE: usize = 4;

/// Quadgram matcher emitting source copies, target copies and inserts.
#[derive(Debug, Clone, Copy, Default)]
pub struct VdeltaMatcher {
    config: MatcherConfig,
}

impl VdeltaMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    /// Longest match for `data[here..]` among indexed earlier positions.
    /// Returns `(position, length)`; length 0 when nothing matched.
    fn longest_match(&self, index: &QuadgramIndex, data: &[u8], here: usize) -> (usize, usize) {
        let max_chain = self.config.max_chain.max(1);
        let mut best = (0, 0);
        let mut key = here;

        loop {
            let mut progress = false;
            let candidates = index.candidates(quadgram(data, key));
            let skip = candidates.len().saturating_sub(max_chain);
            let back = key - here;
            for &slot in &candidates[skip..] {
                if slot < back {
                    continue;
                }
                let pos = slot - back;
                let len = match_length(&data[pos..], &data[here..]);
                if len > best.1 {
                    best = (pos, len);
                    progress = true;
                }
            }
            if !progress {
                break;
            }
            key = here + best.1 - (KEY_SIZE - 1);
            if data.len() - key < KEY_SIZE {
                break;
            }
        }

        best
    }
}

impl DeltaMatcher for VdeltaMatcher {
    fn name(&self) -> &'static str {
        "vdelta"
    }

    fn compute_ops(&self, source: &[u8], target: &[u8], builder: &mut WindowBuilder) {
        if target.is_empty() {
            return;
        }
        let min_match = self.config.min_match.max(KEY_SIZE);

        let mut data = Vec::with_capacity(source.len() + target.len());
        data.extend_from_slice(source);
        data.extend_from_slice(target);
        let start = source.len();
        let end = data.len();

        let mut index = QuadgramIndex::with_capacity(end);
        for pos in 0..start {
            index.insert(source, pos);
        }

        let mut here = start;
        let mut pending: Option<usize> = None;

        while end - here >= KEY_SIZE {
            let (pos, len) = self.longest_match(&index, &data, here);

            if len < min_match {
                index.insert(&data, here);
                pending.get_or_insert(here);
                here += 1;
                continue;
            }

            if let Some(from) = pending.take() {
                builder.insert(&data[from..here]);
            }

            trace!("vdelta: target {} <- data {pos} ({len} bytes)", here - start);
            if pos + len <= start {
                builder.copy_source(pos, len);
            } else if pos < start {
                // No single instruction crosses the source/target boundary.
                let in_source = start - pos;
                builder.copy_source(pos, in_source);
                builder.copy_target(0, len - in_source);
            } else {
                builder.copy_target(pos - start, len);
            }

            here += len;
            if end - here >= KEY_SIZE {
                for last in here - (KEY_SIZE - 1)..here {
                    index.insert(&data, last);
                }
            }
        }

        let from = pending.unwrap_or(here);
        if from < end {
            builder.insert(&data[from..end]);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
