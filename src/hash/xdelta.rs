// Rolling-checksum block matcher.
//
// The source is cut into aligned blocks which are indexed by checksum.
// A same-width window slides over the target one byte at a time; on a
// verified block hit the match is extended forward as far as the bytes
// agree and backward into the pending literal run.  Literals accumulate
// between matches and are flushed just before each copy.
//
// Two shortcuts bracket the scan: a common prefix longer than four bytes
// becomes an immediate source copy, and the tail after the last match is
// checked for a common suffix with the end of the source.

use log::trace;

use super::config::MatcherConfig;
use super::matching::{DeltaMatcher, match_length, reverse_match_length};
use super::rolling::RollingChecksum;
use super::table::BlockTable;
use crate::window::WindowBuilder;

/// Block matcher emitting `CopyFromSource` and `Insert` only.
#[derive(Debug, Clone, Copy, Default)]
pub struct XdeltaMatcher {
    config: MatcherConfig,
}

impl XdeltaMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }
}

impl DeltaMatcher for XdeltaMatcher {
    fn name(&self) -> &'static str {
        "xdelta"
    }

    fn compute_ops(&self, source: &[u8], target: &[u8], builder: &mut WindowBuilder) {
        let block = self.config.block_size.max(1);
        let min_match = self.config.min_match;
        let asize = source.len();
        let bsize = target.len();

        let mut lo = match_length(source, target);
        let mut pending_start = 0;
        if lo > min_match || (lo == bsize && lo > 0) {
            builder.copy_source(0, lo);
            pending_start = lo;
        } else {
            lo = 0;
        }

        if bsize - lo < block || asize < block {
            store_trailer(builder, source, target, pending_start, min_match);
            return;
        }

        let table = BlockTable::new(source, block);
        let upper = bsize - block;
        let mut rolling = RollingChecksum::new(&target[lo..lo + block]);

        while lo < upper {
            match find_match(&table, &rolling, source, target, lo, pending_start) {
                None => {
                    rolling.roll(target[lo], target[lo + block]);
                    lo += 1;
                }
                Some((apos, bpos, len)) => {
                    trace!("xdelta: target {bpos} <- source {apos} ({len} bytes)");
                    if bpos > pending_start {
                        builder.insert(&target[pending_start..bpos]);
                    }
                    builder.copy_source(apos, len);
                    lo = bpos + len;
                    pending_start = lo;
                    if lo + block <= bsize {
                        rolling = RollingChecksum::new(&target[lo..lo + block]);
                    }
                }
            }
        }

        store_trailer(builder, source, target, pending_start, min_match);
    }
}

/// Look up the target block at `bpos`.  On a hit returns the (possibly
/// backward-shifted) source and target positions and the match length.
fn find_match(
    table: &BlockTable<'_>,
    rolling: &RollingChecksum,
    source: &[u8],
    target: &[u8],
    bpos: usize,
    pending_start: usize,
) -> Option<(usize, usize, usize)> {
    let block = table.block_size();
    let mut apos = table.find(rolling.value(), &target[bpos..bpos + block])?;
    let mut bpos = bpos;

    let mut len = block + match_length(&source[apos + block..], &target[bpos + block..]);

    // Source blocks are sampled at block-size strides, so the true start
    // of the match may lie before the block; reclaim it from the literals.
    while apos > 0 && bpos > pending_start && source[apos - 1] == target[bpos - 1] {
        apos -= 1;
        bpos -= 1;
        len += 1;
    }

    Some((apos, bpos, len))
}

/// Flush `target[start..]`, reusing a common suffix with `source` as a
/// final source copy when it is longer than `min_match`.
fn store_trailer(
    builder: &mut WindowBuilder,
    source: &[u8],
    target: &[u8],
    start: usize,
    min_match: usize,
) {
    let remaining = target.len() - start;
    if remaining == 0 {
        return;
    }
    let max_len = remaining.min(source.len());
    let mut end_match = reverse_match_length(
        &source[source.len() - max_len..],
        &target[target.len() - max_len..],
    );
    if end_match <= min_match {
        end_match = 0;
    }
    if remaining > end_match {
        builder.insert(&target[start..target.len() - end_match]);
    }
    if end_match > 0 {
        builder.copy_source(source.len() - end_match, end_match);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
