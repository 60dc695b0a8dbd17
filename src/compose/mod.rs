// Delta composition.
//
// Given window A (base -> mid) and window B (mid -> final), build one
// window base -> final without materializing mid.  B's instructions are
// walked in order.  Inserts and target copies carry over as they are;
// each source copy names a range of A's target, which is resolved
// against A's instructions through an offset index.  A splay-tree range
// index remembers which ranges of A's target were already written to
// the composite, so a repeat reference becomes a single target copy.
//
// # Modules
//
// - `offset_index` : instruction lookup by target position
// - `range_index`  : splay tree of composed ranges

pub mod offset_index;
pub mod range_index;

use log::debug;
use thiserror::Error;

use crate::window::{Instruction, Window, WindowBuilder};
use offset_index::OffsetIndex;
use range_index::{RangeIndex, RangeKind};

/// Errors raised while composing window sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ComposeError {
    #[error(
        "window {window} reads [{offset}, +{len}) of an intermediate text of only {available} bytes"
    )]
    SourceViewOutOfRange {
        window: usize,
        offset: u64,
        len: usize,
        available: u64,
    },
}

/// Compose two windows.
///
/// `b`'s source copies address `a`'s target from offset 0.  The result
/// reads `a`'s source view and produces `b`'s target.  Both windows must
/// already be valid; violations panic.
pub fn compose_windows(a: &Window, b: &Window) -> Window {
    if b.source_ops() == 0 {
        return Window::from_trusted_parts(
            a.source_view_offset(),
            a.source_view_len(),
            b.target_view_len(),
            b.ops().to_vec(),
            b.new_data().to_vec(),
        );
    }

    let offsets = OffsetIndex::new(a);
    let mut ranges = RangeIndex::new();
    let mut builder = WindowBuilder::with_capacity(b.ops().len() * 2, b.new_data().len());
    let mut target_offset = 0;

    for op in b.ops() {
        match *op {
            Instruction::Insert { offset, length } => {
                builder.insert(&b.new_data()[offset..offset + length]);
            }
            Instruction::CopyFromTarget { offset, length } => {
                builder.copy_target(offset, length);
            }
            Instruction::CopyFromSource { offset, length } => {
                let limit = offset + length;
                assert!(
                    limit <= a.target_view_len(),
                    "source copy [{offset}, {limit}) past the first window's target ({})",
                    a.target_view_len()
                );

                ranges.splay(offset);
                let mut tgt = target_offset;
                for range in ranges.build_range_list(offset, limit) {
                    let len = range.limit - range.offset;
                    match range.kind {
                        RangeKind::FromTarget => builder.copy_target(range.target_offset, len),
                        RangeKind::FromSource => copy_source_ops(
                            range.offset,
                            range.limit,
                            tgt,
                            a,
                            &offsets,
                            &mut builder,
                        ),
                    }
                    tgt += len;
                }
                debug_assert_eq!(tgt, target_offset + length);
                ranges.insert(offset, limit, target_offset);
            }
        }
        target_offset += op.length();
    }

    let composite = builder.finish(a.source_view_offset(), a.source_view_len());
    debug!(
        "composed window: {} + {} ops -> {} ops, {} ranges indexed",
        a.ops().len(),
        b.ops().len(),
        composite.ops().len(),
        ranges.len()
    );
    composite
}

/// Emit instructions reproducing `a`'s target range `[offset, limit)`,
/// starting at composite target position `target_offset`.
fn copy_source_ops(
    offset: usize,
    limit: usize,
    mut target_offset: usize,
    a: &Window,
    offsets: &OffsetIndex,
    builder: &mut WindowBuilder,
) {
    debug_assert_eq!(builder.target_len(), target_offset);
    let ops = a.ops();
    let mut op_ndx = offsets.search(offset);

    while op_ndx < ops.len() {
        let off0 = offsets.offset(op_ndx);
        let off1 = offsets.offset(op_ndx + 1);
        if off0 >= limit {
            break;
        }

        let op = ops[op_ndx];
        let length = op.length();
        let fix_offset = offset.saturating_sub(off0);
        let fix_limit = off1.saturating_sub(limit);
        debug_assert!(fix_offset + fix_limit < length);
        let want = length - fix_offset - fix_limit;

        match op {
            Instruction::CopyFromSource { offset: o, .. } => {
                builder.copy_source(o + fix_offset, want);
            }
            Instruction::Insert { offset: o, .. } => {
                let start = o + fix_offset;
                builder.insert(&a.new_data()[start..start + want]);
            }
            Instruction::CopyFromTarget { offset: o, .. } => {
                assert!(o < off0, "target copy at {o} does not precede its position {off0}");

                if o + length - fix_limit <= off0 {
                    copy_source_ops(
                        o + fix_offset,
                        o + length - fix_limit,
                        target_offset,
                        a,
                        offsets,
                        builder,
                    );
                } else {
                    // Overlapping copy: the bytes repeat with period
                    // `pattern`.  Emit one period starting at the right
                    // phase, then let a target copy of the composite
                    // repeat it.
                    let pattern = off0 - o;
                    let phase = fix_offset % pattern;
                    let mut fix_off = fix_offset;
                    let mut tgt_off = target_offset;

                    let n = (length - fix_off - fix_limit).min(pattern - phase);
                    copy_source_ops(o + phase, o + phase + n, tgt_off, a, offsets, builder);
                    fix_off += n;
                    tgt_off += n;

                    if phase > 0 && fix_off + fix_limit < length {
                        let n = (length - fix_off - fix_limit).min(phase);
                        copy_source_ops(o, o + n, tgt_off, a, offsets, builder);
                        fix_off += n;
                        tgt_off += n;
                    }

                    if fix_off + fix_limit < length {
                        builder.copy_target(tgt_off - pattern, length - fix_off - fix_limit);
                    }
                }
            }
        }

        target_offset += want;
        op_ndx += 1;
    }
}

// ---------------------------------------------------------------------------
// Window sequences
// ---------------------------------------------------------------------------

/// Concatenate consecutive windows into one.
///
/// The result's target is the windows' targets back to back and its
/// source view is the union of their non-empty source views.
pub fn merge_windows(windows: &[Window]) -> Window {
    let (view_offset, view_end) = windows
        .iter()
        .filter(|w| w.source_view_len() > 0)
        .map(|w| {
            (
                w.source_view_offset(),
                w.source_view_offset() + w.source_view_len() as u64,
            )
        })
        .reduce(|(lo, hi), (o, e)| (lo.min(o), hi.max(e)))
        .unwrap_or((0, 0));

    let total_ops = windows.iter().map(|w| w.ops().len()).sum();
    let total_new = windows.iter().map(|w| w.new_data().len()).sum();
    let mut builder = WindowBuilder::with_capacity(total_ops, total_new);

    for w in windows {
        let source_shift = (w.source_view_offset().saturating_sub(view_offset)) as usize;
        let target_shift = builder.target_len();
        for op in w.ops() {
            match *op {
                Instruction::CopyFromSource { offset, length } => {
                    builder.copy_source(offset + source_shift, length);
                }
                Instruction::CopyFromTarget { offset, length } => {
                    builder.copy_target(offset + target_shift, length);
                }
                Instruction::Insert { offset, length } => {
                    builder.insert(&w.new_data()[offset..offset + length]);
                }
            }
        }
    }

    builder.finish(view_offset, (view_end - view_offset) as usize)
}

/// Compose two window sequences, A (base -> mid) and B (mid -> final).
///
/// Each B window is composed with the A windows whose targets overlap its
/// source view.  B windows that read no source pass through with an
/// empty source view.
pub fn compose_deltas(a: &[Window], b: &[Window]) -> Result<Vec<Window>, ComposeError> {
    // starts[i]: position of A window i's target in the mid text.
    let mut starts = Vec::with_capacity(a.len() + 1);
    let mut pos = 0u64;
    for w in a {
        starts.push(pos);
        pos += w.target_view_len() as u64;
    }
    starts.push(pos);
    let mid_len = pos;

    let mut out = Vec::with_capacity(b.len());
    for (index, bw) in b.iter().enumerate() {
        if bw.source_ops() == 0 {
            out.push(if bw.source_view_len() == 0 {
                bw.clone()
            } else {
                Window::from_trusted_parts(
                    0,
                    0,
                    bw.target_view_len(),
                    bw.ops().to_vec(),
                    bw.new_data().to_vec(),
                )
            });
            continue;
        }

        let view_start = bw.source_view_offset();
        let view_end = view_start + bw.source_view_len() as u64;
        if view_end > mid_len {
            return Err(ComposeError::SourceViewOutOfRange {
                window: index,
                offset: view_start,
                len: bw.source_view_len(),
                available: mid_len,
            });
        }

        // A windows i..j overlap [view_start, view_end).
        let first = starts[..a.len()].partition_point(|&s| s <= view_start) - 1;
        let last = starts[..a.len()].partition_point(|&s| s < view_end) - 1;
        let merged = if first == last {
            a[first].clone()
        } else {
            merge_windows(&a[first..=last])
        };

        let shift = (view_start - starts[first]) as usize;
        let mut rebased = WindowBuilder::with_capacity(bw.ops().len(), bw.new_data().len());
        for op in bw.ops() {
            match *op {
                Instruction::CopyFromSource { offset, length } => {
                    rebased.copy_source(offset + shift, length);
                }
                Instruction::CopyFromTarget { offset, length } => {
                    rebased.copy_target(offset, length);
                }
                Instruction::Insert { offset, length } => {
                    rebased.insert(&bw.new_data()[offset..offset + length]);
                }
            }
        }
        let rebased = rebased.finish(0, merged.target_view_len());

        out.push(compose_windows(&merged, &rebased));
    }

    debug!("composed {} + {} windows -> {}", a.len(), b.len(), out.len());
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_window;
    use crate::hash::{Algorithm, MatcherConfig, matcher_for};

    fn check(a: &Window, b: &Window, base: &[u8], expected: &[u8]) -> Window {
        let ab = compose_windows(a, b);
        assert!(ab.validate().is_ok());
        assert_eq!(ab.source_view_len(), a.source_view_len());
        assert_eq!(ab.target_view_len(), b.target_view_len());
        assert_eq!(apply_window(&ab, base).unwrap(), expected);
        ab
    }

    #[test]
    fn run_length_scenario() {
        let a = Window::insert_only(b"aaaa");
        let mut b = WindowBuilder::new();
        b.copy_source(0, 4);
        b.copy_target(0, 4);
        let b = b.finish(0, 4);
        check(&a, &b, b"", b"aaaaaaaa");
    }

    #[test]
    fn source_free_b_passes_through() {
        let a = Window::insert_only(b"ignored");
        let b = Window::insert_only(b"fresh");
        assert_eq!(compose_windows(&a, &b), b);
    }

    #[test]
    fn source_free_b_takes_a_view() {
        let base = b"0123456789";
        let mid = b"0123";
        let mut a = WindowBuilder::new();
        a.copy_source(6, 4);
        let a = a.finish(100, 10);

        // Reads a view of the mid text but never copies from it.
        let mut b = WindowBuilder::new();
        b.insert(b"new");
        let b = b.finish(0, mid.len());

        let ab = compose_windows(&a, &b);
        assert_eq!(ab.source_view_offset(), 100);
        assert_eq!(ab.source_view_len(), base.len());
        assert_eq!(ab.target_view_len(), 3);
        assert_eq!(apply_window(&ab, base).unwrap(), b"new");
    }

    #[test]
    fn resolves_through_source_and_insert() {
        // A: base "0123456789" -> "34567XYZ"
        let mut a = WindowBuilder::new();
        a.copy_source(3, 5);
        a.insert(b"XYZ");
        let a = a.finish(0, 10);
        // B: mid "34567XYZ" -> "Z67X--"
        let mut b = WindowBuilder::new();
        b.copy_source(7, 1);
        b.copy_source(3, 3);
        b.insert(b"--");
        let b = b.finish(0, 8);
        let ab = check(&a, &b, b"0123456789", b"Z67X--");
        assert_eq!(ab.new_data(), b"ZX--");
    }

    #[test]
    fn repeated_reference_becomes_target_copy() {
        let mut a = WindowBuilder::new();
        a.copy_source(0, 20);
        let a = a.finish(0, 20);
        let mut b = WindowBuilder::new();
        b.copy_source(0, 20);
        b.insert(b"|");
        b.copy_source(5, 10);
        let b = b.finish(0, 20);
        let base: Vec<u8> = (b'a'..=b't').collect();
        let mut expected = base.clone();
        expected.push(b'|');
        expected.extend_from_slice(&base[5..15]);
        let ab = check(&a, &b, &base, &expected);
        assert_eq!(
            ab.ops().last(),
            Some(&Instruction::CopyFromTarget {
                offset: 5,
                length: 10
            })
        );
    }

    #[test]
    fn overlapping_copy_in_a_is_not_unrolled() {
        // A: "" -> "abcabcabcabcabcabc" via insert + overlapping copy.
        let mut a = WindowBuilder::new();
        a.insert(b"abc");
        a.copy_target(0, 15);
        let a = a.finish(0, 0);
        // B reads the mid text from phase 1 for 13 bytes.
        let mut b = WindowBuilder::new();
        b.insert(b">");
        b.copy_source(4, 13);
        let b = b.finish(0, 18);
        let ab = check(&a, &b, b"", b">bcabcabcabcab");
        assert!(ab.ops().len() <= 4, "{:?}", ab.ops());
    }

    #[test]
    fn nested_target_copies() {
        let mut a = WindowBuilder::new();
        a.copy_source(0, 6);
        a.copy_target(2, 3);
        a.insert(b"!");
        a.copy_target(6, 4);
        let a = a.finish(0, 6);
        let base = b"uvwxyz";
        let mid = apply_window(&a, base).unwrap();
        let mut b = WindowBuilder::new();
        b.copy_source(1, mid.len() - 2);
        b.copy_target(0, 3);
        b.copy_source(0, 1);
        let b = b.finish(0, mid.len());
        let target = apply_window(&b, &mid).unwrap();
        check(&a, &b, base, &target);
    }

    #[test]
    fn diffed_chain_composes() {
        let base: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let mut mid = base[1000..3000].to_vec();
        mid.extend_from_slice(b"middle insert");
        mid.extend_from_slice(&base[..500]);
        let mut target = mid[100..1500].to_vec();
        target.extend_from_slice(&mid[..50].repeat(4));
        for algorithm in [Algorithm::Xdelta, Algorithm::Vdelta] {
            let matcher = matcher_for(algorithm, MatcherConfig::default());
            let a = matcher.diff_window(&base, &mid, 0);
            let b = matcher.diff_window(&mid, &target, 0);
            check(&a, &b, &base, &target);
        }
    }

    #[test]
    fn merge_concatenates_targets() {
        let mut w1 = WindowBuilder::new();
        w1.copy_source(0, 3);
        w1.copy_target(0, 2);
        let w1 = w1.finish(10, 3);
        let mut w2 = WindowBuilder::new();
        w2.insert(b"q");
        w2.copy_source(1, 2);
        w2.copy_target(0, 1);
        let w2 = w2.finish(12, 4);
        let merged = merge_windows(&[w1, w2]);
        assert_eq!(merged.source_view_offset(), 10);
        assert_eq!(merged.source_view_len(), 6);
        let base = b"ABCDEF";
        assert_eq!(apply_window(&merged, base).unwrap(), b"ABCABqDEq");
    }

    #[test]
    fn compose_deltas_spans_windows() {
        let a = vec![
            Window::insert_only(b"hello "),
            Window::insert_only(b"world"),
        ];
        let mut b = WindowBuilder::new();
        b.copy_source(0, 5);
        b.insert(b"!");
        let b = vec![b.finish(4, 5), Window::insert_only(b"?")];
        let out = compose_deltas(&a, &b).unwrap();
        assert_eq!(out.len(), 2);
        let mut text = apply_window(&out[0], b"").unwrap();
        text.extend(apply_window(&out[1], b"").unwrap());
        assert_eq!(text, b"o wor!?");
    }

    #[test]
    fn compose_deltas_rejects_short_mid() {
        let a = vec![Window::insert_only(b"abc")];
        let mut b = WindowBuilder::new();
        b.copy_source(0, 4);
        let b = vec![b.finish(0, 4)];
        assert!(matches!(
            compose_deltas(&a, &b),
            Err(ComposeError::SourceViewOutOfRange { available: 3, .. })
        ));
    }
}
