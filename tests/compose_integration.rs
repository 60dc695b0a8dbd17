// Integration tests for delta composition.
//
// Composition must satisfy
//   apply(compose(diff(base, mid), diff(mid, target)), base) == target
// for single windows, window sequences, and encoded svndiff streams.

use svndelta::apply::{ApplyStream, apply_window};
use svndelta::compose::{ComposeError, compose_deltas, compose_windows};
use svndelta::engine::{self, EncodeOptions};
use svndelta::hash::{Algorithm, MatcherConfig, matcher_for};
use svndelta::stream::StreamConfig;
use svndelta::svndiff::{SvndiffVersion, decode_all};
use svndelta::window::{Instruction, Window, WindowBuilder};

// ===========================================================================
// Helpers
// ===========================================================================

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    (0..size)
        .map(|_| {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
            (s >> 33) as u8
        })
        .collect()
}

fn apply_all(windows: &[Window], base: &[u8]) -> Vec<u8> {
    let mut stream = ApplyStream::new(base, Vec::new());
    for w in windows {
        stream.apply(w).unwrap();
    }
    stream.finish().unwrap().0
}

fn windows_for(source: &[u8], target: &[u8], window_size: usize, algorithm: Algorithm) -> Vec<Window> {
    let opts = EncodeOptions {
        stream: StreamConfig {
            window_size,
            algorithm,
            ..StreamConfig::default()
        },
        ..EncodeOptions::default()
    };
    let mut delta = Vec::new();
    engine::encode_with_options(source, target, &mut delta, &opts).unwrap();
    decode_all(&delta).unwrap().1
}

// ===========================================================================
// Single windows
// ===========================================================================

#[test]
fn run_length_expansion_through_composition() {
    let a = Window::insert_only(b"aaaa");
    let mut b = WindowBuilder::new();
    b.copy_source(0, 4);
    b.copy_target(0, 4);
    let b = b.finish(0, 4);

    let ab = compose_windows(&a, &b);
    assert_eq!(ab.source_view_len(), 0);
    assert_eq!(apply_window(&ab, b"").unwrap(), b"aaaaaaaa");
}

#[test]
fn b_target_copy_straddles_resolved_chain() {
    // mid = "xy" repeated by an overlapping copy, then a source slice.
    let mut a = WindowBuilder::new();
    a.insert(b"xy");
    a.copy_target(0, 9);
    a.copy_source(2, 6);
    let a = a.finish(0, 10);
    let base = b"0123456789";
    let mid = apply_window(&a, base).unwrap();
    assert_eq!(mid, b"xyxyxyxyxyx234567");

    // B reads across the boundary, then copies its own output back.
    let mut b = WindowBuilder::new();
    b.copy_source(7, 8);
    b.copy_target(2, 10);
    b.copy_source(1, 3);
    let b = b.finish(0, mid.len());
    let target = apply_window(&b, &mid).unwrap();

    let ab = compose_windows(&a, &b);
    assert!(ab.validate().is_ok());
    assert_eq!(apply_window(&ab, base).unwrap(), target);
}

#[test]
fn b_without_source_ops_is_unchanged() {
    let a = Window::insert_only(b"irrelevant");
    let mut b = WindowBuilder::new();
    b.insert(b"ab");
    b.copy_target(0, 6);
    let b = b.finish(0, 0);
    assert_eq!(compose_windows(&a, &b), b);
}

#[test]
fn diffed_b_with_no_shared_bytes_reads_base() {
    // diff(mid, target) keeps a view of all of mid even when nothing in
    // target comes from it; the composite must read base instead.
    let base = gen_data(900, 7);
    let mid = gen_data(300, 8);
    let target = b"\x00\x01\x02completely unrelated".to_vec();
    for (first, second) in [
        (Algorithm::Xdelta, Algorithm::Xdelta),
        (Algorithm::Vdelta, Algorithm::Vdelta),
    ] {
        let a = matcher_for(first, MatcherConfig::default()).diff_window(&base, &mid, 0);
        let b = matcher_for(second, MatcherConfig::default()).diff_window(&mid, &target, 0);
        assert_eq!(b.source_ops(), 0);
        assert_eq!(b.source_view_len(), mid.len());

        let ab = compose_windows(&a, &b);
        assert_eq!(ab.source_view_offset(), a.source_view_offset());
        assert_eq!(ab.source_view_len(), base.len());
        assert_eq!(apply_window(&ab, &base).unwrap(), target);
    }
}

#[test]
fn composing_many_random_edits() {
    for seed in 0..8u64 {
        let base = gen_data(2000, seed);
        let mut mid = base[300..1700].to_vec();
        mid.extend_from_slice(&gen_data(100, seed + 100));
        mid.extend_from_slice(&base[..400]);
        let mut target = mid.clone();
        target.extend_from_slice(&mid[..700]);
        target.drain(50..90);

        for algorithm in [Algorithm::Xdelta, Algorithm::Vdelta] {
            let matcher = matcher_for(algorithm, MatcherConfig::default());
            let a = matcher.diff_window(&base, &mid, 0);
            let b = matcher.diff_window(&mid, &target, 0);
            let ab = compose_windows(&a, &b);
            assert_eq!(
                apply_window(&ab, &base).unwrap(),
                target,
                "seed {seed}, {}",
                algorithm.name()
            );
        }
    }
}

// ===========================================================================
// Window sequences
// ===========================================================================

#[test]
fn composed_sequences_apply_in_order() {
    let base = gen_data(40_000, 1);
    let mut mid = base.clone();
    mid.splice(10_000..10_000, gen_data(3000, 2));
    mid.drain(25_000..27_000);
    let mut target = mid[5000..].to_vec();
    target.extend_from_slice(&mid[..5000]);

    for algorithm in [Algorithm::Xdelta, Algorithm::Vdelta] {
        let a = windows_for(&base, &mid, 4096, algorithm);
        let b = windows_for(&mid, &target, 4096, algorithm);
        assert!(a.len() > 1 && b.len() > 1);
        let ab = compose_deltas(&a, &b).unwrap();
        assert_eq!(ab.len(), b.len());
        assert_eq!(apply_all(&ab, &base), target, "{}", algorithm.name());
    }
}

#[test]
fn composed_views_stay_monotonic() {
    let base = gen_data(20_000, 9);
    let mid = base.clone();
    let target = mid.clone();
    let a = windows_for(&base, &mid, 2048, Algorithm::Xdelta);
    let b = windows_for(&mid, &target, 2048, Algorithm::Xdelta);
    let ab = compose_deltas(&a, &b).unwrap();

    let mut last = (0u64, 0u64);
    for w in ab.iter().filter(|w| w.source_view_len() > 0) {
        let view = (w.source_view_offset(), w.source_view_offset() + w.source_view_len() as u64);
        assert!(view.0 >= last.0 && view.1 >= last.1, "{view:?} after {last:?}");
        last = view;
    }
    assert_eq!(apply_all(&ab, &base), target);
}

#[test]
fn insert_only_b_windows_drop_their_view() {
    let a = vec![Window::insert_only(b"mid text")];
    let b = Window::from_parts(
        3,
        4,
        5,
        vec![Instruction::Insert {
            offset: 0,
            length: 5,
        }],
        b"fresh".to_vec(),
    )
    .unwrap();
    let ab = compose_deltas(&a, &[b]).unwrap();
    assert_eq!(ab[0].source_view_len(), 0);
    assert_eq!(apply_window(&ab[0], b"").unwrap(), b"fresh");
}

#[test]
fn view_past_intermediate_text_is_rejected() {
    let a = vec![Window::insert_only(b"short")];
    let mut b = WindowBuilder::new();
    b.copy_source(0, 3);
    let b = vec![b.finish(4, 3)];
    assert_eq!(
        compose_deltas(&a, &b),
        Err(ComposeError::SourceViewOutOfRange {
            window: 0,
            offset: 4,
            len: 3,
            available: 5,
        })
    );
}

// ===========================================================================
// Encoded streams
// ===========================================================================

#[test]
fn engine_compose_matches_direct_decode() {
    let base = gen_data(250_000, 3);
    let mut mid = base.clone();
    for i in (0..mid.len()).step_by(10_000) {
        mid[i] ^= 0xA5;
    }
    let mut target = mid.clone();
    target.splice(120_000..120_000, b"in the middle".iter().copied());

    let mut ab = Vec::new();
    engine::encode(&base, &mid, &mut ab).unwrap();
    let mut bc = Vec::new();
    engine::encode(&mid, &target, &mut bc).unwrap();

    for version in [SvndiffVersion::V0, SvndiffVersion::V1] {
        if version == SvndiffVersion::V1 && !cfg!(feature = "zlib") {
            continue;
        }
        let ac = engine::compose(&ab, &bc, version).unwrap();
        assert_eq!(engine::decode(&base, &ac).unwrap(), target);
    }
}
