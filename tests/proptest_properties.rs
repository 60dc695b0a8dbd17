use proptest::prelude::*;
use svndelta::apply::apply_window;
use svndelta::compose::{compose_deltas, compose_windows};
use svndelta::engine::{self, EncodeOptions};
use svndelta::hash::{Algorithm, MatcherConfig, matcher_for};
use svndelta::stream::StreamConfig;
use svndelta::svndiff::varint;
use svndelta::svndiff::{SvndiffVersion, decode_all, encode_all};

fn algorithm() -> impl Strategy<Value = Algorithm> {
    prop_oneof![Just(Algorithm::Xdelta), Just(Algorithm::Vdelta)]
}

/// Bytes drawn from a small alphabet so that matches are common.
fn text(max: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'c'), any::<u8>()], 0..max)
}

fn encode(source: &[u8], target: &[u8], window_size: usize, algorithm: Algorithm) -> Vec<u8> {
    let opts = EncodeOptions {
        stream: StreamConfig {
            window_size,
            algorithm,
            ..StreamConfig::default()
        },
        ..EncodeOptions::default()
    };
    let mut out = Vec::new();
    engine::encode_with_options(source, target, &mut out, &opts).unwrap();
    out
}

proptest! {
    #[test]
    fn prop_varint_roundtrip(value in any::<u64>()) {
        let bytes = varint::encode(value);
        prop_assert_eq!(bytes.len(), varint::sizeof_u64(value));
        prop_assert_eq!(varint::decode(&bytes, 0).unwrap(), (value, bytes.len()));
    }

    #[test]
    fn prop_encode_decode_roundtrip(
        source in text(4096),
        target in text(4096),
        window_size in 16usize..2048,
        algorithm in algorithm(),
    ) {
        let delta = encode(&source, &target, window_size, algorithm);
        let decoded = engine::decode(&source, &delta).unwrap();
        prop_assert_eq!(decoded, target);
    }

    #[test]
    fn prop_reencoding_is_byte_identical(
        source in text(2048),
        target in text(2048),
        algorithm in algorithm(),
    ) {
        let delta = encode(&source, &target, 512, algorithm);
        let (version, windows) = decode_all(&delta).unwrap();
        prop_assert_eq!(encode_all(&windows, version).unwrap(), delta);
    }

    #[test]
    fn prop_instructions_are_nonempty_and_fill_target(
        source in text(2048),
        target in text(2048),
        algorithm in algorithm(),
    ) {
        let window = matcher_for(algorithm, MatcherConfig::default()).diff_window(&source, &target, 0);
        prop_assert!(window.ops().iter().all(|op| op.length() > 0));
        let total: usize = window.ops().iter().map(|op| op.length()).sum();
        prop_assert_eq!(total, target.len());
        prop_assert!(window.validate().is_ok());
    }

    #[test]
    fn prop_compose_windows_is_correct(
        base in text(1024),
        mid in text(1024),
        target in text(1024),
        first in algorithm(),
        second in algorithm(),
    ) {
        let a = matcher_for(first, MatcherConfig::default()).diff_window(&base, &mid, 0);
        let b = matcher_for(second, MatcherConfig::default()).diff_window(&mid, &target, 0);
        let ab = compose_windows(&a, &b);
        prop_assert_eq!(apply_window(&ab, &base).unwrap(), target);
    }

    #[test]
    fn prop_compose_deltas_is_correct(
        base in text(3000),
        mid in text(3000),
        target in text(3000),
        window_size in 64usize..1024,
    ) {
        let ab = encode(&base, &mid, window_size, Algorithm::Vdelta);
        let bc = encode(&mid, &target, window_size, Algorithm::Xdelta);
        let (_, a) = decode_all(&ab).unwrap();
        let (_, b) = decode_all(&bc).unwrap();
        let windows = compose_deltas(&a, &b).unwrap();
        let ac = encode_all(&windows, SvndiffVersion::V0).unwrap();
        prop_assert_eq!(engine::decode(&base, &ac).unwrap(), target);
    }

    #[test]
    fn prop_identical_data_is_highly_compressible(
        source in proptest::collection::vec(any::<u8>(), 256..8192),
    ) {
        let delta = encode(&source, &source, 102_400, Algorithm::Xdelta);
        prop_assert!(delta.len() < 32, "delta={} target={}", delta.len(), source.len());
    }
}

#[test]
#[ignore = "performance properties are workload and machine dependent"]
fn perf_property_decode_not_pathological() {
    use std::time::Instant;
    let make = |n: usize| -> Vec<u8> { (0..n).map(|i| (i % 251) as u8).collect() };
    let source = make(4 * 1024 * 1024);
    let mut target = source.clone();
    for i in (0..target.len()).step_by(4096) {
        target[i] = target[i].wrapping_add(3);
    }

    let delta = encode(&source, &target, 102_400, Algorithm::Xdelta);
    let t0 = Instant::now();
    let decoded = engine::decode(&source, &delta).unwrap();
    let dt = t0.elapsed();
    assert_eq!(decoded, target);
    assert!(dt.as_secs_f64() < 20.0, "decode took {:?}", dt);
}
