#![no_main]
use libfuzzer_sys::fuzz_target;
use svndelta::engine::{self, EncodeOptions};
use svndelta::hash::Algorithm;
use svndelta::stream::StreamConfig;
use svndelta::svndiff::SvndiffVersion;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte selects version, matcher and window size.
    let flags = data[0];
    let payload = &data[1..];
    let version = match flags % 3 {
        0 => SvndiffVersion::V0,
        1 => SvndiffVersion::V1,
        _ => SvndiffVersion::V2,
    };
    let algorithm = if flags & 0x04 != 0 {
        Algorithm::Vdelta
    } else {
        Algorithm::Xdelta
    };
    let opts = EncodeOptions {
        version,
        stream: StreamConfig {
            window_size: 64 + (flags as usize >> 3) * 32,
            algorithm,
            ..StreamConfig::default()
        },
        ..EncodeOptions::default()
    };

    let split = payload.len() / 2;
    let (source, target) = payload.split_at(split);

    let mut delta = Vec::new();
    engine::encode_with_options(source, target, &mut delta, &opts).unwrap();
    let decoded = engine::decode(source, &delta).unwrap();
    assert_eq!(decoded, target);
});
