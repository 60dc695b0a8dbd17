#![no_main]
use libfuzzer_sys::fuzz_target;
use svndelta::engine;
use svndelta::svndiff::SvndiffVersion;

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // Split into base, mid and final texts and check that the composed
    // delta reproduces the final text straight from the base.
    let third = data.len() / 3;
    let (base, rest) = data.split_at(third);
    let (mid, fin) = rest.split_at(third);

    let mut a = Vec::new();
    engine::encode(base, mid, &mut a).unwrap();
    let mut b = Vec::new();
    engine::encode(mid, fin, &mut b).unwrap();

    let ab = engine::compose(&a, &b, SvndiffVersion::V0).unwrap();
    assert_eq!(engine::decode(base, &ab).unwrap(), fin);
});
