#![no_main]
use libfuzzer_sys::fuzz_target;
use svndelta::engine;
use svndelta::svndiff::decoder;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors, never panics.
    let _ = decoder::decode_all(data);
    let _ = engine::decode(&[], data);

    if data.len() >= 2 {
        let split = data.len() / 2;
        let (source, delta) = data.split_at(split);
        let _ = engine::decode(source, delta);
    }
});
