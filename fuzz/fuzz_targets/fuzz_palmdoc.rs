#![no_main]
use libfuzzer_sys::fuzz_target;
use mobi_xray::container::palmdoc;

fuzz_target!(|data: &[u8]| {
    let _ = palmdoc::decompress(data);

    let compressed = palmdoc::compress(data);
    assert_eq!(palmdoc::decompress(&compressed).unwrap(), data);
});
