#![no_main]
use libfuzzer_sys::fuzz_target;
use mobi_xray::{patch_identifier, read_exth, PatchOutcome};

fuzz_target!(|data: &[u8]| {
    let mut buf = data.to_vec();
    match patch_identifier(&mut buf, "B111111111") {
        Ok(PatchOutcome::Unchanged) => assert_eq!(buf, data),
        Ok(_) => {
            let exth = read_exth(&buf).unwrap();
            assert_eq!(exth.identifier(), Some(&b"B111111111"[..]));
        }
        // a failed patch leaves the buffer untouched
        Err(_) => assert_eq!(buf, data),
    }
});
