#![no_main]
use libfuzzer_sys::fuzz_target;
use mobi_xray::{Codec, MobiFile, ParagraphIndexer};

fuzz_target!(|data: &[u8]| {
    let Ok(file) = MobiFile::from_slice(data) else {
        return;
    };

    let _title = file.title();
    let Ok(text) = file.text() else {
        return;
    };

    // offsets must stay strictly increasing whatever the bytes
    for codec in [Codec::Utf8, Codec::Windows1252] {
        for paragraph in ParagraphIndexer::new().index(text.markup(), codec, 0) {
            assert!(paragraph.offsets().windows(2).all(|w| w[0] < w[1]));
            assert_eq!(paragraph.offsets().len(), paragraph.widths().len());
        }
    }
});
