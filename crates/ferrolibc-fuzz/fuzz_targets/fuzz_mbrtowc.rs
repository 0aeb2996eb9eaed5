#![no_main]
use ferrolibc_core::locale::Encoding;
use ferrolibc_core::wchar::{MbError, MbState, decode_bytes, mbrtowc_with};
use libfuzzer_sys::fuzz_target;

// Byte-at-a-time decoding must agree with whole-buffer decoding.
fuzz_target!(|data: &[u8]| {
    let whole = decode_bytes(data, Encoding::Utf8);
    let mut state = MbState::new();
    let mut chars = Vec::new();
    for &b in data {
        match mbrtowc_with(&[b], &mut state, Encoding::Utf8) {
            Ok((0, _)) => break,
            Ok((wc, _)) => chars.push(wc),
            Err(MbError::Incomplete) => {}
            Err(MbError::Invalid) => return,
        }
    }
    if let Ok(whole) = whole
        && state.is_initial()
    {
        assert_eq!(whole, chars);
    }
});
