#![no_main]

use libfuzzer_sys::fuzz_target;
use murmur_protocol::{decode, decode_header, encode, HEADER_LEN};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the decoder.
    let _ = decode_header(data);

    if let Ok(Some((packet, consumed))) = decode(data) {
        assert!(consumed >= HEADER_LEN && consumed <= data.len());

        // Anything that decodes re-encodes to the exact bytes it came from.
        let frame = encode(&packet).expect("decoded packet must re-encode");
        assert_eq!(&frame[..], &data[..consumed]);
    }
});
