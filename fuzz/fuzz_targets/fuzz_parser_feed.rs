#![no_main]

use libfuzzer_sys::fuzz_target;
use murmur_protocol::BufferParser;

fuzz_target!(|data: &[u8]| {
    // First byte picks the chunk size; the rest is the stream.
    let Some((&chunk, stream)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(chunk).max(1);

    let mut whole = BufferParser::new();
    let mut whole_out = Vec::new();
    let whole_result = whole.feed(stream, &mut whole_out);

    let mut chunked = BufferParser::new();
    let mut chunked_out = Vec::new();
    let mut chunked_result = Ok(());
    for piece in stream.chunks(chunk) {
        chunked_result = chunked.feed(piece, &mut chunked_out);
        if chunked_result.is_err() {
            break;
        }
    }

    // Chunking never changes what a valid stream decodes to.
    if whole_result.is_ok() && chunked_result.is_ok() {
        assert_eq!(whole_out, chunked_out);
        assert_eq!(whole.buffered(), chunked.buffered());
    }
});
