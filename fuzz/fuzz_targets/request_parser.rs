#![no_main]

use libfuzzer_sys::fuzz_target;

use cacheproxy::proxy::http::fuzzing::parse_request_bytes;

fuzz_target!(|data: &[u8]| {
    parse_request_bytes(data);

    // Every prefix of a request is either partial or an error, never a panic.
    if data.len() > 1 {
        parse_request_bytes(&data[..data.len() / 2]);
    }
});
