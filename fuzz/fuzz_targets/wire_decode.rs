#![no_main]

use libfuzzer_sys::fuzz_target;
use pod_complaint::ser::{
    decode_claim, decode_merkle_path, decode_receipt, decode_request, decode_response, encode_claim,
    encode_request, encode_response,
};

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must re-encode to the same bytes.
    if let Ok(req) = decode_request(data) {
        assert_eq!(encode_request(&req), data);
    }
    if let Ok(resp) = decode_response(data) {
        assert_eq!(encode_response(&resp), data);
    }
    if let Ok(claim) = decode_claim(data) {
        assert_eq!(encode_claim(&claim), data);
    }
    let _ = decode_receipt(data);
    let _ = decode_merkle_path(data);
});
