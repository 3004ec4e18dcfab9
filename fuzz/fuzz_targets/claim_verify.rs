#![no_main]

use libfuzzer_sys::fuzz_target;
use pod_complaint::{
    ser::{decode_claim, decode_receipt},
    verify_claim_detailed, Secret,
};

fuzz_target!(|data: &[u8]| {
    // s (1 byte) || secret (32) || receipt (72) || claim
    if data.len() < 1 + 32 + 72 {
        return;
    }
    let s = u64::from(data[0]);
    let mut seed0 = [0u8; 32];
    seed0.copy_from_slice(&data[1..33]);
    let Ok(receipt) = decode_receipt(&data[33..105]) else { return };
    let Ok(claim) = decode_claim(&data[105..]) else { return };
    // Arbitrary claims must be judged without panicking.
    let _ = verify_claim_detailed(s, &receipt, &Secret { seed0 }, &claim);
});
