use bytes::Bytes;
use hoard_core::ContentAddress;

/// `len` bytes derived from `seed`; equal seeds give equal bytes.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut state = seed ^ 0x9e37_79b9_7f4a_7c15;
    (0..len)
        .map(|_| {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

/// Key under which the content store keeps `data`.
#[allow(dead_code)]
pub fn content_key(data: &[u8]) -> String {
    ContentAddress::compute(data).object_key()
}
