use rand::RngCore;

/// Returns a new 16-byte unique identifier as a hex string.
pub fn uid() -> String {
    let mut b = [0u8; 16];
    rand::rng().fill_bytes(&mut b);
    hex::encode(b)
}
