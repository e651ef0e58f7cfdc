//! Random bearer tokens shared by sessions and share links

use rand::rngs::OsRng;
use rand::RngCore;

/// Raw token length in bytes; the hex form is twice as long
pub const TOKEN_BYTES: usize = 32;

/// Generate a token from the OS random source, as lowercase hex
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Canonical lowercase form of a presented token, or `None` when it is not
/// hex of the right length. Hex digits are accepted in either case.
pub fn normalize_token(token: &str) -> Option<String> {
    let well_formed =
        token.len() == TOKEN_BYTES * 2 && token.bytes().all(|b| b.is_ascii_hexdigit());
    well_formed.then(|| token.to_ascii_lowercase())
}
