//! Room Code Generation
//!
//! Short human-shareable identifiers drawn from the 36-symbol
//! uppercase-alphanumeric alphabet. Uniqueness is not checked here;
//! the store's unique constraint rejects collisions and the caller
//! retries generation.

use rand::Rng;

/// Default code length.
pub const DEFAULT_CODE_LENGTH: usize = 6;

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a room code of exactly `length` symbols.
pub fn generate(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Generate a room code of the default length.
pub fn generate_default() -> String {
    generate(DEFAULT_CODE_LENGTH)
}
