//! `mysql_native_password` challenge/response.
//!
//! ```text
//! stage1    = SHA1(password)
//! stage2    = SHA1(stage1)
//! candidate = SHA1(scramble + stage2)
//! response  = candidate XOR stage1
//! ```

use sha1::{Digest, Sha1};

use super::packet::SCRAMBLE_LEN;

/// Computes the response a client sends for `password` and `scramble`.
pub fn scramble_password(password: &str, scramble: &[u8]) -> [u8; SCRAMBLE_LEN] {
    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1);

    let mut hasher = Sha1::new();
    hasher.update(scramble);
    hasher.update(stage2);
    let candidate = hasher.finalize();

    let mut response = [0u8; SCRAMBLE_LEN];
    for (out, (a, b)) in response.iter_mut().zip(candidate.iter().zip(stage1.iter())) {
        *out = a ^ b;
    }
    response
}

/// Checks a client's auth response against the configured password.
///
/// Anything other than a 20-byte response, or a scramble shorter than 20
/// bytes, is a mismatch. Only the first 20 scramble bytes take part.
pub fn verify_native_password(auth_response: &[u8], password: &str, scramble: &[u8]) -> bool {
    if auth_response.len() != SCRAMBLE_LEN || scramble.len() < SCRAMBLE_LEN {
        return false;
    }

    let expected = scramble_password(password, &scramble[..SCRAMBLE_LEN]);
    expected
        .iter()
        .zip(auth_response)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
