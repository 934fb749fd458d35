//! `mysql_native_password` scramble generation/verification (§4.2).
//! Grounded on the teacher's `protocol/auth.rs` SHA1 double-hash scheme.
//! The gateway has no user directory in scope (§1 Non-goals), so the
//! session layer trusts any syntactically valid response; this module
//! exists so that invariant is a deliberate choice, not an unimplemented
//! one, and so a real user store can be wired in later without touching
//! the wire layer.

use rand::RngCore;
use sha1::{Digest, Sha1};

pub const SALT_LEN: usize = 20;

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    // NUL bytes in the salt would truncate it when the client reads it as
    // a C string during negotiation.
    for b in salt.iter_mut() {
        if *b == 0 {
            *b = 0x41;
        }
    }
    salt
}

/// `SHA1(password)` XOR `SHA1(salt + SHA1(SHA1(password)))`, the value a
/// conforming client sends as its auth response.
pub fn scramble(password: &[u8], salt: &[u8; SALT_LEN]) -> [u8; SALT_LEN] {
    let hash1 = Sha1::digest(password);
    let hash2 = Sha1::digest(hash1);
    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(hash2);
    let token = hasher.finalize();

    let mut out = [0u8; SALT_LEN];
    for i in 0..SALT_LEN {
        out[i] = hash1[i] ^ token[i];
    }
    out
}

/// Verifies a client's scrambled response against a stored `SHA1(SHA1(password))`.
pub fn verify(response: &[u8], salt: &[u8; SALT_LEN], stored_double_hash: &[u8]) -> bool {
    if response.len() != SALT_LEN || stored_double_hash.len() != SALT_LEN {
        return false;
    }
    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(stored_double_hash);
    let token = hasher.finalize();

    let mut hash1 = [0u8; SALT_LEN];
    for i in 0..SALT_LEN {
        hash1[i] = response[i] ^ token[i];
    }
    Sha1::digest(hash1).as_slice() == stored_double_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scramble_then_verify_round_trips() {
        let salt = generate_salt();
        let password = b"hunter2";
        let stored_double_hash = Sha1::digest(Sha1::digest(password));
        let response = scramble(password, &salt);
        assert!(verify(&response, &salt, &stored_double_hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let salt = generate_salt();
        let stored_double_hash = Sha1::digest(Sha1::digest(b"correct"));
        let response = scramble(b"wrong", &salt);
        assert!(!verify(&response, &salt, &stored_double_hash));
    }

    #[test]
    fn generated_salt_has_no_nul_bytes() {
        let salt = generate_salt();
        assert!(!salt.contains(&0));
    }
}
