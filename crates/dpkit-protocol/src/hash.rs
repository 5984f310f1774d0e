//! Password and session digests.
//!
//! There is exactly one hashing primitive, [`hex_digest`]. Both the rcon
//! request builder ([`crate::codec::rcon_request`]) and the login-service
//! client derive their tokens from it:
//!
//! ```text
//! secret ──hash_password──→ digest ──hash_session(challenge)──→ token
//! ```
//!
//! The server performs the same two steps with its configured secret and
//! the challenge it issued, then compares tokens. The secret itself never
//! travels on the wire.

use sha2::{Digest, Sha256};

/// Salt appended to secrets before the first hashing round.
pub const PASSWORD_SALT: &str = "DPLogin001";

/// Hashes `input` with SHA-256 and returns the lowercase hex encoding.
pub fn hex_digest(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Turns a plaintext secret into its stored digest.
pub fn hash_password(secret: &str) -> String {
    hex_digest(&format!("{secret}{PASSWORD_SALT}"))
}

/// Binds a password digest to a server-issued challenge (or session id).
pub fn hash_session(digest: &str, challenge: &str) -> String {
    hex_digest(&format!("{digest}{challenge}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_digest_known_vector() {
        assert_eq!(
            hex_digest("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_password_is_salted() {
        assert_ne!(hash_password("hello"), hex_digest("hello"));
        assert_eq!(hash_password("hello"), hex_digest("helloDPLogin001"));
    }

    #[test]
    fn test_hash_session_depends_on_challenge() {
        let digest = hash_password("hello");
        let a = hash_session(&digest, "111");
        let b = hash_session(&digest, "222");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(a, hash_session(&digest, "111"));
    }
}
