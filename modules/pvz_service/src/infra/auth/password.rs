use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::domain::ports::PasswordHasher;

const SALT_LEN: usize = 16;

/// Salted SHA-256, stored as `hex(salt)$hex(digest)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256PasswordHasher;

fn digest(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

impl PasswordHasher for Sha256PasswordHasher {
    fn hash(&self, password: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        rand::rng().fill_bytes(&mut salt);
        format!(
            "{}${}",
            hex::encode(salt),
            hex::encode(digest(&salt, password))
        )
    }

    fn verify(&self, password: &str, stored: &str) -> bool {
        let Some((salt_hex, digest_hex)) = stored.split_once('$') else {
            return false;
        };
        let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
            return false;
        };
        digest(&salt, password).ct_eq(expected.as_slice()).into()
    }
}
