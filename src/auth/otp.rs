use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const OTP_DIGITS: usize = 6;

/// Six random digits, zero padded
pub fn generate_otp() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", n, width = OTP_DIGITS)
}

/// OTPs are stored hashed and bound to the user they were issued for
pub fn hash_otp(user_id: Uuid, otp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(otp.trim().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn verify_otp(user_id: Uuid, otp: &str, stored_hash: &str) -> bool {
    let candidate = hash_otp(user_id, otp);
    // Constant-time comparison over equal-length hex digests
    candidate.len() == stored_hash.len()
        && candidate
            .bytes()
            .zip(stored_hash.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Opaque url-safe token with 256 bits of entropy
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
