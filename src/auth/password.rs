use rand::{distributions::Alphanumeric, Rng};
use sha2::{Digest, Sha256};

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const INVALID_PASSWORD_MESSAGE: &str = "The Password must be at least 8 characters long.";

/// Random alphanumeric string of `len` characters
pub fn random_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub fn generate_salt() -> String {
    random_string(16)
}

/// Opaque 40 character token used for API tokens and one-time links
pub fn generate_token() -> String {
    random_string(40)
}

/// Hex encoded SHA-256 of the password followed by its salt
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn is_valid_password(password: &str) -> bool {
    !password.trim().is_empty() && password.chars().count() >= MIN_PASSWORD_LENGTH
}
