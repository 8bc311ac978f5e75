//! Password verification for PASS, OPER and link passwords.
//!
//! Passwords are stored as argon2 hash strings in the configuration file.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use tokio::task;

fn verify_blocking(hash: &str, password: &str) -> bool {
    let parsed = match PasswordHash::new(hash) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::error!("Bad password hash in configuration: {}", err);
            return false;
        }
    };
    Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
}

/// Checks `password` against a stored argon2 hash string.
///
/// Verification is CPU-bound, so it runs on the blocking thread pool.  Callers must not hold
/// the server state lock across this await point.
pub async fn verify(hash: String, password: String) -> bool {
    task::spawn_blocking(move || verify_blocking(&hash, &password))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::PasswordHasher;
    use argon2::password_hash::{SaltString, rand_core::OsRng};

    fn hash(password: &str) -> String {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default().hash_password(password.as_bytes(), &salt).unwrap().to_string()
    }

    #[test]
    fn test_verify_round_trip() {
        let stored = hash("hunter2");
        assert!(verify_blocking(&stored, "hunter2"));
        assert!(!verify_blocking(&stored, "hunter3"));
        assert!(!verify_blocking(&stored, ""));
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        assert!(!verify_blocking("not a hash", "password"));
        assert!(!verify_blocking("", "password"));
    }
}
