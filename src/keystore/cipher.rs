//! Secret sealing for persisted credentials
//!
//! Sealed values look like `sealed:<base64>`. The key and nonce are both
//! derived from the configured secret, so no per-value nonce is stored.
//! This keeps already-sealed documents readable across versions; the cost is
//! that every value is sealed under the same nonce.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::aead::{Aead, NewAead};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Prefix marking a sealed value
pub const SEALED_TAG: &str = "sealed:";

pub const NONCE_LEN: usize = 12;

/// Symmetric cipher for keystore values
pub struct SecretCipher {
    cipher: ChaCha20Poly1305,
    nonce: [u8; NONCE_LEN],
}

impl SecretCipher {
    /// Build a cipher from an algorithm identifier and a secret
    pub fn new(algorithm: &str, secret: &str) -> Result<Self> {
        match algorithm {
            "" | "chacha20" | "chacha20-poly1305" | "chacha20poly1305" => {}
            other => return Err(Error::UnsupportedCipher(other.to_string())),
        }

        if secret.is_empty() {
            return Err(Error::Config("keystore secret cannot be empty".into()));
        }

        let key = Sha256::digest(secret.as_bytes());
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));

        Ok(Self {
            cipher,
            nonce: derive_nonce(secret),
        })
    }

    /// Seal raw bytes into a tagged string
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let text = bs58::encode(plaintext).into_string();

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&self.nonce), text.as_bytes())
            .map_err(|e| Error::Encryption(e.to_string()))?;

        Ok(format!("{}{}", SEALED_TAG, STANDARD.encode(ciphertext)))
    }

    /// Open a tagged string back into raw bytes
    pub fn decrypt(&self, sealed: &str) -> Result<Vec<u8>> {
        let body = sealed.strip_prefix(SEALED_TAG).ok_or(Error::UntaggedInput)?;

        let ciphertext = STANDARD
            .decode(body)
            .map_err(|e| Error::Decryption(format!("invalid base64: {}", e)))?;

        let text = self
            .cipher
            .decrypt(Nonce::from_slice(&self.nonce), ciphertext.as_ref())
            .map_err(|_| Error::Decryption("authentication failed (wrong secret?)".into()))?;

        bs58::decode(&text)
            .into_vec()
            .map_err(|e| Error::Decryption(format!("invalid payload encoding: {}", e)))
    }

    /// Whether a stored string carries the sealed tag
    pub fn is_sealed(value: &str) -> bool {
        value.starts_with(SEALED_TAG)
    }
}

fn derive_nonce(secret: &str) -> [u8; NONCE_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(b"nonce:");
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();

    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&digest[..NONCE_LEN]);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new("chacha20-poly1305", "correct horse battery staple").unwrap()
    }

    #[test]
    fn test_round_trip() {
        let cipher = cipher();
        for payload in [
            Vec::new(),
            vec![0u8],
            vec![0u8, 0, 1, 2],
            (0..=255u8).collect::<Vec<_>>(),
            vec![7u8; 64],
        ] {
            let sealed = cipher.encrypt(&payload).unwrap();
            assert!(sealed.starts_with(SEALED_TAG));
            assert_eq!(cipher.decrypt(&sealed).unwrap(), payload);
        }
    }

    #[test]
    fn test_untagged_rejected() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"secret").unwrap();
        let body = sealed.trim_start_matches(SEALED_TAG);

        assert!(matches!(cipher.decrypt(body), Err(Error::UntaggedInput)));
        assert!(matches!(
            cipher.decrypt("5Kd3NBUAdUnhyzenEwVLy9pBKxSwXvE9FMPyR4UKZvpe"),
            Err(Error::UntaggedInput)
        ));
        assert!(matches!(cipher.decrypt(""), Err(Error::UntaggedInput)));
    }

    #[test]
    fn test_wrong_secret_fails() {
        let sealed = cipher().encrypt(b"payload").unwrap();
        let other = SecretCipher::new("chacha20-poly1305", "another secret").unwrap();
        assert!(matches!(other.decrypt(&sealed), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_tampered_value_fails() {
        let cipher = cipher();
        let sealed = cipher.encrypt(b"payload").unwrap();
        let mut bytes = STANDARD.decode(&sealed[SEALED_TAG.len()..]).unwrap();
        bytes[0] ^= 0xff;
        let tampered = format!("{}{}", SEALED_TAG, STANDARD.encode(bytes));

        assert!(matches!(cipher.decrypt(&tampered), Err(Error::Decryption(_))));
        assert!(matches!(cipher.decrypt("sealed:***"), Err(Error::Decryption(_))));
    }

    #[test]
    fn test_deterministic_for_same_secret() {
        let a = cipher().encrypt(b"same").unwrap();
        let b = cipher().encrypt(b"same").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unknown_algorithm() {
        assert!(matches!(
            SecretCipher::new("aes-256-cbc", "s"),
            Err(Error::UnsupportedCipher(_))
        ));
        assert!(SecretCipher::new("chacha20poly1305", "s").is_ok());
        assert!(SecretCipher::new("chacha20-poly1305", "").is_err());
    }
}
