//! Session file encryption
//!
//! AES-256-GCM with a key derived from a password via PBKDF2-HMAC-SHA256.
//! Tokens are URL-safe base64 of `version || nonce || ciphertext`.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Key, Nonce,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

pub const KDF_SALT: &[u8] = b"instagram_downloader_salt_v1";
pub const KDF_ITERATIONS: u32 = 100_000;
pub const ENCRYPTION_KEY_ENV: &str = "SESSION_ENCRYPTION_KEY";

const TOKEN_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;

/// Derived key material, wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
struct SessionKey([u8; 32]);

/// Symmetric encryption for session blobs.
pub struct SessionEncryption {
    key: SessionKey,
}

impl SessionEncryption {
    /// Derive the key from `password`, or from the fallback passphrase when
    /// none is given (see [`fallback_passphrase`]).
    pub fn new(password: Option<&str>) -> Self {
        let passphrase = match password {
            Some(p) => p.to_string(),
            None => fallback_passphrase(),
        };
        Self {
            key: derive_key(&passphrase),
        }
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<String> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key.0));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(&nonce, data)
            .map_err(|_| Error::CryptoError("encryption failed".into()))?;

        let mut token = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| Error::CryptoError(format!("malformed token: {}", e)))?;

        if raw.len() < 1 + NONCE_LEN {
            return Err(Error::CryptoError("token too short".into()));
        }
        if raw[0] != TOKEN_VERSION {
            return Err(Error::CryptoError(format!(
                "unsupported token version {}",
                raw[0]
            )));
        }

        let (nonce, ciphertext) = raw[1..].split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key.0));

        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::CryptoError("decryption failed (wrong key?)".into()))
    }
}

/// Passphrase used when the user gives none: `SESSION_ENCRYPTION_KEY` if set,
/// otherwise one derived from the system user name.
pub fn fallback_passphrase() -> String {
    if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
        if !key.trim().is_empty() {
            return key;
        }
    }

    let system_user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "default".to_string());
    format!("ig_downloader_{}_secret", system_user)
}

fn derive_key(passphrase: &str) -> SessionKey {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), KDF_SALT, KDF_ITERATIONS, &mut key);
    SessionKey(key)
}
