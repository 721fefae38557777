use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine as _;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::SyncError;

type HmacSha256 = Hmac<Sha256>;

/// Helper to create an HMAC instance, resolving trait ambiguity.
fn new_hmac(key: &[u8]) -> Result<HmacSha256, SyncError> {
    <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| SyncError::Crypto(format!("HMAC init failed: {e}")))
}

/// Derive a 32-byte key from the application secret, separated by purpose.
fn derive_key(secret: &str, purpose: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(purpose.as_bytes());
    hasher.update(b":");
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}

/// AES-256-GCM encryption for stored OAuth tokens and HMAC signing for the
/// OAuth `state` parameter and session cookies.
pub struct CryptoEngine {
    cipher: Aes256Gcm,
    hmac_key: [u8; 32],
}

impl CryptoEngine {
    /// Create a new CryptoEngine from the application `SECRET_KEY`.
    pub fn new(secret_key: &str) -> Result<Self, SyncError> {
        if secret_key.is_empty() {
            return Err(SyncError::Crypto("SECRET_KEY must not be empty".into()));
        }

        let cipher = Aes256Gcm::new_from_slice(&derive_key(secret_key, "token-encryption"))
            .map_err(|e| SyncError::Crypto(format!("Failed to init AES cipher: {e}")))?;

        Ok(Self {
            cipher,
            hmac_key: derive_key(secret_key, "signing"),
        })
    }

    /// Encrypt plaintext using AES-256-GCM. Returns base64(nonce || ciphertext).
    pub fn encrypt(&self, plaintext: &str) -> Result<String, SyncError> {
        let mut nonce_bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| SyncError::Crypto(format!("Encryption failed: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    /// Decrypt base64(nonce || ciphertext) back to plaintext.
    pub fn decrypt(&self, encrypted_b64: &str) -> Result<String, SyncError> {
        let combined = base64::engine::general_purpose::STANDARD
            .decode(encrypted_b64)
            .map_err(|e| SyncError::Crypto(format!("Invalid base64: {e}")))?;

        if combined.len() < 12 {
            return Err(SyncError::Crypto("Ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SyncError::Crypto(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| SyncError::Crypto(format!("Invalid UTF-8 after decrypt: {e}")))
    }

    /// Sign a payload with HMAC-SHA256. Returns base64url(hmac || payload).
    pub fn sign(&self, payload: &str) -> Result<String, SyncError> {
        let mut mac = new_hmac(&self.hmac_key)?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        let mut combined = signature.to_vec();
        combined.extend_from_slice(payload.as_bytes());

        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&combined))
    }

    /// Verify and extract a signed payload.
    pub fn verify(&self, signed: &str) -> Result<String, SyncError> {
        let combined = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(signed)
            .map_err(|_| SyncError::InvalidState)?;

        if combined.len() < 32 {
            return Err(SyncError::InvalidState);
        }

        let (signature, payload_bytes) = combined.split_at(32);

        let mut mac = new_hmac(&self.hmac_key)?;
        mac.update(payload_bytes);
        mac.verify_slice(signature)
            .map_err(|_| SyncError::InvalidState)?;

        String::from_utf8(payload_bytes.to_vec()).map_err(|_| SyncError::InvalidState)
    }
}
