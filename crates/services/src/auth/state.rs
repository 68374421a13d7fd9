use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use thiserror::Error;

use super::ports::{AuthError, AuthProperties, StateDataFormat};

const NONCE_SIZE: usize = 12; // 96 bits for GCM
const KEY_SIZE: usize = 32;
const CORRELATION_BYTES: usize = 32;

/// Bound into every sealed state so tokens from other purposes never open here
const STATE_PURPOSE: &[u8] = b"portal-auth/state/v1";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid state key length: expected 32 bytes (256 bits), got {0}")]
    InvalidKeyLength(usize),
    #[error("Invalid state key encoding: {0}")]
    InvalidKeyEncoding(String),
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("Decryption failed")]
    DecryptionFailed,
    #[error("Invalid state: too short to contain nonce")]
    InvalidCiphertext,
    #[error("State payload is not valid: {0}")]
    InvalidPayload(String),
}

impl From<StateError> for AuthError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::InvalidKeyLength(_) | StateError::InvalidKeyEncoding(_) => {
                AuthError::Configuration(e.to_string())
            }
            other => AuthError::StateEncodeFailure(other.to_string()),
        }
    }
}

/// Random CSRF correlation value: 256 bits, base64url without padding (43 chars)
pub fn generate_correlation_id() -> String {
    let mut bytes = [0u8; CORRELATION_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// AES-256-GCM protected state.
///
/// Layout before base64url encoding: `nonce (12 bytes) || ciphertext || tag`.
/// The plaintext is the JSON form of the properties.
pub struct EncryptedStateFormat {
    cipher: Aes256Gcm,
}

impl EncryptedStateFormat {
    pub fn new(key: &[u8]) -> Result<Self, StateError> {
        if key.len() != KEY_SIZE {
            return Err(StateError::InvalidKeyLength(key.len()));
        }
        let key = Key::<Aes256Gcm>::from_slice(key);
        Ok(Self {
            cipher: Aes256Gcm::new(key),
        })
    }

    /// Key given as 64 hex characters
    pub fn from_hex(key: &str) -> Result<Self, StateError> {
        let key_bytes =
            hex::decode(key.trim()).map_err(|e| StateError::InvalidKeyEncoding(e.to_string()))?;
        Self::new(&key_bytes)
    }

    /// Fresh random key; states do not survive a restart
    pub fn generate() -> Self {
        Self {
            cipher: Aes256Gcm::new(&Aes256Gcm::generate_key(&mut OsRng)),
        }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, StateError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: STATE_PURPOSE,
                },
            )
            .map_err(|e| StateError::EncryptionFailed(e.to_string()))?;

        // Prepend nonce to ciphertext
        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, StateError> {
        if sealed.len() < NONCE_SIZE {
            return Err(StateError::InvalidCiphertext);
        }

        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: STATE_PURPOSE,
                },
            )
            .map_err(|_| StateError::DecryptionFailed)
    }

    fn decode(&self, protected: &str) -> Result<AuthProperties, StateError> {
        let sealed = URL_SAFE_NO_PAD
            .decode(protected)
            .map_err(|e| StateError::InvalidPayload(e.to_string()))?;
        let plaintext = self.open(&sealed)?;
        serde_json::from_slice(&plaintext).map_err(|e| StateError::InvalidPayload(e.to_string()))
    }
}

impl StateDataFormat for EncryptedStateFormat {
    fn protect(&self, properties: &AuthProperties) -> Result<String, AuthError> {
        let plaintext = serde_json::to_vec(properties)
            .map_err(|e| AuthError::StateEncodeFailure(e.to_string()))?;
        let sealed = self.seal(&plaintext)?;
        Ok(URL_SAFE_NO_PAD.encode(sealed))
    }

    fn unprotect(&self, protected: &str) -> Option<AuthProperties> {
        match self.decode(protected) {
            Ok(properties) => Some(properties),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected callback state");
                None
            }
        }
    }
}
