//! Provider token encryption using AES-256-GCM
//!
//! Access and refresh tokens returned by the identity provider are stored
//! encrypted at rest. Ciphertexts carry a version byte and are bound to the
//! owning session via additional authenticated data (AAD), so a ciphertext
//! copied onto another session row fails to decrypt.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),
    #[error("invalid ciphertext format")]
    InvalidFormat,
    #[error("empty ciphertext")]
    EmptyCiphertext,
}

/// Secure wrapper for encryption keys with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct ZeroizingKey(Vec<u8>);

/// Type alias for crypto keys
pub type CryptoKey = ZeroizingKey;

impl CryptoKey {
    /// Create a new crypto key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::EncryptionFailed(
                "Invalid key length: expected 32 bytes".to_string(),
            ));
        }
        Ok(ZeroizingKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
pub fn decrypt_bytes(
    key: &CryptoKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::EmptyCiphertext);
    }

    if ciphertext[0] != VERSION_ENCRYPTED || ciphertext.len() < MIN_ENCRYPTED_LEN {
        return Err(CryptoError::InvalidFormat);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    debug_assert!(tag_and_ct.len() >= TAG_LEN);

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
}

/// AAD binding a session's provider tokens to the session row and its owner.
fn session_aad(session_id: Uuid, user_id: Uuid) -> String {
    format!("{}|{}", session_id, user_id)
}

/// Type alias for encrypted token result
type EncryptedTokens = Result<(Option<Vec<u8>>, Option<Vec<u8>>), CryptoError>;

/// Encrypt provider tokens for storage on a session row
pub fn encrypt_session_tokens(
    key: &CryptoKey,
    session_id: Uuid,
    user_id: Uuid,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> EncryptedTokens {
    let aad = session_aad(session_id, user_id);

    let access = access_token
        .map(|token| encrypt_bytes(key, aad.as_bytes(), token.as_bytes()))
        .transpose()?;

    let refresh = refresh_token
        .map(|token| encrypt_bytes(key, aad.as_bytes(), token.as_bytes()))
        .transpose()?;

    Ok((access, refresh))
}

/// Decrypt a single provider token stored on a session row
pub fn decrypt_session_token(
    key: &CryptoKey,
    session_id: Uuid,
    user_id: Uuid,
    ciphertext: &[u8],
) -> Result<String, CryptoError> {
    let aad = session_aad(session_id, user_id);
    let bytes = decrypt_bytes(key, aad.as_bytes(), ciphertext)?;
    String::from_utf8(bytes)
        .map_err(|e| CryptoError::DecryptionFailed(format!("Invalid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CryptoKey {
        CryptoKey::new(vec![0u8; 32]).expect("valid test key")
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let encrypted = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let decrypted = decrypt_bytes(&key, aad, &encrypted).expect("decryption succeeds");

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_different_aad_fails() {
        let key = test_key();
        let plaintext = b"secret message";

        let encrypted = encrypt_bytes(&key, b"aad-1", plaintext).expect("encryption succeeds");
        let result = decrypt_bytes(&key, b"aad-2", &encrypted);

        assert!(result.is_err());
    }

    #[test]
    fn test_modified_ciphertext_fails() {
        let key = test_key();
        let aad = b"test-aad";

        let mut encrypted = encrypt_bytes(&key, aad, b"secret message").expect("encryption succeeds");
        encrypted[13] ^= 0x01;

        let result = decrypt_bytes(&key, aad, &encrypted);
        assert!(result.is_err());
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let aad = b"test-aad";
        let plaintext = b"secret message";

        let encrypted1 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");
        let encrypted2 = encrypt_bytes(&key, aad, plaintext).expect("encryption succeeds");

        // Nonces (bytes 1-13) should be different
        assert_ne!(&encrypted1[1..13], &encrypted2[1..13]);
        assert_eq!(
            decrypt_bytes(&key, aad, &encrypted1).expect("decryption succeeds"),
            plaintext
        );
        assert_eq!(
            decrypt_bytes(&key, aad, &encrypted2).expect("decryption succeeds"),
            plaintext
        );
    }

    #[test]
    fn test_unversioned_payload_rejected() {
        let key = test_key();
        let result = decrypt_bytes(&key, b"test-aad", b"not-a-ciphertext");
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }

    #[test]
    fn test_session_token_binding() {
        let key = test_key();
        let session_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        let (access, refresh) = encrypt_session_tokens(
            &key,
            session_id,
            user_id,
            Some("provider-access"),
            Some("provider-refresh"),
        )
        .expect("encryption succeeds");

        let access = access.expect("access ciphertext present");
        let refresh = refresh.expect("refresh ciphertext present");

        assert_eq!(
            decrypt_session_token(&key, session_id, user_id, &access).expect("decrypts"),
            "provider-access"
        );
        assert_eq!(
            decrypt_session_token(&key, session_id, user_id, &refresh).expect("decrypts"),
            "provider-refresh"
        );

        // A ciphertext moved to another session must not decrypt
        let other_session = Uuid::new_v4();
        assert!(decrypt_session_token(&key, other_session, user_id, &access).is_err());
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(CryptoKey::new(vec![0u8; 16]).is_err());
        assert!(CryptoKey::new(vec![0u8; 64]).is_err());
    }

    #[test]
    fn test_insufficient_ciphertext_length() {
        let key = test_key();
        let short_ciphertext = vec![VERSION_ENCRYPTED, 0x02];

        let result = decrypt_bytes(&key, b"test-aad", &short_ciphertext);
        assert!(matches!(result, Err(CryptoError::InvalidFormat)));
    }
}
