//! Password encryption shared with the management service
//!
//! Device passwords are stored AES-256-CBC encrypted and base64 encoded, keyed
//! by the SHA-256 of the thing id.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV: [u8; 16] = *b"39cd5f7b63ed1ff8";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CryptoError {
    #[error("ciphertext is not valid base64")]
    Encoding,

    #[error("bad decrypt")]
    Padding,

    #[error("plaintext is not valid utf-8")]
    Utf8,
}

/// Encrypt `text` with a key derived from `password`
pub fn aes_encrypt(text: &str, password: &str) -> String {
    let key = Sha256::digest(password.as_bytes());
    let cipher = Aes256CbcEnc::new(&key, &IV.into());
    let encrypted = cipher.encrypt_padded_vec_mut::<Pkcs7>(text.as_bytes());
    BASE64_STANDARD.encode(encrypted)
}

/// Decrypt base64 `data` with a key derived from `password`
pub fn aes_decrypt(data: &str, password: &str) -> Result<String, CryptoError> {
    let raw = BASE64_STANDARD
        .decode(data.trim())
        .map_err(|_| CryptoError::Encoding)?;
    let key = Sha256::digest(password.as_bytes());
    let cipher = Aes256CbcDec::new(&key, &IV.into());
    let plain = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&raw)
        .map_err(|_| CryptoError::Padding)?;
    String::from_utf8(plain).map_err(|_| CryptoError::Utf8)
}

/// Decrypt a device password keyed by its thing id, treating the input as
/// plaintext when it does not decrypt
pub fn decrypt_or_plaintext(secret: &SecretString, thing_id: &str) -> SecretString {
    match aes_decrypt(secret.expose_secret(), thing_id) {
        Ok(plain) => SecretString::from(plain),
        Err(e) => {
            debug!("password for thing {} is not encrypted ({}), using it as is", thing_id, e);
            secret.clone()
        }
    }
}

/// True when `secret` already decrypts with the thing key
pub fn is_encrypted_for(secret: &SecretString, thing_id: &str) -> bool {
    aes_decrypt(secret.expose_secret(), thing_id).is_ok()
}
