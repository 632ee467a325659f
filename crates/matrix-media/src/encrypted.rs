//! Encrypted attachment descriptors and decryption.
//!
//! Encrypted rooms upload media as AES-256-CTR ciphertext and put the key,
//! IV and ciphertext hash into the event's `file` object. Only version `v2`
//! descriptors are accepted.

use std::collections::BTreeMap;

use aes::Aes256;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use ctr::cipher::{KeyIvInit, StreamCipher};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const SUPPORTED_VERSION: &str = "v2";
const KEY_ALGORITHM: &str = "A256CTR";
const KEY_TYPE: &str = "oct";
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptError {
    #[error("unsupported encrypted attachment version {0}")]
    UnsupportedVersion(String),
    #[error("unsupported key algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("attachment key is malformed")]
    BadKey,
    #[error("attachment iv is malformed")]
    BadIv,
    #[error("attachment has no sha256 hash")]
    MissingHash,
    #[error("attachment sha256 hash does not match the downloaded content")]
    HashMismatch,
}

/// JSON Web Key carried in an encrypted attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    pub kty: String,
    #[serde(default)]
    pub key_ops: Vec<String>,
    pub alg: String,
    pub k: String,
    #[serde(default)]
    pub ext: bool,
}

/// The `file` object of an encrypted media message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedFile {
    pub url: String,
    pub key: JsonWebKey,
    pub iv: String,
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
    pub v: String,
}

impl EncryptedFile {
    /// Verify the ciphertext hash and decrypt it.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if self.v != SUPPORTED_VERSION {
            return Err(DecryptError::UnsupportedVersion(self.v.clone()));
        }
        if self.key.alg != KEY_ALGORITHM || self.key.kty != KEY_TYPE {
            return Err(DecryptError::UnsupportedAlgorithm(format!(
                "{}/{}",
                self.key.kty, self.key.alg
            )));
        }

        let key = decode_unpadded(&URL_SAFE_NO_PAD, &self.key.k).ok_or(DecryptError::BadKey)?;
        if key.len() != KEY_LEN {
            return Err(DecryptError::BadKey);
        }
        let iv = decode_unpadded(&STANDARD_NO_PAD, &self.iv).ok_or(DecryptError::BadIv)?;
        if iv.len() != IV_LEN {
            return Err(DecryptError::BadIv);
        }

        let expected = self
            .hashes
            .get("sha256")
            .and_then(|hash| decode_unpadded(&STANDARD_NO_PAD, hash))
            .ok_or(DecryptError::MissingHash)?;
        let actual = Sha256::digest(ciphertext);
        if actual.as_slice() != expected.as_slice() {
            return Err(DecryptError::HashMismatch);
        }

        let mut cipher =
            Aes256Ctr::new_from_slices(&key, &iv).map_err(|_| DecryptError::BadKey)?;
        let mut plaintext = ciphertext.to_vec();
        cipher.apply_keystream(&mut plaintext);
        Ok(plaintext)
    }
}

// Clients disagree on padding, so strip it and decode with the no-pad engine.
fn decode_unpadded<E: Engine>(engine: &E, value: &str) -> Option<Vec<u8>> {
    engine.decode(value.trim_end_matches('=')).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];
    const IV: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 0, 0, 0, 0, 0, 0, 0, 0];

    fn encrypt(plaintext: &[u8]) -> (EncryptedFile, Vec<u8>) {
        let mut ciphertext = plaintext.to_vec();
        let mut cipher = Aes256Ctr::new_from_slices(&KEY, &IV).unwrap();
        cipher.apply_keystream(&mut ciphertext);
        let mut hashes = BTreeMap::new();
        hashes.insert(
            "sha256".to_string(),
            STANDARD_NO_PAD.encode(Sha256::digest(&ciphertext)),
        );
        let file = EncryptedFile {
            url: "mxc://example.org/voice".to_string(),
            key: JsonWebKey {
                kty: "oct".to_string(),
                key_ops: vec!["encrypt".to_string(), "decrypt".to_string()],
                alg: "A256CTR".to_string(),
                k: URL_SAFE_NO_PAD.encode(KEY),
                ext: true,
            },
            iv: STANDARD_NO_PAD.encode(IV),
            hashes,
            v: "v2".to_string(),
        };
        (file, ciphertext)
    }

    #[test]
    fn decrypts_matching_ciphertext() {
        let (file, ciphertext) = encrypt(b"OggS voice note payload");
        assert_ne!(ciphertext.as_slice(), b"OggS voice note payload");
        assert_eq!(file.decrypt(&ciphertext).unwrap(), b"OggS voice note payload");
    }

    #[test]
    fn accepts_padded_base64() {
        let (mut file, ciphertext) = encrypt(b"payload");
        file.iv.push_str("==");
        assert!(file.decrypt(&ciphertext).is_ok());
    }

    #[test]
    fn tampered_ciphertext_fails_hash_check() {
        let (file, mut ciphertext) = encrypt(b"payload");
        ciphertext[0] ^= 0xff;
        assert_eq!(file.decrypt(&ciphertext), Err(DecryptError::HashMismatch));
    }

    #[test]
    fn short_key_is_rejected() {
        let (mut file, ciphertext) = encrypt(b"payload");
        file.key.k = URL_SAFE_NO_PAD.encode([1u8; 16]);
        assert_eq!(file.decrypt(&ciphertext), Err(DecryptError::BadKey));
    }

    #[test]
    fn missing_hash_and_old_versions_are_rejected() {
        let (mut file, ciphertext) = encrypt(b"payload");
        file.hashes.clear();
        assert_eq!(file.decrypt(&ciphertext), Err(DecryptError::MissingHash));

        let (mut file, ciphertext) = encrypt(b"payload");
        file.v = "v1".to_string();
        assert_eq!(
            file.decrypt(&ciphertext),
            Err(DecryptError::UnsupportedVersion("v1".to_string()))
        );
    }

    #[test]
    fn parses_event_json() {
        let json = r#"{
            "url": "mxc://example.org/abc",
            "key": {"kty": "oct", "key_ops": ["encrypt", "decrypt"], "alg": "A256CTR",
                    "k": "qcHVMSgYg-71CauWBezXI5qkaRb0LuIy-Wx5kIaHMIA", "ext": true},
            "iv": "X85+XgHN+HEAAAAAAAAAAA",
            "hashes": {"sha256": "5qG4fFnbbVdlAB1Q72JDKwCagV6Dbkx9uds4rSak37c"},
            "v": "v2"
        }"#;
        let file: EncryptedFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.url, "mxc://example.org/abc");
        assert_eq!(file.key.alg, "A256CTR");
        assert!(file.hashes.contains_key("sha256"));
    }
}
