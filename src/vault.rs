// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key vault: encryption at rest for user private keys.
//!
//! Each user's private key is encrypted with a symmetric key derived from
//! their password and a per-user salt (PBKDF2-HMAC-SHA256, 100,000
//! iterations). There is no key escrow: the password-derived key is the
//! sole means of reproducing the encryption key, so a decryption failure
//! IS the password check for this path and maps to invalid credentials,
//! never to data corruption.
//!
//! Stored per user: ciphertext, salt, and IV (hex-encoded). The raw private
//! key is never persisted and never logged.

use std::num::NonZeroU32;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use alloy::signers::local::PrivateKeySigner;
use ring::rand::{SecureRandom, SystemRandom};
use ring::pbkdf2;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, Zeroizing};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// PBKDF2 salt length in bytes.
pub const SALT_LEN: usize = 16;
/// AES-256-CBC initialization vector length in bytes.
pub const IV_LEN: usize = 16;
/// Derived symmetric key length in bytes.
pub const KEY_LEN: usize = 32;
/// Raw private key length in bytes.
pub const PRIVATE_KEY_LEN: usize = 32;

/// PBKDF2-HMAC-SHA256 iteration count.
const PBKDF2_ITERATIONS: NonZeroU32 = match NonZeroU32::new(100_000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Errors from vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The system randomness source failed.
    #[error("secure randomness unavailable")]
    Random,

    /// Decryption failed: the password-derived key is wrong.
    #[error("invalid credentials")]
    WrongPassword,

    /// Stored ciphertext, salt, or IV is not valid hex of the right length.
    #[error("malformed stored secret: {0}")]
    MalformedSecret(&'static str),

    /// A private key hex string failed validation.
    #[error("invalid private key")]
    InvalidPrivateKey,
}

/// A password-derived AES-256 key. Wiped on drop.
pub struct DerivedKey([u8; KEY_LEN]);

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl DerivedKey {
    fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Generate a cryptographically random per-user salt, hex-encoded.
pub fn generate_salt() -> Result<String, VaultError> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| VaultError::Random)?;
    Ok(alloy::hex::encode(salt))
}

/// Derive the symmetric encryption key from a password and stored salt.
///
/// Deterministic: the same password and salt always yield the same key.
/// The password is NFKC-normalized first so visually identical inputs from
/// different keyboards derive the same key. The salt participates as its
/// stored hex string, matching the persisted secret format.
pub fn derive_key(password: &str, salt_hex: &str) -> DerivedKey {
    let normalized: String = password.nfkc().collect();
    let mut out = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        PBKDF2_ITERATIONS,
        salt_hex.as_bytes(),
        normalized.as_bytes(),
        &mut out,
    );
    DerivedKey(out)
}

/// Generate a fresh 32-byte private key, hex-encoded (no 0x prefix).
pub fn generate_private_key() -> Result<Zeroizing<String>, VaultError> {
    let mut key = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
    SystemRandom::new()
        .fill(&mut key[..])
        .map_err(|_| VaultError::Random)?;
    Ok(Zeroizing::new(alloy::hex::encode(&key[..])))
}

/// Encrypt a hex-encoded private key with AES-256-CBC.
///
/// A fresh random IV is drawn per call and returned alongside the
/// ciphertext; both are hex-encoded for storage. The IV is not secret.
pub fn encrypt_private_key(
    private_key_hex: &str,
    key: &DerivedKey,
) -> Result<(String, String), VaultError> {
    let mut iv = [0u8; IV_LEN];
    SystemRandom::new()
        .fill(&mut iv)
        .map_err(|_| VaultError::Random)?;

    let ciphertext = Aes256CbcEnc::new(key.as_bytes().into(), (&iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(private_key_hex.as_bytes());

    Ok((alloy::hex::encode(ciphertext), alloy::hex::encode(iv)))
}

/// Decrypt a stored private key ciphertext.
///
/// A wrong key surfaces as [`VaultError::WrongPassword`]: with CBC + PKCS#7
/// the padding check fails, and even an accidental padding survival is
/// caught by validating that the plaintext is a 64-character hex key.
pub fn decrypt_private_key(
    ciphertext_hex: &str,
    key: &DerivedKey,
    iv_hex: &str,
) -> Result<Zeroizing<String>, VaultError> {
    let ciphertext = alloy::hex::decode(ciphertext_hex)
        .map_err(|_| VaultError::MalformedSecret("ciphertext is not hex"))?;
    let iv = alloy::hex::decode(iv_hex).map_err(|_| VaultError::MalformedSecret("iv is not hex"))?;

    let cipher = Aes256CbcDec::new_from_slices(&key.as_bytes()[..], &iv)
        .map_err(|_| VaultError::MalformedSecret("iv has wrong length"))?;

    let mut buf = Zeroizing::new(ciphertext);
    let plaintext = cipher
        .decrypt_padded_mut::<Pkcs7>(buf.as_mut_slice())
        .map_err(|_| VaultError::WrongPassword)?;

    let plaintext = Zeroizing::new(
        String::from_utf8(plaintext.to_vec()).map_err(|_| VaultError::WrongPassword)?,
    );

    if plaintext.len() != PRIVATE_KEY_LEN * 2
        || !plaintext.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(VaultError::WrongPassword);
    }

    Ok(plaintext)
}

/// Derive the on-chain address for a hex-encoded private key.
///
/// Deterministic public-key derivation: the same key always yields the
/// same address (EIP-55 checksummed).
pub fn address_from_private_key(private_key_hex: &str) -> Result<String, VaultError> {
    let trimmed = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);
    let bytes = alloy::hex::decode(trimmed).map_err(|_| VaultError::InvalidPrivateKey)?;
    let signer =
        PrivateKeySigner::from_slice(&bytes).map_err(|_| VaultError::InvalidPrivateKey)?;
    Ok(signer.address().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salt_is_random_and_right_length() {
        let a = generate_salt().unwrap();
        let b = generate_salt().unwrap();
        assert_eq!(a.len(), SALT_LEN * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn derive_key_is_deterministic_per_password_and_salt() {
        let salt = generate_salt().unwrap();
        let a = derive_key("hunter2", &salt);
        let b = derive_key("hunter2", &salt);
        assert_eq!(a.as_bytes(), b.as_bytes());

        let other_salt = generate_salt().unwrap();
        let c = derive_key("hunter2", &other_salt);
        assert_ne!(a.as_bytes(), c.as_bytes());

        let d = derive_key("hunter3", &salt);
        assert_ne!(a.as_bytes(), d.as_bytes());
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let salt = generate_salt().unwrap();
        let key = derive_key("correct horse battery staple", &salt);
        let private_key = generate_private_key().unwrap();

        let (ciphertext, iv) = encrypt_private_key(&private_key, &key).unwrap();
        let decrypted = decrypt_private_key(&ciphertext, &key, &iv).unwrap();

        assert_eq!(*decrypted, *private_key);
    }

    #[test]
    fn fresh_iv_per_encryption() {
        let salt = generate_salt().unwrap();
        let key = derive_key("pw", &salt);
        let private_key = generate_private_key().unwrap();

        let (ct1, iv1) = encrypt_private_key(&private_key, &key).unwrap();
        let (ct2, iv2) = encrypt_private_key(&private_key, &key).unwrap();
        assert_ne!(iv1, iv2);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn wrong_password_fails_with_error_not_garbage() {
        let salt = generate_salt().unwrap();
        let key = derive_key("right password", &salt);
        let private_key = generate_private_key().unwrap();
        let (ciphertext, iv) = encrypt_private_key(&private_key, &key).unwrap();

        let wrong = derive_key("wrong password", &salt);
        let result = decrypt_private_key(&ciphertext, &wrong, &iv);
        assert!(matches!(result, Err(VaultError::WrongPassword)));
    }

    #[test]
    fn nfkc_equivalent_passwords_derive_same_key() {
        let salt = generate_salt().unwrap();
        // U+00E9 (é) vs U+0065 U+0301 (e + combining acute)
        let composed = derive_key("caf\u{00e9}", &salt);
        let decomposed = derive_key("cafe\u{0301}", &salt);
        assert_eq!(composed.as_bytes(), decomposed.as_bytes());
    }

    #[test]
    fn address_derivation_is_deterministic() {
        let key = "4c0883a69102937d6231471b5dbb6204fe512961708279feb1be6ae5538da033";
        let a = address_from_private_key(key).unwrap();
        let b = address_from_private_key(key).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 42);
        assert!(a.starts_with("0x"));
    }

    #[test]
    fn address_derivation_rejects_bad_keys() {
        assert!(address_from_private_key("zz").is_err());
        assert!(address_from_private_key("abcd").is_err());
    }

    #[test]
    fn malformed_stored_secret_is_not_a_credentials_error() {
        let salt = generate_salt().unwrap();
        let key = derive_key("pw", &salt);
        let result = decrypt_private_key("not hex!", &key, "0000");
        assert!(matches!(result, Err(VaultError::MalformedSecret(_))));
    }
}
