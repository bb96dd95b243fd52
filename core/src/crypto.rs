use crate::{Error, KdfParams, Result};
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub struct MasterKey {
    key: Vec<u8>,
}

impl MasterKey {
    pub fn derive_from_password(password: &str, salt: &[u8], params: &KdfParams) -> Result<Self> {
        let argon2 = Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            argon2::Params::new(params.memory, params.iterations, params.parallelism, None)
                .map_err(|e| Error::Encryption(e.to_string()))?,
        );

        let salt_str = SaltString::encode_b64(salt).map_err(|e| Error::Encryption(e.to_string()))?;

        let password_hash = argon2
            .hash_password(password.as_bytes(), &salt_str)
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let hash = password_hash
            .hash
            .ok_or_else(|| Error::Encryption("Argon2 produced no output".to_string()))?;
        Ok(Self {
            key: hash.as_bytes().to_vec(),
        })
    }

    pub fn generate() -> Self {
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

/// ChaCha20-Poly1305 sealing of repository objects as `nonce || ciphertext`.
pub struct Encryptor {
    cipher: ChaCha20Poly1305,
}

impl Encryptor {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != 32 {
            return Err(Error::Encryption("Key must be 32 bytes".to_string()));
        }

        let key = Key::from_slice(key);
        let cipher = ChaCha20Poly1305::new(key);
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(plaintext, &[])
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.decrypt_with_aad(ciphertext, &[])
    }

    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, Payload { msg: plaintext, aad })
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Fails with `Error::Encryption` when the input is truncated or the tag does not verify.
    pub fn decrypt_with_aad(&self, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Encryption("Ciphertext too short".to_string()));
        }

        let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, Payload { msg: encrypted, aad })
            .map_err(|e| Error::Encryption(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encryption_roundtrip() {
        let key = MasterKey::generate();
        let encryptor = Encryptor::new(key.as_bytes()).unwrap();

        let plaintext = b"Hello, Tidesnap!";
        let ciphertext = encryptor.encrypt(plaintext).unwrap();
        let decrypted = encryptor.decrypt(&ciphertext).unwrap();

        assert_eq!(plaintext.to_vec(), decrypted);
    }

    #[test]
    fn aad_mismatch_fails_authentication() {
        let key = MasterKey::generate();
        let encryptor = Encryptor::new(key.as_bytes()).unwrap();

        let sealed = encryptor.encrypt_with_aad(b"payload", b"tree").unwrap();
        assert!(encryptor.decrypt_with_aad(&sealed, b"tree").is_ok());
        assert!(encryptor.decrypt_with_aad(&sealed, b"data").is_err());
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let key = MasterKey::generate();
        let encryptor = Encryptor::new(key.as_bytes()).unwrap();

        let mut sealed = encryptor.encrypt(b"payload").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(encryptor.decrypt(&sealed).is_err());
        assert!(encryptor.decrypt(&sealed[..NONCE_LEN]).is_err());
    }

    #[test]
    fn password_derivation_is_deterministic() {
        let params = KdfParams {
            memory: 1024,
            iterations: 1,
            parallelism: 1,
            ..KdfParams::default()
        };
        let a = MasterKey::derive_from_password("secret", &params.salt, &params).unwrap();
        let b = MasterKey::derive_from_password("secret", &params.salt, &params).unwrap();
        let c = MasterKey::derive_from_password("other", &params.salt, &params).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
        assert_eq!(a.as_bytes().len(), 32);
    }
}
