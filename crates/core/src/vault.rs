//! Credential encryption at rest
//!
//! AES-256-GCM with a fresh 96-bit nonce per call. The persisted form is a
//! JSON object of hex fields `{"iv", "authTag", "encrypted"}` with the
//! authentication tag stored detached; existing blobs in that shape must
//! stay decryptable, so the layout is load-bearing.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::credentials::StorageCredentials;
use crate::error::{Error, Result};

/// Master key length in bytes
pub const KEY_LEN: usize = 32;

/// GCM nonce length in bytes (96 bits)
pub const NONCE_LEN: usize = 12;

/// GCM authentication tag length in bytes
pub const TAG_LEN: usize = 16;

/// Process-wide master key.
///
/// Constructed once at startup from the 64-hex-character environment form
/// and injected into the vault; there is no global. The raw bytes are never
/// exposed through any read API and are zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    /// Parse the 64-hex-character form. Refuses anything that does not
    /// decode to exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|_| Error::Configuration("master key must be hex-encoded".into()))?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            Error::Configuration(format!(
                "master key must be exactly {KEY_LEN} bytes (64 hex characters)"
            ))
        })?;
        Ok(Self(key))
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}

/// On-disk representation of an encrypted secret
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Hex-encoded 96-bit initialization vector
    pub iv: String,

    /// Hex-encoded GCM authentication tag
    #[serde(rename = "authTag")]
    pub auth_tag: String,

    /// Hex-encoded ciphertext
    pub encrypted: String,
}

/// Authenticated encryption service for provider credentials
pub struct CredentialVault {
    key: MasterKey,
}

impl CredentialVault {
    pub fn new(key: MasterKey) -> Self {
        Self { key }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_slice()))
    }

    /// Encrypt a plaintext under a fresh random nonce.
    ///
    /// Nonce reuse under the same key breaks GCM completely; the nonce is
    /// drawn from the OS RNG on every call and never derived from inputs.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedPayload> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed = self
            .cipher()
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| Error::Configuration("credential encryption failed".into()))?;

        // aes-gcm appends the tag to the ciphertext; split it off so the
        // persisted shape keeps the tag as its own field.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);

        Ok(EncryptedPayload {
            iv: hex::encode(nonce),
            auth_tag: hex::encode(tag),
            encrypted: hex::encode(sealed),
        })
    }

    /// Decrypt a payload, failing closed.
    ///
    /// Any malformed field, wrong-length IV or tag, or authentication
    /// failure yields [`Error::Decryption`]; a garbled payload never
    /// produces a usable plaintext.
    pub fn decrypt(&self, payload: &EncryptedPayload) -> Result<String> {
        let iv = hex::decode(&payload.iv)
            .map_err(|_| Error::Decryption("initialization vector is not valid hex".into()))?;
        if iv.len() != NONCE_LEN {
            return Err(Error::Decryption(format!(
                "initialization vector must be {NONCE_LEN} bytes"
            )));
        }

        let tag = hex::decode(&payload.auth_tag)
            .map_err(|_| Error::Decryption("authentication tag is not valid hex".into()))?;
        if tag.len() != TAG_LEN {
            return Err(Error::Decryption(format!(
                "authentication tag must be {TAG_LEN} bytes"
            )));
        }

        let mut ciphertext = hex::decode(&payload.encrypted)
            .map_err(|_| Error::Decryption("ciphertext is not valid hex".into()))?;
        ciphertext.extend_from_slice(&tag);

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| Error::Decryption("authentication tag mismatch".into()))?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Decryption("plaintext is not valid UTF-8".into()))
    }

    /// Encrypt and serialize to the persisted string form
    pub fn seal(&self, plaintext: &str) -> Result<String> {
        Ok(serde_json::to_string(&self.encrypt(plaintext)?)?)
    }

    /// Parse and decrypt the persisted string form
    pub fn open(&self, blob: &str) -> Result<String> {
        let payload: EncryptedPayload = serde_json::from_str(blob)
            .map_err(|_| Error::Decryption("malformed credential payload".into()))?;
        self.decrypt(&payload)
    }

    /// Seal a credential set for storage inside a `StorageConfig`
    pub fn seal_credentials(&self, credentials: &StorageCredentials) -> Result<String> {
        self.seal(&serde_json::to_string(credentials)?)
    }

    /// Open a stored blob as a credential set.
    ///
    /// A blob that decrypts but does not parse as a credential set is
    /// treated the same as an undecryptable one.
    pub fn open_credentials(&self, blob: &str) -> Result<StorageCredentials> {
        let plaintext = self.open(blob)?;
        serde_json::from_str(&plaintext)
            .map_err(|_| Error::Decryption("payload is not a valid credential set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{LocalCredentials, S3Credentials};

    fn test_vault() -> CredentialVault {
        CredentialVault::new(MasterKey::from_bytes([42u8; KEY_LEN]))
    }

    #[test]
    fn test_master_key_from_hex() {
        let key = MasterKey::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(key.as_slice().len(), KEY_LEN);

        // Too short, too long, not hex
        assert!(MasterKey::from_hex(&"ab".repeat(16)).is_err());
        assert!(MasterKey::from_hex(&"ab".repeat(33)).is_err());
        assert!(MasterKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_master_key_debug_redacted() {
        let key = MasterKey::from_bytes([7u8; KEY_LEN]);
        assert_eq!(format!("{key:?}"), "MasterKey(<redacted>)");
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let vault = test_vault();
        for plaintext in ["", "hello", "with \0 embedded \0 nulls", "日本語"] {
            let payload = vault.encrypt(plaintext).unwrap();
            assert_eq!(vault.decrypt(&payload).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_fresh_iv_per_call() {
        let vault = test_vault();
        let a = vault.encrypt("same plaintext").unwrap();
        let b = vault.encrypt("same plaintext").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.encrypted, b.encrypted);
    }

    #[test]
    fn test_tampered_tag_fails_closed() {
        let vault = test_vault();
        let mut payload = vault.encrypt("secret").unwrap();

        // Flip one bit in the authentication tag
        let mut tag = hex::decode(&payload.auth_tag).unwrap();
        tag[0] ^= 0x01;
        payload.auth_tag = hex::encode(tag);

        assert!(matches!(
            vault.decrypt(&payload),
            Err(Error::Decryption(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let vault = test_vault();
        let mut payload = vault.encrypt("secret").unwrap();

        let mut ciphertext = hex::decode(&payload.encrypted).unwrap();
        ciphertext[0] ^= 0xFF;
        payload.encrypted = hex::encode(ciphertext);

        assert!(vault.decrypt(&payload).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let payload = test_vault().encrypt("secret").unwrap();
        let other = CredentialVault::new(MasterKey::from_bytes([1u8; KEY_LEN]));
        assert!(other.decrypt(&payload).is_err());
    }

    #[test]
    fn test_malformed_payload_fails() {
        let vault = test_vault();

        let bad = EncryptedPayload {
            iv: "not hex".into(),
            auth_tag: "00".repeat(TAG_LEN),
            encrypted: "00".repeat(8),
        };
        assert!(vault.decrypt(&bad).is_err());

        let short_iv = EncryptedPayload {
            iv: "00".repeat(4),
            auth_tag: "00".repeat(TAG_LEN),
            encrypted: "00".repeat(8),
        };
        assert!(vault.decrypt(&short_iv).is_err());

        assert!(vault.open("{\"not\": \"a payload\"}").is_err());
        assert!(vault.open("garbage").is_err());
    }

    #[test]
    fn test_persisted_field_names() {
        // The stored shape is part of the external contract.
        let payload = test_vault().encrypt("x").unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&payload).unwrap()).unwrap();
        assert!(json.get("iv").is_some());
        assert!(json.get("authTag").is_some());
        assert!(json.get("encrypted").is_some());
        assert_eq!(json.as_object().unwrap().len(), 3);
    }

    #[test]
    fn test_seal_open_credentials() {
        let vault = test_vault();
        let credentials = StorageCredentials::S3(S3Credentials {
            access_key: "AKIA123".into(),
            secret_key: "shhh".into(),
            region: "us-east-1".into(),
            bucket: "tenant-data".into(),
            endpoint: None,
            force_path_style: false,
        });

        let blob = vault.seal_credentials(&credentials).unwrap();
        match vault.open_credentials(&blob).unwrap() {
            StorageCredentials::S3(c) => {
                assert_eq!(c.access_key, "AKIA123");
                assert_eq!(c.bucket, "tenant-data");
            }
            other => panic!("wrong credential kind: {other:?}"),
        }
    }

    #[test]
    fn test_open_credentials_rejects_non_credential_plaintext() {
        let vault = test_vault();
        let blob = vault.seal("just a string, not a credential set").unwrap();
        assert!(matches!(
            vault.open_credentials(&blob),
            Err(Error::Decryption(_))
        ));

        // But a real credential set still parses
        let credentials = StorageCredentials::Local(LocalCredentials {
            root_path: "/srv/data".into(),
        });
        let blob = vault.seal_credentials(&credentials).unwrap();
        assert!(vault.open_credentials(&blob).is_ok());
    }
}
