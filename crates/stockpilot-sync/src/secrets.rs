//! # Secret Store
//!
//! Credentials for external sources, encrypted at rest.
//!
//! ## Sealed Format
//! ```text
//! base64( nonce[24] || xchacha20poly1305_ciphertext )
//! ```
//!
//! ## Handling Rules
//! - Plaintext exists only in memory, decrypted just-in-time for a
//!   request and dropped with the request
//! - Secrets never appear in logs or error messages; display surfaces
//!   get [`mask`] output only (short prefix plus asterisks)
//! - `Credential` deliberately has a redacting Debug impl so an
//!   accidental `{:?}` cannot leak material

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use subtle::ConstantTimeEq;

use crate::error::{SyncError, SyncResult};

const NONCE_LEN: usize = 24;

// =============================================================================
// Credential
// =============================================================================

/// Decrypted credential material, alive only for the duration of one
/// request.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Credential(value.into())
    }

    /// Exposes the raw material. Callers hand this straight to a
    /// request builder and nothing else.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Splits "username:password" material for HTTP Basic auth.
    pub fn as_basic_pair(&self) -> SyncResult<(&str, &str)> {
        self.0
            .split_once(':')
            .ok_or_else(|| SyncError::Secret("basic credential must be 'username:password'".into()))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({})", mask(&self.0))
    }
}

/// Masks a secret for display: at most four leading characters, the
/// rest replaced by asterisks. Short secrets are fully masked.
pub fn mask(value: &str) -> String {
    let visible: String = if value.chars().count() > 8 {
        value.chars().take(4).collect()
    } else {
        String::new()
    };
    format!("{visible}****")
}

/// Constant-time byte comparison for signatures and tokens.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

// =============================================================================
// Secret Store
// =============================================================================

/// Seals and unseals credentials with a 256-bit key.
///
/// The key itself comes from the deployment environment (key file or
/// env var), never from the configuration file that names the sources.
pub struct SecretStore {
    cipher: XChaCha20Poly1305,
}

impl SecretStore {
    /// Creates a store from raw key bytes.
    pub fn new(key: &[u8; 32]) -> Self {
        SecretStore {
            cipher: XChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Creates a store from a base64-encoded 256-bit key.
    pub fn from_base64_key(encoded: &str) -> SyncResult<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| SyncError::Secret(format!("bad key encoding: {e}")))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SyncError::Secret("key must be exactly 32 bytes".into()))?;
        Ok(SecretStore::new(&key))
    }

    /// Seals a plaintext credential for storage at rest.
    pub fn seal(&self, plaintext: &str) -> SyncResult<String> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| SyncError::Secret("encryption failed".into()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Unseals a stored credential. Fails on a wrong key or tampered
    /// ciphertext (the AEAD tag will not verify).
    pub fn unseal(&self, sealed: &str) -> SyncResult<Credential> {
        let bytes = BASE64
            .decode(sealed.trim())
            .map_err(|e| SyncError::Secret(format!("bad sealed encoding: {e}")))?;
        if bytes.len() <= NONCE_LEN {
            return Err(SyncError::Secret("sealed value too short".into()));
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| SyncError::Secret("decryption failed".into()))?;

        let value = String::from_utf8(plaintext)
            .map_err(|_| SyncError::Secret("credential is not valid UTF-8".into()))?;
        Ok(Credential::new(value))
    }
}

impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretStore")
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SecretStore {
        SecretStore::new(&[7u8; 32])
    }

    #[test]
    fn test_seal_unseal_roundtrip() {
        let s = store();
        let sealed = s.seal("tok_live_abcdef123456").unwrap();
        assert_ne!(sealed, "tok_live_abcdef123456");
        assert!(!sealed.contains("abcdef"));

        let credential = s.unseal(&sealed).unwrap();
        assert_eq!(credential.expose(), "tok_live_abcdef123456");
    }

    #[test]
    fn test_nonce_varies_per_seal() {
        let s = store();
        let a = s.seal("same-secret").unwrap();
        let b = s.seal("same-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_fails_to_unseal() {
        let sealed = store().seal("secret").unwrap();
        let other = SecretStore::new(&[9u8; 32]);
        assert!(matches!(other.unseal(&sealed), Err(SyncError::Secret(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let s = store();
        let sealed = s.seal("secret").unwrap();
        let mut bytes = BASE64.decode(&sealed).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);
        assert!(s.unseal(&tampered).is_err());
    }

    #[test]
    fn test_mask_shows_short_prefix_only() {
        assert_eq!(mask("tok_live_abcdef123456"), "tok_****");
        // Short secrets reveal nothing at all.
        assert_eq!(mask("abc"), "****");
        assert_eq!(mask("12345678"), "****");
    }

    #[test]
    fn test_debug_never_leaks() {
        let credential = Credential::new("super-secret-token");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_basic_pair_split() {
        let credential = Credential::new("alice:hunter2");
        assert_eq!(credential.as_basic_pair().unwrap(), ("alice", "hunter2"));
        assert!(Credential::new("no-colon").as_basic_pair().is_err());
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
