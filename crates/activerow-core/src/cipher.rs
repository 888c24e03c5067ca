//! Attribute encryption seam.
//!
//! Entities may declare encrypted columns; the engine routes those values
//! through an [`AttributeCipher`] on materialization and persistence. The
//! cipher itself is an external collaborator: the application supplies
//! the implementation, the engine never picks an algorithm.

use crate::error::Result;

/// Encrypts and decrypts attribute values stored as text.
pub trait AttributeCipher: Send + Sync {
    /// Encrypt a plaintext attribute for storage.
    fn encrypt(&self, plaintext: &str) -> String;

    /// Decrypt a stored attribute. Fails on malformed ciphertext.
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}
