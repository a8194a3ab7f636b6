//! Datagram sealing with ChaCha20-Poly1305.
//!
//! Wire layout: 12-byte random nonce followed by the ciphertext. A node
//! without the mesh key cannot produce or read any gossip traffic, which is
//! the only property required here; key rotation is out of scope.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

/// Nonce size of ChaCha20-Poly1305.
const NONCE_SIZE: usize = 12;

/// Sealing/opening context for gossip datagrams.
#[derive(Clone)]
pub(crate) struct DatagramCipher {
    cipher: ChaCha20Poly1305,
}

impl DatagramCipher {
    pub(crate) fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    pub(crate) fn seal(&self, plaintext: &[u8]) -> Option<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self.cipher.encrypt(nonce, plaintext).ok()?;
        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Some(out)
    }

    pub(crate) fn open(&self, datagram: &[u8]) -> Option<Vec<u8>> {
        if datagram.len() <= NONCE_SIZE {
            return None;
        }
        let (nonce_bytes, ciphertext) = datagram.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher.decrypt(nonce, ciphertext).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = DatagramCipher::new(&[7u8; 32]);
        let sealed = cipher.seal(b"hello mesh").unwrap();
        assert_ne!(&sealed[NONCE_SIZE..], b"hello mesh");
        assert_eq!(cipher.open(&sealed).unwrap(), b"hello mesh");
    }

    #[test]
    fn test_wrong_key_fails_open() {
        let cipher = DatagramCipher::new(&[7u8; 32]);
        let other = DatagramCipher::new(&[8u8; 32]);
        let sealed = cipher.seal(b"hello mesh").unwrap();
        assert!(other.open(&sealed).is_none());
    }

    #[test]
    fn test_truncated_datagram_rejected() {
        let cipher = DatagramCipher::new(&[7u8; 32]);
        assert!(cipher.open(&[1, 2, 3]).is_none());
    }
}
