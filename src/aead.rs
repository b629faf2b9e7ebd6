//! The AEAD engine, RFC 9180 §5.2.
//!
//! Nonce handling follows the `Seq(u64)`/`mix_nonce` idiom used by the
//! `crypto-com-rust-hpke` reference crate: a per-context monotonic counter
//! is big-endian-encoded, left-padded to `Nn` bytes, and XORed into the
//! context's fixed base nonce before every seal/open.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead as _, KeyInit as _, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use zeroize::Zeroize;

use crate::error::Error;
use crate::suite::AeadId;

/// All three suites use a 96-bit (12-byte) nonce, RFC 9180's `Nn`.
fn nonce_array(nonce: &[u8]) -> &GenericArray<u8, aes_gcm::aead::consts::U12> {
    GenericArray::from_slice(nonce)
}

/// A per-context sequence counter mixed into the base nonce for every
/// seal/open call, RFC 9180 §5.2 "Encryption and Decryption".
#[derive(Debug, Clone, Copy, Default)]
pub struct Seq(u64);

impl Seq {
    pub fn new() -> Self {
        Seq(0)
    }

    /// XOR the big-endian counter into `base_nonce` (already the right
    /// length for the suite) and return the per-message nonce.
    fn mix_nonce(self, base_nonce: &[u8]) -> Vec<u8> {
        let mut nonce = base_nonce.to_vec();
        let ctr = self.0.to_be_bytes();
        let offset = nonce.len() - ctr.len();
        for (n, c) in nonce[offset..].iter_mut().zip(ctr.iter()) {
            *n ^= c;
        }
        nonce
    }

    fn increment(&mut self) -> Result<(), Error> {
        self.0 = self.0.checked_add(1).ok_or(Error::SequenceOverflow)?;
        Ok(())
    }
}

/// One AEAD direction's worth of key schedule state: the fixed key, fixed
/// base nonce, and the running sequence counter.
#[derive(Clone)]
pub struct AeadKey {
    suite: AeadId,
    key: Vec<u8>,
    base_nonce: Vec<u8>,
    seq: Seq,
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AeadKey").field("suite", &self.suite).finish_non_exhaustive()
    }
}

impl Drop for AeadKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl AeadKey {
    /// `key` must be exactly `suite.params().n_k` bytes, `base_nonce`
    /// exactly `suite.params().n_n` bytes (the key-schedule's job, not
    /// this constructor's, to enforce that length).
    pub fn new(suite: AeadId, key: Vec<u8>, base_nonce: Vec<u8>) -> Self {
        AeadKey {
            suite,
            key,
            base_nonce,
            seq: Seq::new(),
        }
    }

    pub fn suite(&self) -> AeadId {
        self.suite
    }

    /// Seal `plaintext` under the current sequence number, advancing it on
    /// success, and return `ciphertext || tag`.
    pub fn seal(&mut self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = self.seq.mix_nonce(&self.base_nonce);
        let out = seal_with(self.suite, &self.key, &nonce, aad, plaintext)?;
        self.seq.increment()?;
        Ok(out)
    }

    /// Open `ciphertext` (which includes the trailing tag) under the
    /// current sequence number, advancing it only on success, exactly as
    /// RFC 9180's `Open` (a failed open must not move an endpoint's
    /// sequence counter out of sync with its peer).
    pub fn open(&mut self, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let nonce = self.seq.mix_nonce(&self.base_nonce);
        let out = open_with(self.suite, &self.key, &nonce, aad, ciphertext)?;
        self.seq.increment()?;
        Ok(out)
    }

    /// Seal/open with an explicit (non-running) nonce, used by the `hpke.c`
    /// single-shot `HPKE_CTX_seal`/`open` entry points for tests and the
    /// export-only code path; does not touch the running sequence counter.
    pub fn seal_detached(suite: AeadId, key: &[u8], nonce: &[u8], aad: &[u8], pt: &[u8]) -> Result<Vec<u8>, Error> {
        seal_with(suite, key, nonce, aad, pt)
    }

    pub fn open_detached(suite: AeadId, key: &[u8], nonce: &[u8], aad: &[u8], ct: &[u8]) -> Result<Vec<u8>, Error> {
        open_with(suite, key, nonce, aad, ct)
    }
}

fn seal_with(suite: AeadId, key: &[u8], nonce: &[u8], aad: &[u8], pt: &[u8]) -> Result<Vec<u8>, Error> {
    let payload = Payload { msg: pt, aad };
    match suite {
        AeadId::Aes128Gcm => Aes128Gcm::new_from_slice(key)
            .map_err(|_| Error::InvalidKeySize)?
            .encrypt(nonce_array(nonce), payload)
            .map_err(|_| Error::AeadBadTag),
        AeadId::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|_| Error::InvalidKeySize)?
            .encrypt(nonce_array(nonce), payload)
            .map_err(|_| Error::AeadBadTag),
        AeadId::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| Error::InvalidKeySize)?
            .encrypt(nonce_array(nonce), payload)
            .map_err(|_| Error::AeadBadTag),
    }
}

fn open_with(suite: AeadId, key: &[u8], nonce: &[u8], aad: &[u8], ct: &[u8]) -> Result<Vec<u8>, Error> {
    if ct.len() < suite.params().n_t {
        return Err(Error::AeadBadLength);
    }
    let payload = Payload { msg: ct, aad };
    match suite {
        AeadId::Aes128Gcm => Aes128Gcm::new_from_slice(key)
            .map_err(|_| Error::InvalidKeySize)?
            .decrypt(nonce_array(nonce), payload)
            .map_err(|_| Error::AeadBadTag),
        AeadId::Aes256Gcm => Aes256Gcm::new_from_slice(key)
            .map_err(|_| Error::InvalidKeySize)?
            .decrypt(nonce_array(nonce), payload)
            .map_err(|_| Error::AeadBadTag),
        AeadId::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
            .map_err(|_| Error::InvalidKeySize)?
            .decrypt(nonce_array(nonce), payload)
            .map_err(|_| Error::AeadBadTag),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(suite: AeadId) {
        let p = suite.params();
        let key = vec![0x42u8; p.n_k];
        let base_nonce = vec![0x24u8; p.n_n];
        let mut sealer = AeadKey::new(suite, key.clone(), base_nonce.clone());
        let mut opener = AeadKey::new(suite, key, base_nonce);

        let aad = b"associated data";
        let pt = b"the quick brown fox jumps over the lazy dog";
        let ct = sealer.seal(aad, pt).unwrap();
        let back = opener.open(aad, &ct).unwrap();
        assert_eq!(&back, pt);
    }

    #[test]
    fn round_trips_all_suites() {
        round_trip(AeadId::Aes128Gcm);
        round_trip(AeadId::Aes256Gcm);
        round_trip(AeadId::ChaCha20Poly1305);
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let suite = AeadId::ChaCha20Poly1305;
        let p = suite.params();
        let key = vec![0x11u8; p.n_k];
        let base_nonce = vec![0x22u8; p.n_n];
        let mut sealer = AeadKey::new(suite, key.clone(), base_nonce.clone());
        let mut opener = AeadKey::new(suite, key, base_nonce);

        let mut ct = sealer.seal(b"aad", b"message").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(matches!(opener.open(b"aad", &ct), Err(Error::AeadBadTag)));
    }

    #[test]
    fn short_ciphertext_is_bad_length_not_bad_tag() {
        let suite = AeadId::Aes128Gcm;
        let p = suite.params();
        let key = vec![0x01u8; p.n_k];
        let base_nonce = vec![0x00u8; p.n_n];
        let mut opener = AeadKey::new(suite, key, base_nonce);
        let short = vec![0u8; p.n_t - 1];
        assert!(matches!(opener.open(b"", &short), Err(Error::AeadBadLength)));
    }

    #[test]
    fn sequence_advances_between_messages() {
        let suite = AeadId::Aes128Gcm;
        let p = suite.params();
        let key = vec![0x01u8; p.n_k];
        let base_nonce = vec![0x00u8; p.n_n];
        let mut sealer = AeadKey::new(suite, key, base_nonce);
        let ct1 = sealer.seal(b"", b"one").unwrap();
        let ct2 = sealer.seal(b"", b"one").unwrap();
        assert_ne!(ct1, ct2);
    }
}
