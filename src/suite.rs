//! Algorithm identifiers and the parameter tables for each one.
//!
//! Mirrors the fixed id -> params mapping of BoringSSL's
//! `hpke_kem_tab`/`hpke_kdf_tab`/`hpke_aead_tab`, reexpressed as tagged enums
//! with a `params()` match arm instead of sentinel-terminated arrays: the
//! dispatch is still O(1), but `TryFrom<u16>` gets us "reject an unknown
//! identifier" for free instead of a linear sentinel scan.

use crate::error::Error;

/// A DHKEM identifier, RFC 9180 §7.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KemId {
    DhkemP256HkdfSha256,
    DhkemP384HkdfSha384,
    DhkemP521HkdfSha512,
    DhkemX25519HkdfSha256,
    DhkemX448HkdfSha512,
}

/// Fixed-size parameters of a KEM: public/private key sizes, encapsulated
/// key size, and shared secret size, all in octets.
#[derive(Debug, Clone, Copy)]
pub struct KemParams {
    pub id: u16,
    pub n_secret: usize,
    pub n_enc: usize,
    pub n_pk: usize,
    pub n_sk: usize,
}

impl KemId {
    pub const fn wire_id(self) -> u16 {
        match self {
            KemId::DhkemP256HkdfSha256 => 0x0010,
            KemId::DhkemP384HkdfSha384 => 0x0011,
            KemId::DhkemP521HkdfSha512 => 0x0012,
            KemId::DhkemX25519HkdfSha256 => 0x0020,
            KemId::DhkemX448HkdfSha512 => 0x0021,
        }
    }

    /// The KDF this KEM's DHKEM construction internally uses to derive its
    /// shared secret (independent of the KDF negotiated for the HPKE
    /// ciphersuite as a whole).
    pub const fn internal_kdf(self) -> KdfId {
        match self {
            KemId::DhkemP256HkdfSha256 => KdfId::HkdfSha256,
            KemId::DhkemP384HkdfSha384 => KdfId::HkdfSha384,
            KemId::DhkemP521HkdfSha512 => KdfId::HkdfSha512,
            KemId::DhkemX25519HkdfSha256 => KdfId::HkdfSha256,
            KemId::DhkemX448HkdfSha512 => KdfId::HkdfSha512,
        }
    }

    pub const fn params(self) -> KemParams {
        match self {
            KemId::DhkemP256HkdfSha256 => KemParams {
                id: self.wire_id(),
                n_secret: 32,
                n_enc: 65,
                n_pk: 65,
                n_sk: 32,
            },
            KemId::DhkemP384HkdfSha384 => KemParams {
                id: self.wire_id(),
                n_secret: 48,
                n_enc: 97,
                n_pk: 97,
                n_sk: 48,
            },
            KemId::DhkemP521HkdfSha512 => KemParams {
                id: self.wire_id(),
                n_secret: 64,
                n_enc: 133,
                n_pk: 133,
                n_sk: 66,
            },
            KemId::DhkemX25519HkdfSha256 => KemParams {
                id: self.wire_id(),
                n_secret: 32,
                n_enc: 32,
                n_pk: 32,
                n_sk: 32,
            },
            KemId::DhkemX448HkdfSha512 => KemParams {
                id: self.wire_id(),
                n_secret: 64,
                n_enc: 56,
                n_pk: 56,
                n_sk: 56,
            },
        }
    }
}

impl TryFrom<u16> for KemId {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self, Error> {
        Ok(match v {
            0x0010 => KemId::DhkemP256HkdfSha256,
            0x0011 => KemId::DhkemP384HkdfSha384,
            0x0012 => KemId::DhkemP521HkdfSha512,
            0x0020 => KemId::DhkemX25519HkdfSha256,
            0x0021 => KemId::DhkemX448HkdfSha512,
            other => return Err(Error::UnsupportedKem(other)),
        })
    }
}

/// A KDF identifier, RFC 9180 §7.2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfId {
    HkdfSha256,
    HkdfSha384,
    HkdfSha512,
}

#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    pub id: u16,
    /// Output size of the underlying hash, `Nh` in RFC 9180 notation.
    pub n_h: usize,
}

impl KdfId {
    pub const fn wire_id(self) -> u16 {
        match self {
            KdfId::HkdfSha256 => 0x0001,
            KdfId::HkdfSha384 => 0x0002,
            KdfId::HkdfSha512 => 0x0003,
        }
    }

    pub const fn params(self) -> KdfParams {
        match self {
            KdfId::HkdfSha256 => KdfParams {
                id: self.wire_id(),
                n_h: 32,
            },
            KdfId::HkdfSha384 => KdfParams {
                id: self.wire_id(),
                n_h: 48,
            },
            KdfId::HkdfSha512 => KdfParams {
                id: self.wire_id(),
                n_h: 64,
            },
        }
    }
}

impl TryFrom<u16> for KdfId {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self, Error> {
        Ok(match v {
            0x0001 => KdfId::HkdfSha256,
            0x0002 => KdfId::HkdfSha384,
            0x0003 => KdfId::HkdfSha512,
            other => return Err(Error::UnsupportedKdf(other)),
        })
    }
}

/// An AEAD identifier, RFC 9180 §7.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadId {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

#[derive(Debug, Clone, Copy)]
pub struct AeadParams {
    pub id: u16,
    /// Key size in octets, `Nk`.
    pub n_k: usize,
    /// Nonce size in octets, `Nn`.
    pub n_n: usize,
    /// Authentication tag size in octets, `Nt`.
    pub n_t: usize,
}

impl AeadId {
    pub const fn wire_id(self) -> u16 {
        match self {
            AeadId::Aes128Gcm => 0x0001,
            AeadId::Aes256Gcm => 0x0002,
            AeadId::ChaCha20Poly1305 => 0x0003,
        }
    }

    pub const fn params(self) -> AeadParams {
        match self {
            AeadId::Aes128Gcm => AeadParams {
                id: self.wire_id(),
                n_k: 16,
                n_n: 12,
                n_t: 16,
            },
            AeadId::Aes256Gcm => AeadParams {
                id: self.wire_id(),
                n_k: 32,
                n_n: 12,
                n_t: 16,
            },
            AeadId::ChaCha20Poly1305 => AeadParams {
                id: self.wire_id(),
                n_k: 32,
                n_n: 12,
                n_t: 16,
            },
        }
    }
}

impl TryFrom<u16> for AeadId {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self, Error> {
        Ok(match v {
            0x0001 => AeadId::Aes128Gcm,
            0x0002 => AeadId::Aes256Gcm,
            0x0003 => AeadId::ChaCha20Poly1305,
            other => return Err(Error::UnsupportedAead(other)),
        })
    }
}

/// A full HPKE ciphersuite: which KEM, KDF, and AEAD to use together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherSuite {
    pub kem: KemId,
    pub kdf: KdfId,
    pub aead: AeadId,
}

impl CipherSuite {
    pub const fn new(kem: KemId, kdf: KdfId, aead: AeadId) -> Self {
        CipherSuite { kem, kdf, aead }
    }

    pub fn try_from_ids(kem: u16, kdf: u16, aead: u16) -> Result<Self, Error> {
        Ok(CipherSuite {
            kem: KemId::try_from(kem)?,
            kdf: KdfId::try_from(kdf)?,
            aead: AeadId::try_from(aead)?,
        })
    }
}

/// The HPKE mode byte, RFC 9180 §5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Base = 0x00,
    Psk = 0x01,
    Auth = 0x02,
    AuthPsk = 0x03,
}

impl Mode {
    pub const fn requires_psk(self) -> bool {
        matches!(self, Mode::Psk | Mode::AuthPsk)
    }

    pub const fn requires_auth(self) -> bool {
        matches!(self, Mode::Auth | Mode::AuthPsk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kem_ids_round_trip() {
        for kem in [
            KemId::DhkemP256HkdfSha256,
            KemId::DhkemP384HkdfSha384,
            KemId::DhkemP521HkdfSha512,
            KemId::DhkemX25519HkdfSha256,
            KemId::DhkemX448HkdfSha512,
        ] {
            assert_eq!(KemId::try_from(kem.wire_id()).unwrap(), kem);
        }
    }

    #[test]
    fn unknown_kem_is_rejected() {
        assert!(matches!(KemId::try_from(0xffff), Err(Error::UnsupportedKem(0xffff))));
    }

    #[test]
    fn aead_params_match_rfc9180() {
        let p = AeadId::Aes128Gcm.params();
        assert_eq!((p.n_k, p.n_n, p.n_t), (16, 12, 16));
        let p = AeadId::ChaCha20Poly1305.params();
        assert_eq!((p.n_k, p.n_n, p.n_t), (32, 12, 16));
    }
}
