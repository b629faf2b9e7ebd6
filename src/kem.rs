//! The KEM engine, RFC 9180 §4.1 and §7.1 (`DHKEM`).
//!
//! Each suite is a plain Diffie-Hellman group plus a fixed
//! serialize/deserialize for its public key; `encap`/`decap` then layer the
//! shared `ExtractAndExpand` derivation from `hpke_do_kem` in the original
//! source on top, including the two-leg concatenation for Auth mode.

use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::error::Error;
use crate::hkdf;
use crate::suite::KemId;

/// A KEM key pair. Each variant stores the native key type of its curve
/// crate rather than raw bytes, so misuse (feeding a P-256 key into the
/// X25519 path) is a type error, not a runtime one.
pub enum KeyPair {
    P256(p256::SecretKey, p256::PublicKey),
    P384(p384::SecretKey, p384::PublicKey),
    P521(p521::SecretKey, p521::PublicKey),
    X25519([u8; 32], [u8; 32]),
    X448(x448::Secret, x448::PublicKey),
}

/// A deserialized peer public key, tagged by suite so `encap`/`decap` can
/// refuse to mix keys across suites.
#[derive(Clone)]
pub enum PublicKey {
    P256(p256::PublicKey),
    P384(p384::PublicKey),
    P521(p521::PublicKey),
    X25519([u8; 32]),
    X448(x448::PublicKey),
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        if let KeyPair::X25519(sk, _) = self {
            sk.zeroize();
        }
    }
}

impl KeyPair {
    pub fn public_key(&self) -> PublicKey {
        match self {
            KeyPair::P256(_, pk) => PublicKey::P256(pk.clone()),
            KeyPair::P384(_, pk) => PublicKey::P384(pk.clone()),
            KeyPair::P521(_, pk) => PublicKey::P521(pk.clone()),
            KeyPair::X25519(_, pk) => PublicKey::X25519(*pk),
            KeyPair::X448(_, pk) => PublicKey::X448(*pk),
        }
    }
}

/// `GenerateKeyPair()`, RFC 9180 §4.1.
pub fn generate_key_pair<R: RngCore + CryptoRng>(kem: KemId, rng: &mut R) -> KeyPair {
    match kem {
        KemId::DhkemP256HkdfSha256 => {
            let sk = p256::SecretKey::random(rng);
            let pk = sk.public_key();
            KeyPair::P256(sk, pk)
        }
        KemId::DhkemP384HkdfSha384 => {
            let sk = p384::SecretKey::random(rng);
            let pk = sk.public_key();
            KeyPair::P384(sk, pk)
        }
        KemId::DhkemP521HkdfSha512 => {
            let sk = p521::SecretKey::random(rng);
            let pk = sk.public_key();
            KeyPair::P521(sk, pk)
        }
        KemId::DhkemX25519HkdfSha256 => {
            let mut sk = [0u8; 32];
            rng.fill_bytes(&mut sk);
            let pk = x25519_dalek_base(&sk);
            KeyPair::X25519(sk, pk)
        }
        KemId::DhkemX448HkdfSha512 => {
            let sk = x448::Secret::new(rng);
            let pk = x448::PublicKey::from(&sk);
            KeyPair::X448(sk, pk)
        }
    }
}

/// Reconstruct a [`KeyPair`] from a raw private-key octet string, the form
/// stored in the server's PEM container (`PRIVATE KEY` block, unwrapped
/// from its PKCS#8 envelope by `src/echconfig.rs`). The public key is
/// recomputed from the private scalar rather than stored, since the PEM
/// container only carries the private half.
pub fn import_private_key(kem: KemId, bytes: &[u8]) -> Result<KeyPair, Error> {
    if bytes.len() != kem.params().n_sk {
        return Err(Error::InvalidKeySize);
    }
    Ok(match kem {
        KemId::DhkemP256HkdfSha256 => {
            let sk = p256::SecretKey::from_slice(bytes).map_err(|_| Error::InvalidKeySize)?;
            let pk = sk.public_key();
            KeyPair::P256(sk, pk)
        }
        KemId::DhkemP384HkdfSha384 => {
            let sk = p384::SecretKey::from_slice(bytes).map_err(|_| Error::InvalidKeySize)?;
            let pk = sk.public_key();
            KeyPair::P384(sk, pk)
        }
        KemId::DhkemP521HkdfSha512 => {
            let sk = p521::SecretKey::from_slice(bytes).map_err(|_| Error::InvalidKeySize)?;
            let pk = sk.public_key();
            KeyPair::P521(sk, pk)
        }
        KemId::DhkemX25519HkdfSha256 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(bytes);
            let pk = x25519_dalek_base(&arr);
            KeyPair::X25519(arr, pk)
        }
        KemId::DhkemX448HkdfSha512 => {
            let mut arr = [0u8; 56];
            arr.copy_from_slice(bytes);
            let sk = x448::Secret::from(arr);
            let pk = x448::PublicKey::from(&sk);
            KeyPair::X448(sk, pk)
        }
    })
}

fn x25519_dalek_base(sk: &[u8; 32]) -> [u8; 32] {
    curve25519_dalek::constants::X25519_BASEPOINT.mul_clamped(*sk).to_bytes()
}

/// `SerializePublicKey()`, RFC 9180 §4.1: SEC1 uncompressed point encoding
/// for the NIST curves, raw little-endian u-coordinate for X25519/X448.
pub fn serialize_public_key(pk: &PublicKey) -> Vec<u8> {
    match pk {
        PublicKey::P256(pk) => pk.to_encoded_point(false).as_bytes().to_vec(),
        PublicKey::P384(pk) => pk.to_encoded_point(false).as_bytes().to_vec(),
        PublicKey::P521(pk) => pk.to_encoded_point(false).as_bytes().to_vec(),
        PublicKey::X25519(pk) => pk.to_vec(),
        PublicKey::X448(pk) => pk.as_bytes().to_vec(),
    }
}

/// `DeserializePublicKey()`, RFC 9180 §4.1.
pub fn deserialize_public_key(kem: KemId, bytes: &[u8]) -> Result<PublicKey, Error> {
    if bytes.len() != kem.params().n_pk {
        return Err(Error::InvalidKeySize);
    }
    Ok(match kem {
        KemId::DhkemP256HkdfSha256 => {
            let point = p256::EncodedPoint::from_bytes(bytes).map_err(|_| Error::InvalidPoint)?;
            PublicKey::P256(Option::from(p256::PublicKey::from_encoded_point(&point)).ok_or(Error::InvalidPoint)?)
        }
        KemId::DhkemP384HkdfSha384 => {
            let point = p384::EncodedPoint::from_bytes(bytes).map_err(|_| Error::InvalidPoint)?;
            PublicKey::P384(Option::from(p384::PublicKey::from_encoded_point(&point)).ok_or(Error::InvalidPoint)?)
        }
        KemId::DhkemP521HkdfSha512 => {
            let point = p521::EncodedPoint::from_bytes(bytes).map_err(|_| Error::InvalidPoint)?;
            PublicKey::P521(Option::from(p521::PublicKey::from_encoded_point(&point)).ok_or(Error::InvalidPoint)?)
        }
        KemId::DhkemX25519HkdfSha256 => {
            let mut arr = [0u8; 32];
            arr.copy_from_slice(bytes);
            PublicKey::X25519(arr)
        }
        KemId::DhkemX448HkdfSha512 => {
            let mut arr = [0u8; 56];
            arr.copy_from_slice(bytes);
            PublicKey::X448(x448::PublicKey::from_bytes(&arr).ok_or(Error::InvalidPoint)?)
        }
    })
}

/// Raw Diffie-Hellman, `DH(skX, pkY)` in RFC 9180 notation. Returns the
/// shared x-coordinate (NIST curves) or u-coordinate (X25519/X448) bytes.
fn dh(own: &KeyPair, peer: &PublicKey) -> Result<Vec<u8>, Error> {
    match (own, peer) {
        (KeyPair::P256(sk, _), PublicKey::P256(pk)) => {
            let shared = p256::ecdh::diffie_hellman(&sk.to_nonzero_scalar(), pk.as_affine());
            Ok(shared.raw_secret_bytes().to_vec())
        }
        (KeyPair::P384(sk, _), PublicKey::P384(pk)) => {
            let shared = p384::ecdh::diffie_hellman(&sk.to_nonzero_scalar(), pk.as_affine());
            Ok(shared.raw_secret_bytes().to_vec())
        }
        (KeyPair::P521(sk, _), PublicKey::P521(pk)) => {
            let shared = p521::ecdh::diffie_hellman(&sk.to_nonzero_scalar(), pk.as_affine());
            Ok(shared.raw_secret_bytes().to_vec())
        }
        (KeyPair::X25519(sk, _), PublicKey::X25519(pk)) => {
            let point = curve25519_dalek::montgomery::MontgomeryPoint(*pk);
            Ok(point.mul_clamped(*sk).to_bytes().to_vec())
        }
        (KeyPair::X448(sk, _), PublicKey::X448(pk)) => {
            let shared = sk.as_diffie_hellman(pk).ok_or(Error::InvalidPoint)?;
            Ok(shared.as_bytes().to_vec())
        }
        _ => Err(Error::InvalidMode),
    }
}

fn kem_suite_hkdf(kem: KemId) -> (crate::suite::KdfId, Vec<u8>) {
    (kem.internal_kdf(), hkdf::kem_suite_id(kem))
}

/// `ExtractAndExpand(dh, kem_context)`, RFC 9180 §4.1.
fn extract_and_expand(kem: KemId, dh_out: &[u8], kem_context: &[u8]) -> Result<Vec<u8>, Error> {
    let (kdf, suite_id) = kem_suite_hkdf(kem);
    let eae_prk = hkdf::labeled_extract(kdf, b"", &suite_id, b"eae_prk", dh_out)?;
    hkdf::labeled_expand(
        kdf,
        &eae_prk,
        &suite_id,
        b"shared_secret",
        kem_context,
        kem.params().n_secret,
    )
}

/// `Encap()`, RFC 9180 §4.1. `sender_auth` is `Some` only in Auth/AuthPSK
/// mode, in which case its DH output is concatenated after the ephemeral
/// leg's, matching `hpke_do_kem`'s two-leg Auth-mode construction.
pub fn encap<R: RngCore + CryptoRng>(
    kem: KemId,
    recipient_pk: &PublicKey,
    sender_auth: Option<&KeyPair>,
    rng: &mut R,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let ephemeral = generate_key_pair(kem, rng);
    let enc = serialize_public_key(&ephemeral.public_key());

    let mut dh_out = dh(&ephemeral, recipient_pk)?;
    if let Some(auth) = sender_auth {
        dh_out.extend(dh(auth, recipient_pk)?);
    }

    let mut kem_context = enc.clone();
    kem_context.extend_from_slice(&serialize_public_key(recipient_pk));
    if let Some(auth) = sender_auth {
        kem_context.extend_from_slice(&serialize_public_key(&auth.public_key()));
    }

    let shared_secret = extract_and_expand(kem, &dh_out, &kem_context)?;
    Ok((enc, shared_secret))
}

/// `Decap()`, RFC 9180 §4.1.
pub fn decap(
    kem: KemId,
    enc: &[u8],
    recipient: &KeyPair,
    sender_auth_pk: Option<&PublicKey>,
) -> Result<Vec<u8>, Error> {
    let sender_ephemeral_pk = deserialize_public_key(kem, enc)?;

    let mut dh_out = dh(recipient, &sender_ephemeral_pk)?;
    if let Some(auth_pk) = sender_auth_pk {
        dh_out.extend(dh(recipient, auth_pk)?);
    }

    let mut kem_context = enc.to_vec();
    kem_context.extend_from_slice(&serialize_public_key(&recipient.public_key()));
    if let Some(auth_pk) = sender_auth_pk {
        kem_context.extend_from_slice(&serialize_public_key(auth_pk));
    }

    extract_and_expand(kem, &dh_out, &kem_context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    fn round_trip(kem: KemId) {
        let mut rng = OsRng;
        let recipient = generate_key_pair(kem, &mut rng);
        let recipient_pk = recipient.public_key();

        let (enc, ss_sender) = encap(kem, &recipient_pk, None, &mut rng).unwrap();
        let ss_recipient = decap(kem, &enc, &recipient, None).unwrap();
        assert_eq!(ss_sender, ss_recipient);
        assert_eq!(ss_sender.len(), kem.params().n_secret);
    }

    #[test]
    fn round_trips_all_kems() {
        round_trip(KemId::DhkemP256HkdfSha256);
        round_trip(KemId::DhkemP384HkdfSha384);
        round_trip(KemId::DhkemP521HkdfSha512);
        round_trip(KemId::DhkemX25519HkdfSha256);
        round_trip(KemId::DhkemX448HkdfSha512);
    }

    #[test]
    fn auth_mode_round_trips() {
        let kem = KemId::DhkemX25519HkdfSha256;
        let mut rng = OsRng;
        let recipient = generate_key_pair(kem, &mut rng);
        let sender = generate_key_pair(kem, &mut rng);
        let sender_pk = sender.public_key();

        let (enc, ss_sender) = encap(kem, &recipient.public_key(), Some(&sender), &mut rng).unwrap();
        let ss_recipient = decap(kem, &enc, &recipient, Some(&sender_pk)).unwrap();
        assert_eq!(ss_sender, ss_recipient);
    }

    #[test]
    fn imported_private_key_matches_generated() {
        let kem = KemId::DhkemX25519HkdfSha256;
        let mut rng = OsRng;
        let kp = generate_key_pair(kem, &mut rng);
        let KeyPair::X25519(sk_bytes, _) = &kp else { unreachable!() };
        let imported = import_private_key(kem, sk_bytes).unwrap();
        assert_eq!(serialize_public_key(&imported.public_key()), serialize_public_key(&kp.public_key()));
    }

    #[test]
    fn public_key_serialization_round_trips() {
        let kem = KemId::DhkemP384HkdfSha384;
        let mut rng = OsRng;
        let kp = generate_key_pair(kem, &mut rng);
        let bytes = serialize_public_key(&kp.public_key());
        assert_eq!(bytes.len(), kem.params().n_pk);
        deserialize_public_key(kem, &bytes).unwrap();
    }
}
