//! HPKE (RFC 9180) and Encrypted ClientHello (ECH) primitives: a
//! ciphersuite-agnostic HPKE context plus the wire codecs and session
//! plumbing a TLS 1.3 stack needs to offer ECH.
//!
//! The crate is organized bottom-up: [`suite`] and [`hkdf`] are the
//! algorithm-identifier and key-derivation primitives everything else is
//! built on; [`aead`] and [`kem`] are the two halves of an HPKE
//! ciphersuite; [`hpke`] combines them into `Setup{S,R}`/`Seal`/`Open`/
//! `Export`; [`echconfig`] and [`clienthello`] are the ECH-specific wire
//! formats; [`session`] is the server-side orchestration tying HPKE and
//! the ClientHello codec together.

pub mod aead;
pub mod clienthello;
pub mod echconfig;
pub mod error;
pub mod hkdf;
pub mod hpke;
pub mod kem;
pub mod session;
pub mod suite;

pub use error::{Error, Result};
pub use suite::{AeadId, CipherSuite, KdfId, KemId, Mode};
