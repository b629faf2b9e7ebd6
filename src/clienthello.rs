//! Inner/outer ClientHello codec: the `outer_extensions` compression
//! extension used to shrink `ClientHelloInner` before HPKE-sealing it, and
//! the server-side splice that reconstructs the real inner ClientHello.
//!
//! Grounded on `ech_encode_inner`/`ech_decode_inner`/`ech_same_ext` in
//! `ssl/ech.c`: byte offset 38 is where `legacy_session_id` starts (a
//! 4-byte handshake header, 2-byte `legacy_version`, 32-byte `random`), the
//! overall handshake length lives at handshake bytes `1..4`, and a
//! duplicate or missing outer extension referenced by `outer_extensions` is
//! rejected before any splicing happens (`found_outers != n_outers`).

use std::io::{Cursor, Read};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::Error;

/// `ExtensionType` assigned for the ECH `outer_extensions` compression
/// extension.
pub const OUTER_EXTENSIONS_TYPE: u16 = 0xfd00;

const HANDSHAKE_HEADER_LEN: usize = 4;
const CLIENT_HELLO_MSG_TYPE: u8 = 1;

/// `legacy_session_id` is `opaque<0..32>`, TLS 1.3 §4.1.2.
const MAX_SESSION_ID_LEN: usize = 32;

/// Maximum number of extension types an `outer_extensions` marker may list,
/// `ECH_OUTERS_MAX`: zero or more than this many is a fatal decode error,
/// not a structurally-valid-but-unusual extension.
const ECH_OUTERS_MAX: usize = 10;

/// One TLS `Extension { extension_type, extension_data<0..2^16-1> }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub ty: u16,
    pub data: Vec<u8>,
}

/// A parsed TLS 1.3 `ClientHello`, handshake header included, so that
/// re-serializing it recomputes both length fields automatically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    pub legacy_version: u16,
    pub random: [u8; 32],
    pub legacy_session_id: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub legacy_compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn parse(full: &[u8]) -> Result<Self, Error> {
        if full.len() < HANDSHAKE_HEADER_LEN {
            return Err(Error::Truncated);
        }
        let declared_len = u32::from_be_bytes([0, full[1], full[2], full[3]]) as usize;
        if declared_len != full.len() - HANDSHAKE_HEADER_LEN {
            return Err(Error::LengthMismatch);
        }

        let mut cur = Cursor::new(&full[HANDSHAKE_HEADER_LEN..]);
        let legacy_version = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
        let mut random = [0u8; 32];
        cur.read_exact(&mut random).map_err(|_| Error::Truncated)?;

        let session_id_len = cur.read_u8().map_err(|_| Error::Truncated)? as usize;
        if session_id_len > MAX_SESSION_ID_LEN {
            log::debug!("legacy_session_id length {session_id_len} exceeds {MAX_SESSION_ID_LEN}");
            return Err(Error::SessionIdTooLong);
        }
        let mut legacy_session_id = vec![0u8; session_id_len];
        cur.read_exact(&mut legacy_session_id).map_err(|_| Error::Truncated)?;

        let cs_len = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? as usize;
        if cs_len % 2 != 0 {
            return Err(Error::LengthMismatch);
        }
        let mut cipher_suites = Vec::with_capacity(cs_len / 2);
        for _ in 0..cs_len / 2 {
            cipher_suites.push(cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?);
        }

        let comp_len = cur.read_u8().map_err(|_| Error::Truncated)? as usize;
        let mut legacy_compression_methods = vec![0u8; comp_len];
        cur.read_exact(&mut legacy_compression_methods).map_err(|_| Error::Truncated)?;

        let ext_block_len = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? as usize;
        let mut ext_block = vec![0u8; ext_block_len];
        cur.read_exact(&mut ext_block).map_err(|_| Error::Truncated)?;
        let extensions = parse_extensions(&ext_block)?;

        Ok(ClientHello {
            legacy_version,
            random,
            legacy_session_id,
            cipher_suites,
            legacy_compression_methods,
            extensions,
        })
    }

    /// Serialize back to wire bytes, handshake header included, patching
    /// the overall handshake length and the extensions-block length.
    pub fn serialize(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.legacy_version.to_be_bytes());
        body.extend_from_slice(&self.random);
        body.push(self.legacy_session_id.len() as u8);
        body.extend_from_slice(&self.legacy_session_id);
        body.extend_from_slice(&((self.cipher_suites.len() * 2) as u16).to_be_bytes());
        for cs in &self.cipher_suites {
            body.extend_from_slice(&cs.to_be_bytes());
        }
        body.push(self.legacy_compression_methods.len() as u8);
        body.extend_from_slice(&self.legacy_compression_methods);

        let mut ext_block = Vec::new();
        for ext in &self.extensions {
            ext_block.extend_from_slice(&ext.ty.to_be_bytes());
            ext_block.extend_from_slice(&(ext.data.len() as u16).to_be_bytes());
            ext_block.extend_from_slice(&ext.data);
        }
        body.extend_from_slice(&(ext_block.len() as u16).to_be_bytes());
        body.extend_from_slice(&ext_block);

        let mut full = Vec::with_capacity(HANDSHAKE_HEADER_LEN + body.len());
        full.push(CLIENT_HELLO_MSG_TYPE);
        let len = body.len() as u32;
        full.extend_from_slice(&len.to_be_bytes()[1..]);
        full.extend_from_slice(&body);
        full
    }
}

fn parse_extensions(block: &[u8]) -> Result<Vec<Extension>, Error> {
    let mut cur = Cursor::new(block);
    let mut out = Vec::new();
    let end = block.len() as u64;
    while cur.position() < end {
        let ty = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
        let len = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? as usize;
        let mut data = vec![0u8; len];
        cur.read_exact(&mut data).map_err(|_| Error::Truncated)?;
        out.push(Extension { ty, data });
    }
    Ok(out)
}

fn encode_outer_extensions_list(types: &[u16]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(types.len() * 2);
    for ty in types {
        payload.extend_from_slice(&ty.to_be_bytes());
    }
    let mut data = Vec::with_capacity(1 + payload.len());
    data.push(payload.len() as u8);
    data.extend(payload);
    data
}

fn decode_outer_extensions_list(data: &[u8]) -> Result<Vec<u16>, Error> {
    if data.is_empty() {
        return Err(Error::Truncated);
    }
    let len = data[0] as usize;
    if data.len() != 1 + len || len % 2 != 0 {
        return Err(Error::LengthMismatch);
    }
    let n = len / 2;
    if n < 1 || n > ECH_OUTERS_MAX {
        log::debug!("outer_extensions named {n} types, outside 1..={ECH_OUTERS_MAX}");
        return Err(Error::EchOutersOutOfRange);
    }
    let mut cur = Cursor::new(&data[1..]);
    let mut out = Vec::with_capacity(n);
    while (cur.position() as usize) < len {
        out.push(cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?);
    }
    Ok(out)
}

/// `ech_encode_inner`: build `EncodedClientHelloInner`. `legacy_session_id`
/// is always emitted empty (the real one lives only in the outer
/// ClientHello and is spliced back in by [`decode_inner`]). Every
/// extension whose type appears in `compress_types` is removed from its
/// position and replaced, at the position of the first one encountered, by
/// a single `outer_extensions` extension listing those types in order.
pub fn encode_inner(inner: &ClientHello, compress_types: &[u16]) -> Vec<u8> {
    let mut new_extensions = Vec::with_capacity(inner.extensions.len());
    let mut inserted = false;
    for ext in &inner.extensions {
        if compress_types.contains(&ext.ty) {
            if !inserted {
                new_extensions.push(Extension {
                    ty: OUTER_EXTENSIONS_TYPE,
                    data: encode_outer_extensions_list(compress_types),
                });
                inserted = true;
            }
            continue;
        }
        new_extensions.push(ext.clone());
    }

    let encoded = ClientHello {
        legacy_session_id: Vec::new(),
        extensions: new_extensions,
        ..inner.clone()
    };
    encoded.serialize()
}

/// `ech_decode_inner`: reconstruct the real `ClientHelloInner` wire bytes
/// from the `EncodedClientHelloInner` bytes HPKE decrypted and the already
/// (successfully) parsed outer `ClientHello`.
///
/// For every type named by the `outer_extensions` marker, exactly one
/// extension of that type must exist in the outer's extension list: zero
/// matches is [`Error::OuterExtensionMissing`], more than one is
/// [`Error::DuplicateOuterExtension`] (the `found_outers != n_outers`
/// check in the original source collapses both cases into one failure; we
/// keep them distinguishable since both are structural and non-fatal to
/// the overall handshake — the caller treats either as "ECH not applied").
pub fn decode_inner(encoded: &[u8], outer: &ClientHello) -> Result<Vec<u8>, Error> {
    let mut inner = ClientHello::parse(encoded).map_err(|e| {
        log::debug!("reconstructed ClientHelloInner failed to parse: {e}");
        Error::InnerReconstructionFailed
    })?;
    inner.legacy_session_id = outer.legacy_session_id.clone();

    let mut spliced = Vec::with_capacity(inner.extensions.len());
    for ext in inner.extensions {
        if ext.ty != OUTER_EXTENSIONS_TYPE {
            spliced.push(ext);
            continue;
        }
        let requested = decode_outer_extensions_list(&ext.data)?;
        for ty in requested {
            let matches: Vec<&Extension> = outer.extensions.iter().filter(|e| e.ty == ty).collect();
            match matches.len() {
                0 => {
                    log::debug!("outer ClientHello is missing extension type {ty:#06x} named by outer_extensions");
                    return Err(Error::OuterExtensionMissing(ty));
                }
                1 => spliced.push(matches[0].clone()),
                _ => {
                    log::debug!("outer ClientHello has extension type {ty:#06x} more than once");
                    return Err(Error::DuplicateOuterExtension(ty));
                }
            }
        }
    }
    inner.extensions = spliced;
    Ok(inner.serialize())
}
