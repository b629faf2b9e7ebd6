//! `ECHConfig`/`ECHConfigList` wire codec, presentation-format detection,
//! and the PEM container format for server-side key storage.
//!
//! Grounded on `ECHConfigs_from_binary`, `ech_guess_fmt`,
//! `ech_base64_decode`, `local_decode_rdata_name`, and `ech_readpemfile` in
//! `ssl/ech.c`, and the struct layout in `ech_local.h`
//! (`ECH_MIN_ECHCONFIG_LEN`/`ECH_MAX_ECHCONFIG_LEN` = 32/512). The
//! `Opaque<MIN,MAX>`-newtype and "unknown version -> skip, don't fail"
//! idiom follows `ogham-dog`'s `ech-config` crate.

use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::time::SystemTime;

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::Error;

/// The only `ECHConfig.version` this crate parses; any other value is
/// skipped over (its `length` bytes discarded) rather than rejected,
/// matching `ECHConfigs_from_binary`'s `continue` branch.
pub const ECH_CONFIG_VERSION_DRAFT09: u16 = 0xff09;

pub const ECH_MIN_ECHCONFIG_LEN: usize = 32;
pub const ECH_MAX_ECHCONFIG_LEN: usize = 512;

/// One parsed `HpkeSymmetricCipherSuite`: a (KDF, AEAD) pair this config
/// offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricSuite {
    pub kdf_id: u16,
    pub aead_id: u16,
}

/// One parsed, supported-version `ECHConfig` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchConfigRecord {
    /// `config_id`, `opaque<0..255>` (ech_local.h's `ECHConfig.config_id`):
    /// not present on the wire, left empty by `ECHConfigs_from_binary`
    /// ("Calculate config_id value for this one / TODO: really do it"),
    /// per spec.md §9 Open Question 1.
    pub config_id: Vec<u8>,
    pub kem_id: u16,
    pub public_key: Vec<u8>,
    pub cipher_suites: Vec<SymmetricSuite>,
    pub max_name_length: u16,
    pub public_name: String,
    /// Raw `(type, value)` extension pairs not otherwise interpreted.
    pub extensions: Vec<(u16, Vec<u8>)>,
    /// ALPN protocol ids, if an HTTPS/SVCB record this config was parsed
    /// out of carried an `alpn` SvcParam (best-effort, not exhaustive:
    /// general DNS/SVCB handling is a Non-goal).
    pub dns_alpns: Vec<String>,
}

/// A parsed `ECHConfigList`, plus the freshness bookkeeping
/// `ech_readpemfile` tracks per loaded file (`SSL_ECH.loadtime` in
/// `ech_local.h`).
#[derive(Debug, Clone)]
pub struct EchConfigs {
    pub records: Vec<EchConfigRecord>,
    pub loadtime: SystemTime,
    pub pem_path: Option<PathBuf>,
}

fn read_len_prefixed_u16(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>, Error> {
    let len = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? as usize;
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf).map_err(|_| Error::Truncated)?;
    Ok(buf)
}

fn read_len_prefixed_u8(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>, Error> {
    let len = cur.read_u8().map_err(|_| Error::Truncated)? as usize;
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf).map_err(|_| Error::Truncated)?;
    Ok(buf)
}

fn parse_record_contents(content: &[u8]) -> Result<EchConfigRecord, Error> {
    let mut cur = Cursor::new(content);

    // Field order and widths follow `ECHConfigs_from_binary` exactly:
    // public_name and public_key are both u16-length-prefixed, kem_id
    // comes after the public key (not before it), and maximum_name_length
    // is a full u16, not a single octet.
    let public_name_bytes = read_len_prefixed_u16(&mut cur)?;
    if public_name_bytes.is_empty() || public_name_bytes.len() > 255 {
        return Err(Error::LengthMismatch);
    }
    let public_name = String::from_utf8(public_name_bytes).map_err(|_| Error::Truncated)?;

    let public_key = read_len_prefixed_u16(&mut cur)?;

    let kem_id = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;

    let cs_bytes = read_len_prefixed_u16(&mut cur)?;
    if cs_bytes.is_empty() || cs_bytes.len() % 4 != 0 {
        return Err(Error::LengthMismatch);
    }
    let mut cipher_suites = Vec::with_capacity(cs_bytes.len() / 4);
    let mut cs_cur = Cursor::new(cs_bytes.as_slice());
    while (cs_cur.position() as usize) < cs_bytes.len() {
        let kdf_id = cs_cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
        let aead_id = cs_cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
        cipher_suites.push(SymmetricSuite { kdf_id, aead_id });
    }

    let max_name_length = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;

    let ext_bytes = read_len_prefixed_u16(&mut cur)?;
    let mut extensions = Vec::new();
    let mut dns_alpns = Vec::new();
    let mut ext_cur = Cursor::new(ext_bytes.as_slice());
    while (ext_cur.position() as usize) < ext_bytes.len() {
        let ty = ext_cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
        let value = read_len_prefixed_u16(&mut ext_cur)?;
        const ALPN_EXT_TYPE: u16 = 0x0001;
        if ty == ALPN_EXT_TYPE {
            let mut alpn_cur = Cursor::new(value.as_slice());
            while (alpn_cur.position() as usize) < value.len() {
                let proto = read_len_prefixed_u8(&mut alpn_cur)?;
                if let Ok(s) = String::from_utf8(proto) {
                    dns_alpns.push(s);
                }
            }
        }
        extensions.push((ty, value));
    }

    Ok(EchConfigRecord {
        config_id: Vec::new(),
        kem_id,
        public_key,
        cipher_suites,
        max_name_length,
        public_name,
        extensions,
        dns_alpns,
    })
}

impl EchConfigRecord {
    /// Serialize this record's content back to the wire layout
    /// `parse_record_contents` reads, `ALPN_EXT_TYPE` extensions
    /// reconstructed from `dns_alpns` if that extension wasn't already
    /// present verbatim in `extensions`. Inverse of [`parse_record_contents`]
    /// (Testable Property 4: `parse(serialize(c)) == c`).
    fn serialize_contents(&self) -> Vec<u8> {
        const ALPN_EXT_TYPE: u16 = 0x0001;
        let mut out = Vec::new();
        out.extend_from_slice(&(self.public_name.len() as u16).to_be_bytes());
        out.extend_from_slice(self.public_name.as_bytes());
        out.extend_from_slice(&(self.public_key.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.public_key);
        out.extend_from_slice(&self.kem_id.to_be_bytes());

        let mut cs_bytes = Vec::with_capacity(self.cipher_suites.len() * 4);
        for cs in &self.cipher_suites {
            cs_bytes.extend_from_slice(&cs.kdf_id.to_be_bytes());
            cs_bytes.extend_from_slice(&cs.aead_id.to_be_bytes());
        }
        out.extend_from_slice(&(cs_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&cs_bytes);

        out.extend_from_slice(&self.max_name_length.to_be_bytes());

        let has_alpn_ext = self.extensions.iter().any(|(ty, _)| *ty == ALPN_EXT_TYPE);
        let mut ext_bytes = Vec::new();
        for (ty, value) in &self.extensions {
            ext_bytes.extend_from_slice(&ty.to_be_bytes());
            ext_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
            ext_bytes.extend_from_slice(value);
        }
        if !has_alpn_ext && !self.dns_alpns.is_empty() {
            let mut alpn_value = Vec::new();
            for proto in &self.dns_alpns {
                alpn_value.push(proto.len() as u8);
                alpn_value.extend_from_slice(proto.as_bytes());
            }
            ext_bytes.extend_from_slice(&ALPN_EXT_TYPE.to_be_bytes());
            ext_bytes.extend_from_slice(&(alpn_value.len() as u16).to_be_bytes());
            ext_bytes.extend_from_slice(&alpn_value);
        }
        out.extend_from_slice(&(ext_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(&ext_bytes);
        out
    }

    /// Serialize the full `version || content_length || content` record.
    pub fn serialize(&self) -> Vec<u8> {
        let content = self.serialize_contents();
        let mut out = Vec::with_capacity(4 + content.len());
        out.extend_from_slice(&ECH_CONFIG_VERSION_DRAFT09.to_be_bytes());
        out.extend_from_slice(&(content.len() as u16).to_be_bytes());
        out.extend_from_slice(&content);
        out
    }
}

/// Serialize a list of records back to a complete `ECHConfigList`
/// (2-byte total length, then each record's `serialize()` concatenated).
pub fn serialize_list(records: &[EchConfigRecord]) -> Vec<u8> {
    let mut body = Vec::new();
    for record in records {
        body.extend_from_slice(&record.serialize());
    }
    let mut out = Vec::with_capacity(2 + body.len());
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(&body);
    out
}

/// Parse a raw, already-binary `ECHConfigList`. Unknown `ECHConfig`
/// versions are skipped, not rejected (Testable Property 6); an empty
/// result after skipping is `Error::EchConfigListEmpty`.
pub fn parse_binary(bytes: &[u8]) -> Result<Vec<EchConfigRecord>, Error> {
    let mut cur = Cursor::new(bytes);
    let total_len = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? as usize;
    if total_len != bytes.len() - 2 {
        return Err(Error::LengthMismatch);
    }

    let mut records = Vec::new();
    let end = bytes.len() as u64;
    while cur.position() < end {
        let version = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
        let content_len = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? as usize;
        if version != ECH_CONFIG_VERSION_DRAFT09 {
            let mut skip = vec![0u8; content_len];
            cur.read_exact(&mut skip).map_err(|_| Error::Truncated)?;
            log::trace!("skipping ECHConfig with unsupported version {version:#06x}");
            continue;
        }
        if !(ECH_MIN_ECHCONFIG_LEN..=ECH_MAX_ECHCONFIG_LEN).contains(&(content_len + 4)) {
            return Err(Error::EchConfigTooLong);
        }
        let mut content = vec![0u8; content_len];
        cur.read_exact(&mut content).map_err(|_| Error::Truncated)?;
        records.push(parse_record_contents(&content)?);
    }

    if records.is_empty() {
        return Err(Error::EchConfigListEmpty);
    }
    Ok(records)
}

/// The detected presentation format of a caller-supplied `ECHConfigList`,
/// mirroring `ech_guess_fmt`'s classification in `ssl/ech.c`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Binary,
    AsciiHex,
    Base64,
    HttpsSvcb,
}

/// `AH_alphabet = "0123456789ABCDEFabcdef;"` in the original source: `;` is
/// included in the alphabet itself, since multiple semi-colon separated
/// ascii-hex values are accepted (mirrors the base64 path's own multi-value
/// handling below).
fn is_ascii_hex(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit() || b == b';')
}

/// Detect the presentation format of `input` and decode it down to the raw
/// `ECHConfigList` bytes that [`parse_binary`] expects. Handles the
/// `echconfig=` HTTPS/SVCB presentation form and a `;`-separated list of
/// base64 (or ascii-hex) alternatives, trying each until one parses (the
/// first listed value is typically the newest format).
pub fn detect_and_decode(input: &[u8]) -> Result<Vec<u8>, Error> {
    let as_text = match std::str::from_utf8(input) {
        Ok(s) if s.chars().all(|c| c.is_ascii_graphic() || c == ' ') => Some(s.trim()),
        _ => None,
    };

    let Some(text) = as_text else {
        return Ok(input.to_vec());
    };

    // `ech_guess_fmt`'s `ECH_FMT_HTTPSSVC` branch locates the literal
    // anywhere in the input via `strstr`, not only as a leading prefix, so
    // e.g. `"alpn=h2 echconfig=AAA..."` is still recognized.
    const MARKER: &str = "echconfig=";
    let body = match text.find(MARKER) {
        Some(pos) => &text[pos + MARKER.len()..],
        None => text,
    };

    if is_ascii_hex(body) {
        let mut last_err = Error::UnknownFormat;
        for candidate in body.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            if candidate.len() % 2 != 0 {
                last_err = Error::OddHexLength;
                continue;
            }
            match hex_decode(candidate) {
                Ok(bytes) => return Ok(bytes),
                Err(e) => last_err = e,
            }
        }
        return Err(last_err);
    }

    let mut last_err = Error::UnknownFormat;
    for candidate in body.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        match base64::decode(candidate) {
            Ok(bytes) => return Ok(bytes),
            Err(_) => last_err = Error::Base64Invalid,
        }
    }
    Err(last_err)
}

fn hex_decode(s: &str) -> Result<Vec<u8>, Error> {
    let mut out = Vec::with_capacity(s.len() / 2);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(2) {
        let hi = (chunk[0] as char).to_digit(16).ok_or(Error::UnknownFormat)?;
        let lo = (chunk[1] as char).to_digit(16).ok_or(Error::UnknownFormat)?;
        out.push(((hi << 4) | lo) as u8);
    }
    Ok(out)
}

/// Format-autodetect and parse, the entry point a client-side config
/// loader should call on an opaque blob of unknown provenance.
pub fn load_echconfigs(input: &[u8]) -> Result<EchConfigs, Error> {
    let bytes = detect_and_decode(input)?;
    let records = parse_binary(&bytes)?;
    Ok(EchConfigs {
        records,
        loadtime: SystemTime::now(),
        pem_path: None,
    })
}

/// The `SvcParamKey`s this crate recognizes in an HTTPS/SVCB RDATA walk,
/// `ech_local.h`'s `SVCB_ECH`/`SVCB_ALPN`/`SVCB_NO_DEF_ALPN` equivalents.
const SVCB_KEY_ALPN: u16 = 1;
const SVCB_KEY_NO_DEFAULT_ALPN: u16 = 2;
const SVCB_KEY_ECH: u16 = 5;

/// The SvcParams this crate cares about out of an HTTPS/SVCB RR, everything
/// else is walked over and discarded (mandatory/port/ipv4hint/ipv6hint/
/// unknown keys carry no ECH-relevant information).
#[derive(Debug, Clone, Default)]
pub struct SvcbEchParams {
    /// Raw `ECHConfigList` bytes from the `ech` SvcParam, if present.
    pub ech_config_list: Option<Vec<u8>>,
    pub alpn: Vec<String>,
    pub no_default_alpn: bool,
}

/// Walk past an RFC 1035 §3.1 domain-name label sequence (uncompressed: a
/// bare RDATA blob has no message-wide offset space for a compression
/// pointer to target), returning the number of bytes consumed. Matches
/// `local_decode_rdata_name`'s simple length-prefixed walk.
fn skip_rfc1035_name(cur: &mut Cursor<&[u8]>) -> Result<(), Error> {
    loop {
        let len = cur.read_u8().map_err(|_| Error::Truncated)? as usize;
        if len == 0 {
            return Ok(());
        }
        if len & 0xc0 != 0 {
            // A compression pointer; not expected in a standalone RDATA blob
            // (the caller-supplied resource-record bytes, per spec.md's
            // non-goal of a general DNS resolver), but a well-formed
            // trailing pointer byte still has a defined length.
            cur.read_u8().map_err(|_| Error::Truncated)?;
            return Ok(());
        }
        let mut label = vec![0u8; len];
        cur.read_exact(&mut label).map_err(|_| Error::Truncated)?;
    }
}

/// Parse the RDATA of an HTTPS (or SVCB) resource record: a 2-byte
/// priority, a target name, then a sequence of `SvcParamKey` TLVs. Priority
/// 0 is AliasMode and carries no SvcParams (RFC 9460 §2.4.2); anything else
/// is ServiceMode. Recognizes the `ech`, `alpn`, and `no-default-alpn` keys
/// per spec.md §4.6/§6; every other key's value is skipped over unread.
pub fn parse_https_svcb_rdata(rdata: &[u8]) -> Result<SvcbEchParams, Error> {
    let mut cur = Cursor::new(rdata);
    let priority = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
    skip_rfc1035_name(&mut cur)?;

    let mut out = SvcbEchParams::default();
    if priority == 0 {
        return Ok(out);
    }

    let end = rdata.len() as u64;
    while cur.position() < end {
        let key = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
        let value = read_len_prefixed_u16(&mut cur)?;
        match key {
            SVCB_KEY_ECH => out.ech_config_list = Some(value),
            SVCB_KEY_NO_DEFAULT_ALPN => out.no_default_alpn = true,
            SVCB_KEY_ALPN => {
                let mut alpn_cur = Cursor::new(value.as_slice());
                while (alpn_cur.position() as usize) < value.len() {
                    let proto = read_len_prefixed_u8(&mut alpn_cur)?;
                    if let Ok(s) = String::from_utf8(proto) {
                        out.alpn.push(s);
                    }
                }
            }
            other => log::trace!("ignoring unrecognized SvcParamKey {other}"),
        }
    }
    Ok(out)
}

/// Parse an HTTPS/SVCB RDATA blob and, if it carries an `ech` SvcParam,
/// decode that `ECHConfigList` down to its records, stamping every
/// resulting record's `dns_alpns` with the RR's `alpn` SvcParam (spec.md
/// §6's "HTTPS/SVCB ingest" entry point). Returns `Error::EchConfigListEmpty`
/// via [`parse_binary`] if the RR carries no usable `ech` value.
pub fn load_echconfigs_from_https_rr(rdata: &[u8]) -> Result<EchConfigs, Error> {
    let svcb = parse_https_svcb_rdata(rdata)?;
    let ech_bytes = svcb.ech_config_list.ok_or(Error::EchConfigListEmpty)?;
    let mut records = parse_binary(&ech_bytes)?;
    for record in &mut records {
        record.dns_alpns = svcb.alpn.clone();
    }
    Ok(EchConfigs {
        records,
        loadtime: SystemTime::now(),
        pem_path: None,
    })
}

/// A server's private key plus the public `ECHConfigList` it corresponds
/// to, loaded from the dual-block PEM container (`ech_readpemfile`):
/// a `PRIVATE KEY` block (PKCS#8 DER) followed by an `ECHCONFIG` block
/// (raw `ECHConfigList` bytes).
pub struct ServerEchConfig {
    pub private_key: Vec<u8>,
    pub configs: EchConfigs,
}

/// Load the PEM container at `path`.
pub fn load_pem_file(path: &std::path::Path) -> Result<ServerEchConfig, Error> {
    let text = std::fs::read_to_string(path)?;
    let mut config = load_pem_str(&text)?;
    config.configs.pem_path = Some(path.to_path_buf());
    Ok(config)
}

/// Load the PEM container from an in-memory string (used by tests and by
/// callers who already have the file contents).
pub fn load_pem_str(text: &str) -> Result<ServerEchConfig, Error> {
    let blocks = pem::parse_many(text.as_bytes()).map_err(|_| Error::PemMissingBlock)?;

    let key_block = blocks
        .iter()
        .find(|b| b.tag() == "PRIVATE KEY")
        .ok_or(Error::PemMissingBlock)?;
    let config_block = blocks
        .iter()
        .find(|b| b.tag() == "ECHCONFIG")
        .ok_or(Error::PemMissingBlock)?;

    let key_info = pkcs8::PrivateKeyInfoRef::try_from(key_block.contents()).map_err(|_| Error::Pkcs8Invalid)?;
    let private_key = key_info.private_key.to_vec();

    let records = parse_binary(config_block.contents())?;
    Ok(ServerEchConfig {
        private_key,
        configs: EchConfigs {
            records,
            loadtime: SystemTime::now(),
            pem_path: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_record_bytes() -> Vec<u8> {
        let mut content = Vec::new();
        let name = b"example.com";
        content.extend_from_slice(&(name.len() as u16).to_be_bytes());
        content.extend_from_slice(name);
        let pk = vec![0x11u8; 32];
        content.extend_from_slice(&(pk.len() as u16).to_be_bytes());
        content.extend_from_slice(&pk);
        content.extend_from_slice(&0x0020u16.to_be_bytes()); // kem_id X25519
        let cs = [0x00, 0x01, 0x00, 0x01]; // (kdf=1, aead=1)
        content.extend_from_slice(&(cs.len() as u16).to_be_bytes());
        content.extend_from_slice(&cs);
        content.extend_from_slice(&64u16.to_be_bytes()); // max_name_length
        content.extend_from_slice(&0u16.to_be_bytes()); // no extensions

        let mut record = Vec::new();
        record.extend_from_slice(&ECH_CONFIG_VERSION_DRAFT09.to_be_bytes());
        record.extend_from_slice(&(content.len() as u16).to_be_bytes());
        record.extend_from_slice(&content);
        record
    }

    fn wrap_list(records: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(records.len() as u16).to_be_bytes());
        out.extend_from_slice(records);
        out
    }

    /// Scenario S3: parse a single well-formed draft-09 ECHConfig record.
    #[test]
    fn parses_single_record() {
        let list = wrap_list(&minimal_record_bytes());
        let records = parse_binary(&list).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kem_id, 0x0020);
        assert_eq!(records[0].public_name, "example.com");
        assert_eq!(records[0].cipher_suites, vec![SymmetricSuite { kdf_id: 1, aead_id: 1 }]);
        assert_eq!(records[0].max_name_length, 64);
        assert!(records[0].config_id.is_empty());
    }

    /// Testable Property 4: `parse(serialize(c)) == c` for a hand-built record.
    #[test]
    fn record_round_trips_through_serialize() {
        let list = wrap_list(&minimal_record_bytes());
        let records = parse_binary(&list).unwrap();
        let reserialized = serialize_list(&records);
        let reparsed = parse_binary(&reserialized).unwrap();
        assert_eq!(records, reparsed);
    }

    proptest::proptest! {
        /// Testable Property 4, generalized: any record built from
        /// arbitrary-but-valid fields round-trips through serialize/parse.
        #[test]
        fn echconfig_record_round_trips(
            public_name in "[a-z]{20,40}",
            public_key in proptest::collection::vec(proptest::prelude::any::<u8>(), 32..64),
            kem_id in proptest::prelude::any::<u16>(),
            cipher_suites in proptest::collection::vec(
                (proptest::prelude::any::<u16>(), proptest::prelude::any::<u16>()), 1..4,
            ),
            max_name_length in proptest::prelude::any::<u16>(),
        ) {
            let record = EchConfigRecord {
                config_id: Vec::new(),
                kem_id,
                public_key,
                cipher_suites: cipher_suites
                    .into_iter()
                    .map(|(kdf_id, aead_id)| SymmetricSuite { kdf_id, aead_id })
                    .collect(),
                max_name_length,
                public_name,
                extensions: Vec::new(),
                dns_alpns: Vec::new(),
            };
            let list = serialize_list(std::slice::from_ref(&record));
            let reparsed = parse_binary(&list).unwrap();
            proptest::prop_assert_eq!(reparsed, vec![record]);
        }
    }

    /// Testable Property 6: a legacy/unknown version is skipped, not fatal.
    #[test]
    fn mixed_version_list_skips_unknown() {
        let mut legacy = Vec::new();
        legacy.extend_from_slice(&0xfe0bu16.to_be_bytes()); // older, unsupported draft
        let junk = vec![0xAAu8; 10];
        legacy.extend_from_slice(&(junk.len() as u16).to_be_bytes());
        legacy.extend_from_slice(&junk);
        legacy.extend_from_slice(&minimal_record_bytes());

        let list = wrap_list(&legacy);
        let records = parse_binary(&list).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn all_unknown_versions_is_empty_list_error() {
        let mut legacy = Vec::new();
        legacy.extend_from_slice(&0xfe0bu16.to_be_bytes());
        legacy.extend_from_slice(&(0u16).to_be_bytes());
        let list = wrap_list(&legacy);
        assert!(matches!(parse_binary(&list), Err(Error::EchConfigListEmpty)));
    }

    /// Testable Property 8: odd-nibble ascii-hex is rejected cleanly.
    #[test]
    fn odd_hex_length_is_rejected() {
        assert!(matches!(detect_and_decode(b"abc"), Err(Error::OddHexLength)));
    }

    #[test]
    fn https_presentation_form_is_decoded() {
        let list = wrap_list(&minimal_record_bytes());
        let b64 = base64::encode(&list);
        let presentation = format!("echconfig={b64}");
        let decoded = detect_and_decode(presentation.as_bytes()).unwrap();
        assert_eq!(decoded, list);
    }

    /// `echconfig=` need not be the first thing in the input, `strstr`-style.
    #[test]
    fn https_presentation_marker_found_mid_string() {
        let list = wrap_list(&minimal_record_bytes());
        let b64 = base64::encode(&list);
        let presentation = format!("alpn=h2 echconfig={b64}");
        let decoded = detect_and_decode(presentation.as_bytes()).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn semicolon_separated_ascii_hex_alternatives() {
        let list = wrap_list(&minimal_record_bytes());
        let hex = hex::encode(&list);
        let presentation = format!("notvalidhex!!;{hex}");
        let decoded = detect_and_decode(presentation.as_bytes()).unwrap();
        assert_eq!(decoded, list);
    }

    #[test]
    fn semicolon_separated_alternatives_first_valid_wins() {
        let list = wrap_list(&minimal_record_bytes());
        let b64 = base64::encode(&list);
        let presentation = format!("not-base64-at-all!!; {b64}");
        let decoded = detect_and_decode(presentation.as_bytes()).unwrap();
        assert_eq!(decoded, list);
    }

    /// HTTPS RR RDATA carrying `alpn`, `ipv4hint` (ignored), and `ech`
    /// SvcParams, modeled on the pack's `ech_param` wire fixture for the
    /// same RR shape (cloudflare-esni.com, draft `0xfe0d` ECHConfig).
    #[test]
    fn https_svcb_rdata_extracts_ech_and_alpn() {
        let rdata: &[u8] = &[
            0, 1, // priority: 1 (ServiceMode)
            0x00, // target: root
            0, 1, // param: alpn
            0, 3, // param: len = 3
            2, 104, 50, // "h2"
            0, 4, // param: ipv4hint (ignored)
            0, 8, // param: len = 8
            162, 159, 135, 79, 162, 159, 136, 79,
            0, 5, // param: ech
            0, 72, // param: len = 72
            0, 70, // echconfiglist: len = 70
            254, 13, // config version: 0xfe0d (unsupported here, still walked)
            0, 66, // config len
            63, // config id
            0, 32, 0, 32, // hpke stuff
            40, 38, 25, 12, 212, 168, 183, 42, 218, 32, 41, 154, 44, 61, 152, 136, 131, 114, 86, 111, 194, 66, 154,
            114, 231, 170, 205, 83, 72, 105, 105, 119, // public_key
            0, 4, // cipher suites len
            0, 1, 0, 1, // cipher suites
            0, 19, // public name len
            99, 108, 111, 117, 100, 102, 108, 97, 114, 101, 45, 101, 115, 110, 105, 46, 99, 111, 109,
            0, 0, // extensions len
        ];

        let parsed = parse_https_svcb_rdata(rdata).unwrap();
        assert_eq!(parsed.alpn, vec!["h2".to_string()]);
        assert!(!parsed.no_default_alpn);
        let ech = parsed.ech_config_list.unwrap();
        assert_eq!(ech.len(), 72);
        // The embedded list uses the old draft version tag (0xfe0d), which
        // this crate's ECHConfig.version check doesn't accept, so re-parsing
        // it down to records correctly yields "no supported records".
        assert!(matches!(parse_binary(&ech), Err(Error::EchConfigListEmpty)));
    }

    #[test]
    fn alias_mode_svcb_has_no_params() {
        let rdata: &[u8] = &[0, 0, 0x00, 0, 3, 0, 2, 0x01, 0xbb];
        let parsed = parse_https_svcb_rdata(rdata).unwrap();
        assert!(parsed.ech_config_list.is_none());
        assert!(parsed.alpn.is_empty());
    }

    #[test]
    fn load_from_https_rr_stamps_dns_alpns() {
        let mut list = wrap_list(&minimal_record_bytes());
        // Re-tag as 0xff09 is already the default; build an RDATA around it.
        let mut rdata = Vec::new();
        rdata.extend_from_slice(&1u16.to_be_bytes()); // priority
        rdata.push(0); // root target
        rdata.extend_from_slice(&SVCB_KEY_ALPN.to_be_bytes());
        let alpn_value = { let mut v = vec![2u8]; v.extend_from_slice(b"h2"); v };
        rdata.extend_from_slice(&(alpn_value.len() as u16).to_be_bytes());
        rdata.extend_from_slice(&alpn_value);
        rdata.extend_from_slice(&SVCB_KEY_ECH.to_be_bytes());
        rdata.extend_from_slice(&(list.len() as u16).to_be_bytes());
        rdata.append(&mut list);

        let configs = load_echconfigs_from_https_rr(&rdata).unwrap();
        assert_eq!(configs.records.len(), 1);
        assert_eq!(configs.records[0].dns_alpns, vec!["h2".to_string()]);
    }
}
