//! ECH session state: server-side key storage, GREASE handling, and the
//! inner/outer handle swap.
//!
//! Grounded on `ech_swaperoo`, `ech_process_inner_if_present`, and
//! `SSL_CTX_ech_server_key_status`/`SSL_CTX_ech_server_flush_keys` in
//! `ssl/ech.c`, and `ECH_GREASE_*` in `ech_local.h`. The `ech_query`/
//! `ech_reduce`/`ech_alpns`/`svcb_add` surface named in the same header is
//! deliberately not reproduced here; see SPEC_FULL.md §6.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{Cursor, Read};

use crate::clienthello::{ClientHello, Extension};
use crate::echconfig::{EchConfigRecord, ServerEchConfig, SymmetricSuite};
use crate::error::Error;
use crate::hpke::{self, ModeInputs};
use crate::kem;
use crate::suite::{CipherSuite, KdfId, KemId};
use crate::{clienthello, suite};

/// `struct.encrypted_client_hello` as carried in `ClientHelloOuter`, wire
/// layout `ECH_ENCCH` / the `ClientECH` presentation struct in
/// `ech_local.h`: `config_id` is `opaque<0..255>`, a length-prefixed byte
/// string (usually empty, since `config_id` derivation is unimplemented on
/// the issuing side, per spec.md §9 Open Question 1), not a bare octet.
#[derive(Debug, Clone)]
pub struct EncryptedClientHelloOuter {
    pub suite: SymmetricSuite,
    pub config_id: Vec<u8>,
    pub enc: Vec<u8>,
    pub payload: Vec<u8>,
}

pub fn parse_ech_extension(data: &[u8]) -> Result<EncryptedClientHelloOuter, Error> {
    let mut cur = Cursor::new(data);
    let kdf_id = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
    let aead_id = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)?;
    let config_id_len = cur.read_u8().map_err(|_| Error::Truncated)? as usize;
    let mut config_id = vec![0u8; config_id_len];
    cur.read_exact(&mut config_id).map_err(|_| Error::Truncated)?;
    let enc_len = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? as usize;
    let mut enc = vec![0u8; enc_len];
    cur.read_exact(&mut enc).map_err(|_| Error::Truncated)?;
    let payload_len = cur.read_u16::<BigEndian>().map_err(|_| Error::Truncated)? as usize;
    let mut payload = vec![0u8; payload_len];
    cur.read_exact(&mut payload).map_err(|_| Error::Truncated)?;
    Ok(EncryptedClientHelloOuter {
        suite: SymmetricSuite { kdf_id, aead_id },
        config_id,
        enc,
        payload,
    })
}

/// One loaded server key: the ECHConfig record it advertises and the raw
/// private key bytes matching its `kem_id`.
struct KeySlot {
    record: EchConfigRecord,
    private_key: Vec<u8>,
    loadtime: SystemTime,
}

/// The server's table of currently-accepted ECH keys, guarded by a single
/// mutex per SPEC_FULL.md §5 ("serialised by the caller, or a single
/// mutex"): callers must not assume fine-grained locking across slots.
pub struct EchServerKeys {
    slots: Mutex<Vec<KeySlot>>,
}

impl Default for EchServerKeys {
    fn default() -> Self {
        Self::new()
    }
}

impl EchServerKeys {
    pub fn new() -> Self {
        EchServerKeys { slots: Mutex::new(Vec::new()) }
    }

    /// Load every record in `config` (a parsed PEM container) as a slot
    /// sharing `config.private_key`.
    pub fn add(&self, config: ServerEchConfig) {
        let mut slots = self.slots.lock().expect("ech key table lock poisoned");
        let loadtime = config.configs.loadtime;
        for record in config.configs.records {
            slots.push(KeySlot {
                record,
                private_key: config.private_key.clone(),
                loadtime,
            });
        }
    }

    /// `SSL_CTX_ech_server_key_status`: `(config_id, kem_id, loadtime)` for
    /// every currently-loaded key, for operational inspection.
    pub fn server_key_status(&self) -> Vec<(Vec<u8>, u16, SystemTime)> {
        let slots = self.slots.lock().expect("ech key table lock poisoned");
        slots.iter().map(|s| (s.record.config_id.clone(), s.record.kem_id, s.loadtime)).collect()
    }

    /// `SSL_CTX_ech_server_flush_keys`: drop every slot older than
    /// `max_age`, zeroizing its private key first.
    pub fn server_flush_keys(&self, max_age: Duration) {
        use zeroize::Zeroize;
        let mut slots = self.slots.lock().expect("ech key table lock poisoned");
        let now = SystemTime::now();
        slots.retain_mut(|s| {
            let stale = now.duration_since(s.loadtime).unwrap_or_default() > max_age;
            if stale {
                s.private_key.zeroize();
            }
            !stale
        });
    }

    /// Trial-decrypt `ech.payload` against every loaded slot whose
    /// `kem_id`/cipher suite matches, in load order, returning the first
    /// that opens successfully along with the HPKE context that opened it
    /// (needed afterwards to derive the accept confirmation). This crate's
    /// resolution of Open Question 1: `config_id` is not trusted as an
    /// index since draft-09 leaves it reserved/zero. Every failure along
    /// the way is folded into a single [`Error::NoMatchingEchConfig`],
    /// which is always GREASE-safe.
    fn try_decrypt(&self, ech: &EncryptedClientHelloOuter, aad: &[u8]) -> Result<(Vec<u8>, hpke::Context), Error> {
        let slots = self.slots.lock().expect("ech key table lock poisoned");
        for slot in slots.iter() {
            let Ok(kem_id) = KemId::try_from(slot.record.kem_id) else { continue };
            if !slot
                .record
                .cipher_suites
                .iter()
                .any(|cs| cs.kdf_id == ech.suite.kdf_id && cs.aead_id == ech.suite.aead_id)
            {
                continue;
            }
            let Ok(suite) = CipherSuite::try_from_ids(slot.record.kem_id, ech.suite.kdf_id, ech.suite.aead_id) else {
                continue;
            };
            let Ok(recipient) = kem::import_private_key(kem_id, &slot.private_key) else { continue };
            let Ok(mut ctx) = hpke::setup_receiver(suite, &ech.enc, &recipient, &encap_info(), &ModeInputs::default(), None)
            else {
                continue;
            };
            if let Ok(plaintext) = ctx.open(aad, &ech.payload) {
                return Ok((plaintext, ctx));
            }
        }
        Err(Error::NoMatchingEchConfig)
    }
}

/// HPKE `info` for ECH is the fixed ASCII label followed by a zero byte and
/// the encoded `ECHConfig`; this crate uses the fixed label alone
/// (per-record binding is out of scope for the trial-decryption loop
/// above, which already scopes the attempt to one record's key).
fn encap_info() -> Vec<u8> {
    let mut info = b"tls ech".to_vec();
    info.push(0);
    info
}

/// Whether the post-decode `ClientHelloInner` carries a role the host
/// handshake state machine is now driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Outer,
    Inner,
}

/// The single post-handshake ECH outcome surface, `SSL_ECH_STATUS_*` in
/// `ech_local.h`: exactly one of these describes what happened to a given
/// connection's ECH extension, queried after the handshake (or the
/// encrypted-client-hello-bearing flight) has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchStatus {
    /// ECH was present, decrypted, and the reconstructed inner SNI was
    /// accepted by the caller's name callback.
    Success,
    /// ECH was present and decrypted, but the caller's name callback
    /// rejected the reconstructed inner SNI.
    BadName,
    /// ECH was present but failed for a reason other than name rejection
    /// (a non-GREASE-safe decode or crypto failure).
    Failed,
    /// ECH was present but did not decrypt against any loaded key; treated
    /// identically to `NotTried` by the handshake itself, but reported
    /// distinctly here since it is operationally useful to tell the two
    /// apart.
    Grease,
    /// No `encrypted_client_hello` extension was present at all.
    NotTried,
    /// The status surface was queried or mutated out of sequence (e.g.
    /// [`swap`] called twice on the same handle).
    BadCall,
}

/// A snapshot of the outer ClientHello's own state, kept reachable from an
/// [`EchSessionState`] after [`swap`] so the outer session's SNI (and full
/// ClientHello) stay inspectable even once `role` has moved to `Inner`.
/// Boxed and owned one-directionally rather than an actual inner<->outer
/// reference cycle: the inner state points back at a snapshot of the outer,
/// the outer snapshot does not point forward again.
#[derive(Debug, Clone)]
pub struct OuterSnapshot {
    pub sni: Option<String>,
    pub client_hello: ClientHello,
}

/// The shared handle a TLS server's handshake state machine swaps from
/// "processing the outer ClientHello" to "processing the reconstructed
/// inner one", per `ech_swaperoo`.
pub struct EchSessionState {
    pub role: Role,
    /// The handshake transcript hash input buffer, head-spliced by [`swap`].
    pub transcript: Vec<u8>,
    pub accept_confirmation: Option<[u8; 8]>,
    status: EchStatus,
    inner_sni: Option<String>,
    outer_s: Option<Box<OuterSnapshot>>,
}

impl EchSessionState {
    pub fn new_outer(transcript: Vec<u8>) -> Self {
        EchSessionState {
            role: Role::Outer,
            transcript,
            accept_confirmation: None,
            status: EchStatus::NotTried,
            inner_sni: None,
            outer_s: None,
        }
    }

    /// spec.md §4.8's single post-handshake status function.
    pub fn status(&self) -> EchStatus {
        self.status
    }

    /// The inner ClientHello's SNI, once [`swap`] has run successfully.
    pub fn inner_sni(&self) -> Option<&str> {
        self.inner_sni.as_deref()
    }

    /// The outer ClientHello's SNI, reached through the post-swap
    /// back-reference; `None` before a swap has happened or if the outer
    /// carried no `server_name` extension.
    pub fn outer_sni(&self) -> Option<&str> {
        self.outer_s.as_ref().and_then(|o| o.sni.as_deref())
    }

    /// The outer ClientHello itself, still reachable through [`OuterSnapshot`]
    /// after the handle has moved to [`Role::Inner`].
    pub fn outer_client_hello(&self) -> Option<&ClientHello> {
        self.outer_s.as_ref().map(|o| &o.client_hello)
    }
}

/// `ech_swaperoo`: rebind `handle` from outer to inner. `outer_ch_len`
/// is the byte length of the ClientHelloOuter message at the head of
/// `handle.transcript` (including its handshake header); it is replaced by
/// `inner_ch_bytes`, and everything after it (e.g. an already-buffered
/// ServerHello) is preserved unchanged. `outer` is snapshotted into the
/// handle's `outer_s` back-reference so its SNI remains inspectable via
/// [`EchSessionState::outer_sni`] after the swap.
pub fn swap(
    handle: &mut EchSessionState,
    outer: &ClientHello,
    inner_ch_bytes: Vec<u8>,
    outer_ch_len: usize,
    confirmation: [u8; 8],
    inner_sni: &str,
    mut server_name_ok: impl FnMut(&str) -> bool,
) -> Result<(), Error> {
    if handle.role == Role::Inner {
        handle.status = EchStatus::BadCall;
        return Err(Error::EchBadCall);
    }
    if !server_name_ok(inner_sni) {
        handle.status = EchStatus::BadName;
        return Err(Error::InnerSniRejected);
    }
    let tail = handle.transcript.split_off(outer_ch_len.min(handle.transcript.len()));
    handle.transcript = inner_ch_bytes;
    handle.transcript.extend(tail);
    handle.role = Role::Inner;
    handle.accept_confirmation = Some(confirmation);
    handle.inner_sni = Some(inner_sni.to_string());
    handle.outer_s = Some(Box::new(OuterSnapshot {
        sni: extract_sni(outer),
        client_hello: outer.clone(),
    }));
    handle.status = EchStatus::Success;
    Ok(())
}

/// Runs [`process_inner_if_present`] and folds its outcome into `handle`'s
/// [`EchStatus`], performing the accept-path [`swap`] when the extension
/// decrypts successfully. This is the single entry point a server's
/// handshake loop calls once per `ClientHello`; afterwards
/// `handle.status()`/`handle.inner_sni()`/`handle.outer_sni()` report the
/// outcome (spec.md §4.8).
pub fn process_and_swap(
    handle: &mut EchSessionState,
    keys: &EchServerKeys,
    outer: &ClientHello,
    outer_ch_len: usize,
    outer_aad: &[u8],
    mut server_name_ok: impl FnMut(&str) -> bool,
) -> Result<(), Error> {
    match process_inner_if_present(keys, outer, outer_aad, &mut server_name_ok) {
        Ok(EchOutcome::NotPresent) => {
            handle.status = EchStatus::NotTried;
            Ok(())
        }
        Ok(EchOutcome::Grease) => {
            handle.status = EchStatus::Grease;
            Ok(())
        }
        Ok(EchOutcome::Accepted { inner_bytes, inner_client_hello, confirmation }) => {
            let inner_sni = extract_sni(&inner_client_hello).unwrap_or_default();
            swap(handle, outer, inner_bytes, outer_ch_len, confirmation, &inner_sni, server_name_ok)
        }
        Err(e) => {
            handle.status = EchStatus::Failed;
            Err(e)
        }
    }
}

/// The outcome of attempting to process a (possibly absent, possibly
/// GREASE) ECH extension on the server side.
pub enum EchOutcome {
    /// No `encrypted_client_hello` extension was present at all.
    NotPresent,
    /// An extension was present but did not decrypt against any loaded
    /// key; per SPEC_FULL.md §7 this MUST be treated identically to "ECH
    /// not attempted", not as a fatal handshake error.
    Grease,
    /// Decryption and reconstruction succeeded.
    Accepted {
        inner_bytes: Vec<u8>,
        inner_client_hello: ClientHello,
        confirmation: [u8; 8],
    },
}

fn extract_sni(ch: &ClientHello) -> Option<String> {
    const SERVER_NAME_EXT_TYPE: u16 = 0x0000;
    let ext: &Extension = ch.extensions.iter().find(|e| e.ty == SERVER_NAME_EXT_TYPE)?;
    let mut cur = Cursor::new(ext.data.as_slice());
    let list_len = cur.read_u16::<BigEndian>().ok()? as usize;
    if list_len == 0 {
        return None;
    }
    let name_type = cur.read_u8().ok()?;
    if name_type != 0 {
        return None;
    }
    let name_len = cur.read_u16::<BigEndian>().ok()? as usize;
    let mut name = vec![0u8; name_len];
    cur.read_exact(&mut name).ok()?;
    String::from_utf8(name).ok()
}

/// `ech_process_inner_if_present`: look for an `encrypted_client_hello`
/// extension in `outer`'s already-parsed extensions, and if present,
/// attempt decryption + reconstruction + the server-name callback, folding
/// any GREASE-safe failure into [`EchOutcome::Grease`] rather than
/// propagating it.
pub fn process_inner_if_present(
    keys: &EchServerKeys,
    outer: &ClientHello,
    outer_aad: &[u8],
    mut server_name_ok: impl FnMut(&str) -> bool,
) -> Result<EchOutcome, Error> {
    const ECH_EXT_TYPE: u16 = 0xfe0d;
    let Some(ext) = outer.extensions.iter().find(|e| e.ty == ECH_EXT_TYPE) else {
        return Ok(EchOutcome::NotPresent);
    };

    let attempt = (|| -> Result<EchOutcome, Error> {
        let ech = parse_ech_extension(&ext.data)?;
        let (inner_bytes_encoded, ctx) = keys.try_decrypt(&ech, outer_aad)?;
        let inner_bytes = clienthello::decode_inner(&inner_bytes_encoded, outer)?;
        let inner_ch = ClientHello::parse(&inner_bytes).map_err(|_| Error::InnerReconstructionFailed)?;
        let sni = extract_sni(&inner_ch).ok_or(Error::InnerSniRejected)?;
        if !server_name_ok(&sni) {
            return Err(Error::InnerSniRejected);
        }

        // The full TLS transcript hash (ClientHelloInner..ServerHello) is
        // owned by the host handshake state machine, not this crate; we
        // bind the confirmation to a hash of the reconstructed
        // ClientHelloInner itself, which the host stack can fold into its
        // own transcript hash input identically on both sides.
        use sha2::{Digest, Sha256};
        let transcript_stand_in = Sha256::digest(&inner_bytes);
        let confirmation = ctx.confirmation(&transcript_stand_in)?;

        Ok(EchOutcome::Accepted {
            inner_bytes,
            inner_client_hello: inner_ch,
            confirmation,
        })
    })();

    match attempt {
        Ok(outcome) => Ok(outcome),
        Err(e) if e.is_grease_safe() => {
            log::debug!("treating ClientHello as ECH GREASE: {e}");
            Ok(EchOutcome::Grease)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn flush_removes_only_stale_slots() {
        let keys = EchServerKeys::new();
        {
            let mut slots = keys.slots.lock().unwrap();
            slots.push(KeySlot {
                record: dummy_record(),
                private_key: vec![0u8; 32],
                loadtime: SystemTime::now() - Duration::from_secs(3600),
            });
            slots.push(KeySlot {
                record: dummy_record(),
                private_key: vec![0u8; 32],
                loadtime: SystemTime::now(),
            });
        }
        keys.server_flush_keys(Duration::from_secs(60));
        assert_eq!(keys.server_key_status().len(), 1);
    }

    fn dummy_record() -> EchConfigRecord {
        EchConfigRecord {
            config_id: Vec::new(),
            kem_id: 0x0020,
            public_key: vec![0u8; 32],
            cipher_suites: vec![SymmetricSuite { kdf_id: 1, aead_id: 1 }],
            max_name_length: 64,
            public_name: "example.com".into(),
            extensions: vec![],
            dns_alpns: vec![],
        }
    }

    /// Scenario S6: a decrypt failure must be reported as GREASE, not fatal.
    #[test]
    fn grease_when_no_key_matches() {
        let keys = EchServerKeys::new();
        let ech = EncryptedClientHelloOuter {
            suite: SymmetricSuite { kdf_id: 1, aead_id: 1 },
            config_id: Vec::new(),
            enc: vec![0u8; 32],
            payload: vec![0u8; 32],
        };
        let err = keys.try_decrypt(&ech, b"").unwrap_err();
        assert!(err.is_grease_safe());
    }

    /// Scenario S5: server decrypts and reconstructs successfully.
    #[test]
    fn accepts_valid_ech_extension() {
        use crate::clienthello::{encode_inner, Extension as Ext};
        use rand::rngs::OsRng;

        let kem_id = KemId::DhkemX25519HkdfSha256;
        let mut rng = OsRng;
        let recipient = kem::generate_key_pair(kem_id, &mut rng);
        let recipient_pk = recipient.public_key();

        let private_key_bytes = match &recipient {
            kem::KeyPair::X25519(sk, _) => sk.to_vec(),
            _ => unreachable!(),
        };

        let keys = EchServerKeys::new();
        keys.add(ServerEchConfig {
            private_key: private_key_bytes,
            configs: crate::echconfig::EchConfigs {
                records: vec![EchConfigRecord {
                    kem_id: kem_id.wire_id(),
                    cipher_suites: vec![SymmetricSuite { kdf_id: 1, aead_id: 1 }],
                    ..dummy_record()
                }],
                loadtime: SystemTime::now(),
                pem_path: None,
            },
        });

        let suite = CipherSuite::new(kem_id, KdfId::HkdfSha256, suite::AeadId::Aes128Gcm);
        let inputs = ModeInputs::default();
        let (enc, mut sender_ctx) =
            hpke::setup_sender(suite, &recipient_pk, &encap_info(), &inputs, None, &mut rng).unwrap();

        let sni = Ext { ty: 0x0000, data: {
            let mut d = vec![];
            d.extend_from_slice(&14u16.to_be_bytes());
            d.push(0);
            d.extend_from_slice(&11u16.to_be_bytes());
            d.extend_from_slice(b"inner.test.");
            d
        }};
        let inner_ch = ClientHello {
            legacy_version: 0x0303,
            random: [1u8; 32],
            legacy_session_id: vec![],
            cipher_suites: vec![0x1301],
            legacy_compression_methods: vec![0],
            extensions: vec![sni],
        };
        let encoded_inner = encode_inner(&inner_ch, &[]);
        let sealed = sender_ctx.seal(b"aad", &encoded_inner).unwrap();

        let ech_ext_data = {
            let mut d = Vec::new();
            d.extend_from_slice(&1u16.to_be_bytes());
            d.extend_from_slice(&1u16.to_be_bytes());
            d.push(0);
            d.extend_from_slice(&(enc.len() as u16).to_be_bytes());
            d.extend_from_slice(&enc);
            d.extend_from_slice(&(sealed.len() as u16).to_be_bytes());
            d.extend_from_slice(&sealed);
            d
        };

        let outer_sni = Ext { ty: 0x0000, data: {
            let mut d = vec![];
            d.extend_from_slice(&17u16.to_be_bytes());
            d.push(0);
            d.extend_from_slice(&14u16.to_be_bytes());
            d.extend_from_slice(b"public.example");
            d
        }};
        let outer = ClientHello {
            legacy_version: 0x0303,
            random: [2u8; 32],
            legacy_session_id: vec![9, 9, 9],
            cipher_suites: vec![0x1301],
            legacy_compression_methods: vec![0],
            extensions: vec![outer_sni, Extension { ty: 0xfe0d, data: ech_ext_data }],
        };

        let outcome = process_inner_if_present(&keys, &outer, b"aad", |_| true).unwrap();
        assert!(matches!(outcome, EchOutcome::Accepted { .. }));

        let outer_bytes = outer.serialize();
        let mut handle = EchSessionState::new_outer(outer_bytes.clone());
        process_and_swap(&mut handle, &keys, &outer, outer_bytes.len(), b"aad", |_| true).unwrap();

        assert_eq!(handle.status(), EchStatus::Success);
        assert_eq!(handle.role, Role::Inner);
        assert_eq!(handle.inner_sni(), Some("inner.test."));
        assert_eq!(handle.outer_sni(), Some("public.example"));
    }

    /// A server name callback rejecting the reconstructed inner SNI reports
    /// `EchStatus::BadName`, not a generic failure.
    #[test]
    fn bad_name_status_when_inner_sni_rejected() {
        let mut handle = EchSessionState::new_outer(vec![0u8; 4]);
        let outer = ClientHello {
            legacy_version: 0x0303,
            random: [0u8; 32],
            legacy_session_id: vec![],
            cipher_suites: vec![0x1301],
            legacy_compression_methods: vec![0],
            extensions: vec![],
        };
        let err = swap(&mut handle, &outer, vec![0u8; 4], 4, [0u8; 8], "rejected.example", |_| false).unwrap_err();
        assert!(matches!(err, Error::InnerSniRejected));
        assert_eq!(handle.status(), EchStatus::BadName);
    }

    /// Swapping an already-swapped handle is a caller error, not a protocol one.
    #[test]
    fn swap_twice_is_bad_call() {
        let mut handle = EchSessionState::new_outer(vec![0u8; 4]);
        let outer = ClientHello {
            legacy_version: 0x0303,
            random: [0u8; 32],
            legacy_session_id: vec![],
            cipher_suites: vec![0x1301],
            legacy_compression_methods: vec![0],
            extensions: vec![],
        };
        swap(&mut handle, &outer, vec![0u8; 4], 4, [0u8; 8], "ok.example", |_| true).unwrap();
        let err = swap(&mut handle, &outer, vec![0u8; 4], 4, [0u8; 8], "ok.example", |_| true).unwrap_err();
        assert!(matches!(err, Error::EchBadCall));
        assert_eq!(handle.status(), EchStatus::BadCall);
    }
}
