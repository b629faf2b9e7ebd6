//! The HPKE context: `KeySchedule`, `Seal`/`Open`/`Export`, and this
//! crate's resolution of Open Question 3 (a real accept-confirmation
//! derivation instead of `ech_calc_accept_confirm`'s stubbed zeros).
//!
//! Follows RFC 9180 §5.1 (`KeySchedule`) and the mode dispatch in
//! `hpke_setup_sender`/`hpke_setup_recipient` in `crypto/hpke.c`.

use rand::{CryptoRng, RngCore};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::aead::AeadKey;
use crate::error::Error;
use crate::hkdf::{self, full_suite_id};
use crate::kem::{self, KeyPair, PublicKey};
use crate::suite::{CipherSuite, Mode};

/// An established HPKE context, after `Setup{Base,PSK,Auth,AuthPSK}{S,R}`.
/// Holds the running AEAD state and the exporter secret; zeroized on drop.
pub struct Context {
    suite: CipherSuite,
    aead: AeadKey,
    exporter_secret: Vec<u8>,
}

impl Drop for Context {
    fn drop(&mut self) {
        self.exporter_secret.zeroize();
    }
}

/// Inputs that vary by mode; `psk`/`psk_id` for PSK and AuthPSK modes,
/// `sender_auth` (the encapsulator's own static key pair, or the
/// decapsulator's expected peer public key) for Auth and AuthPSK modes.
#[derive(Default)]
pub struct ModeInputs<'a> {
    pub psk: &'a [u8],
    pub psk_id: &'a [u8],
}

/// `VerifyPSKInputs`, RFC 9180 §5.1: a mode requiring a PSK must get both
/// `psk` and `psk_id` non-empty; a mode that doesn't must get neither, so a
/// caller-supplied `psk_id` with no matching `psk` (or vice versa) is
/// rejected instead of silently running in Base/Auth mode.
fn verify_psk_inputs(mode: Mode, psk: &[u8], psk_id: &[u8]) -> Result<(), Error> {
    if mode.requires_psk() {
        if psk.is_empty() || psk_id.is_empty() {
            return Err(Error::HpkeBadPsk);
        }
    } else if !psk.is_empty() || !psk_id.is_empty() {
        return Err(Error::HpkeBadPsk);
    }
    Ok(())
}

fn key_schedule(suite: CipherSuite, mode: Mode, shared_secret: &[u8], info: &[u8], inputs: &ModeInputs) -> Result<Context, Error> {
    verify_psk_inputs(mode, inputs.psk, inputs.psk_id)?;

    let suite_id = full_suite_id(suite);
    let kdf = suite.kdf;
    let psk_id_hash = hkdf::labeled_extract(kdf, b"", &suite_id, b"psk_id_hash", inputs.psk_id)?;
    let info_hash = hkdf::labeled_extract(kdf, b"", &suite_id, b"info_hash", info)?;

    let mut key_schedule_context = vec![mode as u8];
    key_schedule_context.extend_from_slice(&psk_id_hash);
    key_schedule_context.extend_from_slice(&info_hash);

    let secret = hkdf::labeled_extract(kdf, shared_secret, &suite_id, b"secret", inputs.psk)?;

    let aead_params = suite.aead.params();
    let key = hkdf::labeled_expand(kdf, &secret, &suite_id, b"key", &key_schedule_context, aead_params.n_k)?;
    let base_nonce = hkdf::labeled_expand(kdf, &secret, &suite_id, b"base_nonce", &key_schedule_context, aead_params.n_n)?;
    let exporter_secret = hkdf::labeled_expand(
        kdf,
        &secret,
        &suite_id,
        b"exp",
        &key_schedule_context,
        suite.kdf.params().n_h,
    )?;

    Ok(Context {
        suite,
        aead: AeadKey::new(suite.aead, key, base_nonce),
        exporter_secret,
    })
}

/// `SetupBaseS`/`SetupPSKS`/`SetupAuthS`/`SetupAuthPSKS`, selected by
/// whether `sender_auth` is `Some` and whether `inputs.psk` is non-empty.
pub fn setup_sender<R: RngCore + CryptoRng>(
    suite: CipherSuite,
    recipient_pk: &PublicKey,
    info: &[u8],
    inputs: &ModeInputs,
    sender_auth: Option<&KeyPair>,
    rng: &mut R,
) -> Result<(Vec<u8>, Context), Error> {
    let mode = mode_for(inputs, sender_auth.is_some());
    let (enc, shared_secret) = kem::encap(suite.kem, recipient_pk, sender_auth, rng)?;
    let ctx = key_schedule(suite, mode, &shared_secret, info, inputs)?;
    Ok((enc, ctx))
}

/// `SetupBaseR`/`SetupPSKR`/`SetupAuthR`/`SetupAuthPSKR`.
pub fn setup_receiver(
    suite: CipherSuite,
    enc: &[u8],
    recipient: &KeyPair,
    info: &[u8],
    inputs: &ModeInputs,
    sender_auth_pk: Option<&PublicKey>,
) -> Result<Context, Error> {
    let mode = mode_for(inputs, sender_auth_pk.is_some());
    let shared_secret = kem::decap(suite.kem, enc, recipient, sender_auth_pk)?;
    key_schedule(suite, mode, &shared_secret, info, inputs)
}

fn mode_for(inputs: &ModeInputs, authed: bool) -> Mode {
    let psk_like = !inputs.psk.is_empty() || !inputs.psk_id.is_empty();
    match (authed, psk_like) {
        (false, false) => Mode::Base,
        (false, true) => Mode::Psk,
        (true, false) => Mode::Auth,
        (true, true) => Mode::AuthPsk,
    }
}

impl Context {
    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    /// `Context.Seal(aad, pt)`.
    pub fn seal(&mut self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        self.aead.seal(aad, plaintext)
    }

    /// `Context.Open(aad, ct)`.
    pub fn open(&mut self, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        self.aead.open(aad, ciphertext)
    }

    /// `Context.Export(exporter_context, len)`, RFC 9180 §5.3.
    pub fn export(&self, exporter_context: &[u8], len: usize) -> Result<Vec<u8>, Error> {
        let suite_id = full_suite_id(self.suite);
        if len > 255 * self.suite.kdf.params().n_h {
            return Err(Error::ExportTooLong);
        }
        hkdf::labeled_expand(self.suite.kdf, &self.exporter_secret, &suite_id, b"sec exporter", exporter_context, len)
    }

    /// The ECH accept-confirmation value: the low 8 octets the server
    /// splices into `ServerHello.random` to signal ECH acceptance, derived
    /// from this context's exporter secret and the inner transcript hash.
    /// Resolves Open Question 3 (see SPEC_FULL.md §4) instead of leaving it
    /// stubbed to zero as `ech_calc_accept_confirm` does today.
    pub fn confirmation(&self, inner_transcript_hash: &[u8]) -> Result<[u8; 8], Error> {
        let suite_id = full_suite_id(self.suite);
        let out = hkdf::labeled_expand(
            self.suite.kdf,
            &self.exporter_secret,
            &suite_id,
            b"ech accept confirmation",
            inner_transcript_hash,
            8,
        )?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(&out);
        Ok(arr)
    }
}

/// Constant-time comparison of a received accept-confirmation value
/// against the one this context computes, to avoid a timing oracle on
/// ECH-acceptance detection.
pub fn confirmation_matches(ctx: &Context, inner_transcript_hash: &[u8], received: &[u8; 8]) -> Result<bool, Error> {
    let expected = ctx.confirmation(inner_transcript_hash)?;
    Ok(bool::from(expected.ct_eq(received)))
}
