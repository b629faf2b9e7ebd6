//! Error types shared by the HPKE and ECH layers.

use displaydoc::Display;

/// Every way a call into this crate can fail.
///
/// One variant per error kind named by the HPKE/ECH wire formats; no
/// variant carries secret material, so these are safe to log or return to
/// a peer (though most HPKE/ECH failures should be treated as non-fatal by
/// the caller, see [`Error::is_grease_safe`]).
#[derive(Debug, Display)]
pub enum Error {
    /// unsupported or unrecognized KEM identifier: {0:#06x}
    UnsupportedKem(u16),
    /// unsupported or unrecognized KDF identifier: {0:#06x}
    UnsupportedKdf(u16),
    /// unsupported or unrecognized AEAD identifier: {0:#06x}
    UnsupportedAead(u16),
    /// the requested HPKE mode is not valid for this suite
    InvalidMode,
    /// PSK and PSK ID must either both be present or both be absent
    HpkeBadPsk,
    /// public or private key has the wrong length for this KEM
    InvalidKeySize,
    /// a deserialized point is not a valid curve point
    InvalidPoint,
    /// AEAD seal or open failed (bad tag, wrong key, or wrong nonce)
    AeadBadTag,
    /// AEAD ciphertext is shorter than the suite's authentication tag
    AeadBadLength,
    /// the AEAD sequence number space for this context is exhausted
    SequenceOverflow,
    /// export requested more bytes than the KDF can safely produce
    ExportTooLong,
    /// HKDF label-assembly buffer would exceed its fixed-size bound
    HkdfOverflow,
    /// truncated or malformed wire encoding
    Truncated,
    /// length field does not match actual payload length
    LengthMismatch,
    /// ECHConfig content length exceeds ECH_MAX_ECHCONFIG_LEN
    EchConfigTooLong,
    /// ECHConfigs list contains zero parseable records
    EchConfigListEmpty,
    /// could not detect the presentation format of the input
    UnknownFormat,
    /// ascii-hex input has an odd number of nibbles
    OddHexLength,
    /// base64 decoding failed
    Base64Invalid,
    /// PEM container is missing a required block
    PemMissingBlock,
    /// PEM private key block could not be parsed as PKCS#8
    Pkcs8Invalid,
    /// an outer ClientHello extension referenced by `outer_extensions` was not found
    OuterExtensionMissing(u16),
    /// an outer ClientHello extension type appeared more than once
    DuplicateOuterExtension(u16),
    /// `outer_extensions` named zero or more than ECH_OUTERS_MAX extension types
    EchOutersOutOfRange,
    /// outer ClientHello legacy_session_id exceeds 32 bytes
    SessionIdTooLong,
    /// the reconstructed inner ClientHello failed to parse
    InnerReconstructionFailed,
    /// no loaded ECHConfig matched the ClientHelloInner's config id
    NoMatchingEchConfig,
    /// the post-swap server name callback rejected the inner SNI
    InnerSniRejected,
    /// swap() called on a session handle that had already swapped
    EchBadCall,
    /// I/O error: {0}
    Io(String),
}

impl std::error::Error for Error {}

impl Error {
    /// True for failures that a TLS server MUST treat as "ECH not present"
    /// rather than aborting the handshake, to avoid a decryption oracle.
    pub fn is_grease_safe(&self) -> bool {
        matches!(
            self,
            Error::AeadBadTag
                | Error::AeadBadLength
                | Error::NoMatchingEchConfig
                | Error::InnerReconstructionFailed
                | Error::Truncated
                | Error::LengthMismatch
                | Error::EchOutersOutOfRange
                | Error::SessionIdTooLong
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
