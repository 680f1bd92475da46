/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Error types for manifest parsing, signature trust and archive access.
//!
//! Parse errors ([`ManifestError`]) and trust failures ([`SecurityError`]) are
//! `Clone` so a failed archive session can hand the same error back on every
//! retry. [`VerifierError`] is the catch-all returned by the archive facade
//! and the CLI.

use std::io;
use thiserror::Error;

/// Result type for archive-level operations.
pub type Result<T> = std::result::Result<T, VerifierError>;

/// Malformed manifest or signature-file text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// Syntax error; aborts the parse that produced it.
    #[error("Invalid manifest format: {0}")]
    Format(String),

    /// The caller required a version attribute that the main section lacks.
    #[error("Manifest is missing required attribute `{0}`")]
    MissingVersion(String),
}

/// Fatal trust failures. Once raised, the archive session stays failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// Entry content does not match the digest declared in the manifest.
    #[error("{manifest} has invalid digest for `{entry}` in `{archive}`")]
    DigestMismatch {
        manifest: String,
        entry: String,
        archive: String,
    },

    /// A signature block failed cryptographic verification, or its signature
    /// file does not match the manifest.
    #[error("Invalid signature `{name}`: {reason}")]
    InvalidSignature { name: String, reason: String },
}

impl SecurityError {
    pub(crate) fn invalid_signature(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Wraps the error for transport through [`std::io::Read`].
    pub fn into_io(self) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, self)
    }

    /// Recovers a security error carried by an [`io::Error`], if any.
    pub fn from_io(err: &io::Error) -> Option<&SecurityError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<SecurityError>())
    }
}

/// Failures reported by a [`crate::certificate::SignatureVerifier`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignatureError {
    #[error("Malformed signature block: {0}")]
    Malformed(String),

    #[error("ASN.1 decode error: {0}")]
    Asn1(#[from] simple_asn1::ASN1DecodeErr),

    #[error("Unsupported algorithm: {0}")]
    Unsupported(String),

    #[error("No certificate matches the signer")]
    SignerNotFound,

    #[error("Invalid certificate: {0}")]
    Certificate(String),

    #[error("Signature does not verify")]
    BadSignature,
}

/// Comprehensive error type for archive verification.
#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("I/O Error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP Error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("Security Error: {0}")]
    Security(#[from] SecurityError),

    #[error("PEM Parsing Error: {0}")]
    Pem(#[from] pem::PemError),

    /// Validation failures such as an untrusted signer.
    #[error("Validation Error: {0}")]
    Validation(String),

    /// Configuration or setup errors.
    #[error("Configuration Error: {0}")]
    Config(String),
}

impl VerifierError {
    /// Unwraps security errors that travelled through an `io::Error`.
    pub fn from_read(err: io::Error) -> Self {
        match SecurityError::from_io(&err) {
            Some(sec) => Self::Security(sec.clone()),
            None => Self::Io(err),
        }
    }

    /// The underlying security failure, if this is one.
    pub fn security(&self) -> Option<&SecurityError> {
        match self {
            Self::Security(e) => Some(e),
            Self::Io(e) => SecurityError::from_io(e),
            _ => None,
        }
    }
}
