/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Certificate chains and the signature-block verifier seam.

use crate::error::SignatureError;
use ring::digest;
use std::{fmt, sync::Arc};
use x509_parser::prelude::*;

/// A DER certificate plus its subject for display.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    subject: String,
}

impl Certificate {
    pub fn new(der: Vec<u8>, subject: impl Into<String>) -> Self {
        Self {
            der,
            subject: subject.into(),
        }
    }

    /// Parses `der` just far enough to read the subject name.
    pub fn from_der(der: Vec<u8>) -> Result<Self, SignatureError> {
        let subject = {
            let (_, cert) = X509Certificate::from_der(&der)
                .map_err(|e| SignatureError::Certificate(e.to_string()))?;
            cert.subject().to_string()
        };
        Ok(Self { der, subject })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// SHA-256 over the DER bytes, as colon separated hex.
    pub fn fingerprint(&self) -> String {
        digest::digest(&digest::SHA256, &self.der)
            .as_ref()
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("der_len", &self.der.len())
            .finish()
    }
}

/// Ordered certificates, signer first. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateChain {
    certificates: Arc<[Certificate]>,
}

impl CertificateChain {
    pub fn new(certificates: Vec<Certificate>) -> Self {
        Self {
            certificates: certificates.into(),
        }
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.certificates
    }

    pub fn signer(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }
}

/// Every chain that vouched for an entry, one per signature file.
pub type Signers = Vec<CertificateChain>;

/// Checks a signature block against the signature file it signs.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        signature_file: &[u8],
        signature_block: &[u8],
    ) -> Result<CertificateChain, SignatureError>;
}

impl<F> SignatureVerifier for F
where
    F: Fn(&[u8], &[u8]) -> Result<CertificateChain, SignatureError> + Send + Sync,
{
    fn verify(
        &self,
        signature_file: &[u8],
        signature_block: &[u8],
    ) -> Result<CertificateChain, SignatureError> {
        self(signature_file, signature_block)
    }
}
