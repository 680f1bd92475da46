/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Trusted signer certificates for `verify -p`.

use crate::{
    certificate::{Certificate, CertificateChain},
    error::VerifierError,
    ui::Ui,
};
use ::pem as pem_crate;
use std::{fs, path::Path};

/// Certificates a signer must match to be accepted.
#[derive(Debug, Clone, Default)]
pub struct TrustedCertificates {
    certificates: Vec<Certificate>,
}

impl TrustedCertificates {
    /// Load certificates from a PEM bundle or a single DER certificate.
    pub fn load(path: &Path, ui: &Ui) -> Result<Self, VerifierError> {
        let content = fs::read(path)?;
        let trusted = Self::from_bytes(&content, ui)?;
        ui.verbose(&format!(
            "Loaded {} trusted certificate(s) from {}",
            trusted.len(),
            path.display()
        ));
        Ok(trusted)
    }

    pub fn from_bytes(content: &[u8], ui: &Ui) -> Result<Self, VerifierError> {
        let blocks: Vec<Vec<u8>> = match pem_crate::parse_many(content) {
            Ok(pems) if !pems.is_empty() => pems
                .into_iter()
                .filter(|p| p.tag() == "CERTIFICATE")
                .map(|p| p.into_contents())
                .collect(),
            _ => {
                ui.debug("Input is not PEM, attempting to parse as binary X.509 DER...");
                vec![content.to_vec()]
            }
        };
        if blocks.is_empty() {
            return Err(VerifierError::Config(
                "No CERTIFICATE block found in trusted certificate file".into(),
            ));
        }

        let certificates = blocks
            .into_iter()
            .map(|der| {
                Certificate::from_der(der)
                    .map_err(|e| VerifierError::Config(format!("Invalid certificate: {}", e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        for cert in &certificates {
            ui.debug(&format!("Trusted: {} ({})", cert.subject(), cert.fingerprint()));
        }
        Ok(Self { certificates })
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn contains(&self, cert: &Certificate) -> bool {
        self.certificates.iter().any(|c| c.der() == cert.der())
    }

    /// Whether the chain's signer certificate is one of ours.
    pub fn accepts(&self, chain: &CertificateChain) -> bool {
        chain.signer().map_or(false, |signer| self.contains(signer))
    }
}
