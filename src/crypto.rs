/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{error::VerifierError, BUFFER_SIZE};
use base64::{engine::general_purpose::STANDARD as base64_engine, Engine};
use ring::digest;
use std::{fmt, io::Read};

/// Algorithms tried, in order, when an entry has no `Digest-Algorithms`.
pub const DEFAULT_DIGEST_ALGORITHMS: [&str; 2] = ["SHA", "SHA1"];

/// Digest algorithms with an implementation available, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    /// Resolves the algorithm part of a `<ALGO>-Digest` attribute name.
    /// Names without an implementation (e.g. `MD5`) resolve to `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "SHA" | "SHA1" | "SHA-1" => Some(Self::Sha1),
            "SHA256" | "SHA-256" => Some(Self::Sha256),
            "SHA384" | "SHA-384" => Some(Self::Sha384),
            "SHA512" | "SHA-512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn ring(self) -> &'static digest::Algorithm {
        match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
            Self::Sha384 => &digest::SHA384,
            Self::Sha512 => &digest::SHA512,
        }
    }

    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        digest::digest(self.ring(), data).as_ref().to_vec()
    }

    pub fn digest_base64(self, data: &[u8]) -> String {
        base64_engine.encode(self.digest(data))
    }

    pub fn accumulator(self) -> DigestAccumulator {
        DigestAccumulator {
            algorithm: self,
            ctx: digest::Context::new(self.ring()),
            processed: 0,
        }
    }

    /// Digests everything `reader` yields.
    pub fn digest_stream<R: Read>(self, reader: &mut R) -> Result<Vec<u8>, VerifierError> {
        let mut acc = self.accumulator();
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let count = reader.read(&mut buf)?;
            if count == 0 {
                break;
            }
            acc.update(&buf[..count]);
        }
        Ok(acc.finish())
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        })
    }
}

/// Incremental digest over bytes fed as they are read.
pub struct DigestAccumulator {
    algorithm: DigestAlgorithm,
    ctx: digest::Context,
    processed: u64,
}

impl DigestAccumulator {
    pub fn update(&mut self, data: &[u8]) {
        self.ctx.update(data);
        self.processed += data.len() as u64;
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn finish(self) -> Vec<u8> {
        self.ctx.finish().as_ref().to_vec()
    }
}

impl fmt::Debug for DigestAccumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestAccumulator")
            .field("algorithm", &self.algorithm)
            .field("processed", &self.processed)
            .finish()
    }
}

/// Decodes a base64 digest value as written in manifests.
pub fn decode_digest(value: &str) -> Option<Vec<u8>> {
    base64_engine.decode(value.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_algorithm_names() {
        assert_eq!(DigestAlgorithm::from_name("SHA"), Some(DigestAlgorithm::Sha1));
        assert_eq!(DigestAlgorithm::from_name("sha-1"), Some(DigestAlgorithm::Sha1));
        assert_eq!(DigestAlgorithm::from_name("SHA-256"), Some(DigestAlgorithm::Sha256));
        assert_eq!(DigestAlgorithm::from_name("sha512"), Some(DigestAlgorithm::Sha512));
        assert_eq!(DigestAlgorithm::from_name("MD5"), None);
    }

    #[test]
    fn sha1_matches_known_vector() {
        assert_eq!(
            DigestAlgorithm::Sha1.digest_base64(b"abc"),
            "qZk+NkcGgWq6PiVxeFDCbJzQ2J0="
        );
    }

    #[test]
    fn accumulator_equals_one_shot_digest() {
        let data = vec![7u8; BUFFER_SIZE * 2 + 13];
        let mut acc = DigestAlgorithm::Sha256.accumulator();
        for chunk in data.chunks(1000) {
            acc.update(chunk);
        }
        assert_eq!(acc.processed(), data.len() as u64);
        assert_eq!(acc.finish(), DigestAlgorithm::Sha256.digest(&data));

        let streamed = DigestAlgorithm::Sha256
            .digest_stream(&mut std::io::Cursor::new(&data))
            .unwrap();
        assert_eq!(streamed, DigestAlgorithm::Sha256.digest(&data));
    }

    #[test]
    fn decodes_padded_base64() {
        assert_eq!(decode_digest(" AQID "), Some(vec![1, 2, 3]));
        assert_eq!(decode_digest("not base64!"), None);
    }
}
