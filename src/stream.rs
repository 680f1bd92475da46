/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{
    certificate::{CertificateChain, Signers},
    error::SecurityError,
    verification::{TrustResolver, VerifierEntry},
};
use std::{
    fmt,
    io::{self, Read},
    sync::Arc,
};

/// Digests an entry's content while it is read and checks it at end of stream.
///
/// A mismatch found on a read that returned data is reported by the next
/// call; callers must read to the end to observe verification failures.
pub struct VerifyingReader<R> {
    inner: R,
    resolver: Arc<TrustResolver>,
    entry: Option<VerifierEntry>,
    remaining: Option<u64>,
    signers: Option<Signers>,
    deferred: Option<SecurityError>,
    failed: Option<SecurityError>,
}

impl<R: Read> VerifyingReader<R> {
    /// `declared_len` is the uncompressed size from the directory, if known.
    pub fn new(
        inner: R,
        resolver: Arc<TrustResolver>,
        entry: Option<VerifierEntry>,
        declared_len: Option<u64>,
    ) -> Self {
        Self {
            inner,
            resolver,
            remaining: entry.as_ref().and(declared_len),
            entry,
            signers: None,
            deferred: None,
            failed: None,
        }
    }

    /// Whether this stream is being verified.
    pub fn is_verifying(&self) -> bool {
        self.entry.is_some() || self.signers.is_some() || self.failed.is_some()
    }

    /// Signers established once the whole entry was read and matched.
    pub fn signers(&self) -> Option<&[CertificateChain]> {
        self.signers.as_deref()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn complete(&mut self) -> Result<(), SecurityError> {
        let Some(entry) = self.entry.take() else {
            return Ok(());
        };
        match self.resolver.finish(entry) {
            Ok(signers) => {
                self.signers = Some(signers);
                Ok(())
            }
            Err(err) => {
                self.failed = Some(err.clone());
                Err(err)
            }
        }
    }
}

impl<R: Read> Read for VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = self.deferred.take() {
            return Err(err.into_io());
        }
        if let Some(err) = &self.failed {
            return Err(err.clone().into_io());
        }
        let Some(entry) = self.entry.as_mut() else {
            return self.inner.read(buf);
        };

        let count = self.inner.read(buf)?;
        self.resolver.feed(entry, &buf[..count]);
        if count == 0 {
            self.complete().map_err(SecurityError::into_io)?;
            return Ok(0);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(count as u64);
            if *remaining == 0 {
                if let Err(err) = self.complete() {
                    self.deferred = Some(err);
                }
            }
        }
        Ok(count)
    }
}

impl<R> fmt::Debug for VerifyingReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyingReader")
            .field("entry", &self.entry)
            .field("remaining", &self.remaining)
            .field("verified", &self.signers.is_some())
            .field("failed", &self.failed)
            .finish()
    }
}
