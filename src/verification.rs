/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Per-archive trust state.
//!
//! Verification runs in two phases. Classification pairs each signature block
//! under `META-INF/` with its signature file, checks the block, and checks the
//! signature file against the manifest (whole file first, then section by
//! section). Afterwards every entry stream is digested as it is read and
//! compared with the manifest when it reaches end of stream; only then does
//! the entry get its signers.

use crate::{
    attributes::{AttributeSet, CREATED_BY, DIGEST_ALGORITHMS},
    certificate::{CertificateChain, SignatureVerifier, Signers},
    crypto::{decode_digest, DigestAccumulator, DigestAlgorithm, DEFAULT_DIGEST_ALGORITHMS},
    error::SecurityError,
    manifest::{Chunks, Manifest, ParsedManifest},
    MANIFEST_NAME, META_INF,
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, warn};

pub const SIGNATURE_FILE_SUFFIX: &str = ".SF";
pub const SIGNATURE_BLOCK_SUFFIXES: [&str; 3] = [".RSA", ".DSA", ".EC"];

/// `Created-By` marker of the tool whose signature files carry the whole
/// manifest digest under `<ALGO>-Digest` instead of `<ALGO>-Digest-Manifest`.
pub const ALTERNATE_TOOL_MARKER: &str = "signtool";

/// Where an archive stands in the verification protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustStatus {
    /// No signature material found.
    Unsigned,
    /// Metadata collected but not yet classified.
    Discovering,
    /// Signed; some signed entries have not been read to the end yet.
    PartiallyVerified,
    /// Signed; every signed entry has been read and matched.
    FullySigned,
    /// A fatal trust failure occurred.
    VerificationFailed,
}

fn ends_with_ignore_case(name: &str, suffix: &str) -> bool {
    name.len() >= suffix.len()
        && name
            .get(name.len() - suffix.len()..)
            .map_or(false, |tail| tail.eq_ignore_ascii_case(suffix))
}

/// Whether `name` is a signature file or block in the metadata directory.
pub fn is_signature_entry(name: &str) -> bool {
    let in_meta = name
        .get(..META_INF.len())
        .map_or(false, |p| p.eq_ignore_ascii_case(META_INF));
    in_meta
        && (ends_with_ignore_case(name, SIGNATURE_FILE_SUFFIX)
            || SIGNATURE_BLOCK_SUFFIXES
                .iter()
                .any(|s| ends_with_ignore_case(name, s)))
}

/// `META-INF/MANIFEST.MF`, in any letter case.
pub fn is_manifest_entry(name: &str) -> bool {
    name.eq_ignore_ascii_case(MANIFEST_NAME)
}

/// Base name of a signature block, e.g. `META-INF/CERT` for `META-INF/CERT.RSA`.
fn block_base(name: &str) -> Option<&str> {
    SIGNATURE_BLOCK_SUFFIXES
        .iter()
        .find(|s| ends_with_ignore_case(name, s))
        .map(|s| &name[..name.len() - s.len()])
}

fn companion_signature_file<'a>(
    pending: &'a BTreeMap<String, Vec<u8>>,
    base: &str,
) -> Option<&'a String> {
    pending.keys().find(|k| {
        k.get(..base.len()) == Some(base)
            && k.get(base.len()..)
                .map_or(false, |ext| ext.eq_ignore_ascii_case(SIGNATURE_FILE_SUFFIX))
    })
}

/// Signature files whose `Created-By` names the alternate signing tool.
pub fn is_alternate_tool_signature(signature_file: &Manifest) -> bool {
    signature_file
        .main_attributes()
        .get_str(CREATED_BY)
        .map_or(false, |v| {
            v.to_ascii_lowercase().contains(ALTERNATE_TOOL_MARKER)
        })
}

/// Live verification context for one entry stream.
pub struct VerifierEntry {
    name: String,
    algorithm: DigestAlgorithm,
    expected: String,
    signers: Signers,
    accumulator: DigestAccumulator,
}

impl VerifierEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn signers(&self) -> &[CertificateChain] {
        &self.signers
    }

    pub fn update(&mut self, data: &[u8]) {
        self.accumulator.update(data);
    }
}

impl fmt::Debug for VerifierEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierEntry")
            .field("name", &self.name)
            .field("algorithm", &self.algorithm)
            .field("signers", &self.signers.len())
            .field("accumulator", &self.accumulator)
            .finish()
    }
}

enum MetaEntries {
    Pending(BTreeMap<String, Vec<u8>>),
    Classified,
}

struct PrimaryManifest {
    manifest: Arc<Manifest>,
    raw: Vec<u8>,
}

struct TrustState {
    meta: MetaEntries,
    manifest: Option<PrimaryManifest>,
    chunks: Option<Chunks>,
    signature_files: BTreeMap<String, Manifest>,
    certificates: BTreeMap<String, CertificateChain>,
    verified: BTreeMap<String, Signers>,
    failure: Option<SecurityError>,
}

/// Trust bookkeeping for one archive, shared by all of its entry streams.
pub struct TrustResolver {
    archive: String,
    verifier: Arc<dyn SignatureVerifier>,
    state: Mutex<TrustState>,
}

impl TrustResolver {
    pub fn new(archive: impl Into<String>, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            archive: archive.into(),
            verifier,
            state: Mutex::new(TrustState {
                meta: MetaEntries::Pending(BTreeMap::new()),
                manifest: None,
                chunks: None,
                signature_files: BTreeMap::new(),
                certificates: BTreeMap::new(),
                verified: BTreeMap::new(),
                failure: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrustState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn archive_name(&self) -> &str {
        &self.archive
    }

    /// Records a metadata entry for classification. Ignored once classified.
    pub fn add_meta_entry(&self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        match &mut self.state().meta {
            MetaEntries::Pending(pending) => {
                debug!(entry = %name, len = bytes.len(), "metadata entry recorded");
                pending.insert(name, bytes);
            }
            MetaEntries::Classified => {
                debug!(entry = %name, "metadata entry ignored after classification");
            }
        }
    }

    /// Binds the primary manifest, its raw bytes and any captured chunks.
    pub fn set_manifest(&self, parsed: ParsedManifest) {
        let mut state = self.state();
        state.manifest = Some(PrimaryManifest {
            manifest: Arc::new(parsed.manifest),
            raw: parsed.raw,
        });
        state.chunks = parsed.chunks;
    }

    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.state().manifest.as_ref().map(|m| Arc::clone(&m.manifest))
    }

    /// Drops the per-entry manifest chunks.
    pub fn remove_chunks(&self) {
        self.state().chunks.take();
    }

    pub fn has_chunks(&self) -> bool {
        self.state().chunks.is_some()
    }

    pub fn is_classified(&self) -> bool {
        matches!(self.state().meta, MetaEntries::Classified)
    }

    pub fn is_signed_archive(&self) -> bool {
        !self.state().certificates.is_empty()
    }

    pub fn failure(&self) -> Option<SecurityError> {
        self.state().failure.clone()
    }

    pub fn signature_file_names(&self) -> Vec<String> {
        self.state().certificates.keys().cloned().collect()
    }

    pub fn certificate_chain(&self, signature_file: &str) -> Option<CertificateChain> {
        self.state().certificates.get(signature_file).cloned()
    }

    /// Signers of an entry whose content has been fully read and matched.
    pub fn verified_signers(&self, entry: &str) -> Option<Signers> {
        self.state().verified.get(entry).cloned()
    }

    pub fn status(&self) -> TrustStatus {
        let state = self.state();
        if state.failure.is_some() {
            return TrustStatus::VerificationFailed;
        }
        match &state.meta {
            MetaEntries::Pending(pending) if pending.is_empty() => TrustStatus::Unsigned,
            MetaEntries::Pending(_) => TrustStatus::Discovering,
            MetaEntries::Classified if state.certificates.is_empty() => TrustStatus::Unsigned,
            MetaEntries::Classified => {
                let manifest = state.manifest.as_ref().map(|m| &m.manifest);
                let all_read = state
                    .signature_files
                    .values()
                    .flat_map(|sf| sf.entries().map(|(name, _)| name))
                    .filter(|name| manifest.map_or(false, |m| m.entry(name).is_some()))
                    .all(|name| state.verified.contains_key(name));
                if all_read {
                    TrustStatus::FullySigned
                } else {
                    TrustStatus::PartiallyVerified
                }
            }
        }
    }

    /// Classifies pending metadata entries.
    ///
    /// Returns `Ok(false)` when a signature pair is waiting for the manifest
    /// to be bound. Otherwise every pair is verified, unpaired entries are
    /// dropped, chunks are released, and `Ok(true)` is returned.
    pub fn read_certificates(&self) -> Result<bool, SecurityError> {
        let mut state = self.state();
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }
        let pending = match &state.meta {
            MetaEntries::Pending(pending) => pending,
            MetaEntries::Classified => return Ok(true),
        };

        let mut pairs = Vec::new();
        for name in pending.keys() {
            let Some(base) = block_base(name) else { continue };
            match companion_signature_file(pending, base) {
                Some(sf) => pairs.push((sf.clone(), name.clone())),
                None => debug!(block = %name, "signature block without signature file, skipped"),
            }
        }
        if !pairs.is_empty() && state.manifest.is_none() {
            debug!("signature files found before the manifest, classification deferred");
            return Ok(false);
        }

        let pending = match std::mem::replace(&mut state.meta, MetaEntries::Classified) {
            MetaEntries::Pending(pending) => pending,
            MetaEntries::Classified => BTreeMap::new(),
        };
        for (sf_name, block_name) in pairs {
            let (Some(sf_bytes), Some(block_bytes)) = (pending.get(&sf_name), pending.get(&block_name))
            else {
                continue;
            };
            if let Err(err) = self.install_signature(&mut state, &sf_name, sf_bytes, block_bytes) {
                warn!(archive = %self.archive, error = %err, "signature rejected");
                state.chunks = None;
                state.failure = Some(err.clone());
                return Err(err);
            }
        }
        state.chunks = None;
        debug!(
            archive = %self.archive,
            signers = state.certificates.len(),
            "metadata classified"
        );
        Ok(true)
    }

    fn install_signature(
        &self,
        state: &mut TrustState,
        sf_name: &str,
        sf_bytes: &[u8],
        block_bytes: &[u8],
    ) -> Result<(), SecurityError> {
        let chain = self
            .verifier
            .verify(sf_bytes, block_bytes)
            .map_err(|e| SecurityError::invalid_signature(sf_name, e.to_string()))?;
        let signature_file = Manifest::parse(sf_bytes)
            .map_err(|e| SecurityError::invalid_signature(sf_name, e.to_string()))?;
        let primary = state
            .manifest
            .as_ref()
            .ok_or_else(|| SecurityError::invalid_signature(sf_name, "no manifest"))?;
        verify_signature_file(sf_name, &signature_file, primary, state.chunks.as_ref())?;

        debug!(signature_file = %sf_name, entries = signature_file.entry_count(), "signature file installed");
        state.signature_files.insert(sf_name.to_string(), signature_file);
        state.certificates.insert(sf_name.to_string(), chain);
        Ok(())
    }

    /// Starts verification of an entry stream, or `None` when nothing vouches
    /// for the entry.
    pub fn init_entry(&self, name: &str) -> Result<Option<VerifierEntry>, SecurityError> {
        let state = self.state();
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }
        let Some(primary) = &state.manifest else {
            return Ok(None);
        };
        if state.signature_files.is_empty() {
            return Ok(None);
        }
        let Some(attrs) = primary.manifest.entry(name) else {
            return Ok(None);
        };
        let signers: Signers = state
            .signature_files
            .iter()
            .filter(|(_, sf)| sf.entry(name).is_some())
            .filter_map(|(sf_name, _)| state.certificates.get(sf_name).cloned())
            .collect();
        if signers.is_empty() {
            return Ok(None);
        }
        let Some((algorithm, expected)) = select_digest(attrs) else {
            debug!(entry = %name, "no usable digest attribute");
            return Ok(None);
        };
        Ok(Some(VerifierEntry {
            name: name.to_string(),
            algorithm,
            expected,
            signers,
            accumulator: algorithm.accumulator(),
        }))
    }

    pub fn feed(&self, entry: &mut VerifierEntry, data: &[u8]) {
        entry.update(data);
    }

    /// Completes an entry: the digest must match or the archive is failed.
    pub fn finish(&self, entry: VerifierEntry) -> Result<Signers, SecurityError> {
        let VerifierEntry {
            name,
            expected,
            signers,
            accumulator,
            ..
        } = entry;
        let actual = accumulator.finish();
        let mut state = self.state();
        if let Some(err) = &state.failure {
            return Err(err.clone());
        }
        if decode_digest(&expected).as_deref() != Some(actual.as_slice()) {
            let err = SecurityError::DigestMismatch {
                manifest: MANIFEST_NAME.to_string(),
                entry: name,
                archive: self.archive.clone(),
            };
            warn!(error = %err, "entry digest mismatch");
            state.failure = Some(err.clone());
            return Err(err);
        }
        debug!(entry = %name, "entry verified");
        state.verified.insert(name, signers.clone());
        Ok(signers)
    }
}

impl fmt::Debug for TrustResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustResolver")
            .field("archive", &self.archive)
            .field("status", &self.status())
            .finish()
    }
}

/// First algorithm, in declared order, with an implementation and a digest.
/// Without `Digest-Algorithms` the legacy names are tried, then any other
/// supported `<ALGO>-Digest`.
fn select_digest(attrs: &AttributeSet) -> Option<(DigestAlgorithm, String)> {
    let declared = attrs.get_str(DIGEST_ALGORITHMS);
    let candidates: Vec<&str> = match declared {
        Some(list) => list.split_whitespace().collect(),
        None => DEFAULT_DIGEST_ALGORITHMS.to_vec(),
    };
    let named = candidates.into_iter().find_map(|algo| {
        let algorithm = DigestAlgorithm::from_name(algo)?;
        let expected = attrs.get_str(&format!("{}-Digest", algo))?;
        Some((algorithm, expected.to_string()))
    });
    match (named, declared) {
        (None, None) => strongest_listed_digest(attrs),
        (named, _) => named,
    }
}

/// The strongest supported `<ALGO>-Digest`, e.g. `SHA-256-Digest` from
/// signers that never write `Digest-Algorithms`.
fn strongest_listed_digest(attrs: &AttributeSet) -> Option<(DigestAlgorithm, String)> {
    attrs
        .iter()
        .filter_map(|(key, value)| {
            let algorithm = DigestAlgorithm::from_name(key.strip_suffix_ignore_case("-Digest")?)?;
            Some((algorithm, value.to_string()))
        })
        .max_by_key(|(algorithm, _)| *algorithm)
}

/// Matches with or without a single trailing line terminator byte.
fn manifest_digest_matches(algorithm: DigestAlgorithm, expected: &str, raw: &[u8]) -> bool {
    let Some(expected) = decode_digest(expected) else {
        return false;
    };
    if algorithm.digest(raw) == expected {
        return true;
    }
    match raw.last() {
        Some(b'\n') | Some(b'\r') => algorithm.digest(&raw[..raw.len() - 1]) == expected,
        _ => false,
    }
}

fn verify_signature_file(
    sf_name: &str,
    signature_file: &Manifest,
    primary: &PrimaryManifest,
    chunks: Option<&Chunks>,
) -> Result<(), SecurityError> {
    let suffix = if is_alternate_tool_signature(signature_file) {
        "-Digest"
    } else {
        "-Digest-Manifest"
    };
    let whole_manifest_ok = signature_file
        .main_attributes()
        .iter()
        .filter_map(|(key, value)| {
            let algorithm = DigestAlgorithm::from_name(key.strip_suffix_ignore_case(suffix)?)?;
            Some((algorithm, value))
        })
        .any(|(algorithm, value)| manifest_digest_matches(algorithm, value, &primary.raw));
    if whole_manifest_ok {
        return Ok(());
    }

    debug!(signature_file = %sf_name, "whole-manifest digest did not match, checking sections");
    for (entry, attrs) in signature_file.entries() {
        let chunk = chunks.and_then(|c| c.get(entry)).ok_or_else(|| {
            SecurityError::invalid_signature(
                sf_name,
                format!("manifest has no section for `{}`", entry),
            )
        })?;
        let mut checked = 0;
        for (key, value) in attrs.iter() {
            let Some(algorithm) = key
                .strip_suffix_ignore_case("-Digest")
                .and_then(DigestAlgorithm::from_name)
            else {
                continue;
            };
            if decode_digest(value).as_deref() != Some(algorithm.digest(chunk).as_slice()) {
                return Err(SecurityError::invalid_signature(
                    sf_name,
                    format!("digest of manifest section `{}` does not match", entry),
                ));
            }
            checked += 1;
        }
        if checked == 0 {
            return Err(SecurityError::invalid_signature(
                sf_name,
                format!("no supported digest for manifest section `{}`", entry),
            ));
        }
    }
    if signature_file.entry_count() == 0 {
        return Err(SecurityError::invalid_signature(
            sf_name,
            "signature file does not match the manifest",
        ));
    }
    Ok(())
}
