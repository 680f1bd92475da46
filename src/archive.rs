/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Archive facade: lazy manifest loading, one-shot classification of the
//! signature files and verified entry streams.

use crate::{
    attributes::{AttributeName, AttributeSet},
    certificate::{SignatureVerifier, Signers},
    error::{ManifestError, Result, VerifierError},
    manifest::{CharsetDecoder, Manifest, ParseOptions},
    pkcs7::Pkcs7Verifier,
    stream::VerifyingReader,
    verification::{is_manifest_entry, is_signature_entry, TrustResolver, TrustStatus},
    BUFFER_SIZE,
};
use std::{
    fmt,
    fs::File,
    io::{self, BufReader, Read, Seek},
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};
use tracing::debug;
use zip::ZipArchive;

/// One directory record of the underlying archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Supplies entry names and raw content; compression is its business.
pub trait ArchiveSource {
    fn list_entries(&mut self) -> Result<Vec<EntryInfo>>;

    fn open_raw(&mut self, name: &str) -> Result<Box<dyn Read + '_>>;

    fn read_all(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut reader = self.open_raw(name)?;
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}

/// ZIP files through the `zip` crate.
pub struct ZipSource<R> {
    archive: ZipArchive<R>,
}

impl ZipSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R) -> Result<Self> {
        Ok(Self {
            archive: ZipArchive::new(reader)?,
        })
    }
}

impl<R: Read + Seek> ArchiveSource for ZipSource<R> {
    fn list_entries(&mut self) -> Result<Vec<EntryInfo>> {
        let mut entries = Vec::with_capacity(self.archive.len());
        for i in 0..self.archive.len() {
            let file = self.archive.by_index(i)?;
            entries.push(EntryInfo {
                name: file.name().to_string(),
                size: file.size(),
                is_dir: file.is_dir(),
            });
        }
        Ok(entries)
    }

    fn open_raw(&mut self, name: &str) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(self.archive.by_name(name)?))
    }
}

/// Entries held in memory, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entries: Vec<(EntryInfo, Vec<u8>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        self.entries.push((
            EntryInfo {
                name: name.into(),
                size: content.len() as u64,
                is_dir: false,
            },
            content,
        ));
        self
    }

    pub fn with_dir(mut self, name: impl Into<String>) -> Self {
        self.entries.push((
            EntryInfo {
                name: name.into(),
                size: 0,
                is_dir: true,
            },
            Vec::new(),
        ));
        self
    }
}

impl ArchiveSource for MemorySource {
    fn list_entries(&mut self) -> Result<Vec<EntryInfo>> {
        Ok(self.entries.iter().map(|(info, _)| info.clone()).collect())
    }

    fn open_raw(&mut self, name: &str) -> Result<Box<dyn Read + '_>> {
        self.entries
            .iter()
            .find(|(info, _)| info.name == name)
            .map(|(_, content)| Box::new(content.as_slice()) as Box<dyn Read + '_>)
            .ok_or_else(|| {
                VerifierError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no entry named `{}`", name),
                ))
            })
    }
}

/// Options fixed for the lifetime of an archive session.
#[derive(Clone)]
pub struct ArchiveOptions {
    pub name: Option<String>,
    pub required_version: Option<AttributeName>,
    pub charset: Option<Arc<dyn CharsetDecoder>>,
    pub verifier: Arc<dyn SignatureVerifier>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            name: None,
            required_version: None,
            charset: None,
            verifier: Arc::new(Pkcs7Verifier),
        }
    }
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn require_version(mut self, name: AttributeName) -> Self {
        self.required_version = Some(name);
        self
    }

    pub fn with_charset(mut self, charset: Arc<dyn CharsetDecoder>) -> Self {
        self.charset = Some(charset);
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn SignatureVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    fn parse_options(&self) -> ParseOptions {
        let mut options = ParseOptions::new().with_chunks();
        if let Some(name) = &self.required_version {
            options = options.require_version(name.clone());
        }
        if let Some(charset) = &self.charset {
            options = options.with_charset(Arc::clone(charset));
        }
        options
    }
}

impl fmt::Debug for ArchiveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveOptions")
            .field("name", &self.name)
            .field("required_version", &self.required_version)
            .field("charset", &self.charset)
            .finish_non_exhaustive()
    }
}

type ManifestSlot = std::result::Result<Option<Arc<Manifest>>, ManifestError>;

/// State shared by every view of one archive: manifest cache and trust.
pub struct ArchiveSession {
    name: String,
    options: ArchiveOptions,
    resolver: Arc<TrustResolver>,
    manifest: Mutex<Option<ManifestSlot>>,
    classified: AtomicBool,
    classify_lock: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ArchiveSession {
    pub fn new(name: impl Into<String>, options: ArchiveOptions) -> Self {
        let name = name.into();
        Self {
            resolver: Arc::new(TrustResolver::new(name.clone(), Arc::clone(&options.verifier))),
            name,
            options,
            manifest: Mutex::new(None),
            classified: AtomicBool::new(false),
            classify_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver(&self) -> &Arc<TrustResolver> {
        &self.resolver
    }

    pub fn status(&self) -> TrustStatus {
        self.resolver.status()
    }

    /// The manifest if some view has already loaded it.
    pub fn loaded_manifest(&self) -> Option<Arc<Manifest>> {
        match &*lock(&self.manifest) {
            Some(Ok(manifest)) => manifest.clone(),
            _ => None,
        }
    }

    /// Loads the manifest once; parse errors are cached, I/O errors are not.
    pub fn manifest(&self, source: &mut dyn ArchiveSource) -> Result<Option<Arc<Manifest>>> {
        let mut slot = lock(&self.manifest);
        if let Some(cached) = &*slot {
            return cached.clone().map_err(VerifierError::from);
        }

        let listing = source.list_entries()?;
        let Some(info) = listing.iter().find(|e| !e.is_dir && is_manifest_entry(&e.name)) else {
            debug!(archive = %self.name, "no manifest, archive is unsigned");
            *slot = Some(Ok(None));
            return Ok(None);
        };
        let reader = source.open_raw(&info.name)?;
        match Manifest::read_from(reader, &self.options.parse_options()) {
            Ok(parsed) => {
                debug!(
                    archive = %self.name,
                    entries = parsed.manifest.entry_count(),
                    "manifest loaded"
                );
                self.resolver.set_manifest(parsed);
                let manifest = self.resolver.manifest();
                *slot = Some(Ok(manifest.clone()));
                Ok(manifest)
            }
            Err(VerifierError::Manifest(err)) => {
                *slot = Some(Err(err.clone()));
                Err(err.into())
            }
            Err(err) => Err(err),
        }
    }

    /// Runs classification of the signature files at most once.
    pub fn classify(&self, source: &mut dyn ArchiveSource) -> Result<()> {
        if !self.classified.load(Ordering::Acquire) {
            let _guard = lock(&self.classify_lock);
            if !self.classified.load(Ordering::Acquire) {
                self.run_classification(source)?;
                self.classified.store(true, Ordering::Release);
            }
        }
        match self.resolver.failure() {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn run_classification(&self, source: &mut dyn ArchiveSource) -> Result<()> {
        if self.manifest(source)?.is_some() {
            for info in source.list_entries()? {
                if !info.is_dir && is_signature_entry(&info.name) {
                    let bytes = source.read_all(&info.name)?;
                    self.resolver.add_meta_entry(info.name, bytes);
                }
            }
        }
        // Failures are latched by the resolver and reported by `classify`.
        if let Ok(false) = self.resolver.read_certificates() {
            debug!(archive = %self.name, "signature files without a manifest");
        }
        self.resolver.remove_chunks();
        Ok(())
    }
}

impl fmt::Debug for ArchiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveSession")
            .field("name", &self.name)
            .field("classified", &self.classified.load(Ordering::Relaxed))
            .field("resolver", &self.resolver)
            .finish()
    }
}

/// An entry as listed in the archive directory.
#[derive(Clone)]
pub struct EntryHandle {
    info: EntryInfo,
    session: Arc<ArchiveSession>,
}

impl EntryHandle {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub fn is_dir(&self) -> bool {
        self.info.is_dir
    }

    /// Manifest attributes, if the manifest has been loaded.
    pub fn attributes(&self) -> Option<AttributeSet> {
        self.session
            .loaded_manifest()
            .and_then(|m| m.entry(&self.info.name).cloned())
    }

    /// Signers, available only after the content was read to the end.
    pub fn signers(&self) -> Option<Signers> {
        self.session.resolver().verified_signers(&self.info.name)
    }
}

impl fmt::Debug for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryHandle").field("info", &self.info).finish()
    }
}

/// A view of an archive through one content source.
pub struct Archive<S> {
    source: S,
    session: Arc<ArchiveSession>,
}

impl Archive<ZipSource<BufReader<File>>> {
    pub fn open_path(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        let path = path.as_ref();
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::join(
            ZipSource::open(path)?,
            Arc::new(ArchiveSession::new(name, options)),
        ))
    }
}

impl<S: ArchiveSource> Archive<S> {
    /// Wraps `source` without reading anything from it.
    pub fn open(source: S, options: ArchiveOptions) -> Self {
        let name = options.name.clone().unwrap_or_else(|| "archive".to_string());
        Self::join(source, Arc::new(ArchiveSession::new(name, options)))
    }

    /// Another view over the same archive sharing manifest and trust state.
    pub fn join(source: S, session: Arc<ArchiveSession>) -> Self {
        Self { source, session }
    }

    pub fn session(&self) -> Arc<ArchiveSession> {
        Arc::clone(&self.session)
    }

    pub fn name(&self) -> &str {
        self.session.name()
    }

    pub fn status(&self) -> TrustStatus {
        self.session.status()
    }

    pub fn is_signed(&mut self) -> Result<bool> {
        self.session.classify(&mut self.source)?;
        Ok(self.session.resolver().is_signed_archive())
    }

    pub fn entries(&mut self) -> Result<impl Iterator<Item = EntryHandle>> {
        let listing = self.source.list_entries()?;
        let session = Arc::clone(&self.session);
        Ok(listing.into_iter().map(move |info| EntryHandle {
            info,
            session: Arc::clone(&session),
        }))
    }

    pub fn entry(&mut self, name: &str) -> Result<Option<EntryHandle>> {
        Ok(self.entries()?.find(|e| e.name() == name))
    }

    pub fn manifest(&mut self) -> Result<Option<Arc<Manifest>>> {
        self.session.manifest(&mut self.source)
    }

    /// Opens an entry's content; signature files are classified first.
    pub fn open_entry_stream(
        &mut self,
        handle: &EntryHandle,
    ) -> Result<VerifyingReader<Box<dyn Read + '_>>> {
        let resolver = Arc::clone(self.session.resolver());
        if handle.is_dir() {
            let empty: Box<dyn Read + '_> = Box::new(io::empty());
            return Ok(VerifyingReader::new(empty, resolver, None, Some(0)));
        }
        self.session.classify(&mut self.source)?;
        let entry = resolver.init_entry(handle.name())?;
        let raw = self.source.open_raw(handle.name())?;
        Ok(VerifyingReader::new(raw, resolver, entry, Some(handle.size())))
    }

    /// Reads an entry to the end, verifying it when it is signed.
    pub fn read_entry(&mut self, handle: &EntryHandle) -> Result<Vec<u8>> {
        let mut reader = self.open_entry_stream(handle)?;
        // The directory's size is untrusted until the content is read.
        let mut content = Vec::with_capacity(handle.size().min(BUFFER_SIZE as u64) as usize);
        reader
            .read_to_end(&mut content)
            .map_err(VerifierError::from_read)?;
        Ok(content)
    }

    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S> fmt::Debug for Archive<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
