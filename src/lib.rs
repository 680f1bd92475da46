/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! # ZipVerifier Rust Library
//!
//! Streaming verification of signed JAR/APK/ZIP archives. The manifest is
//! parsed on demand, signature files are checked the first time content is
//! requested, and each entry is digested while it is read; an entry only
//! gains signers once its whole content has matched the manifest.
//!
//! ```no_run
//! use std::io::Read;
//! use zipverifierust::archive::{Archive, ArchiveOptions};
//!
//! # fn main() -> zipverifierust::error::Result<()> {
//! let mut archive = Archive::open_path("app.jar", ArchiveOptions::new())?;
//! for handle in archive.entries()?.collect::<Vec<_>>() {
//!     let mut content = Vec::new();
//!     archive.open_entry_stream(&handle)?.read_to_end(&mut content)?;
//!     println!("{} signed: {}", handle.name(), handle.signers().is_some());
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod attributes;
pub mod certificate;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod manifest;
pub mod pkcs7;
pub mod stream;
pub mod ui;
pub mod verification;

pub use archive::{Archive, ArchiveOptions, ArchiveSession, ArchiveSource, EntryHandle};
pub use attributes::{AttributeName, AttributeSet};
pub use certificate::{Certificate, CertificateChain, SignatureVerifier, Signers};
pub use error::{ManifestError, SecurityError, SignatureError, VerifierError};
pub use manifest::Manifest;
pub use stream::VerifyingReader;
pub use verification::{TrustResolver, TrustStatus};

pub const APP_NAME: &str = "ZipVerifierust";
pub const APP_BIN_NAME: &str = "zipverifierust";
pub const APP_VERSION: &str = "1.0.0";
pub const APP_AUTHOR: &str = "Tiash H Kabir / @MrCarb0n";
pub const APP_ABOUT: &str = "Streaming, memory-safe signature verification for JAR/APK/ZIP archives.";
pub const BUFFER_SIZE: usize = 64 * 1024;

pub const META_INF: &str = "META-INF/";
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";
