/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

//! Configuration parsing and validation for the ZipVerifier CLI.

use crate::{attributes::AttributeName, error::VerifierError, ui::Ui};
use clap::ArgMatches;
use std::path::{Path, PathBuf};

/// Execution mode for the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Stream every entry through verification
    Verify { parallel: bool },
    /// Print the parsed manifest
    Manifest,
    /// List entries with their digest coverage
    List,
}

/// Application configuration parsed from command-line arguments.
#[derive(Debug)]
pub struct Config {
    /// Archive to inspect
    pub input_path: PathBuf,
    /// Execution mode
    pub mode: Mode,
    /// Trusted signer certificates (PEM bundle or DER), if pinning is requested
    pub trusted_path: Option<PathBuf>,
    /// Fail when the manifest lacks `Manifest-Version`
    pub require_version: Option<AttributeName>,
    /// Whether to suppress non-error output
    pub quiet: bool,
    /// Enable verbose logging
    pub verbose: bool,
    /// Verbosity level (0 = off, 1 = verbose, 2 = very verbose, 3+ = debug)
    pub verbosity_level: u8,
}

impl Config {
    /// Parse configuration from command-line argument matches.
    pub fn from_matches(matches: &ArgMatches, ui: &Ui) -> Result<Self, VerifierError> {
        let quiet = matches.get_flag("quiet");
        let verbosity_level = matches.get_count("verbose");
        let verbose = verbosity_level > 0;

        let (mode, sub_matches) = match matches.subcommand() {
            Some(("verify", sub)) => (
                Mode::Verify {
                    parallel: sub.get_flag("parallel"),
                },
                sub,
            ),
            Some(("manifest", sub)) => (Mode::Manifest, sub),
            Some(("list", sub)) => (Mode::List, sub),
            _ => {
                return Err(VerifierError::Config(
                    "No subcommand provided. Use 'verify', 'manifest' or 'list'.".into(),
                ))
            }
        };

        let input_path = Self::existing_file(
            sub_matches.get_one::<String>("input"),
            "Input file",
            ui,
        )?
        .ok_or_else(|| VerifierError::Config("No input file specified".into()))?;
        if verbose {
            ui.info(&format!("Input: {}", input_path.display()));
        }

        let trusted_path = Self::existing_file(
            Self::optional_arg(sub_matches, "trusted"),
            "Trusted certificate file",
            ui,
        )?;
        let require_version = Self::optional_flag(sub_matches, "require_version")
            .then(AttributeName::manifest_version);

        Ok(Self {
            input_path,
            mode,
            trusted_path,
            require_version,
            quiet,
            verbose,
            verbosity_level,
        })
    }

    // Only `verify` declares these; other subcommands answer "absent".
    fn optional_arg<'a>(matches: &'a ArgMatches, id: &str) -> Option<&'a String> {
        matches.try_get_one::<String>(id).ok().flatten()
    }

    fn optional_flag(matches: &ArgMatches, id: &str) -> bool {
        matches.try_get_one::<bool>(id).ok().flatten().copied().unwrap_or(false)
    }

    fn existing_file(
        arg: Option<&String>,
        what: &str,
        ui: &Ui,
    ) -> Result<Option<PathBuf>, VerifierError> {
        let Some(arg) = arg else {
            return Ok(None);
        };
        let path = Path::new(arg);
        if !path.exists() {
            return Err(VerifierError::Config(format!(
                "{} does not exist: {}",
                what,
                path.display()
            )));
        }
        let metadata = std::fs::metadata(path).map_err(|e| {
            VerifierError::Config(format!("Cannot access {} {}: {}", what, path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(VerifierError::Config(format!(
                "{} is not a regular file: {}",
                what,
                path.display()
            )));
        }
        ui.debug(&format!("Using {}: {}", what.to_lowercase(), path.display()));
        Ok(Some(path.to_path_buf()))
    }
}
