/*
 * ZipVerifier Rust v1.0.0
 * Copyright (c) 2026 Tiash H Kabir / @MrCarb0n.
 * Licensed under the MIT License.
 */

use crate::{
    archive::{Archive, ArchiveOptions, ArchiveSource, EntryHandle, ZipSource},
    certificate::Signers,
    config::{self, Config},
    error::VerifierError,
    keys::TrustedCertificates,
    ui::Ui,
    verification::{is_manifest_entry, is_signature_entry, TrustStatus},
    *,
};
use clap::{Arg, ArgAction, Command};
use rayon::prelude::*;
use std::{collections::BTreeSet, io, path::Path, sync::Arc};
use tracing_subscriber::EnvFilter;

pub fn run() -> Result<(), VerifierError> {
    let binary_name = std::env::args()
        .next()
        .and_then(|p| {
            std::path::Path::new(&p)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| APP_BIN_NAME.to_string());

    let input_arg = || {
        Arg::new("input")
            .required(true)
            .help("Path to the archive (JAR/APK/ZIP)")
            .index(1)
    };
    let require_version_arg = || {
        Arg::new("require_version")
            .long("require-version")
            .action(ArgAction::SetTrue)
            .help("Reject manifests without Manifest-Version")
    };

    let matches = Command::new(APP_NAME)
        .bin_name(binary_name)
        .version(APP_VERSION)
        .author(APP_AUTHOR)
        .about(APP_ABOUT)
        .disable_version_flag(true)
        .help_template("{about-with-newline}{usage-heading} {usage}\n\n{all-args}\n")
        .subcommand_required(false)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("verify")
                .about("Read every entry and verify it against the signatures")
                .arg_required_else_help(true)
                .arg(input_arg())
                .arg(
                    Arg::new("trusted")
                        .short('p')
                        .long("trusted")
                        .help("Only accept signers from this certificate file (PEM/DER)"),
                )
                .arg(require_version_arg())
                .arg(
                    Arg::new("parallel")
                        .short('j')
                        .long("parallel")
                        .action(ArgAction::SetTrue)
                        .help("Verify entries on all cores"),
                ),
        )
        .subcommand(
            Command::new("manifest")
                .about("Print the archive manifest")
                .arg_required_else_help(true)
                .arg(input_arg())
                .arg(require_version_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List entries with manifest and signature coverage")
                .arg_required_else_help(true)
                .arg(input_arg()),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Set verbosity level (-v for verbose, -vv for more verbose, -vvv for debug)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Suppress all output except errors"),
        )
        .arg(
            Arg::new("version_custom")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print version information"),
        )
        .get_matches();

    if matches.get_flag("version_custom") {
        let mut ui = Ui::new(false, false, false, false, true);
        ui.enable_colors_if_supported();
        ui.print_version_info();
        return Ok(());
    }

    let verbosity_level = matches.get_count("verbose");
    let quiet = matches.get_flag("quiet");
    let mut ui = Ui::from_verbosity_level(verbosity_level, quiet, true);
    ui.enable_colors_if_supported();
    init_tracing(ui.debug);

    ui.print_banner();

    if matches.subcommand().is_none() {
        return Err(VerifierError::Config("No command provided".into()));
    }

    run_logic(&matches, &ui)
}

/// Library events go to stderr at `-vvv`, or whenever `RUST_LOG` is set.
fn init_tracing(debug: bool) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if debug => EnvFilter::new("zipverifierust=debug"),
        Err(_) => return,
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn run_logic(matches: &clap::ArgMatches, ui: &Ui) -> Result<(), VerifierError> {
    let config = Config::from_matches(matches, ui)?;

    let mut options = ArchiveOptions::new().named(display_name(&config.input_path));
    if let Some(ref version) = config.require_version {
        options = options.require_version(version.clone());
    }

    match config.mode {
        config::Mode::Verify { parallel } => {
            ui.print_mode_header("VERIFICATION MODE");
            let trusted = config
                .trusted_path
                .as_deref()
                .map(|p| TrustedCertificates::load(p, ui))
                .transpose()?;
            verify_archive(&config.input_path, options, parallel, trusted.as_ref(), ui)
        }
        config::Mode::Manifest => {
            let mut archive = Archive::open_path(&config.input_path, options)?;
            let manifest = archive.manifest()?.ok_or_else(|| {
                VerifierError::Validation(format!("{} has no {}", archive.name(), MANIFEST_NAME))
            })?;
            ui.verbose(&format!("{} entry section(s)", manifest.entry_count()));
            manifest.write_to(io::stdout().lock())?;
            Ok(())
        }
        config::Mode::List => {
            ui.print_mode_header("ENTRY LISTING");
            list_archive(&config.input_path, options, ui)
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

struct EntryOutcome {
    name: String,
    signers: Option<Signers>,
}

/// Streams one entry to the end so its digest is checked.
fn verify_entry<S: ArchiveSource>(
    archive: &mut Archive<S>,
    handle: &EntryHandle,
) -> Result<EntryOutcome, VerifierError> {
    let mut reader = archive.open_entry_stream(handle)?;
    io::copy(&mut reader, &mut io::sink()).map_err(VerifierError::from_read)?;
    Ok(EntryOutcome {
        name: handle.name().to_string(),
        signers: reader.signers().map(<[_]>::to_vec),
    })
}

fn verify_archive(
    path: &Path,
    options: ArchiveOptions,
    parallel: bool,
    trusted: Option<&TrustedCertificates>,
    ui: &Ui,
) -> Result<(), VerifierError> {
    let mut archive = Archive::open_path(path, options)?;
    ui.info(&format!("Verifying integrity: {}", path.display()));

    if archive.manifest()?.is_none() {
        return Err(VerifierError::Validation(format!(
            "{} is unsigned (no {})",
            archive.name(),
            MANIFEST_NAME
        )));
    }
    if !archive.is_signed()? {
        return Err(VerifierError::Validation(format!(
            "{} is unsigned (no valid signature files)",
            archive.name()
        )));
    }
    let session = archive.session();
    ui.verbose(&format!(
        "Signature files: {}",
        session.resolver().signature_file_names().join(", ")
    ));

    let handles: Vec<EntryHandle> = archive
        .entries()?
        .filter(|h| !h.is_dir() && !is_manifest_entry(h.name()) && !is_signature_entry(h.name()))
        .collect();
    ui.show_progress_bar(handles.len() as u64, "Verifying entries");

    let outcomes: Result<Vec<EntryOutcome>, VerifierError> = if parallel {
        ui.verbose(&format!("Parallel verification on {} threads", rayon::current_num_threads()));
        handles
            .par_iter()
            .map_init(
                || ZipSource::open(path).map(|source| Archive::join(source, Arc::clone(&session))),
                |view, handle| {
                    let outcome = match view {
                        Ok(view) => verify_entry(view, handle),
                        Err(e) => Err(VerifierError::Config(format!("Cannot reopen archive: {}", e))),
                    };
                    ui.inc_progress();
                    outcome
                },
            )
            .collect()
    } else {
        handles
            .iter()
            .map(|handle| {
                let outcome = verify_entry(&mut archive, handle);
                ui.inc_progress();
                outcome
            })
            .collect()
    };
    ui.finish_progress();
    let outcomes = outcomes?;

    let (signed, unsigned): (Vec<&EntryOutcome>, Vec<&EntryOutcome>) =
        outcomes.iter().partition(|o| o.signers.is_some());
    for outcome in &unsigned {
        ui.very_verbose(&format!("Not covered by a signature: {}", outcome.name));
    }

    if let Some(trusted) = trusted {
        for outcome in &signed {
            let accepted = outcome
                .signers
                .iter()
                .flatten()
                .any(|chain| trusted.accepts(chain));
            if !accepted {
                return Err(VerifierError::Validation(format!(
                    "`{}` is not signed by a trusted certificate",
                    outcome.name
                )));
            }
        }
        ui.verbose("All signed entries chain to a trusted certificate");
    }

    let subjects: BTreeSet<String> = signed
        .iter()
        .copied()
        .flat_map(|o| o.signers.iter().flatten())
        .filter_map(|chain| chain.signer())
        .map(|cert| cert.subject().to_string())
        .collect();
    let status = match session.status() {
        TrustStatus::FullySigned if unsigned.is_empty() => "Verified",
        TrustStatus::FullySigned | TrustStatus::PartiallyVerified => "Verified (partially signed)",
        TrustStatus::Unsigned | TrustStatus::Discovering => "Unsigned",
        TrustStatus::VerificationFailed => "Failed",
    };

    if unsigned.is_empty() {
        ui.success("Signature valid. Every entry is signed and intact.");
    } else {
        ui.warn(&format!(
            "{} entr{} not covered by any signature.",
            unsigned.len(),
            if unsigned.len() == 1 { "y is" } else { "ies are" }
        ));
    }
    ui.print_summary(
        "Verification Report",
        &[
            ("Status", status.to_string()),
            ("Archive", path.display().to_string()),
            ("Signed", signed.len().to_string()),
            ("Unsigned", unsigned.len().to_string()),
            ("Signers", subjects.into_iter().collect::<Vec<_>>().join("; ")),
        ],
    );
    Ok(())
}

fn list_archive(path: &Path, options: ArchiveOptions, ui: &Ui) -> Result<(), VerifierError> {
    let mut archive = Archive::open_path(path, options)?;
    let manifest = archive.manifest()?;
    let signed = archive.is_signed()?;
    let resolver = Arc::clone(archive.session().resolver());

    let (mut covered, mut listed, mut total) = (0usize, 0usize, 0usize);
    for handle in archive.entries()? {
        total += 1;
        let in_manifest = manifest
            .as_ref()
            .map_or(false, |m| m.entry(handle.name()).is_some());
        let is_covered = signed && resolver.init_entry(handle.name())?.is_some();
        let marker = if handle.is_dir() {
            "d"
        } else if is_covered {
            covered += 1;
            "sm"
        } else if in_manifest {
            listed += 1;
            "m"
        } else {
            "-"
        };
        let detail = if handle.is_dir() {
            String::new()
        } else {
            format!("{} bytes", handle.size())
        };
        ui.entry_row(marker, handle.name(), &detail);
    }

    ui.print_summary(
        "Listing",
        &[
            ("Entries", total.to_string()),
            ("Signed", covered.to_string()),
            ("Manifest", (covered + listed).to_string()),
            ("Signers", resolver.signature_file_names().join(", ")),
        ],
    );
    Ok(())
}
