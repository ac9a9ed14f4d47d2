// SPDX-License-Identifier: Apache-2.0

//! The command-line surface (spec §6): `config, session, add, match,
//! snapmatch, scan, delta, spdxdebian, spdxalien, upload, fossy,
//! harvest, cvecheck, mirror`, each taking the global `--session`,
//! `-i/--ignore-cache`, `-v/-q`, `--dryrun` flags.

use crate::shell::verbosity::Verbosity;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Flags shared by every per-package command.
#[derive(Debug, Args, Clone)]
pub struct GlobalArgs {
	/// Session to operate on; required by every command but `config`.
	#[arg(long, global = true)]
	pub session: Option<String>,

	/// Re-derive artifacts instead of reading a cached Pool entry.
	#[arg(short = 'i', long = "ignore-cache", global = true)]
	pub ignore_cache: bool,

	#[arg(short = 'v', global = true)]
	pub verbose: bool,

	#[arg(short = 'q', global = true)]
	pub quiet: bool,

	/// Compute and report what would happen without writing to the Pool.
	#[arg(long, global = true)]
	pub dryrun: bool,

	/// Lock key presented for mutating session operations.
	#[arg(long, global = true)]
	pub lock_key: Option<String>,
}

impl GlobalArgs {
	pub fn verbosity(&self) -> Verbosity {
		Verbosity::from_flags(self.quiet, self.verbose)
	}
}

#[derive(Debug, Parser)]
#[command(name = "a4f", about = "Software composition analysis pipeline for Yocto/BitBake alien packages")]
pub struct Cli {
	#[command(flatten)]
	pub global: GlobalArgs,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Print the resolved configuration and exit.
	Config,

	/// Manage sessions: create, populate, filter, lock/unlock, report.
	Session {
		#[command(subcommand)]
		action: SessionAction,
	},

	/// Ingest an `.aliensrc` tarball into the Pool.
	Add {
		/// Path to the `.aliensrc` tar file.
		path: PathBuf,
		/// Overwrite an existing Pool entry for the same identity.
		#[arg(long)]
		force: bool,
	},

	/// Match every session package against the current Debian index.
	Match,

	/// Match every session package against Debian snapshot's historical index.
	Snapmatch,

	/// Run the file-level scanner over every session package.
	Scan,

	/// Reconcile Debian and alien scan findings (spec §4.5).
	Delta,

	/// Extract an SPDX document from each matched package's `debian/copyright`.
	Spdxdebian,

	/// Synthesize the Alien SPDX document (spec §4.8).
	Spdxalien,

	/// Upload each package's archive and Alien SPDX to the clearing server.
	Upload,

	/// Poll the clearing server and finalize the SPDX document (spec §4.9).
	Fossy {
		/// Optional accompanying CycloneDX SBOM to supplement package metadata.
		#[arg(long)]
		sbom: Option<PathBuf>,
	},

	/// Aggregate per-identity audit results (spec §4.10).
	Harvest {
		/// Keep only this one snapshot tag alongside tagged releases.
		#[arg(long)]
		filter_snapshot: Option<String>,
		/// Restrict output to these binary package names.
		#[arg(long = "with-binary")]
		with_binaries: Vec<String>,
	},

	/// Check harvested packages against the NVD feed (spec §4.11).
	///
	/// Without `--vendor`/`--product`/`--version`, checks every session
	/// package by `(name, name)` as the `(vendor, product)` pair — the
	/// common CPE convention for single-component projects (e.g.
	/// `cpe:2.3:a:zlib:zlib:...`). Pass all three flags together to
	/// check one explicit `(vendor, product, version)` triple instead.
	Cvecheck {
		/// Directory the yearly NVD feed files are cached under.
		#[arg(long)]
		feed_dir: PathBuf,
		/// Years to check, e.g. `2023 2024`.
		#[arg(long = "year", required = true)]
		years: Vec<u32>,
		/// CPE vendor for an explicit-triple check.
		#[arg(long, requires_all = ["product", "version"])]
		vendor: Option<String>,
		/// CPE product for an explicit-triple check.
		#[arg(long, requires_all = ["vendor", "version"])]
		product: Option<String>,
		/// Product version for an explicit-triple check.
		#[arg(long, requires_all = ["vendor", "product"])]
		version: Option<String>,
	},

	/// Project harvested `.tinfoilhat.json` documents into SQL (spec §4.12).
	Mirror {
		#[arg(long, value_enum)]
		mode: MirrorModeArg,
	},
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum MirrorModeArg {
	Full,
	Delta,
}

#[derive(Debug, Subcommand)]
pub enum SessionAction {
	/// Create a new session, optionally with a fixed id.
	Create { id: Option<String> },
	/// Add every Pool-known package matching the given glob patterns.
	Populate {
		#[arg(default_value = "*")]
		name_glob: String,
		#[arg(default_value = "*")]
		version_glob: String,
	},
	/// Pull in every Pool-known variant sharing `(name, version)` with an existing member.
	AddVariants,
	/// Keep only packages whose score exceeds the threshold.
	ScoreGt { threshold: f64 },
	/// Keep only uploaded packages.
	OnlyUploaded,
	/// Lock the session with the configured lock key.
	Lock,
	/// Unlock the session.
	Unlock {
		#[arg(long)]
		force: bool,
	},
	/// Write a CSV report of the session's packages.
	ReportCsv { path: PathBuf },
}
