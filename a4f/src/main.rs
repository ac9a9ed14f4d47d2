// SPDX-License-Identifier: Apache-2.0

mod alien;
mod alienspdx;
mod calc;
mod clearing;
mod cli;
mod config;
mod cve;
mod debian2spdx;
mod delta;
mod dep5;
mod error;
mod final_spdx;
mod harvest;
mod http;
mod identity;
mod matcher;
mod mirror;
mod pool;
mod runner;
mod scan;
mod session;
mod shell;
mod spdx_doc;
mod util;

use clap::Parser;
use cli::{Cli, Command, MirrorModeArg, SessionAction};
use config::{CliOverrides, Settings};
use error::{Error, Result};
use identity::Identity;
use matcher::{DebianMatcher, HttpDebianIndex, HttpSnapshotLookup, PackageMatcher, SnapMatcher};
use pool::{FileType, IfExists, Pool, Relationship};
use runner::StepError;
use session::{FilterPredicate, PackageRef, Session};
use shell::Shell;
use std::process::ExitCode;

fn main() -> ExitCode {
	let cli = Cli::parse();
	Shell::init(cli.global.verbosity());

	let env = env_logger::Env::new().filter("A4F_LOGLEVEL");
	env_logger::Builder::from_env(env).init();

	match run(cli) {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			Shell::error(&err);
			ExitCode::from(err.exit_code() as u8)
		}
	}
}

fn run(cli: Cli) -> Result<()> {
	let overrides = CliOverrides {
		pool_dir: None,
		ignore_cache: cli.global.ignore_cache,
		verbose: cli.global.verbose,
		quiet: cli.global.quiet,
		dry_run: cli.global.dryrun,
		session_id: cli.global.session.clone(),
		lock_key: cli.global.lock_key.clone(),
	};
	let settings = Settings::load(overrides)?;
	let pool = Pool::new(&settings.pool_dir, settings.cache_effective());

	match cli.command {
		Command::Config => cmd_config(&settings),
		Command::Session { action } => cmd_session(&pool, &settings, action),
		Command::Add { path, force } => cmd_add(&pool, &settings, &path, force),
		Command::Match => cmd_match(&pool, &settings),
		Command::Snapmatch => cmd_snapmatch(&pool, &settings),
		Command::Scan => cmd_scan(&pool, &settings),
		Command::Delta => cmd_delta(&pool, &settings),
		Command::Spdxdebian => cmd_spdxdebian(&pool, &settings),
		Command::Spdxalien => cmd_spdxalien(&pool, &settings),
		Command::Upload => cmd_upload(&pool, &settings),
		Command::Fossy { sbom } => cmd_fossy(&pool, &settings, sbom.as_deref()),
		Command::Harvest {
			filter_snapshot,
			with_binaries,
		} => cmd_harvest(&pool, &settings, filter_snapshot, with_binaries),
		Command::Cvecheck {
			feed_dir,
			years,
			vendor,
			product,
			version,
		} => cmd_cvecheck(&pool, &settings, &feed_dir, &years, vendor.zip(product).zip(version).map(|((v, p), ver)| (v, p, ver))),
		Command::Mirror { mode } => cmd_mirror(&pool, &settings, mode),
	}
}

fn cmd_config(settings: &Settings) -> Result<()> {
	println!("pool_dir: {}", settings.pool_dir.display());
	println!("cache: {}", settings.cache);
	println!("log_level: {}", settings.log_level);
	println!("session_id: {:?}", settings.session_id);
	Ok(())
}

fn require_session_id(settings: &Settings) -> Result<&str> {
	settings
		.session_id
		.as_deref()
		.ok_or_else(|| Error::config("--session is required for this command"))
}

fn load_session(pool: &Pool, settings: &Settings) -> Result<Session> {
	Session::load(pool, require_session_id(settings)?)
}

fn cmd_session(pool: &Pool, settings: &Settings, action: SessionAction) -> Result<()> {
	match action {
		SessionAction::Create { id } => {
			let session = Session::create(id);
			session.save(pool)?;
			println!("{}", session.id);
			Ok(())
		}
		SessionAction::Populate {
			name_glob,
			version_glob,
		} => {
			let mut session = load_session(pool, settings)?;
			session.check_mutation_allowed(settings.lock_key.as_deref(), false)?;
			let added = session.populate(pool, &name_glob, &version_glob)?;
			session.save(pool)?;
			Shell::progress(format!("added {added} package(s)"));
			Ok(())
		}
		SessionAction::AddVariants => {
			let mut session = load_session(pool, settings)?;
			session.check_mutation_allowed(settings.lock_key.as_deref(), false)?;
			let known: Vec<Identity> = session.packages.iter().map(|p| p.identity.clone()).collect();
			let added = session.add_variants(&known);
			session.save(pool)?;
			Shell::progress(format!("added {added} variant(s)"));
			Ok(())
		}
		SessionAction::ScoreGt { threshold } => {
			let mut session = load_session(pool, settings)?;
			session.filter(&FilterPredicate::ScoreGt(threshold));
			session.save(pool)
		}
		SessionAction::OnlyUploaded => {
			let mut session = load_session(pool, settings)?;
			session.filter(&FilterPredicate::OnlyUploaded);
			session.save(pool)
		}
		SessionAction::Lock => {
			let mut session = load_session(pool, settings)?;
			let key = settings
				.lock_key
				.clone()
				.ok_or_else(|| Error::config("--lock-key is required to lock a session"))?;
			session.lock(key)?;
			session.save(pool)
		}
		SessionAction::Unlock { force } => {
			let mut session = load_session(pool, settings)?;
			let key = settings.lock_key.clone().unwrap_or_default();
			session.unlock(&key, force)?;
			session.save(pool)
		}
		SessionAction::ReportCsv { path } => {
			let session = load_session(pool, settings)?;
			session.report_csv(&path)
		}
	}
}

fn cmd_add(pool: &Pool, settings: &Settings, path: &std::path::Path, force: bool) -> Result<()> {
	let package = alien::add(pool, path, force)?;
	Shell::progress(format!("ingested {}@{}", package.primary_name(), package.version()));

	if let Some(session_id) = &settings.session_id {
		let mut session = Session::load(pool, session_id)?;
		let identity = Identity::new(package.primary_name(), package.version());
		if !session.packages.iter().any(|p| p.identity == identity) {
			session.packages.push(PackageRef::new(identity));
			session.save(pool)?;
		}
	}
	Ok(())
}

/// Shared per-package driver for commands whose step writes one Pool
/// artifact and flips one `StepStatus` flag. Errors are recorded, not
/// propagated, per the §7 propagation rule (`runner::for_each_package`).
fn run_step(
	pool: &Pool,
	session: &mut Session,
	step_name: &str,
	ignore_cache: bool,
	mut step: impl FnMut(&Pool, &Identity) -> Result<()>,
) -> Result<Vec<StepError>> {
	let identities: Vec<Identity> = session.packages.iter().map(|p| p.identity.clone()).collect();
	let errors = runner::for_each_package(&identities, step_name, ignore_cache, |identity| step(pool, identity))?;
	Ok(errors)
}

fn load_alien_package(pool: &Pool, identity: &Identity) -> Result<alien::AlienPackage> {
	let basename = format!("{}-{}", identity.name, identity.version);
	let path = pool.resolve(
		Relationship::Userland,
		&identity.name,
		&identity.version,
		&basename,
		FileType::Aliensrc,
	);
	let archive_bytes = pool.read(&path)?;
	let manifest_bytes = extract_manifest_from_tar(&archive_bytes)?;
	let manifest = alien::parse_manifest(&manifest_bytes)?;
	let main_archive_index = manifest
		.source_package
		.files
		.iter()
		.position(|f| f.files_in_archive.is_positive_archive() && !f.is_unpack_disabled());
	Ok(alien::AlienPackage {
		manifest,
		main_archive_index,
	})
}

fn extract_manifest_from_tar(bytes: &[u8]) -> Result<Vec<u8>> {
	let mut archive = tar::Archive::new(bytes);
	let mut entries = archive.entries().map_err(|e| Error::Io {
		path: "aliensrc".into(),
		source: e,
	})?;
	let mut first = entries
		.next()
		.ok_or_else(|| Error::corrupt("empty .aliensrc archive"))?
		.map_err(|e| Error::Io {
			path: "aliensrc".into(),
			source: e,
		})?;
	let mut manifest_bytes = Vec::new();
	std::io::Read::read_to_end(&mut first, &mut manifest_bytes).map_err(|e| Error::Io {
		path: "aliensrc.json".into(),
		source: e,
	})?;
	Ok(manifest_bytes)
}

fn cmd_match(pool: &Pool, settings: &Settings) -> Result<()> {
	let mut session = load_session(pool, settings)?;
	let provider = HttpDebianIndex::new("https://sources.debian.org/api/index.json", config::DEFAULT_TIMEOUT)?;
	let matcher = DebianMatcher::new(provider);
	let archive_agent = http::tls::new_agent(config::DEFAULT_TIMEOUT)?;

	let errors = run_step(pool, &mut session, "match", settings.ignore_cache, |pool, identity| {
		let package = load_alien_package(pool, identity)?;
		let result = matcher.match_package(&package)?;
		let basename = format!("{}-{}", identity.name, identity.version);
		let path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::AlienMatcher);
		let bytes = serde_json::to_vec_pretty(&result).map_err(Error::Json)?;
		pool.write(&path, &bytes, IfExists::Overwrite)?;
		store_debian_archives(pool, &archive_agent, identity, &result)?;
		Ok(())
	})?;

	mark_succeeded(&mut session, &errors, |s| s.matched = true);
	record_errors(&errors);
	session.save(pool)
}

fn cmd_snapmatch(pool: &Pool, settings: &Settings) -> Result<()> {
	let mut session = load_session(pool, settings)?;
	let lookup = HttpSnapshotLookup::new("https://snapshot.debian.org", config::DEFAULT_TIMEOUT)?;
	let provider = HttpDebianIndex::new("https://sources.debian.org/api/index.json", config::DEFAULT_TIMEOUT)?;
	let matcher = SnapMatcher::new(lookup, provider);
	let archive_agent = http::tls::new_agent(config::DEFAULT_TIMEOUT)?;

	let errors = run_step(pool, &mut session, "snapmatch", settings.ignore_cache, |pool, identity| {
		let package = load_alien_package(pool, identity)?;
		let result = matcher.match_package(&package)?;
		let basename = format!("{}-{}", identity.name, identity.version);
		let path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::SnapMatch);
		let bytes = serde_json::to_vec_pretty(&result).map_err(Error::Json)?;
		pool.write(&path, &bytes, IfExists::Overwrite)?;
		store_debian_archives(pool, &archive_agent, identity, &result)?;
		Ok(())
	})?;

	mark_succeeded(&mut session, &errors, |_| {});
	record_errors(&errors);
	session.save(pool)
}

/// Invokes the external file-level scanner (spec §1, §6: "treated as
/// opaque") over the package's ingested archive, then persists its
/// normalized JSON output as this package's `ScancodeJson` artifact.
fn cmd_scan(pool: &Pool, settings: &Settings) -> Result<()> {
	let mut session = load_session(pool, settings)?;
	let scancode_cmd = match settings.scancode_mode {
		config::ScancodeMode::Native => "scancode",
		config::ScancodeMode::Wrapper => "scancode-wrapper",
	};

	let errors = run_step(pool, &mut session, "scan", settings.ignore_cache, |pool, identity| {
		let basename = format!("{}-{}", identity.name, identity.version);
		let json_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::ScancodeJson);
		let spdx_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::ScancodeSpdx);

		if pool.is_cached(&json_path) && pool.is_cached(&spdx_path) {
			return Ok(());
		}

		let archive_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::Aliensrc);
		let out_json = std::env::temp_dir().join(format!("{basename}.scancode.json"));
		let out_spdx = std::env::temp_dir().join(format!("{basename}.scancode.spdx"));
		let status = std::process::Command::new(scancode_cmd)
			.arg(pool.path_for(&archive_path))
			.arg(&out_json)
			.arg(&out_spdx)
			.status()
			.map_err(|e| Error::Io { path: out_json.clone(), source: e })?;
		if !status.success() {
			return Err(Error::SubprocessFailure {
				command: scancode_cmd.to_owned(),
				status: status.code(),
			});
		}

		pool.write(&json_path, &util::fs::read_bytes(&out_json)?, IfExists::Overwrite)?;
		pool.write(&spdx_path, &util::fs::read_bytes(&out_spdx)?, IfExists::Overwrite)?;
		Ok(())
	})?;

	mark_succeeded(&mut session, &errors, |s| s.scanned = true);
	record_errors(&errors);
	session.save(pool)
}

fn read_scan_report(pool: &Pool, identity: &Identity, file_type: FileType) -> Result<scan::ScanReport> {
	let path = pool.resolve(
		Relationship::Userland,
		&identity.name,
		&identity.version,
		&format!("{}-{}", identity.name, identity.version),
		file_type,
	);
	let bytes = pool.read(&path)?;
	serde_json::from_slice(&bytes).map_err(Error::Json)
}

/// Reduces an SPDX document's per-file entries to the `{path →
/// findings}` shape `delta::reconcile` compares against, so the
/// Debian side of the delta can be taken from `DebianSpdx` (spec
/// §4.5's "old" input) instead of a second scan run.
fn spdx_to_scan_report(doc: &spdx_rs::models::SPDX) -> scan::ScanReport {
	let mut report = scan::ScanReport::new();
	for file in &doc.file_information {
		let sha1 = file
			.file_checksum
			.iter()
			.find(|c| c.algorithm == spdx_rs::models::Algorithm::SHA1)
			.map(|c| c.value.clone());
		let licenses = if file.concluded_license == spdx_doc::NOASSERTION {
			Vec::new()
		} else {
			vec![file.concluded_license.clone()]
		};
		let copyrights = if file.copyright_text == spdx_doc::NOASSERTION {
			Vec::new()
		} else {
			vec![file.copyright_text.clone()]
		};
		report.files.insert(
			file.file_name.clone(),
			scan::FileFindings {
				licenses,
				copyrights,
				sha1,
			},
		);
	}
	report
}

fn cmd_delta(pool: &Pool, settings: &Settings) -> Result<()> {
	let mut session = load_session(pool, settings)?;

	let errors = run_step(pool, &mut session, "delta", settings.ignore_cache, |pool, identity| {
		let debian_spdx_path = pool.resolve(
			Relationship::Debian,
			&identity.name,
			&identity.version,
			&format!("{}-{}", identity.name, identity.version),
			FileType::DebianSpdx,
		);
		let debian_report = pool
			.read(&debian_spdx_path)
			.ok()
			.and_then(|b| String::from_utf8(b).ok())
			.and_then(|s| spdx_doc::from_tag_value(&s).ok())
			.map(|doc| spdx_to_scan_report(&doc))
			.unwrap_or_default();
		let alien_report = read_scan_report(pool, identity, FileType::ScancodeJson)?;
		let report = delta::reconcile(&debian_report, &alien_report);
		let path = pool.resolve(
			Relationship::Userland,
			&identity.name,
			&identity.version,
			&format!("{}-{}", identity.name, identity.version),
			FileType::Deltacode,
		);
		let bytes = serde_json::to_vec_pretty(&report).map_err(Error::Json)?;
		pool.write(&path, &bytes, IfExists::Overwrite)?;
		Ok(())
	})?;

	mark_succeeded(&mut session, &errors, |s| s.delta_done = true);
	record_errors(&errors);
	session.save(pool)
}

/// Downloads `url` in full; every Debian archive artifact (`.dsc`,
/// `.orig.tar.*`, `.debian.tar.*`/`.diff.gz`) is small enough to buffer
/// whole rather than stream.
fn download_bytes(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
	use std::io::Read as _;
	let resp = agent.get(url).call()?;
	let mut bytes = Vec::new();
	resp.into_reader().read_to_end(&mut bytes).map_err(|e| Error::Io {
		path: url.into(),
		source: e,
	})?;
	Ok(bytes)
}

/// Picks the tar decompressor by the archive URL's suffix. Debian
/// sources ship `.orig.tar.gz`, `.orig.tar.xz`, and `.debian.tar.{xz,zst}`
/// depending on era and compressor; an unrecognized suffix is an error
/// rather than a silent zstd guess.
fn decompress_by_suffix<'a>(url: &str, bytes: &'a [u8]) -> Result<Box<dyn std::io::Read + 'a>> {
	if url.ends_with(".gz") {
		Ok(Box::new(flate2::read::GzDecoder::new(bytes)))
	} else if url.ends_with(".xz") {
		Ok(Box::new(xz2::read::XzDecoder::new(bytes)))
	} else if url.ends_with(".zst") || url.ends_with(".zstd") {
		Ok(Box::new(zstd::stream::read::Decoder::new(bytes).map_err(|e| Error::Io {
			path: url.into(),
			source: e,
		})?))
	} else {
		Err(Error::corrupt(format!("unrecognized archive compression for {url}")))
	}
}

/// Downloads the matched Debian source's `debian.tar.*` diff and
/// extracts `debian/copyright` from it, the input `spdxdebian` reduces
/// into an SPDX document (spec §4.6).
fn fetch_debian_copyright(agent: &ureq::Agent, debsrc_debian_url: &str) -> Result<String> {
	use std::io::Read as _;

	let bytes = download_bytes(agent, debsrc_debian_url)?;
	let decompressed = decompress_by_suffix(debsrc_debian_url, &bytes)?;

	let mut archive = tar::Archive::new(decompressed);
	for entry in archive.entries().map_err(|e| Error::Io {
		path: "debian.tar".into(),
		source: e,
	})? {
		let mut entry = entry.map_err(|e| Error::Io {
			path: "debian.tar".into(),
			source: e,
		})?;
		let path = entry.path().map_err(|e| Error::Io {
			path: "debian.tar".into(),
			source: e,
		})?;
		if path.ends_with("debian/copyright") {
			let mut text = String::new();
			entry.read_to_string(&mut text).map_err(|e| Error::Io {
				path: "debian/copyright".into(),
				source: e,
			})?;
			return Ok(text);
		}
	}
	Err(Error::not_found("debian/copyright not present in debian.tar"))
}

/// Lists every entry path inside a downloaded `.orig.tar.*` archive, the
/// `archive_paths` that `debian2spdx::extract` glob-matches DEP-5
/// `Files:` stanzas against to populate per-file SPDX entries.
fn list_archive_paths(url: &str, bytes: &[u8]) -> Result<Vec<String>> {
	let decompressed = decompress_by_suffix(url, bytes)?;
	let mut archive = tar::Archive::new(decompressed);
	let mut paths = Vec::new();
	for entry in archive.entries().map_err(|e| Error::Io {
		path: "orig.tar".into(),
		source: e,
	})? {
		let entry = entry.map_err(|e| Error::Io {
			path: "orig.tar".into(),
			source: e,
		})?;
		let path = entry.path().map_err(|e| Error::Io {
			path: "orig.tar".into(),
			source: e,
		})?;
		paths.push(path.to_string_lossy().into_owned());
	}
	Ok(paths)
}

/// Downloads and caches the matched Debian source's `.dsc`,
/// `.orig.tar.*`, and `.debian.tar.*`/`.diff.gz` under `pool/debian/`
/// (spec §4.4: matchers "retrieve ... by HTTP; store them under
/// `pool/debian/<name>/<version>/`"). Skips whichever URL the match
/// didn't find.
fn store_debian_archives(pool: &Pool, agent: &ureq::Agent, identity: &Identity, result: &matcher::MatchResult) -> Result<()> {
	let basename = format!("{}-{}", identity.name, identity.version);
	if let Some(url) = &result.dsc_url {
		let path = pool.resolve(Relationship::Debian, &identity.name, &identity.version, &basename, FileType::DebianDsc);
		pool.ensure(&path, || download_bytes(agent, url))?;
	}
	if let Some(url) = &result.debsrc_orig {
		let path = pool.resolve(Relationship::Debian, &identity.name, &identity.version, &basename, FileType::DebianOrigArchive);
		pool.ensure(&path, || download_bytes(agent, url))?;
	}
	if let Some(url) = &result.debsrc_debian {
		let path = pool.resolve(Relationship::Debian, &identity.name, &identity.version, &basename, FileType::DebianDiffArchive);
		pool.ensure(&path, || download_bytes(agent, url))?;
	}
	Ok(())
}

fn cmd_spdxdebian(pool: &Pool, settings: &Settings) -> Result<()> {
	let mut session = load_session(pool, settings)?;
	let agent = http::tls::new_agent(config::DEFAULT_TIMEOUT)?;

	let errors = run_step(pool, &mut session, "spdxdebian", settings.ignore_cache, |pool, identity| {
		let basename = format!("{}-{}", identity.name, identity.version);
		let matcher_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::AlienMatcher);
		let match_result: matcher::MatchResult = pool.read(&matcher_path).and_then(|b| serde_json::from_slice(&b).map_err(Error::Json))?;
		let debsrc_debian = match_result
			.debsrc_debian
			.ok_or_else(|| Error::not_found("no matched Debian diff to derive debian/copyright from"))?;

		let copyright_path = pool.resolve(Relationship::Debian, &identity.name, &identity.version, &basename, FileType::DebianCopyrightRaw);
		let copyright_text = pool.ensure(&copyright_path, || {
			fetch_debian_copyright(&agent, &debsrc_debian).map(|s| s.into_bytes())
		})?;
		let copyright_text = String::from_utf8_lossy(&copyright_text).into_owned();

		let archive_paths = match &match_result.debsrc_orig {
			Some(orig_url) => {
				let orig_path = pool.resolve(Relationship::Debian, &identity.name, &identity.version, &basename, FileType::DebianOrigArchive);
				let orig_bytes = pool.ensure(&orig_path, || download_bytes(&agent, orig_url))?;
				list_archive_paths(orig_url, &orig_bytes)?
			}
			None => Vec::new(),
		};

		let doc = debian2spdx::extract(&identity.name, &identity.version, &copyright_text, &archive_paths)?;
		let path = pool.resolve(Relationship::Debian, &identity.name, &identity.version, &basename, FileType::DebianSpdx);
		let text = spdx_doc::to_tag_value(&doc)?;
		pool.write(&path, text.as_bytes(), IfExists::Overwrite)
	})?;

	mark_succeeded(&mut session, &errors, |s| s.spdx_debian_done = true);
	record_errors(&errors);
	session.save(pool)
}

fn cmd_spdxalien(pool: &Pool, settings: &Settings) -> Result<()> {
	let mut session = load_session(pool, settings)?;

	let errors = run_step(pool, &mut session, "spdxalien", settings.ignore_cache, |pool, identity| {
		let scancode_spdx_path = pool.resolve(
			Relationship::Userland,
			&identity.name,
			&identity.version,
			&format!("{}-{}", identity.name, identity.version),
			FileType::ScancodeSpdx,
		);
		let scancode_text = pool.read(&scancode_spdx_path).map(|b| String::from_utf8_lossy(&b).into_owned())?;
		let scancode_doc = spdx_doc::from_tag_value(&scancode_text)?;

		let delta_path = pool.resolve(
			Relationship::Userland,
			&identity.name,
			&identity.version,
			&format!("{}-{}", identity.name, identity.version),
			FileType::Deltacode,
		);
		let delta_report: Option<delta::DeltaReport> = pool
			.read(&delta_path)
			.ok()
			.and_then(|b| serde_json::from_slice(&b).ok());

		let debian_spdx_path = pool.resolve(
			Relationship::Debian,
			&identity.name,
			&identity.version,
			&format!("{}-{}", identity.name, identity.version),
			FileType::DebianSpdx,
		);
		let debian_doc: Option<spdx_rs::models::SPDX> = pool
			.read(&debian_spdx_path)
			.ok()
			.and_then(|b| String::from_utf8(b).ok())
			.and_then(|s| spdx_doc::from_tag_value(&s).ok());

		let (synthesized, warnings) =
			alienspdx::synthesize(&scancode_doc, delta_report.as_ref(), debian_doc.as_ref(), false);
		for warning in &warnings {
			Shell::warn(&warning.0);
		}

		let path = pool.resolve(
			Relationship::Userland,
			&identity.name,
			&identity.version,
			&format!("{}-{}", identity.name, identity.version),
			FileType::AlienSpdx,
		);
		let text = spdx_doc::to_tag_value(&synthesized)?;
		pool.write(&path, text.as_bytes(), IfExists::Overwrite)
	})?;

	mark_succeeded(&mut session, &errors, |s| s.spdx_alien_done = true);
	record_errors(&errors);
	session.save(pool)
}

fn cmd_upload(pool: &Pool, settings: &Settings) -> Result<()> {
	let mut session = load_session(pool, settings)?;
	let fossy = settings
		.fossy
		.clone()
		.ok_or_else(|| Error::config("FOSSY_* credentials are required for upload"))?;
	let mut client = clearing::ClearingClient::new(fossy.server.as_str(), fossy.password.clone())?;

	let errors = run_step(pool, &mut session, "upload", settings.ignore_cache, |pool, identity| {
		let basename = format!("{}-{}", identity.name, identity.version);
		let archive_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::Aliensrc);
		let archive_bytes = pool.read(&archive_path)?;
		let sha256 = sha256::digest(&archive_bytes);

		let alien_spdx_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::AlienSpdx);
		let alien_spdx_tagvalue = pool.read(&alien_spdx_path).map(|b| String::from_utf8_lossy(&b).into_owned())?;

		let rdfxml_out = std::env::temp_dir().join(format!("{basename}.alien.rdf"));
		let tagvalue_tmp = std::env::temp_dir().join(format!("{basename}.alien.spdx"));
		util::fs::write_bytes(&tagvalue_tmp, alien_spdx_tagvalue.as_bytes())?;
		let rdfxml = if let Some(tool) = &settings.spdx_tools_cmd {
			clearing::convert_to_rdfxml(tool, &tagvalue_tmp, &rdfxml_out)?;
			util::fs::read_string(&rdfxml_out).unwrap_or(alien_spdx_tagvalue)
		} else {
			alien_spdx_tagvalue
		};

		let report = clearing::clear_package(&mut client, &identity.name, &identity.version, &archive_bytes, &sha256, Some(&rdfxml))?;
		let fossy_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::FossyJson);
		let bytes = serde_json::to_vec_pretty(&report).map_err(Error::Json)?;
		pool.write(&fossy_path, &bytes, IfExists::Overwrite)
	})?;

	mark_succeeded(&mut session, &errors, |s| s.uploaded = true);
	record_errors(&errors);
	session.save(pool)
}

fn cmd_fossy(pool: &Pool, settings: &Settings, sbom: Option<&std::path::Path>) -> Result<()> {
	let mut session = load_session(pool, settings)?;
	let supplement = sbom.map(final_spdx::read_cyclonedx_supplement).transpose()?;

	let errors = run_step(pool, &mut session, "fossy", settings.ignore_cache, |pool, identity| {
		let basename = format!("{}-{}", identity.name, identity.version);
		let fossy_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::FossyJson);
		let fossy_report: clearing::FossyReport = pool.read(&fossy_path).and_then(|b| serde_json::from_slice(&b).map_err(Error::Json))?;
		if !fossy_report.status.is_terminal() {
			return Err(Error::ServiceUnavailable(format!("upload {} has not reached a terminal status yet", fossy_report.upload_id)));
		}

		let alien_spdx_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::AlienSpdx);
		let alien_text = pool.read(&alien_spdx_path).map(|b| String::from_utf8_lossy(&b).into_owned())?;
		let alien_doc = spdx_doc::from_tag_value(&alien_text)?;

		// The clearing server's own SPDX export isn't modeled as a
		// pool artifact; reuse the Alien SPDX's file tree as the
		// starting point and layer the server's concluded decisions
		// on top, same shape `finalize` expects to repair.
		let mut server_doc = alien_doc.clone();
		server_doc.document_name = format!("{}-{}-final", identity.name, identity.version);
		for file in &mut server_doc.file_information {
			if let Some(license) = fossy_report.concluded_licenses.get(&file.file_name) {
				file.concluded_license = license.clone();
			}
		}

		let alien_package = load_alien_package(pool, identity)?;
		let mut finalized = final_spdx::finalize(server_doc, &alien_package, &alien_doc);
		if let Some(supplement) = &supplement {
			final_spdx::apply_cyclonedx_supplement(&mut finalized, supplement);
		}

		let final_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::FinalSpdx);
		let text = spdx_doc::to_tag_value(&finalized)?;
		pool.write(&final_path, text.as_bytes(), IfExists::Overwrite)
	})?;

	mark_succeeded(&mut session, &errors, |s| s.fossy_done = true);
	record_errors(&errors);
	session.save(pool)
}

fn cmd_harvest(pool: &Pool, settings: &Settings, filter_snapshot: Option<String>, with_binaries: Vec<String>) -> Result<()> {
	let mut session = load_session(pool, settings)?;
	let statuses: std::collections::HashMap<Identity, session::StepStatus> =
		session.packages.iter().map(|p| (p.identity.clone(), p.status.clone())).collect();
	let mut doc = harvest::Harvest::default();

	let errors = run_step(pool, &mut session, "harvest", settings.ignore_cache, |pool, identity| {
		let basename = format!("{}-{}", identity.name, identity.version);
		let tinfoilhat_path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::TinfoilHat);
		let tinfoilhat: harvest::TinfoilHat = pool.read(&tinfoilhat_path).and_then(|b| serde_json::from_slice(&b).map_err(Error::Json))?;
		let scan = read_scan_report(pool, identity, FileType::ScancodeJson)?;
		let status = statuses.get(identity).cloned().unwrap_or_default();
		let progress = harvest::AuditProgress {
			matched: status.matched,
			scanned: status.scanned,
			delta_done: status.delta_done,
			spdx_done: status.spdx_alien_done,
			uploaded: status.uploaded,
			fossy_done: status.fossy_done,
		};
		let entry = harvest::attribute(identity, &tinfoilhat, progress, &scan);
		harvest::merge(&mut doc, identity, entry);
		Ok(())
	})?;

	if let Some(keep) = &filter_snapshot {
		doc = harvest::filter_snapshot(&doc, keep);
	}
	if !with_binaries.is_empty() {
		doc = harvest::with_binaries(&doc, &with_binaries);
	}

	let path = pool.resolve(Relationship::Stats, "_", "_", "harvest", FileType::Harvest);
	let bytes = serde_json::to_vec_pretty(&doc).map_err(Error::Json)?;
	pool.write(&path, &bytes, IfExists::Overwrite)?;

	mark_succeeded(&mut session, &errors, |s| s.harvested = true);
	record_errors(&errors);
	session.save(pool)
}

/// Checks harvested packages against the NVD feed (spec §4.11), either
/// for one explicit `(vendor, product, version)` triple or, absent
/// that, for every session package under the vendor==product CPE
/// convention single-component open-source projects are indexed under
/// (e.g. `cpe:2.3:a:zlib:zlib:...`).
fn cmd_cvecheck(
	pool: &Pool,
	settings: &Settings,
	feed_dir: &std::path::Path,
	years: &[u32],
	explicit: Option<(String, String, String)>,
) -> Result<()> {
	let agent = http::tls::new_agent(config::DEFAULT_TIMEOUT)?;
	let mut records = Vec::new();
	for year in years {
		let path = cve::refresh_feed(&agent, feed_dir, *year)?;
		let text = util::fs::read_string(&path)?;
		let feed: Vec<cve::CveRecord> = serde_json::from_str(&text).map_err(Error::Json)?;
		records.extend(feed);
	}

	let mut report = cve::CveCheckReport::default();
	if let Some((vendor, product, version)) = &explicit {
		let one = cve::filter(&records, vendor, product, version);
		report.identified.extend(one.identified);
		report.review.extend(one.review);
	} else {
		let session = load_session(pool, settings)?;
		for p in &session.packages {
			let one = cve::filter(&records, &p.identity.name, &p.identity.name, &p.identity.version);
			report.identified.extend(one.identified);
			report.review.extend(one.review);
		}
	}

	let path = pool.resolve(Relationship::Stats, "_", "_", "cve", FileType::CveHarvest);
	let bytes = serde_json::to_vec_pretty(&report).map_err(Error::Json)?;
	pool.write(&path, &bytes, IfExists::Overwrite)
}

fn cmd_mirror(pool: &Pool, settings: &Settings, mode: MirrorModeArg) -> Result<()> {
	let mirror_db = settings
		.mirror_db
		.clone()
		.ok_or_else(|| Error::config("MIRROR_DB_* settings are required for mirror"))?;
	let mut conn = rusqlite::Connection::open(format!("{}/{}.sqlite", mirror_db.host, mirror_db.dbname)).map_err(Error::Sql)?;
	mirror::init_schema(&conn)?;

	let session = load_session(pool, settings)?;
	let mode = match mode {
		MirrorModeArg::Full => mirror::Mode::Full,
		MirrorModeArg::Delta => mirror::Mode::Delta,
	};

	let mut owned: Vec<(String, serde_json::Value)> = Vec::new();
	for p in &session.packages {
		let identity = &p.identity;
		let basename = format!("{}-{}", identity.name, identity.version);
		let path = pool.resolve(Relationship::Userland, &identity.name, &identity.version, &basename, FileType::TinfoilHat);
		let Ok(bytes) = pool.read(&path) else { continue };
		let data: serde_json::Value = serde_json::from_slice(&bytes).map_err(Error::Json)?;
		owned.push((format!("{basename}.tinfoilhat.json"), data));
	}

	let entries: Vec<mirror::MirrorEntry> = owned
		.iter()
		.map(|(fname, data)| mirror::MirrorEntry { fname, data })
		.collect();
	mirror::project(&mut conn, &session.id, &entries, mode)?;

	Ok(())
}

fn record_errors(errors: &[StepError]) {
	if !errors.is_empty() {
		Shell::warn(format!("{} package(s) recorded an error and were skipped", errors.len()));
	}
}

/// Flips `set` true on every package that did NOT record an error this
/// step, so a recoverable failure never gets marked as done.
fn mark_succeeded(session: &mut Session, errors: &[StepError], set: impl Fn(&mut session::StepStatus)) {
	let failed: std::collections::HashSet<&Identity> = errors.iter().map(|e| &e.identity).collect();
	for p in &mut session.packages {
		if !failed.contains(&p.identity) {
			set(&mut p.status);
		}
	}
}
