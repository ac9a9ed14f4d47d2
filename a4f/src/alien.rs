// SPDX-License-Identifier: Apache-2.0

//! AlienPackage ingestion (`add`): parses an `.aliensrc` tarball's
//! manifest, selects its main internal archive, and copies it into the
//! Pool under `userland/<name>/<version>/` (spec §4.3, §6).

use crate::error::{Error, Result};
use crate::pool::{FileType, IfExists, Pool, Relationship};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// `files_in_archive`: a positive count, `false` (not an archive), or
/// `0` (an empty archive) — modeled as a tagged variant instead of the
/// source's overloaded `int|false|0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArchiveFileCount {
	Count(u64),
	NotArchive,
}

impl<'de> Deserialize<'de> for ArchiveFileCount {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		let value = serde_json::Value::deserialize(deserializer)?;
		match value {
			serde_json::Value::Bool(false) => Ok(ArchiveFileCount::NotArchive),
			serde_json::Value::Bool(true) => Err(de::Error::custom(
				"files_in_archive: `true` is not a valid value",
			)),
			serde_json::Value::Number(n) => n
				.as_u64()
				.map(ArchiveFileCount::Count)
				.ok_or_else(|| de::Error::custom("files_in_archive: not a non-negative integer")),
			other => Err(de::Error::custom(format!(
				"files_in_archive: unexpected value {other}"
			))),
		}
	}
}

impl ArchiveFileCount {
	/// Whether this entry is eligible to be the main internal archive:
	/// a strictly positive count.
	pub fn is_positive_archive(&self) -> bool {
		matches!(self, ArchiveFileCount::Count(n) if *n > 0)
	}
}

/// One entry in `source_package.files[]` (spec §3, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFile {
	pub name: String,
	pub sha1_cksum: String,
	#[serde(default)]
	pub git_sha1: Option<String>,
	pub src_uri: String,
	pub files_in_archive: ArchiveFileCount,
	#[serde(default)]
	pub paths: Vec<String>,
}

impl ManifestFile {
	/// Whether `src_uri` uses the `git://` scheme.
	pub fn is_git(&self) -> bool {
		self.src_uri.starts_with("git://")
	}

	/// BitBake `SRC_URI` parameters are semicolon-separated
	/// `name=value` pairs following the URL, e.g.
	/// `http://x/y.tar.gz;unpack=0`.
	fn params(&self) -> Vec<(&str, &str)> {
		self.src_uri
			.split(';')
			.skip(1)
			.filter_map(|segment| segment.split_once('='))
			.collect()
	}

	/// Whether this entry's `src_uri` explicitly disables unpacking.
	pub fn is_unpack_disabled(&self) -> bool {
		self.params()
			.iter()
			.any(|(k, v)| *k == "unpack" && (*v == "0" || *v == "no" || *v == "false"))
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcePackage {
	/// Ordered aliases; index 0 is the primary name.
	pub name: Vec<String>,
	pub version: String,
	pub manager: String,
	#[serde(default)]
	pub metadata: serde_json::Value,
	pub files: Vec<ManifestFile>,
	#[serde(default)]
	pub tags: Vec<String>,
}

/// The `aliensrc.json` manifest, schema-for-schema with spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
	#[serde(default = "default_manifest_version")]
	pub version: u32,
	pub source_package: SourcePackage,
}

fn default_manifest_version() -> u32 {
	1
}

/// The parsed, immutable representation of an ingested `.aliensrc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlienPackage {
	pub manifest: Manifest,
	/// Index into `manifest.source_package.files` of the selected main
	/// internal archive, if one was found (spec §4.3's selection rule).
	pub main_archive_index: Option<usize>,
}

impl AlienPackage {
	pub fn primary_name(&self) -> &str {
		&self.manifest.source_package.name[0]
	}

	pub fn alternative_names(&self) -> &[String] {
		&self.manifest.source_package.name[1..]
	}

	pub fn version(&self) -> &str {
		&self.manifest.source_package.version
	}

	pub fn files(&self) -> &[ManifestFile] {
		&self.manifest.source_package.files
	}

	pub fn main_archive(&self) -> Option<&ManifestFile> {
		self.main_archive_index.map(|i| &self.files()[i])
	}

	/// The canonical archive identity: the main archive's sha1, plus
	/// its git commit when `src_uri` is `git://` (spec §4.3).
	pub fn canonical_archive_identity(&self) -> Option<String> {
		let archive = self.main_archive()?;
		match (&archive.git_sha1, archive.is_git()) {
			(Some(git_sha1), true) => Some(format!("{}+git.{}", archive.sha1_cksum, git_sha1)),
			_ => Some(archive.sha1_cksum.clone()),
		}
	}

	fn validate(&self) -> Result<()> {
		let sp = &self.manifest.source_package;
		if sp.name.is_empty() {
			return Err(Error::corrupt("aliensrc.json: source_package.name is empty"));
		}
		if sp.version.is_empty() {
			return Err(Error::corrupt("aliensrc.json: source_package.version is empty"));
		}
		for file in &sp.files {
			if file.sha1_cksum.len() != 40 || !file.sha1_cksum.chars().all(|c| c.is_ascii_hexdigit())
			{
				return Err(Error::corrupt(format!(
					"aliensrc.json: file '{}' has a malformed sha1_cksum",
					file.name
				)));
			}
		}
		Ok(())
	}
}

/// Selects the main internal archive per the spec §4.3 rule: among
/// files whose `files_in_archive` is a positive integer, pick the one
/// whose `src_uri` does not disable unpacking, ties broken by order of
/// appearance.
fn select_main_archive(files: &[ManifestFile]) -> Option<usize> {
	files
		.iter()
		.position(|f| f.files_in_archive.is_positive_archive() && !f.is_unpack_disabled())
}

/// Parse a manifest from raw `aliensrc.json` bytes (used both by `add`
/// and by tests verifying the round-trip property of spec §8).
pub fn parse_manifest(bytes: &[u8]) -> Result<Manifest> {
	serde_json::from_slice(bytes).map_err(Error::Json)
}

fn package_from_manifest(manifest: Manifest) -> Result<AlienPackage> {
	let main_archive_index = select_main_archive(&manifest.source_package.files);
	let package = AlienPackage {
		manifest,
		main_archive_index,
	};
	package.validate()?;
	Ok(package)
}

/// Ingest an `.aliensrc` tar from disk: the first member must be
/// `aliensrc.json`. The whole archive is then copied verbatim into the
/// Pool.
pub fn add(pool: &Pool, tar_path: &Path, force: bool) -> Result<AlienPackage> {
	let raw = crate::util::fs::read_bytes(tar_path)?;

	let mut archive = tar::Archive::new(raw.as_slice());
	let mut entries = archive.entries().map_err(|e| Error::Io {
		path: tar_path.to_owned(),
		source: e,
	})?;

	let mut first = entries
		.next()
		.ok_or_else(|| Error::corrupt(format!("{}: empty .aliensrc archive", tar_path.display())))?
		.map_err(|e| Error::Io {
			path: tar_path.to_owned(),
			source: e,
		})?;
	let first_path = first.path().map_err(|e| Error::Io {
		path: tar_path.to_owned(),
		source: e,
	})?;
	if first_path.file_name().and_then(|n| n.to_str()) != Some("aliensrc.json") {
		return Err(Error::corrupt(format!(
			"{}: first tar member must be aliensrc.json, found {}",
			tar_path.display(),
			first_path.display()
		)));
	}

	let mut manifest_bytes = Vec::new();
	first.read_to_end(&mut manifest_bytes).map_err(|e| Error::Io {
		path: tar_path.to_owned(),
		source: e,
	})?;
	drop(first);
	drop(entries);

	let manifest = parse_manifest(&manifest_bytes)?;
	let package = package_from_manifest(manifest)?;

	let basename = format!(
		"{}-{}",
		package.primary_name(),
		package.version()
	);
	let path = pool.resolve(
		Relationship::Userland,
		package.primary_name(),
		package.version(),
		&basename,
		FileType::Aliensrc,
	);
	let if_exists = if force {
		IfExists::Overwrite
	} else {
		IfExists::Fail
	};
	pool.write(&path, &raw, if_exists)?;

	Ok(package)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::tempdir;

	fn sample_manifest_json() -> serde_json::Value {
		serde_json::json!({
			"version": 1,
			"source_package": {
				"name": ["zlib"],
				"version": "1.2.11-r0",
				"manager": "bitbake",
				"metadata": {"recipe": "zlib_1.2.11.bb"},
				"files": [
					{
						"name": "zlib-1.2.11.tar.xz",
						"sha1_cksum": "e1cb0d5c92da8e9a8c2635dfa249c341dfd00322",
						"git_sha1": null,
						"src_uri": "http://zlib.net/zlib-1.2.11.tar.xz",
						"files_in_archive": 18,
						"paths": []
					},
					{
						"name": "LICENSE",
						"sha1_cksum": "0000000000000000000000000000000000000a",
						"git_sha1": null,
						"src_uri": "file://LICENSE",
						"files_in_archive": false,
						"paths": []
					}
				],
				"tags": []
			}
		});
	}

	fn build_aliensrc(dir: &Path, manifest: &serde_json::Value) -> std::path::PathBuf {
		let tar_path = dir.join("zlib-1.2.11-r0.aliensrc");
		let file = std::fs::File::create(&tar_path).unwrap();
		let mut builder = tar::Builder::new(file);

		let manifest_bytes = serde_json::to_vec_pretty(manifest).unwrap();
		let mut header = tar::Header::new_gnu();
		header.set_size(manifest_bytes.len() as u64);
		header.set_cksum();
		builder
			.append_data(&mut header, "aliensrc.json", manifest_bytes.as_slice())
			.unwrap();

		let mut file_header = tar::Header::new_gnu();
		file_header.set_size(4);
		file_header.set_cksum();
		builder
			.append_data(&mut file_header, "files/LICENSE", b"MIT\n".as_slice())
			.unwrap();

		builder.into_inner().unwrap().flush().unwrap();
		tar_path
	}

	#[test]
	fn selects_positive_archive_over_non_archive_entry() {
		let manifest: Manifest = serde_json::from_value(sample_manifest_json()).unwrap();
		let package = package_from_manifest(manifest).unwrap();
		assert_eq!(package.main_archive_index, Some(0));
		assert_eq!(package.main_archive().unwrap().name, "zlib-1.2.11.tar.xz");
	}

	#[test]
	fn skips_entries_with_unpack_disabled() {
		let mut json = sample_manifest_json();
		json["source_package"]["files"][0]["src_uri"] =
			serde_json::json!("http://zlib.net/zlib-1.2.11.tar.xz;unpack=0");
		json["source_package"]["files"]
			.as_array_mut()
			.unwrap()
			.push(serde_json::json!({
				"name": "zlib-1.2.11-alt.tar.xz",
				"sha1_cksum": "1111111111111111111111111111111111111a",
				"git_sha1": null,
				"src_uri": "http://zlib.net/zlib-1.2.11-alt.tar.xz",
				"files_in_archive": 5,
				"paths": []
			}));
		let manifest: Manifest = serde_json::from_value(json).unwrap();
		let package = package_from_manifest(manifest).unwrap();
		assert_eq!(package.main_archive_index, Some(1));
	}

	#[test]
	fn git_archive_identity_includes_git_sha1() {
		let mut json = sample_manifest_json();
		json["source_package"]["files"][0]["src_uri"] = serde_json::json!("git://example.com/zlib");
		json["source_package"]["files"][0]["git_sha1"] =
			serde_json::json!("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef");
		let manifest: Manifest = serde_json::from_value(json).unwrap();
		let package = package_from_manifest(manifest).unwrap();
		let identity = package.canonical_archive_identity().unwrap();
		assert!(identity.contains("+git.deadbeef"));
	}

	#[test]
	fn rejects_malformed_sha1() {
		let mut json = sample_manifest_json();
		json["source_package"]["files"][0]["sha1_cksum"] = serde_json::json!("not-a-sha1");
		let manifest: Manifest = serde_json::from_value(json).unwrap();
		let err = package_from_manifest(manifest).unwrap_err();
		assert!(matches!(err, Error::CorruptInput(_)));
	}

	#[test]
	fn ingestion_writes_to_expected_pool_path_and_resolves_archive_name() {
		let dir = tempdir().unwrap();
		let tar_path = build_aliensrc(dir.path(), &sample_manifest_json());

		let pool_root = dir.path().join("pool");
		let pool = Pool::new(&pool_root, true);
		let package = add(&pool, &tar_path, false).unwrap();

		assert_eq!(package.primary_name(), "zlib");
		assert_eq!(package.version(), "1.2.11-r0");
		assert_eq!(
			package.main_archive().unwrap().name,
			"zlib-1.2.11.tar.xz"
		);

		let expected = pool_root.join("userland/zlib/1.2.11-r0/zlib-1.2.11-r0.aliensrc");
		assert!(expected.exists());
	}

	#[test]
	fn duplicate_add_without_force_fails() {
		let dir = tempdir().unwrap();
		let tar_path = build_aliensrc(dir.path(), &sample_manifest_json());
		let pool = Pool::new(dir.path().join("pool"), true);

		add(&pool, &tar_path, false).unwrap();
		let err = add(&pool, &tar_path, false).unwrap_err();
		assert!(matches!(err, Error::DuplicatePackage(_)));

		add(&pool, &tar_path, true).unwrap();
	}

	#[test]
	fn manifest_round_trips_through_json() {
		let manifest: Manifest = serde_json::from_value(sample_manifest_json()).unwrap();
		let bytes = serde_json::to_vec(&manifest).unwrap();
		let back = parse_manifest(&bytes).unwrap();
		assert_eq!(manifest.source_package.name, back.source_package.name);
		assert_eq!(manifest.source_package.files.len(), back.source_package.files.len());
	}
}
