// SPDX-License-Identifier: Apache-2.0

//! The Pool: a content-addressable workspace on disk. Every artifact
//! the pipeline produces is written under a logical path
//! `<relationship>/<name>/<version>/<basename>.<ext>` and keyed by
//! package identity plus a closed FILETYPE tag (spec §3, §6).
//!
//! Grounded on the teacher's `HcCache` (walk-the-tree-by-identity,
//! `DirEntry`-based iteration) generalized per Design Note "the pool
//! cache decorator pattern... is modeled as an explicit `ensure(path,
//! produce)` primitive that reads if present, otherwise invokes
//! `produce` and atomically writes".

use crate::error::{Error, Result};
use crate::util::fs;
use std::path::{Path, PathBuf};

/// The four top-level relationships a Pool entry can live under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
	/// The alien package as ingested, and its derived artifacts.
	Userland,
	/// Matched Debian source artifacts and the Debian SPDX.
	Debian,
	/// Cross-package aggregate documents (Harvest, CVE mirror feeds).
	Stats,
	/// Session documents.
	Session,
}

impl Relationship {
	fn as_str(&self) -> &'static str {
		match self {
			Relationship::Userland => "userland",
			Relationship::Debian => "debian",
			Relationship::Stats => "stats",
			Relationship::Session => "session",
		}
	}
}

/// The closed set of pool artifact kinds (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
	Aliensrc,
	TinfoilHat,
	AlienMatcher,
	SnapMatch,
	ScancodeJson,
	ScancodeSpdx,
	Deltacode,
	DebianDsc,
	DebianOrigArchive,
	DebianDiffArchive,
	DebianSpdx,
	DebianCopyrightRaw,
	AlienSpdx,
	FossyJson,
	FinalSpdx,
	Harvest,
	CveHarvest,
	SessionJson,
}

impl FileType {
	pub fn extension(&self) -> &'static str {
		match self {
			FileType::Aliensrc => "aliensrc",
			FileType::TinfoilHat => "tinfoilhat.json",
			FileType::AlienMatcher => "alienmatcher.json",
			FileType::SnapMatch => "snapmatch.json",
			FileType::ScancodeJson => "scancode.json",
			FileType::ScancodeSpdx => "scancode.spdx",
			FileType::Deltacode => "deltacode.json",
			FileType::DebianDsc => "dsc",
			FileType::DebianOrigArchive => "orig.tar",
			FileType::DebianDiffArchive => "debian.tar",
			FileType::DebianSpdx => "debian.spdx",
			FileType::DebianCopyrightRaw => "_debian_copyright",
			FileType::AlienSpdx => "alien.spdx",
			FileType::FossyJson => "fossy.json",
			FileType::FinalSpdx => "final.spdx",
			FileType::Harvest => "harvest.json",
			FileType::CveHarvest => "cve.json",
			FileType::SessionJson => "session.json",
		}
	}

	/// FILETYPEs that must already exist for this one to be written,
	/// per the Pool entry invariant in spec §3. Empty for inputs.
	pub fn prerequisites(&self) -> &'static [FileType] {
		match self {
			FileType::Aliensrc => &[],
			FileType::TinfoilHat => &[FileType::Aliensrc],
			FileType::AlienMatcher => &[FileType::Aliensrc],
			FileType::SnapMatch => &[FileType::Aliensrc],
			FileType::ScancodeJson => &[FileType::Aliensrc],
			FileType::ScancodeSpdx => &[FileType::Aliensrc],
			FileType::Deltacode => &[FileType::ScancodeJson],
			// Fetched from whichever matcher (current-index or snapshot)
			// found the candidate, so neither matcher artifact is a
			// prerequisite here the way `DebianSpdx` requires `AlienMatcher`.
			FileType::DebianDsc => &[],
			FileType::DebianOrigArchive => &[],
			FileType::DebianDiffArchive => &[],
			FileType::DebianSpdx => &[FileType::AlienMatcher],
			FileType::DebianCopyrightRaw => &[FileType::AlienMatcher],
			FileType::AlienSpdx => &[FileType::ScancodeSpdx],
			FileType::FossyJson => &[FileType::AlienSpdx],
			FileType::FinalSpdx => &[FileType::FossyJson],
			FileType::Harvest => &[],
			FileType::CveHarvest => &[FileType::Harvest],
			FileType::SessionJson => &[],
		}
	}
}

/// A resolved, logical Pool path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPath {
	pub relationship: Relationship,
	pub name: String,
	pub version: String,
	pub basename: String,
	pub file_type: FileType,
}

impl PoolPath {
	fn relative(&self) -> PathBuf {
		PathBuf::from(self.relationship.as_str())
			.join(&self.name)
			.join(&self.version)
			.join(format!("{}.{}", self.basename, self.file_type.extension()))
	}
}

/// Whether an existing file should cause a write to fail or be overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfExists {
	Fail,
	Overwrite,
}

/// The Pool: a root directory plus the cache policy gating reads/writes.
pub struct Pool {
	root: PathBuf,
	cache_enabled: bool,
}

impl Pool {
	pub fn new(root: impl Into<PathBuf>, cache_enabled: bool) -> Pool {
		Pool {
			root: root.into(),
			cache_enabled,
		}
	}

	/// Resolve a logical pool path to its absolute filesystem path.
	pub fn resolve(
		&self,
		relationship: Relationship,
		name: &str,
		version: &str,
		basename: &str,
		file_type: FileType,
	) -> PoolPath {
		PoolPath {
			relationship,
			name: name.to_owned(),
			version: version.to_owned(),
			basename: basename.to_owned(),
			file_type,
		}
	}

	fn absolute(&self, path: &PoolPath) -> PathBuf {
		self.root.join(path.relative())
	}

	/// Whether a cached, non-empty artifact exists at `path`.
	pub fn is_cached(&self, path: &PoolPath) -> bool {
		self.cache_enabled && fs::exists_non_empty(self.absolute(path))
	}

	pub fn read(&self, path: &PoolPath) -> Result<Vec<u8>> {
		fs::read_bytes(self.absolute(path))
	}

	pub fn write(&self, path: &PoolPath, bytes: &[u8], if_exists: IfExists) -> Result<()> {
		self.check_prerequisites(path)?;
		let absolute = self.absolute(path);
		if if_exists == IfExists::Fail && fs::exists_non_empty(&absolute) {
			return Err(Error::DuplicatePackage(format!(
				"{} already exists",
				absolute.display()
			)));
		}
		fs::write_bytes(&absolute, bytes)
	}

	fn check_prerequisites(&self, path: &PoolPath) -> Result<()> {
		for prereq in path.file_type.prerequisites() {
			let prereq_path = PoolPath {
				relationship: path.relationship,
				name: path.name.clone(),
				version: path.version.clone(),
				basename: path.basename.clone(),
				file_type: *prereq,
			};
			if !fs::exists_non_empty(self.absolute(&prereq_path)) {
				return Err(Error::IntegrityViolation {
					path: self.absolute(path),
					reason: format!(
						"prerequisite {} missing for {}",
						prereq.extension(),
						path.file_type.extension()
					),
				});
			}
		}
		Ok(())
	}

	/// The cache primitive described in Design Note §9: read the
	/// artifact if it's cached, otherwise call `produce`, write the
	/// result, and return it. `--ignore-cache` (via `cache_enabled =
	/// false`) makes this always re-derive.
	pub fn ensure(
		&self,
		path: &PoolPath,
		produce: impl FnOnce() -> Result<Vec<u8>>,
	) -> Result<Vec<u8>> {
		if self.is_cached(path) {
			return self.read(path);
		}
		let bytes = produce()?;
		self.write(path, &bytes, IfExists::Overwrite)?;
		Ok(bytes)
	}

	/// Root directory the pool is rooted at (used by the SnapMatcher
	/// and ClearingClient to materialize temp extraction trees inside
	/// a package's own pool subtree instead of off to the side).
	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Absolute path for a pool entry, without reading or writing it —
	/// used by callers that hand a path to an external subprocess
	/// (scanner, SPDX converter).
	pub fn path_for(&self, path: &PoolPath) -> PathBuf {
		self.absolute(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	fn pool() -> (tempfile::TempDir, Pool) {
		let dir = tempdir().unwrap();
		let pool = Pool::new(dir.path(), true);
		(dir, pool)
	}

	#[test]
	fn resolve_builds_expected_relative_path() {
		let (_dir, pool) = pool();
		let path = pool.resolve(
			Relationship::Userland,
			"zlib",
			"1.2.11-r0",
			"zlib-1.2.11-r0",
			FileType::Aliensrc,
		);
		assert_eq!(
			path.relative(),
			PathBuf::from("userland/zlib/1.2.11-r0/zlib-1.2.11-r0.aliensrc")
		);
	}

	#[test]
	fn write_without_prerequisite_is_integrity_violation() {
		let (_dir, pool) = pool();
		let path = pool.resolve(
			Relationship::Userland,
			"zlib",
			"1.2.11-r0",
			"zlib-1.2.11-r0",
			FileType::ScancodeJson,
		);
		let err = pool.write(&path, b"{}", IfExists::Overwrite).unwrap_err();
		assert!(matches!(err, Error::IntegrityViolation { .. }));
	}

	#[test]
	fn ensure_reads_cache_without_calling_produce_twice() {
		let (_dir, pool) = pool();
		let path = pool.resolve(
			Relationship::Userland,
			"zlib",
			"1.2.11-r0",
			"zlib-1.2.11-r0",
			FileType::Aliensrc,
		);
		let calls = std::cell::Cell::new(0);
		let produce = || {
			calls.set(calls.get() + 1);
			Ok(b"payload".to_vec())
		};
		let first = pool.ensure(&path, produce).unwrap();
		assert_eq!(first, b"payload");
		assert_eq!(calls.get(), 1);

		let calls2 = std::cell::Cell::new(0);
		let second = pool
			.ensure(&path, || {
				calls2.set(calls2.get() + 1);
				Ok(b"ignored".to_vec())
			})
			.unwrap();
		assert_eq!(second, b"payload");
		assert_eq!(calls2.get(), 0);
	}

	#[test]
	fn ignore_cache_forces_reproduction() {
		let (dir, _pool) = pool();
		let pool_no_cache = Pool::new(dir.path(), false);
		let path = pool_no_cache.resolve(
			Relationship::Userland,
			"zlib",
			"1.2.11-r0",
			"zlib-1.2.11-r0",
			FileType::Aliensrc,
		);
		pool_no_cache
			.write(&path, b"first", IfExists::Overwrite)
			.unwrap();
		let value = pool_no_cache.ensure(&path, || Ok(b"second".to_vec())).unwrap();
		assert_eq!(value, b"second");
	}

	#[test]
	fn duplicate_write_with_fail_policy_errors() {
		let (_dir, pool) = pool();
		let path = pool.resolve(
			Relationship::Userland,
			"zlib",
			"1.2.11-r0",
			"zlib-1.2.11-r0",
			FileType::Aliensrc,
		);
		pool.write(&path, b"first", IfExists::Fail).unwrap();
		let err = pool.write(&path, b"second", IfExists::Fail).unwrap_err();
		assert!(matches!(err, Error::DuplicatePackage(_)));
	}
}
