// SPDX-License-Identifier: Apache-2.0

//! Session: a filtered, lockable work list referencing Pool entries by
//! identity (spec §3, §4.2). Persisted as a single JSON document under
//! the Pool's `session` relationship.

use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::pool::{FileType, IfExists, Pool, Relationship};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Per-step status flags tracked for a package within a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepStatus {
	pub matched: bool,
	pub scanned: bool,
	pub delta_done: bool,
	pub spdx_debian_done: bool,
	pub spdx_alien_done: bool,
	pub uploaded: bool,
	pub fossy_done: bool,
	pub harvested: bool,
}

/// A single entry in a Session's work list: an identity plus its
/// progress through the pipeline, and the match score if one has been
/// computed (used by the `score-gt` filter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRef {
	pub identity: Identity,
	#[serde(default)]
	pub status: StepStatus,
	#[serde(default)]
	pub score: Option<f64>,
}

impl PackageRef {
	pub fn new(identity: Identity) -> PackageRef {
		PackageRef {
			identity,
			status: StepStatus::default(),
			score: None,
		}
	}
}

/// The persisted Session document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
	pub id: String,
	pub created_at: DateTime<Utc>,
	#[serde(default)]
	pub lock_key: Option<String>,
	#[serde(default)]
	pub packages: Vec<PackageRef>,
}

/// Closed set of filter predicates `Session::filter` accepts.
#[derive(Debug, Clone)]
pub enum FilterPredicate {
	ScoreGt(f64),
	IncludeExclude {
		include: Vec<String>,
		exclude: Vec<String>,
	},
	OnlyUploaded,
}

impl Session {
	/// `create(id?)`: start a new, empty session. A random id is
	/// generated if none is given.
	pub fn create(id: Option<String>) -> Session {
		let id = id.unwrap_or_else(random_session_id);
		Session {
			id,
			created_at: Utc::now(),
			lock_key: None,
			packages: Vec::new(),
		}
	}

	fn pool_path(id: &str) -> (Relationship, String, String, String, FileType) {
		(
			Relationship::Session,
			id.to_owned(),
			"_".to_owned(),
			id.to_owned(),
			FileType::SessionJson,
		)
	}

	/// Load a previously persisted session from the Pool.
	pub fn load(pool: &Pool, id: &str) -> Result<Session> {
		let (rel, name, version, basename, file_type) = Self::pool_path(id);
		let path = pool.resolve(rel, &name, &version, &basename, file_type);
		let bytes = pool.read(&path)?;
		serde_json::from_slice(&bytes).map_err(Error::Json)
	}

	/// Persist this session to the Pool, overwriting any prior copy.
	pub fn save(&self, pool: &Pool) -> Result<()> {
		let (rel, name, version, basename, file_type) = Self::pool_path(&self.id);
		let path = pool.resolve(rel, &name, &version, &basename, file_type);
		let bytes = serde_json::to_vec_pretty(self).map_err(Error::Json)?;
		pool.write(&path, &bytes, IfExists::Overwrite)
	}

	/// `populate(glob_name, glob_version)`: add every Pool-known
	/// `(name, version)` whose `.aliensrc` basename matches the given
	/// shell-style glob patterns.
	pub fn populate(&mut self, pool: &Pool, glob_name: &str, glob_version: &str) -> Result<usize> {
		let userland = pool.root().join("userland");
		if !userland.is_dir() {
			return Ok(0);
		}

		let name_pattern = glob::Pattern::new(glob_name)
			.map_err(|e| Error::corrupt(format!("invalid name glob: {e}")))?;
		let version_pattern = glob::Pattern::new(glob_version)
			.map_err(|e| Error::corrupt(format!("invalid version glob: {e}")))?;

		let mut added = 0;
		let existing: HashSet<Identity> =
			self.packages.iter().map(|p| p.identity.clone()).collect();

		for name_entry in std::fs::read_dir(&userland).map_err(|e| Error::Io {
			path: userland.clone(),
			source: e,
		})? {
			let name_entry = name_entry.map_err(|e| Error::Io {
				path: userland.clone(),
				source: e,
			})?;
			let name = name_entry.file_name().to_string_lossy().into_owned();
			if !name_pattern.matches(&name) {
				continue;
			}
			let name_dir = name_entry.path();
			if !name_dir.is_dir() {
				continue;
			}
			for version_entry in std::fs::read_dir(&name_dir).map_err(|e| Error::Io {
				path: name_dir.clone(),
				source: e,
			})? {
				let version_entry = version_entry.map_err(|e| Error::Io {
					path: name_dir.clone(),
					source: e,
				})?;
				let version = version_entry.file_name().to_string_lossy().into_owned();
				if !version_pattern.matches(&version) {
					continue;
				}
				let identity = Identity::new(&name, &version);
				if !existing.contains(&identity) {
					self.packages.push(PackageRef::new(identity));
					added += 1;
				}
			}
		}

		Ok(added)
	}

	/// `addVariants()`: extend the list with every Pool-known
	/// `(name, version, variant*)` sharing `(name, version)` with an
	/// existing member.
	pub fn add_variants(&mut self, known: &[Identity]) -> usize {
		let mut added = 0;
		let bases: Vec<Identity> = self.packages.iter().map(|p| p.identity.clone()).collect();
		for candidate in known {
			let shares_base = bases.iter().any(|b| b.same_name_version(candidate));
			let already_present = self.packages.iter().any(|p| &p.identity == candidate);
			if shares_base && !already_present {
				self.packages.push(PackageRef::new(candidate.clone()));
				added += 1;
			}
		}
		added
	}

	/// `filter(predicate)`: retain only package refs matching the predicate.
	pub fn filter(&mut self, predicate: &FilterPredicate) {
		self.packages.retain(|p| match predicate {
			FilterPredicate::ScoreGt(threshold) => p.score.is_some_and(|s| s > *threshold),
			FilterPredicate::IncludeExclude { include, exclude } => {
				let included = include.is_empty() || include.iter().any(|n| n == &p.identity.name);
				let excluded = exclude.iter().any(|n| n == &p.identity.name);
				included && !excluded
			}
			FilterPredicate::OnlyUploaded => p.status.uploaded,
		});
	}

	/// `lock(key)`: set the lock key, failing if already locked by a
	/// different key.
	pub fn lock(&mut self, key: impl Into<String>) -> Result<()> {
		let key = key.into();
		match &self.lock_key {
			Some(existing) if existing != &key => Err(Error::LockConflict {
				session: self.id.clone(),
			}),
			_ => {
				self.lock_key = Some(key);
				Ok(())
			}
		}
	}

	/// `unlock(key, force?)`: clear the lock if `key` matches, or
	/// unconditionally if `force` is set.
	pub fn unlock(&mut self, key: &str, force: bool) -> Result<()> {
		match &self.lock_key {
			Some(existing) if existing == key || force => {
				self.lock_key = None;
				Ok(())
			}
			Some(_) => Err(Error::LockConflict {
				session: self.id.clone(),
			}),
			None => Ok(()),
		}
	}

	/// Every mutating session operation must present the current lock
	/// key (unless unlocked, or the caller has `--force`).
	pub fn check_mutation_allowed(&self, presented_key: Option<&str>, force: bool) -> Result<()> {
		match &self.lock_key {
			None => Ok(()),
			Some(_) if force => Ok(()),
			Some(expected) => {
				if presented_key == Some(expected.as_str()) {
					Ok(())
				} else {
					Err(Error::LockConflict {
						session: self.id.clone(),
					})
				}
			}
		}
	}

	/// `reportCsv(path)`: write a CSV summary of the session's package
	/// refs (identity, score, and per-step status columns).
	pub fn report_csv(&self, path: &Path) -> Result<()> {
		let mut out = String::from(
			"name,version,variant,score,matched,scanned,delta_done,spdx_debian_done,spdx_alien_done,uploaded,fossy_done,harvested\n",
		);
		for p in &self.packages {
			out.push_str(&format!(
				"{},{},{},{},{},{},{},{},{},{},{},{}\n",
				p.identity.name,
				p.identity.version,
				p.identity.variant.clone().unwrap_or_default(),
				p.score.map(|s| s.to_string()).unwrap_or_default(),
				p.status.matched,
				p.status.scanned,
				p.status.delta_done,
				p.status.spdx_debian_done,
				p.status.spdx_alien_done,
				p.status.uploaded,
				p.status.fossy_done,
				p.status.harvested,
			));
		}
		crate::util::fs::write_bytes(path, out.as_bytes())
	}
}

fn random_session_id() -> String {
	let mut rng = rand::rng();
	let n: u64 = rng.random();
	format!("session-{n:016x}")
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn lock_rejects_mismatched_key() {
		let mut session = Session::create(Some("s1".into()));
		session.lock("k1").unwrap();
		let err = session.lock("k2").unwrap_err();
		assert!(matches!(err, Error::LockConflict { .. }));
	}

	#[test]
	fn force_unlock_removes_lock_regardless_of_key() {
		let mut session = Session::create(Some("s1".into()));
		session.lock("k1").unwrap();
		session.unlock("wrong", true).unwrap();
		assert!(session.lock_key.is_none());
	}

	#[test]
	fn unlock_without_force_requires_matching_key() {
		let mut session = Session::create(Some("s1".into()));
		session.lock("k1").unwrap();
		let err = session.unlock("wrong", false).unwrap_err();
		assert!(matches!(err, Error::LockConflict { .. }));
	}

	#[test]
	fn mutation_check_passes_when_unlocked() {
		let session = Session::create(Some("s1".into()));
		assert!(session.check_mutation_allowed(None, false).is_ok());
	}

	#[test]
	fn score_gt_filter_keeps_only_higher_scores() {
		let mut session = Session::create(Some("s1".into()));
		let mut a = PackageRef::new(Identity::new("a", "1.0"));
		a.score = Some(50.0);
		let mut b = PackageRef::new(Identity::new("b", "1.0"));
		b.score = Some(90.0);
		session.packages = vec![a, b];
		session.filter(&FilterPredicate::ScoreGt(60.0));
		assert_eq!(session.packages.len(), 1);
		assert_eq!(session.packages[0].identity.name, "b");
	}

	#[test]
	fn include_exclude_filter() {
		let mut session = Session::create(Some("s1".into()));
		session.packages = vec![
			PackageRef::new(Identity::new("a", "1.0")),
			PackageRef::new(Identity::new("b", "1.0")),
			PackageRef::new(Identity::new("c", "1.0")),
		];
		session.filter(&FilterPredicate::IncludeExclude {
			include: vec!["a".into(), "b".into()],
			exclude: vec!["b".into()],
		});
		assert_eq!(session.packages.len(), 1);
		assert_eq!(session.packages[0].identity.name, "a");
	}

	#[test]
	fn add_variants_pulls_in_shared_name_version() {
		let mut session = Session::create(Some("s1".into()));
		session.packages = vec![PackageRef::new(Identity::new("zlib", "1.2.11-r0"))];
		let known = vec![
			Identity::new("zlib", "1.2.11-r0").with_variant("abcd"),
			Identity::new("openssl", "3.0.0-r0"),
		];
		let added = session.add_variants(&known);
		assert_eq!(added, 1);
		assert_eq!(session.packages.len(), 2);
	}

	#[test]
	fn save_then_load_roundtrips() {
		let dir = tempdir().unwrap();
		let pool = Pool::new(dir.path(), true);
		let mut session = Session::create(Some("roundtrip".into()));
		session.packages.push(PackageRef::new(Identity::new("zlib", "1.2.11-r0")));
		session.save(&pool).unwrap();

		let loaded = Session::load(&pool, "roundtrip").unwrap();
		assert_eq!(loaded.id, "roundtrip");
		assert_eq!(loaded.packages.len(), 1);
	}
}
