// SPDX-License-Identifier: Apache-2.0

//! Debian matching: two interchangeable implementations behind a
//! single `PackageMatcher` trait (spec §4.4) — a current-index matcher
//! and a historical-snapshot matcher keyed by file sha1.

use crate::alien::AlienPackage;
use crate::calc::{fuzzy_package_score, overall_score, version_distance, version_score};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `dsc_format` values a Debian source package may declare (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DscFormat {
	#[serde(rename = "1.0")]
	Format1_0,
	#[serde(rename = "3.0 (quilt)")]
	Format3Quilt,
	#[serde(rename = "3.0 (native)")]
	Format3Native,
}

/// One candidate version distance computed against a Debian source
/// package index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
	pub version: String,
	pub distance: u64,
	pub is_aliensrc: bool,
}

/// The outcome of matching an `AlienPackage` against a Debian source
/// (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
	pub alien_name: String,
	pub alien_version: String,
	pub matched_name: String,
	pub matched_version: String,
	pub score: f64,
	pub package_score: u32,
	pub version_score: u32,
	pub candidates: Vec<Candidate>,
	pub dsc_url: Option<String>,
	pub debsrc_orig: Option<String>,
	pub debsrc_debian: Option<String>,
	pub dsc_format: Option<DscFormat>,
	#[serde(default)]
	pub srcfiles: Vec<SourceFileRef>,
}

/// A per-file download descriptor recorded by the snapshot matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFileRef {
	pub sha1_cksum: String,
	pub src_uri: String,
}

/// One Debian source package entry as listed by the current-package
/// JSON index (spec §4.4a: "a JSON index of current Debian package
/// metadata" — the exact schema is the index's own, modeled here as
/// the fields the matcher needs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebianIndexEntry {
	pub name: String,
	pub version: String,
	pub format: DscFormat,
	pub dsc_url: String,
	pub orig_url: Option<String>,
	pub debian_url: Option<String>,
	pub diff_url: Option<String>,
}

/// Source of Debian index candidates by package name, abstracted so
/// the current-index and snapshot matchers can share scoring logic
/// against either a live HTTP index or an in-memory fake (Design Note
/// §9: "tests substitute an in-memory fake").
pub trait DebianIndexProvider {
	fn candidates_for_name(&self, name: &str) -> Result<Vec<DebianIndexEntry>>;
}

/// Looks up a Debian source package by the sha1 of one of its files,
/// the historical-snapshot matcher's fast path (spec §4.4b).
pub trait SnapshotFileLookup {
	fn lookup_by_sha1(&self, sha1: &str) -> Result<Option<SnapshotHit>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotHit {
	pub name: String,
	pub version: String,
	pub entry: DebianIndexEntry,
}

/// Maximum version distance eligible for selection (spec §4.4).
const MAX_DISTANCE: u64 = 300;

pub trait PackageMatcher {
	fn match_package(&self, pkg: &AlienPackage) -> Result<MatchResult>;
}

fn best_candidate(entries: &[DebianIndexEntry], alien_version: &str) -> Option<(usize, u64)> {
	entries
		.iter()
		.enumerate()
		.map(|(i, e)| (i, version_distance(alien_version, &e.version)))
		.filter(|(_, distance)| *distance <= MAX_DISTANCE)
		.min_by(|(ia, da), (ib, db)| {
			da.cmp(db).then_with(|| {
				let a = &entries[*ia];
				let b = &entries[*ib];
				// Ties: prefer non-prerelease, then most recent
				// (lexicographically greater version string).
				let a_pre = a.version.to_lowercase().contains("dfsg")
					|| a.version.contains('~');
				let b_pre = b.version.to_lowercase().contains("dfsg")
					|| b.version.contains('~');
				a_pre.cmp(&b_pre).then(b.version.cmp(&a.version))
			})
		})
}

fn build_candidate_list(entries: &[DebianIndexEntry], alien_version: &str) -> Vec<Candidate> {
	entries
		.iter()
		.map(|e| Candidate {
			version: e.version.clone(),
			distance: version_distance(alien_version, &e.version),
			is_aliensrc: false,
		})
		.collect()
}

fn score_against(pkg: &AlienPackage, entry: &DebianIndexEntry) -> (u32, u32, u64) {
	let name_scores: Vec<u32> = std::iter::once(pkg.primary_name())
		.chain(pkg.alternative_names().iter().map(String::as_str))
		.map(|name| fuzzy_package_score(name, &entry.name))
		.collect();
	let package_score = name_scores.into_iter().max().unwrap_or(0);
	let distance = version_distance(pkg.version(), &entry.version);
	let v_score = version_score(distance);
	(package_score, v_score, distance)
}

/// Matches against the current Debian archive index.
pub struct DebianMatcher<P: DebianIndexProvider> {
	provider: P,
}

impl<P: DebianIndexProvider> DebianMatcher<P> {
	pub fn new(provider: P) -> DebianMatcher<P> {
		DebianMatcher { provider }
	}
}

impl<P: DebianIndexProvider> PackageMatcher for DebianMatcher<P> {
	fn match_package(&self, pkg: &AlienPackage) -> Result<MatchResult> {
		let entries = self.provider.candidates_for_name(pkg.primary_name())?;
		if entries.is_empty() {
			return Err(Error::not_found(format!(
				"no Debian candidate for '{}'",
				pkg.primary_name()
			)));
		}

		let (best_idx, _distance) = best_candidate(&entries, pkg.version()).ok_or_else(|| {
			Error::not_found(format!(
				"no Debian candidate for '{}' within distance {MAX_DISTANCE}",
				pkg.primary_name()
			))
		})?;
		let best = &entries[best_idx];
		let (package_score, v_score, distance) = score_against(pkg, best);

		Ok(MatchResult {
			alien_name: pkg.primary_name().to_owned(),
			alien_version: pkg.version().to_owned(),
			matched_name: best.name.clone(),
			matched_version: best.version.clone(),
			score: overall_score(package_score, v_score),
			package_score,
			version_score: v_score,
			candidates: build_candidate_list(&entries, pkg.version())
				.into_iter()
				.map(|mut c| {
					if c.version == best.version {
						c.distance = distance;
					}
					c
				})
				.collect(),
			dsc_url: Some(best.dsc_url.clone()),
			debsrc_orig: best.orig_url.clone(),
			debsrc_debian: best.debian_url.clone().or_else(|| best.diff_url.clone()),
			dsc_format: Some(best.format),
			srcfiles: Vec::new(),
		})
	}
}

/// Matches against Debian snapshot's historical index, preferring a
/// direct file-sha1 hit before falling back to name/version scoring.
pub struct SnapMatcher<L: SnapshotFileLookup, P: DebianIndexProvider> {
	lookup: L,
	provider: P,
}

impl<L: SnapshotFileLookup, P: DebianIndexProvider> SnapMatcher<L, P> {
	pub fn new(lookup: L, provider: P) -> SnapMatcher<L, P> {
		SnapMatcher { lookup, provider }
	}
}

impl<L: SnapshotFileLookup, P: DebianIndexProvider> PackageMatcher for SnapMatcher<L, P> {
	fn match_package(&self, pkg: &AlienPackage) -> Result<MatchResult> {
		let main_archive = pkg
			.main_archive()
			.ok_or_else(|| Error::NoInternalArchive(pkg.primary_name().to_owned()))?;

		if let Some(hit) = self.lookup.lookup_by_sha1(&main_archive.sha1_cksum)? {
			let names_match = hit.name.eq_ignore_ascii_case(pkg.primary_name());
			let package_score = if names_match {
				100
			} else {
				fuzzy_package_score(pkg.primary_name(), &hit.name)
			};
			return Ok(MatchResult {
				alien_name: pkg.primary_name().to_owned(),
				alien_version: pkg.version().to_owned(),
				matched_name: hit.name.clone(),
				matched_version: hit.version.clone(),
				score: overall_score(package_score, 100),
				package_score,
				version_score: 100,
				candidates: vec![Candidate {
					version: hit.version.clone(),
					distance: 0,
					is_aliensrc: false,
				}],
				dsc_url: Some(hit.entry.dsc_url.clone()).filter(|s| !s.is_empty()),
				debsrc_orig: hit.entry.orig_url.clone(),
				debsrc_debian: hit.entry.debian_url.clone().or_else(|| hit.entry.diff_url.clone()),
				dsc_format: Some(hit.entry.format),
				srcfiles: vec![SourceFileRef {
					sha1_cksum: main_archive.sha1_cksum.clone(),
					src_uri: main_archive.src_uri.clone(),
				}],
			});
		}

		// Fall back to name/version scoring, same as the current-index
		// matcher, against the snapshot's own candidate listing.
		let entries = self.provider.candidates_for_name(pkg.primary_name())?;
		if entries.is_empty() {
			return Err(Error::not_found(format!(
				"no Debian snapshot candidate for '{}'",
				pkg.primary_name()
			)));
		}
		let (best_idx, _distance) = best_candidate(&entries, pkg.version()).ok_or_else(|| {
			Error::not_found(format!(
				"no Debian snapshot candidate for '{}' within distance {MAX_DISTANCE}",
				pkg.primary_name()
			))
		})?;
		let best = &entries[best_idx];
		let (package_score, v_score, distance) = score_against(pkg, best);
		Ok(MatchResult {
			alien_name: pkg.primary_name().to_owned(),
			alien_version: pkg.version().to_owned(),
			matched_name: best.name.clone(),
			matched_version: best.version.clone(),
			score: overall_score(package_score, v_score),
			package_score,
			version_score: v_score,
			candidates: build_candidate_list(&entries, pkg.version())
				.into_iter()
				.map(|mut c| {
					if c.version == best.version {
						c.distance = distance;
					}
					c
				})
				.collect(),
			dsc_url: Some(best.dsc_url.clone()),
			debsrc_orig: best.orig_url.clone(),
			debsrc_debian: best.debian_url.clone().or_else(|| best.diff_url.clone()),
			dsc_format: Some(best.format),
			srcfiles: Vec::new(),
		})
	}
}

/// HTTP-backed `DebianIndexProvider` against a configured JSON index
/// URL (spec §4.4a).
pub struct HttpDebianIndex {
	agent: ureq::Agent,
	index_url: String,
}

impl HttpDebianIndex {
	pub fn new(index_url: impl Into<String>, timeout: Duration) -> Result<HttpDebianIndex> {
		Ok(HttpDebianIndex {
			agent: crate::http::tls::new_agent(timeout)?,
			index_url: index_url.into(),
		})
	}
}

impl DebianIndexProvider for HttpDebianIndex {
	fn candidates_for_name(&self, name: &str) -> Result<Vec<DebianIndexEntry>> {
		let all: Vec<DebianIndexEntry> = crate::util::retry::with_backoff(
			3,
			Duration::from_millis(200),
			crate::util::retry::default_retryable,
			|| {
				let resp = self.agent.get(&self.index_url).call()?;
				resp.into_json::<Vec<DebianIndexEntry>>()
					.map_err(|e| Error::other(format!("invalid Debian index response: {e}")))
			},
		)?;
		Ok(all.into_iter().filter(|e| e.name == name).collect())
	}
}

/// HTTP-backed `SnapshotFileLookup` against snapshot.debian.org's
/// file-info API.
pub struct HttpSnapshotLookup {
	agent: ureq::Agent,
	base_url: String,
}

impl HttpSnapshotLookup {
	pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<HttpSnapshotLookup> {
		Ok(HttpSnapshotLookup {
			agent: crate::http::tls::new_agent(timeout)?,
			base_url: base_url.into(),
		})
	}
}

#[derive(Debug, Deserialize)]
struct SnapshotFileInfoResponse {
	result: Vec<SnapshotFileInfoEntry>,
}

#[derive(Debug, Deserialize)]
struct SnapshotFileInfoEntry {
	name: String,
	version: Option<String>,
}

impl SnapshotFileLookup for HttpSnapshotLookup {
	fn lookup_by_sha1(&self, sha1: &str) -> Result<Option<SnapshotHit>> {
		let url = format!("{}/mr/file/{}/info", self.base_url, sha1);
		let resp = crate::util::retry::with_backoff(
			3,
			Duration::from_millis(200),
			crate::util::retry::default_retryable,
			|| Ok(self.agent.get(&url).call()?),
		);
		let resp = match resp {
			Ok(r) => r,
			Err(Error::Http(_)) => return Ok(None),
			Err(e) => return Err(e),
		};
		let parsed: SnapshotFileInfoResponse = resp
			.into_json()
			.map_err(|e| Error::other(format!("invalid snapshot response: {e}")))?;
		let Some(first) = parsed.result.into_iter().next() else {
			return Ok(None);
		};
		let version = first.version.unwrap_or_default();
		Ok(Some(SnapshotHit {
			name: first.name.clone(),
			version: version.clone(),
			entry: DebianIndexEntry {
				name: first.name,
				version,
				format: DscFormat::Format3Quilt,
				dsc_url: String::new(),
				orig_url: None,
				debian_url: None,
				diff_url: None,
			},
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::alien::{parse_manifest, AlienPackage};

	struct FakeIndex(Vec<DebianIndexEntry>);
	impl DebianIndexProvider for FakeIndex {
		fn candidates_for_name(&self, name: &str) -> Result<Vec<DebianIndexEntry>> {
			Ok(self.0.iter().filter(|e| e.name == name).cloned().collect())
		}
	}

	struct FakeSnapshotMiss;
	impl SnapshotFileLookup for FakeSnapshotMiss {
		fn lookup_by_sha1(&self, _sha1: &str) -> Result<Option<SnapshotHit>> {
			Ok(None)
		}
	}

	struct FakeSnapshotHit(SnapshotHit);
	impl SnapshotFileLookup for FakeSnapshotHit {
		fn lookup_by_sha1(&self, _sha1: &str) -> Result<Option<SnapshotHit>> {
			Ok(Some(self.0.clone()))
		}
	}

	fn zlib_package() -> AlienPackage {
		let json = serde_json::json!({
			"version": 1,
			"source_package": {
				"name": ["zlib"],
				"version": "1.2.11-r0",
				"manager": "bitbake",
				"metadata": {},
				"files": [{
					"name": "zlib-1.2.11.tar.xz",
					"sha1_cksum": "e1cb0d5c92da8e9a8c2635dfa249c341dfd00322",
					"git_sha1": null,
					"src_uri": "http://zlib.net/zlib-1.2.11.tar.xz",
					"files_in_archive": 18,
					"paths": []
				}],
				"tags": []
			}
		});
		let manifest = parse_manifest(&serde_json::to_vec(&json).unwrap()).unwrap();
		crate::alien::AlienPackage {
			main_archive_index: Some(0),
			manifest,
		}
	}

	fn zlib_index() -> Vec<DebianIndexEntry> {
		vec![
			DebianIndexEntry {
				name: "zlib".into(),
				version: "1.2.11.dfsg-1".into(),
				format: DscFormat::Format3Quilt,
				dsc_url: "https://example/zlib_1.2.11.dfsg-1.dsc".into(),
				orig_url: Some("https://example/zlib_1.2.11.dfsg.orig.tar.xz".into()),
				debian_url: Some("https://example/zlib_1.2.11.dfsg-1.debian.tar.xz".into()),
				diff_url: None,
			},
			DebianIndexEntry {
				name: "zlib".into(),
				version: "1.2.11.dfsg-2".into(),
				format: DscFormat::Format3Quilt,
				dsc_url: "https://example/zlib_1.2.11.dfsg-2.dsc".into(),
				orig_url: None,
				debian_url: None,
				diff_url: None,
			},
			DebianIndexEntry {
				name: "zlib".into(),
				version: "1.2.8.dfsg-5".into(),
				format: DscFormat::Format3Quilt,
				dsc_url: "https://example/zlib_1.2.8.dfsg-5.dsc".into(),
				orig_url: None,
				debian_url: None,
				diff_url: None,
			},
		]
	}

	#[test]
	fn scenario_2_current_index_matching() {
		let matcher = DebianMatcher::new(FakeIndex(zlib_index()));
		let result = matcher.match_package(&zlib_package()).unwrap();
		assert_eq!(result.matched_version, "1.2.11.dfsg-1");
		assert_eq!(result.version_score, 99);
		assert_eq!(result.package_score, 100);
		assert_eq!(result.score, 99.5);
	}

	#[test]
	fn no_candidates_is_not_found() {
		let matcher = DebianMatcher::new(FakeIndex(vec![]));
		let err = matcher.match_package(&zlib_package()).unwrap_err();
		assert!(matches!(err, Error::NotFound(_)));
	}

	#[test]
	fn snapshot_sha1_hit_scores_full_marks_on_name_match() {
		let hit = SnapshotHit {
			name: "zlib".into(),
			version: "1.2.11.dfsg-1".into(),
			entry: zlib_index().remove(0),
		};
		let matcher = SnapMatcher::new(FakeSnapshotHit(hit), FakeIndex(vec![]));
		let result = matcher.match_package(&zlib_package()).unwrap();
		assert_eq!(result.package_score, 100);
		assert_eq!(result.version_score, 100);
		assert_eq!(result.score, 100.0);
	}

	#[test]
	fn snapshot_falls_back_to_name_version_scoring_on_miss() {
		let matcher = SnapMatcher::new(FakeSnapshotMiss, FakeIndex(zlib_index()));
		let result = matcher.match_package(&zlib_package()).unwrap();
		assert_eq!(result.matched_version, "1.2.11.dfsg-1");
	}

	#[test]
	fn package_with_no_main_archive_snapmatches_to_no_internal_archive() {
		let mut pkg = zlib_package();
		pkg.main_archive_index = None;
		let matcher = SnapMatcher::new(FakeSnapshotMiss, FakeIndex(zlib_index()));
		let err = matcher.match_package(&pkg).unwrap_err();
		assert!(matches!(err, Error::NoInternalArchive(_)));
	}
}
