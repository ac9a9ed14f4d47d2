// SPDX-License-Identifier: Apache-2.0

//! Deltacode: classifies the file-level delta between two scan
//! reports by licensing/copyright change (spec §4.5).

use crate::scan::{
	normalize_copyright_set, normalize_copyright_set_year_masked, normalize_license_set, ScanReport,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which bucket a file belongs to. Every new-side file belongs to
/// exactly one variant; every old-side file absent from new belongs to
/// one of the two `Deleted*` variants (spec §3, §8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
	Same,
	Moved,
	ChangedNoLicenseAndCopyright,
	ChangedSameCopyrightAndLicense,
	ChangedUpdatedCopyrightYearOnly,
	ChangedCopyrightOrLicense,
	NewNoLicenseAndCopyright,
	NewWithLicenseOrCopyright,
	DeletedNoLicenseAndCopyright,
	DeletedWithLicenseOrCopyright,
}

/// One classified file pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaEntry {
	pub category: Category,
	pub new_path: Option<String>,
	pub old_path: Option<String>,
}

/// The statistics half of a DeltaReport: the size of each category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaStats {
	pub same_files: usize,
	pub moved_files: usize,
	pub changed_files_with_no_license_and_copyright: usize,
	pub changed_files_with_same_copyright_and_license: usize,
	pub changed_files_with_updated_copyright_year_only: usize,
	pub changed_files_with_changed_copyright_or_license: usize,
	pub new_files_with_no_license_and_copyright: usize,
	pub new_files_with_license_or_copyright: usize,
	pub deleted_files_with_no_license_and_copyright: usize,
	pub deleted_files_with_license_or_copyright: usize,
	pub new_files_count: usize,
	pub old_files_count: usize,
}

/// Output of the Delta reconciler (spec §3, §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaReport {
	pub stats: DeltaStats,
	pub body: Vec<DeltaEntry>,
	pub similarity: f64,
}

fn has_license_or_copyright(findings: &crate::scan::FileFindings) -> bool {
	!findings.licenses.is_empty() || !findings.copyrights.is_empty()
}

/// Computes the Deltacode between `old` (Debian) and `new` (alien).
///
/// Runs in two passes so the result never depends on `HashMap`'s
/// randomized iteration order: an old path present unchanged or
/// changed at the same path in `new` is resolved first and can never
/// be "stolen" afterward as a `moved_from` source by an unrelated new
/// path that merely happens to share its sha1.
pub fn reconcile(old: &ScanReport, new: &ScanReport) -> DeltaReport {
	// Index old files by sha1 to find `moved_files` (same sha1,
	// different path), excluding any old path that is itself present at
	// the same path in `new` — that path is already spoken for by the
	// Same/Changed case below and is never a legitimate move source.
	let mut old_by_sha1: HashMap<&str, Vec<&str>> = HashMap::new();
	for (path, findings) in &old.files {
		if new.files.contains_key(path) {
			continue;
		}
		if let Some(sha1) = &findings.sha1 {
			old_by_sha1.entry(sha1.as_str()).or_default().push(path);
		}
	}
	for paths in old_by_sha1.values_mut() {
		paths.sort_unstable();
	}

	let mut body = Vec::new();
	let mut stats = DeltaStats {
		new_files_count: new.files.len(),
		old_files_count: old.files.len(),
		..Default::default()
	};

	// Process new paths in sorted order so that when several new paths
	// tie for the same sha1-matched old candidates, which one wins is a
	// function of path name, not of hashmap iteration.
	let mut new_paths: Vec<&String> = new.files.keys().collect();
	new_paths.sort_unstable();

	let mut claimed_old_paths: std::collections::HashSet<&str> = std::collections::HashSet::new();

	for new_path in new_paths {
		let new_findings = &new.files[new_path];
		let old_findings = old.files.get(new_path);

		let category = match old_findings {
			Some(old_findings) if old_findings.sha1 == new_findings.sha1 && old_findings.sha1.is_some() => {
				Category::Same
			}
			Some(old_findings) => classify_changed(old_findings, new_findings),
			None => {
				// Not present at the same path in `old`: check whether
				// it moved (identical sha1 elsewhere).
				let moved_from = new_findings.sha1.as_deref().and_then(|sha1| {
					old_by_sha1
						.get(sha1)
						.and_then(|paths| paths.iter().find(|p| !claimed_old_paths.contains(**p)))
						.copied()
				});
				if let Some(old_path) = moved_from {
					claimed_old_paths.insert(old_path);
					body.push(DeltaEntry {
						category: Category::Moved,
						new_path: Some(new_path.clone()),
						old_path: Some(old_path.to_owned()),
					});
					stats.moved_files += 1;
					continue;
				}
				if has_license_or_copyright(new_findings) {
					Category::NewWithLicenseOrCopyright
				} else {
					Category::NewNoLicenseAndCopyright
				}
			}
		};

		count_category(&mut stats, category);
		body.push(DeltaEntry {
			category,
			new_path: Some(new_path.clone()),
			old_path: old_findings.map(|_| new_path.clone()),
		});
	}

	for (old_path, old_findings) in &old.files {
		if new.files.contains_key(old_path) || claimed_old_paths.contains(old_path.as_str()) {
			continue;
		}
		let category = if has_license_or_copyright(old_findings) {
			Category::DeletedWithLicenseOrCopyright
		} else {
			Category::DeletedNoLicenseAndCopyright
		};
		count_category(&mut stats, category);
		body.push(DeltaEntry {
			category,
			new_path: None,
			old_path: Some(old_path.clone()),
		});
	}

	let numerator = (stats.same_files
		+ stats.moved_files
		+ stats.changed_files_with_no_license_and_copyright
		+ stats.changed_files_with_same_copyright_and_license
		+ stats.changed_files_with_updated_copyright_year_only) as f64;
	let similarity = if stats.new_files_count == 0 {
		0.0
	} else {
		numerator / stats.new_files_count as f64
	};

	DeltaReport {
		stats,
		body,
		similarity,
	}
}

fn classify_changed(
	old: &crate::scan::FileFindings,
	new: &crate::scan::FileFindings,
) -> Category {
	let old_has_lc = has_license_or_copyright(old);
	let new_has_lc = has_license_or_copyright(new);
	if !old_has_lc && !new_has_lc {
		return Category::ChangedNoLicenseAndCopyright;
	}

	let old_licenses = normalize_license_set(&old.licenses);
	let new_licenses = normalize_license_set(&new.licenses);
	let old_copyrights = normalize_copyright_set(&old.copyrights);
	let new_copyrights = normalize_copyright_set(&new.copyrights);

	if old_licenses == new_licenses && old_copyrights == new_copyrights {
		return Category::ChangedSameCopyrightAndLicense;
	}

	if old_licenses == new_licenses {
		let old_masked = normalize_copyright_set_year_masked(&old.copyrights);
		let new_masked = normalize_copyright_set_year_masked(&new.copyrights);
		if old_masked == new_masked {
			return Category::ChangedUpdatedCopyrightYearOnly;
		}
	}

	Category::ChangedCopyrightOrLicense
}

fn count_category(stats: &mut DeltaStats, category: Category) {
	match category {
		Category::Same => stats.same_files += 1,
		Category::Moved => stats.moved_files += 1,
		Category::ChangedNoLicenseAndCopyright => stats.changed_files_with_no_license_and_copyright += 1,
		Category::ChangedSameCopyrightAndLicense => {
			stats.changed_files_with_same_copyright_and_license += 1
		}
		Category::ChangedUpdatedCopyrightYearOnly => {
			stats.changed_files_with_updated_copyright_year_only += 1
		}
		Category::ChangedCopyrightOrLicense => {
			stats.changed_files_with_changed_copyright_or_license += 1
		}
		Category::NewNoLicenseAndCopyright => stats.new_files_with_no_license_and_copyright += 1,
		Category::NewWithLicenseOrCopyright => stats.new_files_with_license_or_copyright += 1,
		Category::DeletedNoLicenseAndCopyright => stats.deleted_files_with_no_license_and_copyright += 1,
		Category::DeletedWithLicenseOrCopyright => stats.deleted_files_with_license_or_copyright += 1,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::scan::FileFindings;

	fn findings(licenses: &[&str], copyrights: &[&str], sha1: &str) -> FileFindings {
		FileFindings {
			licenses: licenses.iter().map(|s| s.to_string()).collect(),
			copyrights: copyrights.iter().map(|s| s.to_string()).collect(),
			sha1: Some(sha1.to_owned()),
		}
	}

	#[test]
	fn every_new_file_is_classified_exactly_once() {
		let mut old = ScanReport::new();
		old.files.insert("a.c".into(), findings(&["MIT"], &[], "aaa"));
		old.files.insert("b.c".into(), findings(&[], &[], "bbb"));

		let mut new = ScanReport::new();
		new.files.insert("a.c".into(), findings(&["MIT"], &[], "aaa")); // same
		new.files.insert("b.c.new".into(), findings(&[], &[], "bbb")); // moved
		new.files.insert("c.c".into(), findings(&["GPL-2.0-only"], &[], "ccc")); // new w/ license

		let delta = reconcile(&old, &new);
		let sum = delta.stats.same_files
			+ delta.stats.moved_files
			+ delta.stats.changed_files_with_no_license_and_copyright
			+ delta.stats.changed_files_with_same_copyright_and_license
			+ delta.stats.changed_files_with_updated_copyright_year_only
			+ delta.stats.changed_files_with_changed_copyright_or_license
			+ delta.stats.new_files_with_no_license_and_copyright
			+ delta.stats.new_files_with_license_or_copyright;
		assert_eq!(sum, delta.stats.new_files_count);
		assert_eq!(delta.stats.same_files, 1);
		assert_eq!(delta.stats.moved_files, 1);
		assert_eq!(delta.stats.new_files_with_license_or_copyright, 1);
	}

	#[test]
	fn deleted_files_absent_from_new_are_classified() {
		let mut old = ScanReport::new();
		old.files.insert("gone.c".into(), findings(&["MIT"], &[], "xxx"));
		let new = ScanReport::new();

		let delta = reconcile(&old, &new);
		assert_eq!(delta.stats.deleted_files_with_license_or_copyright, 1);
	}

	#[test]
	fn year_only_copyright_change_is_its_own_category() {
		let mut old = ScanReport::new();
		old.files.insert(
			"a.c".into(),
			findings(&["MIT"], &["Copyright 2019 Jane Doe"], "aaa"),
		);
		let mut new = ScanReport::new();
		new.files.insert(
			"a.c".into(),
			findings(&["MIT"], &["Copyright 2024 Jane Doe"], "bbb"),
		);

		let delta = reconcile(&old, &new);
		assert_eq!(delta.stats.changed_files_with_updated_copyright_year_only, 1);
	}

	#[test]
	fn similarity_formula() {
		// spec §8 scenario 3: 108 same + 1 moved over 253 new files.
		let mut old = ScanReport::new();
		let mut new = ScanReport::new();
		for i in 0..108 {
			let path = format!("f{i}.c");
			old.files.insert(path.clone(), findings(&[], &[], &format!("sha{i}")));
			new.files.insert(path, findings(&[], &[], &format!("sha{i}")));
		}
		old.files.insert("zconf.h".into(), findings(&[], &[], "moved-sha"));
		new.files.insert("zconf.h.in".into(), findings(&[], &[], "moved-sha"));
		for i in 108..252 {
			new.files.insert(
				format!("new{i}.c"),
				findings(&["MIT"], &["Copyright 2020 X"], &format!("new-sha{i}")),
			);
		}

		let delta = reconcile(&old, &new);
		assert_eq!(delta.stats.same_files, 108);
		assert_eq!(delta.stats.moved_files, 1);
		assert_eq!(delta.stats.new_files_count, 253);
		let expected_similarity = (108.0 + 1.0) / 253.0;
		assert!((delta.similarity - expected_similarity).abs() < 1e-9);
	}
}
