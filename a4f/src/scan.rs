// SPDX-License-Identifier: Apache-2.0

//! `ScanReport`: the normalized per-file view of a scanner's output
//! (spec §3). The scanner itself (ScanCode) is an external
//! collaborator (spec §1); this module only models its normalized
//! shape and the license/copyright normalization helpers the Delta
//! reconciler and AlienSPDX synthesizer both need.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

/// Per-file scanner findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFindings {
	#[serde(default)]
	pub licenses: Vec<String>,
	#[serde(default)]
	pub copyrights: Vec<String>,
	/// The file's checksum as recorded in the scan, used by the Delta
	/// reconciler to decide `same_files` vs `moved_files` vs a change.
	#[serde(default)]
	pub sha1: Option<String>,
}

/// A normalized `{path → findings}` map, the shape both scan trees
/// (Debian "old" and alien "new") are reduced to (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
	pub files: HashMap<String, FileFindings>,
}

impl ScanReport {
	pub fn new() -> ScanReport {
		ScanReport::default()
	}
}

/// SPDX identifier synonyms collapsed before set comparison (spec
/// §4.5), not a license-compatibility judgment — purely a dedup aid.
const LICENSE_SYNONYMS: &[(&str, &str)] = &[
	("GPLv2", "GPL-2.0-only"),
	("GPL-2.0", "GPL-2.0-only"),
	("GPLv2+", "GPL-2.0-or-later"),
	("GPL-2.0+", "GPL-2.0-or-later"),
	("GPLv3", "GPL-3.0-only"),
	("GPL-3.0", "GPL-3.0-only"),
	("LGPLv2.1", "LGPL-2.1-only"),
	("LGPL-2.1", "LGPL-2.1-only"),
	("BSD-3", "BSD-3-Clause"),
	("BSD-2", "BSD-2-Clause"),
	("Apache-2", "Apache-2.0"),
	("MIT License", "MIT"),
];

fn normalize_license_token(token: &str) -> String {
	let trimmed = token.trim();
	for (synonym, canonical) in LICENSE_SYNONYMS {
		if trimmed.eq_ignore_ascii_case(synonym) {
			return (*canonical).to_owned();
		}
	}
	trimmed.to_owned()
}

/// Normalizes a license list into a comparable set: synonyms
/// collapsed, whitespace trimmed, `NOASSERTION`/`NONE` dropped.
pub fn normalize_license_set(licenses: &[String]) -> BTreeSet<String> {
	licenses
		.iter()
		.map(|l| normalize_license_token(l))
		.filter(|l| !l.is_empty() && !l.eq_ignore_ascii_case("NOASSERTION") && !l.eq_ignore_ascii_case("NONE"))
		.collect()
}

fn year_regex() -> &'static Regex {
	static RE: OnceLock<Regex> = OnceLock::new();
	RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap())
}

/// Collapses whitespace and lowercases a copyright string for
/// comparison (spec §4.5).
fn normalize_copyright_token(copyright: &str) -> String {
	copyright
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
		.to_lowercase()
}

/// Normalizes a copyright list into a comparable set.
pub fn normalize_copyright_set(copyrights: &[String]) -> BTreeSet<String> {
	copyrights
		.iter()
		.map(|c| normalize_copyright_token(c))
		.filter(|c| !c.is_empty())
		.collect()
}

/// Masks year tokens (`\b(19|20)\d{2}\b`) so two copyrights differing
/// only in year compare equal.
pub fn mask_years(copyright: &str) -> String {
	year_regex().replace_all(copyright, "<YEAR>").into_owned()
}

/// Normalized-and-year-masked copyright set, used to detect the
/// `changed_files_with_updated_copyright_year_only` category.
pub fn normalize_copyright_set_year_masked(copyrights: &[String]) -> BTreeSet<String> {
	copyrights
		.iter()
		.map(|c| mask_years(&normalize_copyright_token(c)))
		.filter(|c| !c.is_empty())
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn license_synonyms_collapse() {
		let a = normalize_license_set(&["GPLv2".into()]);
		let b = normalize_license_set(&["GPL-2.0-only".into()]);
		assert_eq!(a, b);
	}

	#[test]
	fn noassertion_and_none_are_dropped() {
		let set = normalize_license_set(&["NOASSERTION".into(), "NONE".into(), "MIT".into()]);
		assert_eq!(set.len(), 1);
		assert!(set.contains("MIT"));
	}

	#[test]
	fn copyright_year_masking_ignores_year_only_changes() {
		let a = normalize_copyright_set_year_masked(&["Copyright 2019 Jane Doe".into()]);
		let b = normalize_copyright_set_year_masked(&["copyright   2021  jane doe".into()]);
		assert_eq!(a, b);
	}

	#[test]
	fn copyright_set_distinguishes_non_year_changes() {
		let a = normalize_copyright_set(&["Copyright 2019 Jane Doe".into()]);
		let b = normalize_copyright_set(&["Copyright 2019 John Smith".into()]);
		assert_ne!(a, b);
	}
}
