// SPDX-License-Identifier: Apache-2.0

//! The Harvester: gathers, per identity, the artifacts of every prior
//! pipeline step and emits one JSON document keyed by build-matrix tag
//! (spec §4.10).
//!
//! `TinfoilHat` metadata carries BitBake recipe metadata as a
//! `serde_json::Value` — its shape is genuinely free-form and not
//! specified further, so it is passed through verbatim rather than
//! forced into a tagged variant (Design Note §9's guidance applies only
//! where the shape is actually known).

use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One binary package emitted by the underlying Yocto build, as
/// attributed from TinfoilHat metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryPackage {
	pub name: String,
	#[serde(default)]
	pub files: Vec<String>,
}

/// `.tinfoilhat.json`: per-recipe BitBake build metadata (spec §4.10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TinfoilHat {
	#[serde(default)]
	pub binary_packages: Vec<BinaryPackage>,
	/// Free-form recipe metadata (`DESCRIPTION`, `HOMEPAGE`, layer
	/// provenance, etc.) whose shape BitBake does not fix.
	#[serde(default)]
	pub recipe_metadata: serde_json::Value,
}

/// Audit progress for one identity, read from its `Session` step flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditProgress {
	pub matched: bool,
	pub scanned: bool,
	pub delta_done: bool,
	pub spdx_done: bool,
	pub uploaded: bool,
	pub fossy_done: bool,
}

/// Per-binary-package attribution: file count and normalized license
/// set, surfaced alongside the recipe's overall audit progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinaryAttribution {
	pub file_count: usize,
	pub licenses: Vec<String>,
}

/// One identity's harvested record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestEntry {
	pub name: String,
	pub version: String,
	pub progress: AuditProgress,
	pub binaries: BTreeMap<String, BinaryAttribution>,
}

/// The full Harvest document: a map from build-matrix tag (the
/// recipe's identity string) to its entry (spec §4.10).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Harvest {
	pub entries: BTreeMap<String, HarvestEntry>,
}

fn build_matrix_tag(identity: &Identity) -> String {
	match &identity.variant {
		Some(variant) => format!("{}-{}-{}", identity.name, identity.version, variant),
		None => format!("{}-{}", identity.name, identity.version),
	}
}

/// Builds one identity's entry from its TinfoilHat metadata and the
/// license sets each binary's files carry in the scan report.
pub fn attribute(
	identity: &Identity,
	tinfoilhat: &TinfoilHat,
	progress: AuditProgress,
	scan: &crate::scan::ScanReport,
) -> HarvestEntry {
	let mut binaries = BTreeMap::new();
	for binary in &tinfoilhat.binary_packages {
		let mut licenses = std::collections::BTreeSet::new();
		for file in &binary.files {
			if let Some(findings) = scan.files.get(file) {
				licenses.extend(crate::scan::normalize_license_set(&findings.licenses));
			}
		}
		binaries.insert(
			binary.name.clone(),
			BinaryAttribution {
				file_count: binary.files.len(),
				licenses: licenses.into_iter().collect(),
			},
		);
	}

	HarvestEntry {
		name: identity.name.clone(),
		version: identity.version.clone(),
		progress,
		binaries,
	}
}

/// `--filter-snapshot`: keeps only entries whose build-matrix tag is
/// either a tagged release (no embedded `snapshot` marker) or the one
/// named snapshot (spec §4.10).
pub fn filter_snapshot(harvest: &Harvest, keep_snapshot: &str) -> Harvest {
	let entries = harvest
		.entries
		.iter()
		.filter(|(tag, _)| !tag.contains("snapshot") || *tag == keep_snapshot)
		.map(|(tag, entry)| (tag.clone(), entry.clone()))
		.collect();
	Harvest { entries }
}

/// `--with-binaries`: restricts every entry's `binaries` map to the
/// named set (spec §4.10). Entries with no matching binary are dropped
/// entirely, not left with an empty `binaries` map — an entry present
/// with nothing to show is not useful output.
pub fn with_binaries(harvest: &Harvest, names: &[String]) -> Harvest {
	let wanted: std::collections::HashSet<&str> = names.iter().map(String::as_str).collect();
	let entries = harvest
		.entries
		.iter()
		.filter_map(|(tag, entry)| {
			let binaries: BTreeMap<_, _> = entry
				.binaries
				.iter()
				.filter(|(name, _)| wanted.contains(name.as_str()))
				.map(|(name, attribution)| (name.clone(), attribution.clone()))
				.collect();
			if binaries.is_empty() {
				None
			} else {
				Some((
					tag.clone(),
					HarvestEntry {
						binaries,
						..entry.clone()
					},
				))
			}
		})
		.collect();
	Harvest { entries }
}

/// Inserts or replaces one identity's entry in the harvest document,
/// keyed by its build-matrix tag.
pub fn merge(harvest: &mut Harvest, identity: &Identity, entry: HarvestEntry) {
	harvest.entries.insert(build_matrix_tag(identity), entry);
}
