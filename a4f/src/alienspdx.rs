// SPDX-License-Identifier: Apache-2.0

//! The Alien SPDX synthesizer: weaves scanner output (`.scancode.spdx`)
//! with the Debian SPDX under similarity-gated rules (spec §4.7).
//!
//! Implemented as a pure function so the tiering boundary ("similarity
//! exactly 0.30 yields >= 1 LicenseConcluded; at 0.2999 none", spec
//! §8) is directly unit-testable without touching the Pool.

use crate::delta::{Category, DeltaReport};
use spdx_rs::models::SPDX;
use std::collections::HashMap;

/// Tunable similarity thresholds (spec §4.7, Open Question in spec
/// §9: "treated as tunables... if the implementer needs exact parity
/// with the source tool's numbers, they must be extracted from the
/// reference runs"). Kept as spec.md states them.
pub mod thresholds {
	pub const DEBIAN_PER_FILE: f64 = 0.30;
	pub const PACKAGE_DECLARED: f64 = 0.92;
	pub const PACKAGE_FULL: f64 = 1.00;
}

/// A non-fatal note surfaced alongside the synthesized document (e.g.
/// "no Debian match; scancode-only output", spec §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning(pub String);

/// File path categories eligible to receive Debian's per-file
/// `LicenseConcluded`/copyright at the `0.30 <= S < 0.92` tier and
/// above (spec §4.7: "same, moved, changed_no_lc, changed_same_lc,
/// changed_year_only").
fn is_debian_eligible(category: Category) -> bool {
	matches!(
		category,
		Category::Same
			| Category::Moved
			| Category::ChangedNoLicenseAndCopyright
			| Category::ChangedSameCopyrightAndLicense
			| Category::ChangedUpdatedCopyrightYearOnly
	)
}

/// Synthesizes the Alien SPDX document.
///
/// `scancode`: always present, the baseline. `delta`: the Deltacode
/// against the matched Debian scan, if a match exists. `debian`: the
/// Debian SPDX, if a match exists. `force_full`: `--apply-debian-full`,
/// forcing the `S = 1.00` branch irrespective of similarity.
pub fn synthesize(
	scancode: &SPDX,
	delta: Option<&DeltaReport>,
	debian: Option<&SPDX>,
	force_full: bool,
) -> (SPDX, Vec<Warning>) {
	let mut warnings = Vec::new();
	let mut output = scancode.clone();

	let (Some(delta), Some(debian)) = (delta, debian) else {
		for file in &mut output.file_information {
			reclassify_as_scanner_only(file);
		}
		warnings.push(Warning(
			"no Debian match or no main internal archive; scancode-only output".to_owned(),
		));
		return (output, warnings);
	};

	let similarity = if force_full { thresholds::PACKAGE_FULL } else { delta.similarity };

	if similarity < thresholds::DEBIAN_PER_FILE {
		for file in &mut output.file_information {
			reclassify_as_scanner_only(file);
		}
		warnings.push(Warning(format!(
			"similarity {similarity:.2} below {:.2}; no concluded license inferred",
			thresholds::DEBIAN_PER_FILE
		)));
		return (output, warnings);
	}

	// path -> (debian concluded license, debian copyright)
	let debian_by_path: HashMap<&str, (&str, &str)> = debian
		.file_information
		.iter()
		.map(|f| (f.file_name.as_str(), (f.concluded_license.as_str(), f.copyright_text.as_str())))
		.collect();

	let eligible_new_paths: std::collections::HashSet<&str> = delta
		.body
		.iter()
		.filter(|entry| is_debian_eligible(entry.category))
		.filter_map(|entry| entry.new_path.as_deref())
		.collect();

	for file in &mut output.file_information {
		if eligible_new_paths.contains(file.file_name.as_str()) {
			if let Some((license, copyright)) = debian_by_path.get(file.file_name.as_str()) {
				file.concluded_license = (*license).to_owned();
				file.copyright_text = (*copyright).to_owned();
				continue;
			}
		}
		reclassify_as_scanner_only(file);
	}

	if similarity >= thresholds::PACKAGE_DECLARED {
		if let Some(debian_package) = debian.package_information.first() {
			for package in &mut output.package_information {
				package.declared_license = debian_package.declared_license.clone();
			}
		}
	}

	if similarity >= thresholds::PACKAGE_FULL {
		if let Some(debian_package) = debian.package_information.first() {
			for package in &mut output.package_information {
				package.copyright_text = debian_package.copyright_text.clone();
				package.package_supplier = debian_package.package_supplier.clone();
				package.package_originator = debian_package.package_originator.clone();
			}
		}
	}

	(output, warnings)
}

/// Moves a file's concluded license into `LicenseInfoInFile` (the
/// scanner-only representation), per spec §4.7's `S < 0.30` tier.
fn reclassify_as_scanner_only(file: &mut spdx_rs::models::FileInformation) {
	if file.concluded_license != crate::spdx_doc::NOASSERTION && !file.concluded_license.is_empty() {
		if !file.license_information_in_file.contains(&file.concluded_license) {
			file.license_information_in_file.push(file.concluded_license.clone());
		}
	}
	file.concluded_license = crate::spdx_doc::NOASSERTION.to_owned();
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::delta::{DeltaEntry, DeltaStats};
	use crate::spdx_doc::{new_document, new_file, new_package};

	fn scancode_doc() -> SPDX {
		let mut doc = new_document("alien", "https://a4f.local/spdx/alien/scancode");
		let mut file_a = new_file("SPDXRef-File-a", "a.c", None);
		file_a.concluded_license = "MIT".to_owned();
		doc.file_information.push(file_a);
		let mut file_b = new_file("SPDXRef-File-b", "b.c", None);
		file_b.concluded_license = "GPL-2.0-only".to_owned();
		doc.file_information.push(file_b);
		doc.package_information.push(new_package("SPDXRef-Package", "alien"));
		doc
	}

	fn debian_doc() -> SPDX {
		let mut doc = new_document("alien", "https://a4f.local/spdx/alien/debian");
		let mut file_a = new_file("SPDXRef-File-a", "a.c", None);
		file_a.concluded_license = "MIT".to_owned();
		file_a.copyright_text = "2021 Jane Doe".to_owned();
		doc.file_information.push(file_a);
		let mut package = new_package("SPDXRef-Package-Debian", "alien");
		package.declared_license = "MIT".to_owned();
		doc.package_information.push(package);
		doc
	}

	fn delta_with_similarity(similarity: f64) -> DeltaReport {
		DeltaReport {
			stats: DeltaStats::default(),
			body: vec![DeltaEntry {
				category: Category::Same,
				new_path: Some("a.c".into()),
				old_path: Some("a.c".into()),
			}],
			similarity,
		}
	}

	#[test]
	fn below_030_is_scanner_only() {
		let delta = delta_with_similarity(0.2999);
		let (doc, warnings) = synthesize(&scancode_doc(), Some(&delta), Some(&debian_doc()), false);
		assert!(doc.file_information.iter().all(|f| f.concluded_license == "NOASSERTION"));
		assert!(!warnings.is_empty());
	}

	#[test]
	fn exactly_030_promotes_eligible_file_to_concluded() {
		let delta = delta_with_similarity(0.30);
		let (doc, _warnings) = synthesize(&scancode_doc(), Some(&delta), Some(&debian_doc()), false);
		let a = doc.file_information.iter().find(|f| f.file_name == "a.c").unwrap();
		assert_eq!(a.concluded_license, "MIT");
		let b = doc.file_information.iter().find(|f| f.file_name == "b.c").unwrap();
		assert_eq!(b.concluded_license, "NOASSERTION");
	}

	#[test]
	fn at_092_applies_package_declared_license() {
		let delta = delta_with_similarity(0.92);
		let (doc, _) = synthesize(&scancode_doc(), Some(&delta), Some(&debian_doc()), false);
		assert_eq!(doc.package_information[0].declared_license, "MIT");
	}

	#[test]
	fn at_100_applies_full_package_metadata() {
		let delta = delta_with_similarity(1.00);
		let (doc, _) = synthesize(&scancode_doc(), Some(&delta), Some(&debian_doc()), false);
		assert_eq!(doc.package_information[0].copyright_text, "NOASSERTION");
	}

	#[test]
	fn force_full_overrides_low_similarity() {
		let delta = delta_with_similarity(0.0);
		let (doc, warnings) = synthesize(&scancode_doc(), Some(&delta), Some(&debian_doc()), true);
		assert_eq!(doc.package_information[0].declared_license, "MIT");
		assert!(warnings.is_empty());
	}

	#[test]
	fn no_debian_match_falls_back_to_scanner_only_with_warning() {
		let (doc, warnings) = synthesize(&scancode_doc(), None, None, false);
		assert!(doc.file_information.iter().all(|f| f.concluded_license == "NOASSERTION"));
		assert_eq!(warnings.len(), 1);
	}
}
