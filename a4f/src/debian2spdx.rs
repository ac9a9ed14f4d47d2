// SPDX-License-Identifier: Apache-2.0

//! Debian2SPDX: parses `debian/copyright` (DEP-5) + `debian/control`
//! into an SPDX document with one SPDX-File per `Files:` stanza entry
//! and a package-level license formed as the `AND`-union of every
//! `License:` atom (spec §4.6).

use crate::dep5::{self, Dep5Document};
use crate::error::{Error, Result};
use crate::spdx_doc::{file_spdx_id, new_document, new_file, new_package};
use glob::Pattern;
use spdx_rs::models::SPDX;
use std::collections::BTreeSet;

/// Extracts an SPDX document from a Debian source package's
/// `debian/copyright` text and the archive's file tree. On a
/// missing/unparseable format header, the caller should instead write
/// the raw text out as `FILETYPE.DEBIAN_COPYRIGHT_RAW` — that fallback
/// lives in the caller (the `spdxdebian` command), not here, since
/// this function's only job is the happy-path extraction.
pub fn extract(
	package_name: &str,
	package_version: &str,
	copyright_text: &str,
	archive_paths: &[String],
) -> Result<SPDX> {
	let doc = dep5::parse(copyright_text)?;
	Ok(build_document(package_name, package_version, &doc, archive_paths))
}

fn build_document(
	package_name: &str,
	package_version: &str,
	dep5: &Dep5Document,
	archive_paths: &[String],
) -> SPDX {
	let namespace = format!("https://a4f.local/spdx/{package_name}/{package_version}/debian");
	let mut doc = new_document(&format!("{package_name}-{package_version}-debian"), &namespace);

	let mut package = new_package("SPDXRef-Package-Debian", package_name);
	package.package_version = Some(package_version.to_owned());

	let mut all_license_atoms: BTreeSet<String> = BTreeSet::new();
	// Later `Files:` stanzas are conventionally the more specific
	// overrides (a catch-all `Files: *` comes first, narrower globs
	// follow), so a later match wins over an earlier one at the same
	// path.
	let mut per_path: std::collections::HashMap<String, (String, String)> = std::collections::HashMap::new();

	for paragraph in &dep5.files_paragraphs {
		let globs = paragraph.get_list("Files");
		let license = paragraph.get("License").unwrap_or("NOASSERTION").to_owned();
		let copyright = paragraph.get("Copyright").unwrap_or("NOASSERTION").to_owned();
		all_license_atoms.extend(license_atoms(&license));

		for glob_pattern in &globs {
			let Ok(pattern) = Pattern::new(glob_pattern) else {
				continue;
			};
			for path in archive_paths {
				if pattern.matches(path) {
					per_path.insert(path.clone(), (license.clone(), copyright.clone()));
				}
			}
		}
	}

	let mut paths: Vec<&String> = per_path.keys().collect();
	paths.sort();
	for path in paths {
		let (license, copyright) = &per_path[path];
		let mut file = new_file(&file_spdx_id(path), path, None);
		file.concluded_license = license.clone();
		file.copyright_text = copyright.clone();
		doc.file_information.push(file);
	}

	for standalone in &dep5.standalone_licenses {
		if let Some(license_id) = standalone.get("License").and_then(|v| v.lines().next()) {
			let license_id = license_id.trim();
			if !license_id.is_empty() {
				all_license_atoms.insert(format!("LicenseRef-{}", sanitize_license_ref(license_id)));
			}
		}
	}

	package.declared_license = union_license(&all_license_atoms);
	package.concluded_license = package.declared_license.clone();
	doc.package_information.push(package);

	doc
}

/// Splits a DEP-5 `License:` field into its atomic identifiers (it may
/// itself already be an `AND`/`OR` expression; atoms are the
/// whitespace/operator-delimited tokens).
fn license_atoms(license: &str) -> Vec<String> {
	license
		.split(|c: char| c.is_whitespace() || c == '(' || c == ')')
		.filter(|tok| !tok.is_empty() && !tok.eq_ignore_ascii_case("AND") && !tok.eq_ignore_ascii_case("OR"))
		.map(str::to_owned)
		.collect()
}

fn sanitize_license_ref(id: &str) -> String {
	id.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
		.collect()
}

/// Combines every license atom conservatively with `AND` (spec §4.6).
fn union_license(atoms: &BTreeSet<String>) -> String {
	if atoms.is_empty() {
		return "NOASSERTION".to_owned();
	}
	atoms.iter().cloned().collect::<Vec<_>>().join(" AND ")
}

#[cfg(test)]
mod tests {
	use super::*;

	const COPYRIGHT: &str = "Format: https://www.debian.org/doc/packaging-manuals/copyright-format/1.0/\nSource: https://zlib.net\n\nFiles: *\nCopyright: 2021 Jane Doe\nLicense: Zlib\n\nFiles: contrib/minizip/*\nCopyright: 2019 Minizip Authors\nLicense: BSD-3-Clause\n";

	fn archive_paths() -> Vec<String> {
		vec![
			"zlib.c".into(),
			"zconf.h".into(),
			"contrib/minizip/zip.c".into(),
			"contrib/minizip/unzip.c".into(),
		]
	}

	#[test]
	fn builds_one_file_entry_per_matched_path() {
		let doc = extract("zlib", "1.2.11.dfsg-1", COPYRIGHT, &archive_paths()).unwrap();
		assert_eq!(doc.file_information.len(), 4);
	}

	#[test]
	fn more_specific_glob_wins_for_overlapping_paths() {
		let doc = extract("zlib", "1.2.11.dfsg-1", COPYRIGHT, &archive_paths()).unwrap();
		let zip_file = doc
			.file_information
			.iter()
			.find(|f| f.file_name == "contrib/minizip/zip.c")
			.unwrap();
		assert_eq!(zip_file.concluded_license, "BSD-3-Clause");
	}

	#[test]
	fn package_license_is_and_union_of_atoms() {
		let doc = extract("zlib", "1.2.11.dfsg-1", COPYRIGHT, &archive_paths()).unwrap();
		let package = &doc.package_information[0];
		assert!(package.declared_license.contains("AND"));
		assert!(package.declared_license.contains("Zlib"));
		assert!(package.declared_license.contains("BSD-3-Clause"));
	}

	#[test]
	fn unparseable_copyright_is_corrupt_input() {
		let err = extract("zlib", "1.0", "Source: foo\n", &archive_paths()).unwrap_err();
		assert!(matches!(err, Error::CorruptInput(_)));
	}
}
