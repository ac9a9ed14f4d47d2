// SPDX-License-Identifier: Apache-2.0

//! Shared helpers around `spdx_rs::models::SPDX`, the in-memory SPDX
//! 2.2 document model used for `DebianSPDX`, `AlienSPDX` and
//! `FinalSPDX` (spec §3).

use chrono::Utc;
use spdx_rs::models::{Algorithm, FileInformation, PackageInformation, SPDX};

pub const NOASSERTION: &str = "NOASSERTION";
pub const SPDX_VERSION: &str = "SPDX-2.2";

/// A fresh SPDX document with the creation-info boilerplate filled in.
pub fn new_document(name: &str, namespace: &str) -> SPDX {
	let mut doc = SPDX {
		spdx_version: SPDX_VERSION.to_owned(),
		document_name: name.to_owned(),
		spdx_identifier: "SPDXRef-DOCUMENT".to_owned(),
		document_namespace: namespace.to_owned(),
		..Default::default()
	};
	doc.creation_info.creators.push("Tool: a4f".to_owned());
	doc.creation_info.created = Utc::now();
	doc
}

/// A minimal package entry with `NOASSERTION` defaults for the fields
/// spec §4.6/§4.7 only conditionally populate.
pub fn new_package(spdx_id: &str, name: &str) -> PackageInformation {
	PackageInformation {
		package_name: name.to_owned(),
		package_spdx_identifier: spdx_id.to_owned(),
		package_download_location: NOASSERTION.to_owned(),
		concluded_license: NOASSERTION.to_owned(),
		declared_license: NOASSERTION.to_owned(),
		copyright_text: NOASSERTION.to_owned(),
		..Default::default()
	}
}

/// A minimal per-file entry carrying a sha1 checksum, matching the
/// file records the scanner / Deltacode produce.
pub fn new_file(spdx_id: &str, name: &str, sha1: Option<&str>) -> FileInformation {
	let mut file = FileInformation {
		file_name: name.to_owned(),
		file_spdx_identifier: spdx_id.to_owned(),
		concluded_license: NOASSERTION.to_owned(),
		copyright_text: NOASSERTION.to_owned(),
		..Default::default()
	};
	if let Some(sha1) = sha1 {
		file.file_checksum.push(spdx_rs::models::Checksum {
			algorithm: Algorithm::SHA1,
			value: sha1.to_owned(),
		});
	}
	file
}

/// A stable per-path SPDX file identifier (SPDX identifiers may only
/// contain letters, digits and `-`).
pub fn file_spdx_id(path: &str) -> String {
	let sanitized: String = path
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
		.collect();
	format!("SPDXRef-File-{sanitized}")
}

/// Serializes a document to SPDX Tag-Value text.
pub fn to_tag_value(doc: &SPDX) -> crate::error::Result<String> {
	spdx_rs::parsers::spdx_to_tag_value(doc)
		.map_err(|e| crate::error::Error::other(format!("SPDX tag-value serialization failed: {e}")))
}

/// Parses SPDX Tag-Value text, used for the scanner's `.scancode.spdx`
/// output and the clearing server's exported SPDX.
pub fn from_tag_value(text: &str) -> crate::error::Result<SPDX> {
	spdx_rs::parsers::spdx_from_tag_value(text)
		.map_err(|e| crate::error::Error::corrupt(format!("unparseable SPDX tag-value document: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn new_document_carries_creator_tool() {
		let doc = new_document("zlib", "https://example/spdx/zlib");
		assert!(doc.creation_info.creators.iter().any(|c| c.contains("a4f")));
	}

	#[test]
	fn file_spdx_id_sanitizes_path() {
		assert_eq!(file_spdx_id("src/zlib.c"), "SPDXRef-File-src-zlib-c");
	}
}
