// SPDX-License-Identifier: Apache-2.0

//! A small, line-oriented parser for Debian's machine-readable
//! `debian/copyright` format (DEP-5): blank-line-delimited paragraphs
//! of `Field: value` pairs, with `Files:`/`Copyright:`/`License:`
//! stanzas and "stand-alone license" paragraphs that carry only
//! `License:` + full text (spec §4.6).
//!
//! No parser for this grammar exists among this corpus's dependencies
//! (the pack's `deb` reference repo has one, but pulling in the whole
//! `deb` crate for a single paragraph reader would be a needless
//! dependency this crate's own style avoids), so it is hand-written,
//! per Design Note §9's "do not rely on regex-only shortcuts" guidance
//! applied to parsers generally.

use crate::error::{Error, Result};

/// One DEP-5 paragraph: an ordered list of `(field, value)` pairs.
/// Multi-line field values (continuation lines beginning with
/// whitespace) are joined with `\n`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
	pub fields: Vec<(String, String)>,
}

impl Paragraph {
	pub fn get(&self, name: &str) -> Option<&str> {
		self.fields
			.iter()
			.find(|(k, _)| k.eq_ignore_ascii_case(name))
			.map(|(_, v)| v.as_str())
	}

	/// `Files:`/`Copyright:` etc. stanzas may list several whitespace
	/// separated glob patterns across possibly-wrapped lines.
	pub fn get_list(&self, name: &str) -> Vec<String> {
		self.get(name)
			.map(|v| v.split_whitespace().map(str::to_owned).collect())
			.unwrap_or_default()
	}
}

/// A parsed `debian/copyright` document: the header paragraph
/// (`Format:`/`Source:`/…), zero or more `Files:` paragraphs, and zero
/// or more stand-alone `License:` paragraphs (no `Files:` field).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dep5Document {
	pub header: Paragraph,
	pub files_paragraphs: Vec<Paragraph>,
	pub standalone_licenses: Vec<Paragraph>,
}

const FORMAT_FIELD: &str = "Format";
const MACHINE_READABLE_MARKER: &str = "https://www.debian.org/doc/packaging-manuals/copyright-format/";

/// Parse DEP-5 text. Returns `CorruptInput` if the `Format:` header is
/// missing or does not point at the machine-readable copyright format
/// spec, per spec §4.6 ("if the format header is missing or
/// unparseable... fail with CopyrightNotMachineParseable").
pub fn parse(text: &str) -> Result<Dep5Document> {
	let paragraphs = split_paragraphs(text);
	let Some(header) = paragraphs.first() else {
		return Err(Error::corrupt("debian/copyright: empty document"));
	};

	let format = header
		.get(FORMAT_FIELD)
		.ok_or_else(|| Error::corrupt("debian/copyright: missing Format: header"))?;
	if !format.contains(MACHINE_READABLE_MARKER) {
		return Err(Error::corrupt(format!(
			"debian/copyright: unrecognized Format: '{format}'"
		)));
	}

	let mut doc = Dep5Document {
		header: header.clone(),
		files_paragraphs: Vec::new(),
		standalone_licenses: Vec::new(),
	};

	for paragraph in &paragraphs[1..] {
		if paragraph.get("Files").is_some() {
			doc.files_paragraphs.push(paragraph.clone());
		} else if paragraph.get("License").is_some() {
			doc.standalone_licenses.push(paragraph.clone());
		}
		// Paragraphs with neither field (stray comments) are ignored.
	}

	Ok(doc)
}

fn split_paragraphs(text: &str) -> Vec<Paragraph> {
	let mut paragraphs = Vec::new();
	let mut current = Paragraph::default();
	let mut last_field: Option<usize> = None;

	for line in text.lines() {
		if line.trim().is_empty() {
			if !current.fields.is_empty() {
				paragraphs.push(std::mem::take(&mut current));
			}
			last_field = None;
			continue;
		}
		if line.starts_with(' ') || line.starts_with('\t') {
			if let Some(idx) = last_field {
				let continuation = line.trim();
				let value = &mut current.fields[idx].1;
				if continuation != "." {
					if !value.is_empty() {
						value.push('\n');
					}
					value.push_str(continuation);
				} else {
					value.push('\n');
				}
			}
			continue;
		}
		if line.starts_with('#') {
			continue;
		}
		if let Some((key, value)) = line.split_once(':') {
			current.fields.push((key.trim().to_owned(), value.trim().to_owned()));
			last_field = Some(current.fields.len() - 1);
		}
	}
	if !current.fields.is_empty() {
		paragraphs.push(current);
	}
	paragraphs
}
