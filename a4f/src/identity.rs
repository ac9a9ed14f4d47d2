// SPDX-License-Identifier: Apache-2.0

//! Package identity: the `(name, version, variant?)` triple that is
//! the primary key throughout the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A package identity. `variant` distinguishes two builds that share
/// `(name, version)` but differ in bit content (e.g. a short content
/// digest of the main archive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity {
	pub name: String,
	pub version: String,
	#[serde(skip_serializing_if = "Option::is_none", default)]
	pub variant: Option<String>,
}

impl Identity {
	pub fn new(name: impl Into<String>, version: impl Into<String>) -> Identity {
		Identity {
			name: name.into(),
			version: version.into(),
			variant: None,
		}
	}

	pub fn with_variant(mut self, variant: impl Into<String>) -> Identity {
		self.variant = Some(variant.into());
		self
	}

	/// Whether `other` shares this identity's `(name, version)`,
	/// ignoring `variant` — the relation `Session::addVariants` walks.
	pub fn same_name_version(&self, other: &Identity) -> bool {
		self.name == other.name && self.version == other.version
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.variant {
			Some(variant) => write!(f, "{}@{}+{}", self.name, self.version, variant),
			None => write!(f, "{}@{}", self.name, self.version),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_includes_variant_when_present() {
		let id = Identity::new("zlib", "1.2.11-r0").with_variant("deadbeef");
		assert_eq!(id.to_string(), "zlib@1.2.11-r0+deadbeef");
	}

	#[test]
	fn same_name_version_ignores_variant() {
		let a = Identity::new("zlib", "1.2.11-r0").with_variant("aaa");
		let b = Identity::new("zlib", "1.2.11-r0").with_variant("bbb");
		assert!(a.same_name_version(&b));
	}
}
