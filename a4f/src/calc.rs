// SPDX-License-Identifier: Apache-2.0

//! Pure scoring functions shared by the Debian matchers: fuzzy
//! package-name similarity and Debian-style version distance (spec
//! §4.4).

use std::collections::HashSet;

/// Debian packaging conventions that should not weigh against an
/// otherwise-matching name.
const STRIPPED_SUFFIXES: &[&str] = &["-dev", "-dbg", "-doc", "-utils", "-bin", "-tools"];
const STRIPPED_PREFIXES: &[&str] = &["lib"];

/// A short, explicit table of common Yocto/Debian aliasing pairs. Not
/// a network lookup — an acceptable static table per Design Note §9.
const ALIASES: &[(&str, &str)] = &[
	("util-linux", "util-linux-ng"),
	("iptables", "xtables-addons"),
	("e2fsprogs", "e2fsprogs-libs"),
	("openssl", "openssl1.1"),
	("ncurses", "ncurses5"),
];

fn strip_conventions(name: &str) -> String {
	let mut s = name.to_lowercase();
	for suffix in STRIPPED_SUFFIXES {
		if let Some(stripped) = s.strip_suffix(suffix) {
			s = stripped.to_owned();
			break;
		}
	}
	for prefix in STRIPPED_PREFIXES {
		if let Some(stripped) = s.strip_prefix(prefix) {
			// Don't strip "lib" off a name that is just "lib<word>"
			// where removing it would leave nothing meaningful, e.g.
			// keep "libc" distinct from "c" unless both sides agree.
			if !stripped.is_empty() {
				s = stripped.to_owned();
			}
			break;
		}
	}
	s
}

fn tokenize(name: &str) -> HashSet<String> {
	strip_conventions(name)
		.split(|c: char| c == '-' || c == '_' || c == '.')
		.filter(|t| !t.is_empty())
		.map(str::to_owned)
		.collect()
}

fn aliased_equivalents(name: &str) -> Vec<String> {
	let lower = name.to_lowercase();
	let mut out = vec![lower.clone()];
	for (a, b) in ALIASES {
		if lower == *a {
			out.push((*b).to_owned());
		} else if lower == *b {
			out.push((*a).to_owned());
		}
	}
	out
}

/// Symmetric token-set similarity of two package names, in `[0, 100]`.
/// Adjusted for Debian suffix/prefix conventions and a short alias
/// table before comparison (spec §4.4).
pub fn fuzzy_package_score(a: &str, b: &str) -> u32 {
	if a.eq_ignore_ascii_case(b) {
		return 100;
	}

	let mut best = token_set_score(a, b);
	for alias_a in aliased_equivalents(a) {
		for alias_b in aliased_equivalents(b) {
			best = best.max(token_set_score(&alias_a, &alias_b));
		}
	}
	best
}

fn token_set_score(a: &str, b: &str) -> u32 {
	if a.eq_ignore_ascii_case(b) {
		return 100;
	}
	let ta = tokenize(a);
	let tb = tokenize(b);
	if ta.is_empty() || tb.is_empty() {
		return 0;
	}
	let intersection = ta.intersection(&tb).count();
	let union = ta.union(&tb).count();
	((intersection as f64 / union as f64) * 100.0).round() as u32
}

/// A parsed Debian-style version string: `[epoch:]upstream[-revision]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebianVersion {
	pub epoch: u32,
	pub upstream: String,
	pub revision: String,
}

impl DebianVersion {
	pub fn parse(raw: &str) -> DebianVersion {
		let (epoch, rest) = match raw.split_once(':') {
			Some((epoch_str, rest)) if epoch_str.chars().all(|c| c.is_ascii_digit()) => {
				(epoch_str.parse().unwrap_or(0), rest)
			}
			_ => (0, raw),
		};

		// The revision is everything after the last '-'; packages with
		// no '-' (Debian "native" versions) have an empty revision.
		match rest.rfind('-') {
			Some(idx) => DebianVersion {
				epoch,
				upstream: rest[..idx].to_owned(),
				revision: rest[idx + 1..].to_owned(),
			},
			None => DebianVersion {
				epoch,
				upstream: rest.to_owned(),
				revision: String::new(),
			},
		}
	}

	/// The leading numeric run of `upstream`, used for major/minor
	/// step weighting (e.g. `1.2.11.dfsg` → `[1, 2, 11]`).
	fn numeric_components(&self) -> Vec<u64> {
		self.upstream
			.split(|c: char| c == '.' || c == '+' || c == '~' || c == '-')
			.take_while(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
			.map(|s| s.parse().unwrap_or(0))
			.collect()
	}

	/// Whether the upstream string carries a pre-release-style marker
	/// (`dfsg`, `~`, `+`, `-rcN`, …).
	fn has_prerelease_marker(&self) -> bool {
		let lower = self.upstream.to_lowercase();
		lower.contains("dfsg") || lower.contains('~') || lower.contains("+rc") || lower.contains("-rc")
	}
}

/// Non-negative distance between two Debian-style version strings,
/// weighted per spec §4.4: epoch change 1000, differing upstream major
/// 100/step, minor 10/step, revision 1/step, pre-release markers +5.
/// `0` iff the strings compare equal after normalization.
pub fn version_distance(a: &str, b: &str) -> u64 {
	if a == b {
		return 0;
	}
	let va = DebianVersion::parse(a);
	let vb = DebianVersion::parse(b);
	if va == vb {
		return 0;
	}

	let mut distance = 0u64;

	if va.epoch != vb.epoch {
		distance += 1000;
	}

	let na = va.numeric_components();
	let nb = vb.numeric_components();
	let len = na.len().max(nb.len());
	for i in 0..len {
		let ca = na.get(i).copied().unwrap_or(0);
		let cb = nb.get(i).copied().unwrap_or(0);
		if ca == cb {
			continue;
		}
		let diff = ca.abs_diff(cb);
		distance += match i {
			0 => diff.saturating_mul(100),
			1 => diff.saturating_mul(10),
			_ => diff,
		};
	}

	if va.revision != vb.revision {
		let both_numeric = !va.revision.is_empty()
			&& !vb.revision.is_empty()
			&& va.revision.chars().all(|c| c.is_ascii_digit())
			&& vb.revision.chars().all(|c| c.is_ascii_digit());
		if both_numeric {
			let ra: u64 = va.revision.parse().unwrap_or(0);
			let rb: u64 = vb.revision.parse().unwrap_or(0);
			distance += ra.abs_diff(rb);
		} else {
			// One side's "revision" is a BitBake recipe tag (e.g. `r0`)
			// rather than a Debian packaging revision: not a per-step
			// comparison, so count it as a single fixed step.
			distance += 5;
		}
	}

	if va.has_prerelease_marker() != vb.has_prerelease_marker() {
		distance += 5;
	}

	distance
}

/// `version_score = max(0, 100 - distance)`, floored so that any
/// distance `<= 10` maps to `>= 99` (spec §4.4).
pub fn version_score(distance: u64) -> u32 {
	if distance <= 10 {
		return 99 + (10 - distance.min(10)) as u32 / 10;
	}
	100u64.saturating_sub(distance) as u32
}

/// Overall match score: `0.5*package_score + 0.5*version_score`,
/// rounded to one decimal (spec §4.4).
pub fn overall_score(package_score: u32, version_score: u32) -> f64 {
	let raw = 0.5 * package_score as f64 + 0.5 * version_score as f64;
	(raw * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fuzzy_score_is_symmetric_and_in_range() {
		let pairs = [
			("zlib", "zlib"),
			("libfoo-dev", "foo"),
			("util-linux", "util-linux-ng"),
			("completely-different", "other-thing"),
		];
		for (a, b) in pairs {
			let ab = fuzzy_package_score(a, b);
			let ba = fuzzy_package_score(b, a);
			assert_eq!(ab, ba, "score({a}, {b}) != score({b}, {a})");
			assert!(ab <= 100);
		}
	}

	#[test]
	fn exact_match_scores_100() {
		assert_eq!(fuzzy_package_score("zlib", "zlib"), 100);
	}

	#[test]
	fn alias_table_raises_score() {
		let aliased = fuzzy_package_score("util-linux", "util-linux-ng");
		let unrelated = fuzzy_package_score("util-linux", "totally-unrelated-name");
		assert!(aliased > unrelated);
	}

	#[test]
	fn version_distance_reflexive_and_symmetric() {
		let versions = ["1.2.11.dfsg-1", "1.2.11-r0", "2:3.0.1-5", "1.0"];
		for v in versions {
			assert_eq!(version_distance(v, v), 0);
		}
		assert_eq!(
			version_distance("1.2.11.dfsg-1", "1.2.8.dfsg-5"),
			version_distance("1.2.8.dfsg-5", "1.2.11.dfsg-1")
		);
	}

	#[test]
	fn epoch_change_dominates_distance() {
		let d = version_distance("1:1.0-1", "2:1.0-1");
		assert!(d >= 1000);
	}

	#[test]
	fn scenario_2_matching_literals() {
		// spec §8 scenario 2: alien 1.2.11-r0 vs candidate 1.2.11.dfsg-1
		let distance = version_distance("1.2.11-r0", "1.2.11.dfsg-1");
		assert_eq!(distance, 10);
		assert_eq!(version_score(distance), 99);
		assert_eq!(fuzzy_package_score("zlib", "zlib"), 100);
		assert_eq!(overall_score(100, 99), 99.5);
	}
}
