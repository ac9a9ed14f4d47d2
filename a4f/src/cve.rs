// SPDX-License-Identifier: Apache-2.0

//! CVE check: maintains a local mirror of NVD JSON yearly feeds and
//! filters them by CPE 2.3 applicability against a `(vendor, product,
//! version)` triple (spec §4.11).
//!
//! The NVD feed mirror and its 24h staleness check reuse the same
//! `ureq` agent and `util::fs` helpers the Debian matchers use; the
//! advisory file lock guarding the feed directory against concurrent
//! refreshes (spec §5) uses `fs2`, since nothing in the teacher's own
//! stack provides cross-process advisory locking (hipcheck's own cache
//! has no shared-mutable-cache-across-processes concern).

use crate::error::{Error, Result};
use crate::util::fs as ufs;
use crate::util::retry::{default_retryable, with_backoff};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const STALENESS: Duration = Duration::from_secs(24 * 60 * 60);

/// One NVD CVE record, trimmed to the fields the applicability walk
/// needs (spec §4.11; the rest of the NVD schema is not modeled).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CveRecord {
	pub id: String,
	pub configurations: Configurations,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Configurations {
	#[serde(default)]
	pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
	#[serde(default)]
	pub operator: String,
	#[serde(default)]
	pub cpe_match: Vec<CpeMatch>,
	#[serde(default)]
	pub children: Vec<Node>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpeMatch {
	pub vulnerable: bool,
	pub criteria: String,
	#[serde(default)]
	pub version_start_including: Option<String>,
	#[serde(default)]
	pub version_start_excluding: Option<String>,
	#[serde(default)]
	pub version_end_including: Option<String>,
	#[serde(default)]
	pub version_end_excluding: Option<String>,
}

/// A parsed CPE 2.3 URI's `(vendor, product, version)` fields, the
/// only three components the applicability check compares (spec
/// §4.11). Full CPE 2.3 has more components (`update`, `edition`,
/// `language`, …); they are not named by spec.md and are ignored.
struct Cpe23 {
	vendor: String,
	product: String,
	version: String,
}

fn parse_cpe23(criteria: &str) -> Option<Cpe23> {
	// cpe:2.3:a:<vendor>:<product>:<version>:...
	let parts: Vec<&str> = criteria.split(':').collect();
	if parts.len() < 6 || parts[0] != "cpe" || parts[1] != "2.3" {
		return None;
	}
	Some(Cpe23 {
		vendor: parts[3].to_owned(),
		product: parts[4].to_owned(),
		version: parts[5].to_owned(),
	})
}

/// Compares two dotted version strings segment by segment, numeric
/// comparison within a segment, string comparison as a fallback
/// (distinct from `calc::DebianVersion`, which models Debian packaging
/// revisions specifically; CPE product versions are not Debian
/// versions). Per Design Note §9's "explicit parser, not a regex
/// shortcut" guidance applied to version comparison generally.
fn compare_versions(a: &str, b: &str) -> Ordering {
	use itertools::EitherOrBoth;
	use itertools::Itertools;

	for pair in a.split('.').zip_longest(b.split('.')) {
		let (ca, cb) = match pair {
			EitherOrBoth::Both(ca, cb) => (ca, cb),
			// A shorter segment list compares as if padded with "0", so
			// "1.0" == "1.0.0".
			EitherOrBoth::Left(ca) => (ca, "0"),
			EitherOrBoth::Right(cb) => ("0", cb),
		};
		let ordering = match (ca.parse::<u64>(), cb.parse::<u64>()) {
			(Ok(na), Ok(nb)) => na.cmp(&nb),
			_ => ca.cmp(cb),
		};
		if ordering != Ordering::Equal {
			return ordering;
		}
	}
	Ordering::Equal
}

/// Whether `version` is `*` ("any", always matches) or `-` ("not
/// applicable", never matches) per CPE 2.3 wildcard semantics (spec
/// §4.11).
fn cpe_version_matches(cpe_version: &str, version: &str) -> Option<bool> {
	match cpe_version {
		"*" => Some(true),
		"-" => Some(false),
		v if v.contains('?') => None,
		v => Some(compare_versions(v, version) == Ordering::Equal),
	}
}

/// The result of evaluating one `CpeMatch` entry against a triple.
enum MatchOutcome {
	Applies,
	DoesNotApply,
	Unsupported,
}

fn evaluate_cpe_match(entry: &CpeMatch, vendor: &str, product: &str, version: &str) -> MatchOutcome {
	let Some(cpe) = parse_cpe23(&entry.criteria) else {
		return MatchOutcome::Unsupported;
	};
	if !cpe.vendor.eq_ignore_ascii_case(vendor) || !cpe.product.eq_ignore_ascii_case(product) {
		return MatchOutcome::DoesNotApply;
	}

	let has_range = entry.version_start_including.is_some()
		|| entry.version_start_excluding.is_some()
		|| entry.version_end_including.is_some()
		|| entry.version_end_excluding.is_some();

	if !has_range {
		return match cpe_version_matches(&cpe.version, version) {
			Some(true) => MatchOutcome::Applies,
			Some(false) => MatchOutcome::DoesNotApply,
			None => MatchOutcome::Unsupported,
		};
	}

	let checks: [(Option<&String>, fn(Ordering) -> bool); 4] = [
		(entry.version_start_including.as_ref(), |o| o != Ordering::Less),
		(entry.version_start_excluding.as_ref(), |o| o == Ordering::Greater),
		(entry.version_end_including.as_ref(), |o| o != Ordering::Greater),
		(entry.version_end_excluding.as_ref(), |o| o == Ordering::Less),
	];

	for (bound, accept) in checks {
		if let Some(bound) = bound {
			if bound.contains('?') {
				return MatchOutcome::Unsupported;
			}
			if !accept(compare_versions(version, bound)) {
				return MatchOutcome::DoesNotApply;
			}
		}
	}
	MatchOutcome::Applies
}

/// Evaluates one node. `OR` (the default/explicit operator) applies if
/// any `cpe_match` entry applies. `AND` or any node with `children` is
/// unsupported (spec §4.11: "ignore nodes with AND operator or child
/// nodes").
fn evaluate_node(node: &Node, vendor: &str, product: &str, version: &str) -> MatchOutcome {
	if !node.children.is_empty() || node.operator.eq_ignore_ascii_case("AND") {
		return MatchOutcome::Unsupported;
	}

	let mut any_unsupported = false;
	for entry in &node.cpe_match {
		match evaluate_cpe_match(entry, vendor, product, version) {
			MatchOutcome::Applies => return MatchOutcome::Applies,
			MatchOutcome::Unsupported => any_unsupported = true,
			MatchOutcome::DoesNotApply => {}
		}
	}
	if any_unsupported {
		MatchOutcome::Unsupported
	} else {
		MatchOutcome::DoesNotApply
	}
}

/// Which bucket a CVE record belongs in for a given triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
	Identified,
	Review,
	NotApplicable,
}

/// Classifies one CVE record against `(vendor, product, version)`
/// (spec §4.11).
pub fn classify(record: &CveRecord, vendor: &str, product: &str, version: &str) -> Bucket {
	let mut any_applies = false;
	let mut any_unsupported = false;
	for node in &record.configurations.nodes {
		match evaluate_node(node, vendor, product, version) {
			MatchOutcome::Applies => any_applies = true,
			MatchOutcome::Unsupported => any_unsupported = true,
			MatchOutcome::DoesNotApply => {}
		}
	}
	if any_applies {
		Bucket::Identified
	} else if any_unsupported {
		Bucket::Review
	} else {
		Bucket::NotApplicable
	}
}

/// The CVE check output document: two top-level buckets (spec §4.11).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CveCheckReport {
	pub identified: Vec<String>,
	pub review: Vec<String>,
}

/// Filters a set of CVE records against one triple, producing the
/// `identified[]`/`review[]` buckets.
pub fn filter(records: &[CveRecord], vendor: &str, product: &str, version: &str) -> CveCheckReport {
	let mut report = CveCheckReport::default();
	for record in records {
		match classify(record, vendor, product, version) {
			Bucket::Identified => report.identified.push(record.id.clone()),
			Bucket::Review => report.review.push(record.id.clone()),
			Bucket::NotApplicable => {}
		}
	}
	report
}

fn feed_path(feed_dir: &Path, year: u32) -> PathBuf {
	feed_dir.join(format!("nvdcve-2.0-{year}.json"))
}

fn is_stale(path: &Path) -> bool {
	let Ok(meta) = std::fs::metadata(path) else {
		return true;
	};
	let Ok(modified) = meta.modified() else {
		return true;
	};
	SystemTime::now().duration_since(modified).unwrap_or(STALENESS) >= STALENESS
}

/// Refreshes the local mirror of one year's NVD JSON feed if the local
/// copy is missing or older than 24h, under an advisory lock on the
/// feed directory so concurrent processes don't race the same download
/// (spec §5). The feed URL pattern is NVD's published per-year JSON
/// feed endpoint.
pub fn refresh_feed(agent: &ureq::Agent, feed_dir: &Path, year: u32) -> Result<PathBuf> {
	ufs::create_dir_all(feed_dir)?;
	let lock_path = feed_dir.join(".lock");
	let lock_file = File::create(&lock_path).map_err(|e| Error::Io {
		path: lock_path.clone(),
		source: e,
	})?;
	lock_file.lock_exclusive().map_err(|e| Error::Io {
		path: lock_path,
		source: e,
	})?;

	let path = feed_path(feed_dir, year);
	if !is_stale(&path) {
		lock_file.unlock().ok();
		return Ok(path);
	}

	let url = format!("https://nvd.nist.gov/feeds/json/cve/2.0/nvdcve-2.0-{year}.json.gz");
	let body = with_backoff(3, Duration::from_secs(1), default_retryable, || {
		let resp = agent.get(&url).call()?;
		let mut bytes = Vec::new();
		resp.into_reader()
			.read_to_end(&mut bytes)
			.map_err(|e| Error::Io {
				path: path.clone(),
				source: e,
			})?;
		Ok(bytes)
	});

	lock_file.unlock().ok();
	ufs::write_bytes(&path, &body?)?;
	Ok(path)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn intel_node(version_start_including: &str, version_end_excluding: &str) -> Node {
		Node {
			operator: "OR".into(),
			cpe_match: vec![CpeMatch {
				vulnerable: true,
				criteria: "cpe:2.3:a:intel:sgx_dcap:*:*:*:*:*:*:*:*".into(),
				version_start_including: Some(version_start_including.into()),
				version_start_excluding: None,
				version_end_including: None,
				version_end_excluding: Some(version_end_excluding.into()),
			}],
			children: vec![],
		}
	}

	#[test]
	fn scenario_6_in_range_is_identified() {
		// spec §8 scenario 6.
		let record = CveRecord {
			id: "CVE-2026-0001".into(),
			configurations: Configurations {
				nodes: vec![intel_node("1.10.0.0", "1.11.0.0")],
			},
		};
		let bucket = classify(&record, "intel", "sgx_dcap", "1.10.100.4");
		assert_eq!(bucket, Bucket::Identified);
	}

	#[test]
	fn scenario_6_nested_children_is_review() {
		let record = CveRecord {
			id: "CVE-2026-0002".into(),
			configurations: Configurations {
				nodes: vec![Node {
					operator: "AND".into(),
					cpe_match: vec![],
					children: vec![intel_node("1.10.0.0", "1.11.0.0")],
				}],
			},
		};
		let bucket = classify(&record, "intel", "sgx_dcap", "1.10.100.4");
		assert_eq!(bucket, Bucket::Review);
	}

	#[test]
	fn only_version_end_excluding_matches_strictly_below() {
		let node = Node {
			operator: "OR".into(),
			cpe_match: vec![CpeMatch {
				vulnerable: true,
				criteria: "cpe:2.3:a:vendor:product:*:*:*:*:*:*:*:*".into(),
				version_start_including: None,
				version_start_excluding: None,
				version_end_including: None,
				version_end_excluding: Some("2.0".into()),
			}],
			children: vec![],
		};
		let record = CveRecord {
			id: "CVE-2026-0003".into(),
			configurations: Configurations { nodes: vec![node] },
		};
		assert_eq!(classify(&record, "vendor", "product", "1.9"), Bucket::Identified);
		assert_eq!(classify(&record, "vendor", "product", "2.0"), Bucket::NotApplicable);
		assert_eq!(classify(&record, "vendor", "product", "3.0"), Bucket::NotApplicable);
	}

	#[test]
	fn question_mark_wildcard_is_unsupported() {
		let node = Node {
			operator: "OR".into(),
			cpe_match: vec![CpeMatch {
				vulnerable: true,
				criteria: "cpe:2.3:a:vendor:product:1.?.0:*:*:*:*:*:*:*".into(),
				version_start_including: None,
				version_start_excluding: None,
				version_end_including: None,
				version_end_excluding: None,
			}],
			children: vec![],
		};
		let record = CveRecord {
			id: "CVE-2026-0004".into(),
			configurations: Configurations { nodes: vec![node] },
		};
		assert_eq!(classify(&record, "vendor", "product", "1.5.0"), Bucket::Review);
	}

	#[test]
	fn compare_versions_orders_numeric_segments() {
		assert_eq!(compare_versions("1.10.0.0", "1.9.0.0"), Ordering::Greater);
		assert_eq!(compare_versions("1.10.100.4", "1.11.0.0"), Ordering::Less);
		assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
		assert_eq!(compare_versions("1.0", "1.0.1"), Ordering::Less);
	}

	#[test]
	fn filter_buckets_multiple_records() {
		let identified = CveRecord {
			id: "CVE-IN".into(),
			configurations: Configurations {
				nodes: vec![intel_node("1.10.0.0", "1.11.0.0")],
			},
		};
		let review = CveRecord {
			id: "CVE-REVIEW".into(),
			configurations: Configurations {
				nodes: vec![Node {
					operator: "AND".into(),
					cpe_match: vec![],
					children: vec![intel_node("1.10.0.0", "1.11.0.0")],
				}],
			},
		};
		let report = filter(&[identified, review], "intel", "sgx_dcap", "1.10.100.4");
		assert_eq!(report.identified, vec!["CVE-IN"]);
		assert_eq!(report.review, vec!["CVE-REVIEW"]);
	}
}
