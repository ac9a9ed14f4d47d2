// SPDX-License-Identifier: Apache-2.0

//! The shared per-package driver every command (`match`, `snapmatch`,
//! `delta`, `spdxdebian`, `spdxalien`, `upload`, `fossy`, `harvest`,
//! `cvecheck`, `mirror`) runs its `run(package)` step through, so the
//! catch-record-continue propagation rule lives in one place (spec §7).
//!
//! A non-fatal error is recorded into the session report and the
//! command moves on to the next package. A fatal error (`Config`,
//! `LockConflict`, or `IntegrityViolation` when the caller has not
//! passed `--ignore-cache`) aborts the whole command immediately — no
//! error is ever silently dropped either way.

use crate::error::Error;
use crate::identity::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded failure: which package, which step, when, and why.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
	pub identity: Identity,
	pub step: String,
	pub time: DateTime<Utc>,
	pub message: String,
}

/// Whether `error` should abort the whole command (`Fatal`) or be
/// recorded against the package and skipped (`Recoverable`).
fn classify(error: &Error, ignore_cache: bool) -> bool {
	match error {
		Error::Config(_) | Error::LockConflict { .. } => true,
		Error::IntegrityViolation { .. } => !ignore_cache,
		_ => false,
	}
}

/// Runs `step` once per package in `packages`, collecting a
/// [`StepError`] for every recoverable failure and returning early with
/// `Err` the moment a fatal one occurs (spec §7's propagation rule).
///
/// `step_name` labels the recorded errors; it is not derived from
/// `step` itself since closures do not carry a useful `Debug` name.
pub fn for_each_package<'a, F>(
	packages: &'a [Identity],
	step_name: &str,
	ignore_cache: bool,
	mut step: F,
) -> Result<Vec<StepError>, Error>
where
	F: FnMut(&'a Identity) -> Result<(), Error>,
{
	let mut errors = Vec::new();
	for identity in packages {
		if let Err(error) = step(identity) {
			if classify(&error, ignore_cache) {
				return Err(error);
			}
			errors.push(StepError {
				identity: identity.clone(),
				step: step_name.to_owned(),
				time: Utc::now(),
				message: error.to_string(),
			});
		}
	}
	Ok(errors)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn identity(name: &str) -> Identity {
		Identity::new(name, "1.0")
	}

	#[test]
	fn recoverable_errors_are_recorded_and_iteration_continues() {
		let packages = vec![identity("a"), identity("b"), identity("c")];
		let mut seen = Vec::new();
		let errors = for_each_package(&packages, "scan", false, |id| {
			seen.push(id.name.clone());
			if id.name == "b" {
				Err(Error::not_found("no candidate"))
			} else {
				Ok(())
			}
		})
		.unwrap();

		assert_eq!(seen, vec!["a", "b", "c"]);
		assert_eq!(errors.len(), 1);
		assert_eq!(errors[0].identity.name, "b");
		assert_eq!(errors[0].step, "scan");
	}

	#[test]
	fn config_error_aborts_immediately() {
		let packages = vec![identity("a"), identity("b")];
		let mut seen = Vec::new();
		let result = for_each_package(&packages, "scan", false, |id| {
			seen.push(id.name.clone());
			Err(Error::config("missing A4F_POOL"))
		});

		assert!(result.is_err());
		assert_eq!(seen, vec!["a"]);
	}

	#[test]
	fn integrity_violation_is_fatal_unless_ignore_cache() {
		let packages = vec![identity("a")];
		let err = || Error::IntegrityViolation {
			path: "foo".into(),
			reason: "hash mismatch".into(),
		};

		let fatal = for_each_package(&packages, "spdxalien", false, |_| Err(err()));
		assert!(fatal.is_err());

		let recovered = for_each_package(&packages, "spdxalien", true, |_| Err(err())).unwrap();
		assert_eq!(recovered.len(), 1);
	}

	#[test]
	fn no_errors_yields_empty_list() {
		let packages = vec![identity("a")];
		let errors = for_each_package(&packages, "scan", false, |_| Ok(())).unwrap();
		assert!(errors.is_empty());
	}
}
