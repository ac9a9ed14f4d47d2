// SPDX-License-Identifier: Apache-2.0

//! A single bounded-exponential-backoff-with-jitter retry helper,
//! shared by the Debian matchers, the clearing-server client, and
//! Mirror's SQL writes — the three external blocking points the
//! concurrency model (spec §5) requires an explicit timeout and
//! bounded retry policy for. Subprocesses are excluded by convention:
//! call sites simply don't route subprocess invocations through this
//! helper.

use crate::error::{Error, Result};
use rand::Rng;
use std::thread::sleep;
use std::time::Duration;

/// Retry `f` up to `max_attempts` times total, with exponential
/// backoff from `base` and up to 20% jitter, stopping early if `f`
/// returns an error for which `is_retryable` returns `false`.
pub fn with_backoff<T>(
	max_attempts: u32,
	base: Duration,
	mut is_retryable: impl FnMut(&Error) -> bool,
	mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
	let mut attempt = 0;
	loop {
		match f() {
			Ok(value) => return Ok(value),
			Err(err) if attempt + 1 < max_attempts && is_retryable(&err) => {
				let backoff = base.saturating_mul(1 << attempt);
				let jitter_frac: f64 = rand::rng().random_range(0.0..0.2);
				let jitter = backoff.mul_f64(jitter_frac);
				sleep(backoff + jitter);
				attempt += 1;
			}
			Err(err) => return Err(err),
		}
	}
}

/// The default retryable predicate: network errors and service
/// unavailability retry, everything else (config, corrupt input, lock
/// conflicts, subprocess failures) does not.
pub fn default_retryable(err: &Error) -> bool {
	matches!(err, Error::Network { .. } | Error::Http(_) | Error::ServiceUnavailable(_))
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::Cell;

	#[test]
	fn succeeds_after_transient_failures() {
		let attempts = Cell::new(0);
		let result = with_backoff(
			3,
			Duration::from_millis(1),
			default_retryable,
			|| {
				let n = attempts.get();
				attempts.set(n + 1);
				if n < 2 {
					Err(Error::ServiceUnavailable("flaky".into()))
				} else {
					Ok(42)
				}
			},
		);
		assert_eq!(result.unwrap(), 42);
		assert_eq!(attempts.get(), 3);
	}

	#[test]
	fn exhausts_budget_and_returns_last_error() {
		let attempts = Cell::new(0);
		let result: Result<()> = with_backoff(3, Duration::from_millis(1), default_retryable, || {
			attempts.set(attempts.get() + 1);
			Err(Error::ServiceUnavailable("down".into()))
		});
		assert!(result.is_err());
		assert_eq!(attempts.get(), 3);
	}

	#[test]
	fn non_retryable_error_stops_immediately() {
		let attempts = Cell::new(0);
		let result: Result<()> = with_backoff(5, Duration::from_millis(1), default_retryable, || {
			attempts.set(attempts.get() + 1);
			Err(Error::config("bad env"))
		});
		assert!(result.is_err());
		assert_eq!(attempts.get(), 1);
	}
}
