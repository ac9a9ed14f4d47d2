// SPDX-License-Identifier: Apache-2.0

//! The error taxonomy used throughout `a4f`.
//!
//! Every fallible operation in the pipeline returns one of these
//! variants. The CLI layer (`main.rs`) maps each variant onto the exit
//! codes described in the external interface: configuration errors
//! exit 2, lock conflicts exit 3, service-unavailable conditions exit
//! 4, everything else recoverable at package scope exits 1 (or 0, if
//! the only errors were recorded into a per-package `errors[]` list).

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

/// An enumeration of errors that can occur while running `a4f`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	/// Missing or invalid environment/config; fatal, exit 2.
	#[error("configuration error: {0}")]
	Config(String),

	/// Session lock key mismatch; fatal for the command, exit 3.
	#[error("session '{session}' is locked")]
	LockConflict { session: String },

	/// No candidate was found for a lookup (Debian match, pool artifact, …).
	#[error("not found: {0}")]
	NotFound(String),

	/// `.aliensrc` manifest schema violation, checksum mismatch, or
	/// unparseable `debian/copyright`.
	#[error("corrupt input: {0}")]
	CorruptInput(String),

	/// A duplicate package was staged without `--force`.
	#[error("package already exists in pool: {0}")]
	DuplicatePackage(String),

	/// The alien package has no file eligible to be its main internal
	/// archive (spec §4.3's selection rule found nothing).
	#[error("package '{0}' has no main internal archive")]
	NoInternalArchive(String),

	/// A downloaded artifact's sha1 does not match the index's claim.
	#[error("corrupt download at {url}: expected sha1 {expected}, got {actual}")]
	CorruptDownload {
		url: String,
		expected: String,
		actual: String,
	},

	/// An I/O retry budget was exhausted while talking to a remote service.
	#[error("network error talking to {service}: {source}")]
	Network {
		service: String,
		#[source]
		source: Box<Error>,
	},

	/// A remote service is unavailable (non-2xx, non-retryable 4xx, etc).
	#[error("service unavailable: {0}")]
	ServiceUnavailable(String),

	/// A subprocess (scanner, SPDX converter) exited non-zero.
	#[error("subprocess '{command}' failed with status {status:?}")]
	SubprocessFailure {
		command: String,
		status: Option<i32>,
	},

	/// A cached pool artifact did not match its prerequisite identity.
	#[error("integrity violation at {path}: {reason}")]
	IntegrityViolation { path: PathBuf, reason: String },

	#[error("I/O error at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("TOML error: {0}")]
	Toml(#[from] toml::de::Error),

	#[error("HTTP error: {0}")]
	Http(#[from] Box<ureq::Error>),

	#[error("SQL error: {0}")]
	Sql(#[from] rusqlite::Error),

	#[error("{0}")]
	Other(String),
}

impl Error {
	pub fn config<S: Into<String>>(msg: S) -> Self {
		Error::Config(msg.into())
	}

	pub fn not_found<S: Into<String>>(msg: S) -> Self {
		Error::NotFound(msg.into())
	}

	pub fn corrupt<S: Into<String>>(msg: S) -> Self {
		Error::CorruptInput(msg.into())
	}

	pub fn other<S: Into<String>>(msg: S) -> Self {
		Error::Other(msg.into())
	}

	/// Whether this error is fatal at the command level (vs recorded
	/// per-package and skipped, per the propagation rule).
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			Error::Config(_) | Error::LockConflict { .. } | Error::IntegrityViolation { .. }
		)
	}

	/// The process exit code this error maps to, per the external
	/// interface's closed set of exit codes.
	pub fn exit_code(&self) -> i32 {
		match self {
			Error::Config(_) => 2,
			Error::LockConflict { .. } => 3,
			Error::ServiceUnavailable(_) => 4,
			_ => 1,
		}
	}
}

impl From<ureq::Error> for Error {
	fn from(e: ureq::Error) -> Self {
		Error::Http(Box::new(e))
	}
}

/// Attach a path to an I/O error; used at every filesystem boundary so
/// error messages always say which file failed.
pub trait IoContext<T> {
	fn path_context<P: Into<PathBuf>>(self, path: P) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
	fn path_context<P: Into<PathBuf>>(self, path: P) -> Result<T> {
		self.map_err(|source| Error::Io {
			path: path.into(),
			source,
		})
	}
}
