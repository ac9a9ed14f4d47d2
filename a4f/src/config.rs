// SPDX-License-Identifier: Apache-2.0

//! Read-only configuration context threaded explicitly through command
//! execution (Design Note: "Global configuration (`Settings`) becomes
//! an explicit, read-only context object... no process-wide
//! singleton"). Assembled once at startup from environment variables,
//! with CLI flags taking precedence where the CLI surface allows an
//! override.

use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Whether the file-level scanner should be invoked as a native
/// binary or through a wrapper script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScancodeMode {
	Native,
	Wrapper,
}

/// Fossology clearing-server credentials, grouped so they can be
/// threaded together or omitted together.
#[derive(Debug, Clone)]
pub struct FossyCreds {
	pub user: String,
	pub password: String,
	pub group_id: Option<String>,
	pub server: url::Url,
}

/// Assembled, immutable configuration for a single `a4f` invocation.
#[derive(Debug, Clone)]
pub struct Settings {
	/// `A4F_POOL`, required.
	pub pool_dir: PathBuf,
	/// `A4F_CACHE`, default true.
	pub cache: bool,
	/// `A4F_LOGLEVEL`, default INFO.
	pub log_level: String,
	/// `A4F_SCANCODE`.
	pub scancode_mode: ScancodeMode,
	/// `A4F_PRINTRESULT`.
	pub print_result: bool,
	/// `SPDX_TOOLS_CMD`.
	pub spdx_tools_cmd: Option<String>,
	/// `SPDX_DISCLAIMER`.
	pub spdx_disclaimer: Option<String>,
	/// `PACKAGE_ID_EXT`.
	pub package_id_ext: Option<String>,
	/// `FOSSY_*`.
	pub fossy: Option<FossyCreds>,
	/// `A4F_LOCK_KEY`, the session lock key presented by default.
	pub lock_key: Option<String>,
	/// `MIRROR_DB_*`, joined into a single connection description.
	pub mirror_db: Option<MirrorDbConfig>,

	/// `-i` / `--ignore-cache`, scoped to the current command.
	pub ignore_cache: bool,
	/// `-v` / `-q`.
	pub verbose: bool,
	pub quiet: bool,
	/// `--dryrun`.
	pub dry_run: bool,
	/// `--session`.
	pub session_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MirrorDbConfig {
	pub host: String,
	pub port: u16,
	pub dbname: String,
	pub user: String,
	pub password: String,
}

/// Timeout applied to every external blocking point (HTTP downloads,
/// clearing-server calls, SQL writes), per the concurrency model.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Retry budget for retryable errors at those same blocking points.
pub const DEFAULT_RETRIES: u32 = 3;

impl Settings {
	/// Load settings from the environment, then apply CLI overrides.
	pub fn load(overrides: CliOverrides) -> Result<Settings> {
		let pool_dir = env_path("A4F_POOL")?
			.or(overrides.pool_dir)
			.ok_or_else(|| Error::config("A4F_POOL must be set (or --pool passed)"))?;

		let cache = env_bool("A4F_CACHE", true)?;
		let log_level = env::var("A4F_LOGLEVEL").unwrap_or_else(|_| "INFO".to_owned());

		let scancode_mode = match env::var("A4F_SCANCODE").as_deref() {
			Ok("wrapper") => ScancodeMode::Wrapper,
			_ => ScancodeMode::Native,
		};

		let print_result = env_bool("A4F_PRINTRESULT", false)?;

		let fossy = match (
			env::var("FOSSY_USER"),
			env::var("FOSSY_PASSWORD"),
			env::var("FOSSY_SERVER"),
		) {
			(Ok(user), Ok(password), Ok(server)) => Some(FossyCreds {
				user,
				password,
				group_id: env::var("FOSSY_GROUP_ID").ok(),
				server: url::Url::parse(&server)
					.map_err(|e| Error::config(format!("invalid FOSSY_SERVER: {e}")))?,
			}),
			_ => None,
		};

		let mirror_db = match (
			env::var("MIRROR_DB_HOST"),
			env::var("MIRROR_DB_DBNAME"),
			env::var("MIRROR_DB_USER"),
		) {
			(Ok(host), Ok(dbname), Ok(user)) => Some(MirrorDbConfig {
				host,
				port: env::var("MIRROR_DB_PORT")
					.ok()
					.and_then(|p| p.parse().ok())
					.unwrap_or(5432),
				dbname,
				user,
				password: env::var("MIRROR_DB_PASSWORD").unwrap_or_default(),
			}),
			_ => None,
		};

		Ok(Settings {
			pool_dir,
			cache,
			log_level,
			scancode_mode,
			print_result,
			spdx_tools_cmd: env::var("SPDX_TOOLS_CMD").ok(),
			spdx_disclaimer: env::var("SPDX_DISCLAIMER").ok(),
			package_id_ext: env::var("PACKAGE_ID_EXT").ok(),
			fossy,
			lock_key: env::var("A4F_LOCK_KEY").ok().or(overrides.lock_key),
			mirror_db,
			ignore_cache: overrides.ignore_cache,
			verbose: overrides.verbose,
			quiet: overrides.quiet,
			dry_run: overrides.dry_run,
			session_id: overrides.session_id,
		})
	}

	/// Whether the Pool's cache-hit short-circuit applies to the
	/// current command (global flag AND NOT the per-command override).
	pub fn cache_effective(&self) -> bool {
		self.cache && !self.ignore_cache
	}
}

/// The subset of settings the CLI layer can override per invocation.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
	pub pool_dir: Option<PathBuf>,
	pub ignore_cache: bool,
	pub verbose: bool,
	pub quiet: bool,
	pub dry_run: bool,
	pub session_id: Option<String>,
	pub lock_key: Option<String>,
}

fn env_path(name: &str) -> Result<Option<PathBuf>> {
	match env::var(name) {
		Ok(value) => Ok(Some(PathBuf::from(value))),
		Err(env::VarError::NotPresent) => Ok(None),
		Err(env::VarError::NotUnicode(_)) => {
			Err(Error::config(format!("{name} is not valid UTF-8")))
		}
	}
}

fn env_bool(name: &str, default: bool) -> Result<bool> {
	match env::var(name) {
		Ok(value) => match value.to_lowercase().as_str() {
			"1" | "true" | "yes" | "on" => Ok(true),
			"0" | "false" | "no" | "off" => Ok(false),
			other => Err(Error::config(format!("{name}={other} is not a boolean"))),
		},
		Err(_) => Ok(default),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex;

	// Environment variable mutation is process-global, so tests that
	// touch it are serialized through this mutex.
	static ENV_LOCK: Mutex<()> = Mutex::new(());

	#[test]
	fn missing_pool_dir_is_a_config_error() {
		let _guard = ENV_LOCK.lock().unwrap();
		env::remove_var("A4F_POOL");
		let err = Settings::load(CliOverrides::default()).unwrap_err();
		assert_eq!(err.exit_code(), 2);
	}

	#[test]
	fn pool_dir_from_cli_override_wins_without_env() {
		let _guard = ENV_LOCK.lock().unwrap();
		env::remove_var("A4F_POOL");
		let settings = Settings::load(CliOverrides {
			pool_dir: Some(PathBuf::from("/tmp/pool")),
			..Default::default()
		})
		.unwrap();
		assert_eq!(settings.pool_dir, PathBuf::from("/tmp/pool"));
	}

	#[test]
	fn ignore_cache_flag_disables_cache_effective() {
		let _guard = ENV_LOCK.lock().unwrap();
		env::remove_var("A4F_POOL");
		env::remove_var("A4F_CACHE");
		let settings = Settings::load(CliOverrides {
			pool_dir: Some(PathBuf::from("/tmp/pool")),
			ignore_cache: true,
			..Default::default()
		})
		.unwrap();
		assert!(settings.cache);
		assert!(!settings.cache_effective());
	}
}
