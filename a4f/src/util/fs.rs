// SPDX-License-Identifier: Apache-2.0

//! Small filesystem helpers shared by every module that touches the
//! Pool or reads configuration files.

use crate::error::{Error, IoContext, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::ops::Not;
use std::path::{Path, PathBuf};

/// Read a file to a string.
pub fn read_string<P: AsRef<Path>>(path: P) -> Result<String> {
	let path = path.as_ref();
	fs::read_to_string(path).path_context(path)
}

/// Read a file to a byte buffer.
pub fn read_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
	let path = path.as_ref();
	fs::read(path).path_context(path)
}

/// Read a file and deserialize it from TOML.
pub fn read_toml<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
	let path = path.as_ref();
	let contents = read_string(path)?;
	toml::de::from_str(&contents).map_err(Error::Toml)
}

/// Read a file and deserialize it from JSON.
pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T> {
	let path = path.as_ref();
	let contents = read_bytes(path)?;
	serde_json::from_slice(&contents).map_err(Error::Json)
}

/// Serialize a value to pretty JSON and write it to `path`, creating
/// parent directories as needed.
pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<()> {
	let path = path.as_ref();
	if let Some(parent) = path.parent() {
		create_dir_all(parent)?;
	}
	let contents = serde_json::to_vec_pretty(value).map_err(Error::Json)?;
	write_bytes(path, &contents)
}

/// Write bytes to `path`, creating parent directories as needed.
pub fn write_bytes<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
	let path = path.as_ref();
	if let Some(parent) = path.parent() {
		create_dir_all(parent)?;
	}
	fs::write(path, bytes).path_context(path)
}

/// Create a directory and all missing parents.
pub fn create_dir_all<P: AsRef<Path>>(path: P) -> Result<()> {
	let path = path.as_ref();
	fs::create_dir_all(path).path_context(path)
}

/// Check that a given path exists.
pub fn exists<P: AsRef<Path>>(path: P) -> Result<()> {
	let path = path.as_ref();
	if path.exists().not() {
		Err(Error::not_found(format!("'{}' not found", path.display())))
	} else {
		Ok(())
	}
}

/// Returns `true` if the file at `path` exists and is non-empty, the
/// condition the Pool's cache policy gates reads and writes on.
pub fn exists_non_empty<P: AsRef<Path>>(path: P) -> bool {
	let path = path.as_ref();
	match fs::metadata(path) {
		Ok(meta) => meta.is_file() && meta.len() > 0,
		Err(_) => false,
	}
}

/// Find the first file with a given name, searching recursively.
pub fn find_file_by_name<P: AsRef<Path>>(dir: P, file_name: &str) -> Result<PathBuf> {
	fn inner(dir: &Path, file_name: &str) -> Result<PathBuf> {
		if dir.is_dir() {
			for entry in fs::read_dir(dir).path_context(dir)? {
				let entry = entry.path_context(dir)?;
				let path = entry.path();
				if path.is_dir() {
					if let Ok(found) = inner(&path, file_name) {
						return Ok(found);
					}
				} else if path.file_name().is_some_and(|name| name == file_name) {
					return Ok(path);
				}
			}
		}
		Err(Error::not_found(format!(
			"could not find {} inside {}",
			file_name,
			dir.display()
		)))
	}

	inner(dir.as_ref(), file_name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	#[test]
	fn write_then_read_json_roundtrips() {
		let dir = tempdir().unwrap();
		let path = dir.path().join("a/b/c.json");
		write_json(&path, &vec![1, 2, 3]).unwrap();
		let back: Vec<i32> = read_json(&path).unwrap();
		assert_eq!(back, vec![1, 2, 3]);
	}

	#[test]
	fn exists_non_empty_false_for_missing_and_empty() {
		let dir = tempdir().unwrap();
		let missing = dir.path().join("nope");
		assert!(!exists_non_empty(&missing));

		let empty = dir.path().join("empty");
		fs::write(&empty, []).unwrap();
		assert!(!exists_non_empty(&empty));

		let full = dir.path().join("full");
		fs::write(&full, b"x").unwrap();
		assert!(exists_non_empty(&full));
	}

	#[test]
	fn find_file_by_name_recurses() {
		let dir = tempdir().unwrap();
		let nested = dir.path().join("a/b");
		create_dir_all(&nested).unwrap();
		fs::write(nested.join("target.txt"), b"hi").unwrap();
		let found = find_file_by_name(dir.path(), "target.txt").unwrap();
		assert_eq!(found, nested.join("target.txt"));
	}
}
