// SPDX-License-Identifier: Apache-2.0

//! Mirror: projects every `.tinfoilhat.json` referenced by a session
//! into a SQL table `(session, fname, data)`, transactionally per
//! session (spec §4.12).
//!
//! `rusqlite` stands in for the Postgres-family store the
//! `MIRROR_DB_*` environment variables describe in the external
//! interface: it is the smallest real SQL engine that lets the
//! transactional FULL/DELTA contract be implemented and exercised in
//! this crate's own test suite without a network database dependency.
//! `serde_json::Value` is stored as `TEXT` since SQLite has no native
//! `jsonb`.

use crate::error::{Error, Result};
use rusqlite::{params, Connection};

/// Which projection strategy to run (spec §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	/// Delete all rows for the session, then insert every row fresh.
	Full,
	/// Insert only rows whose `(session, fname)` is not already present.
	Delta,
}

/// One row to project: a session-relative file name and its decoded
/// `.tinfoilhat.json` content.
pub struct MirrorEntry<'a> {
	pub fname: &'a str,
	pub data: &'a serde_json::Value,
}

/// Creates the `tinfoilhat` table if it does not already exist.
pub fn init_schema(conn: &Connection) -> Result<()> {
	conn.execute_batch(
		"CREATE TABLE IF NOT EXISTS tinfoilhat (
			session TEXT NOT NULL,
			fname TEXT NOT NULL,
			data TEXT NOT NULL,
			PRIMARY KEY (session, fname)
		)",
	)
	.map_err(Error::Sql)
}

/// Projects `entries` for `session` into the table, per `mode` (spec
/// §4.12). The whole operation is one transaction: a row failing to
/// insert rolls back the entire session's projection rather than
/// leaving a partial set.
pub fn project(conn: &mut Connection, session: &str, entries: &[MirrorEntry], mode: Mode) -> Result<usize> {
	let tx = conn.transaction().map_err(Error::Sql)?;

	if mode == Mode::Full {
		tx.execute("DELETE FROM tinfoilhat WHERE session = ?1", params![session])
			.map_err(Error::Sql)?;
	}

	let mut inserted = 0;
	for entry in entries {
		let data_text = serde_json::to_string(entry.data).map_err(Error::Json)?;
		let rows = match mode {
			Mode::Full => tx
				.execute(
					"INSERT INTO tinfoilhat (session, fname, data) VALUES (?1, ?2, ?3)",
					params![session, entry.fname, data_text],
				)
				.map_err(Error::Sql)?,
			Mode::Delta => tx
				.execute(
					"INSERT OR IGNORE INTO tinfoilhat (session, fname, data) VALUES (?1, ?2, ?3)",
					params![session, entry.fname, data_text],
				)
				.map_err(Error::Sql)?,
		};
		inserted += rows;
	}

	tx.commit().map_err(Error::Sql)?;
	Ok(inserted)
}

/// Reads back every row currently projected for `session`, sorted by
/// `fname` (used by tests and by `--dryrun` inspection).
pub fn rows_for_session(conn: &Connection, session: &str) -> Result<Vec<(String, serde_json::Value)>> {
	let mut stmt = conn
		.prepare("SELECT fname, data FROM tinfoilhat WHERE session = ?1 ORDER BY fname")
		.map_err(Error::Sql)?;
	let rows = stmt
		.query_map(params![session], |row| {
			let fname: String = row.get(0)?;
			let data_text: String = row.get(1)?;
			Ok((fname, data_text))
		})
		.map_err(Error::Sql)?;

	let mut out = Vec::new();
	for row in rows {
		let (fname, data_text) = row.map_err(Error::Sql)?;
		let data: serde_json::Value = serde_json::from_str(&data_text).map_err(Error::Json)?;
		out.push((fname, data));
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn memory_conn() -> Connection {
		let conn = Connection::open_in_memory().unwrap();
		init_schema(&conn).unwrap();
		conn
	}

	#[test]
	fn full_mode_replaces_prior_rows() {
		let mut conn = memory_conn();
		let data = serde_json::json!({"k": 1});
		project(
			&mut conn,
			"s1",
			&[MirrorEntry { fname: "a.tinfoilhat.json", data: &data }],
			Mode::Full,
		)
		.unwrap();

		let other_data = serde_json::json!({"k": 2});
		project(
			&mut conn,
			"s1",
			&[MirrorEntry { fname: "b.tinfoilhat.json", data: &other_data }],
			Mode::Full,
		)
		.unwrap();

		let rows = rows_for_session(&conn, "s1").unwrap();
		assert_eq!(rows.len(), 1);
		assert_eq!(rows[0].0, "b.tinfoilhat.json");
	}

	#[test]
	fn delta_mode_skips_existing_rows() {
		let mut conn = memory_conn();
		let original = serde_json::json!({"k": 1});
		project(
			&mut conn,
			"s1",
			&[MirrorEntry { fname: "a.tinfoilhat.json", data: &original }],
			Mode::Full,
		)
		.unwrap();

		let changed = serde_json::json!({"k": 999});
		let inserted = project(
			&mut conn,
			"s1",
			&[MirrorEntry { fname: "a.tinfoilhat.json", data: &changed }],
			Mode::Delta,
		)
		.unwrap();
		assert_eq!(inserted, 0);

		let rows = rows_for_session(&conn, "s1").unwrap();
		assert_eq!(rows[0].1, original);
	}

	#[test]
	fn delta_mode_adds_new_rows_alongside_existing() {
		let mut conn = memory_conn();
		let a = serde_json::json!({"k": "a"});
		let b = serde_json::json!({"k": "b"});
		project(&mut conn, "s1", &[MirrorEntry { fname: "a.tinfoilhat.json", data: &a }], Mode::Full).unwrap();
		project(&mut conn, "s1", &[MirrorEntry { fname: "b.tinfoilhat.json", data: &b }], Mode::Delta).unwrap();

		let rows = rows_for_session(&conn, "s1").unwrap();
		assert_eq!(rows.len(), 2);
	}

	#[test]
	fn projections_are_scoped_per_session() {
		let mut conn = memory_conn();
		let data = serde_json::json!({"k": 1});
		project(&mut conn, "s1", &[MirrorEntry { fname: "a.tinfoilhat.json", data: &data }], Mode::Full).unwrap();
		project(&mut conn, "s2", &[MirrorEntry { fname: "a.tinfoilhat.json", data: &data }], Mode::Full).unwrap();

		assert_eq!(rows_for_session(&conn, "s1").unwrap().len(), 1);
		assert_eq!(rows_for_session(&conn, "s2").unwrap().len(), 1);
	}
}
