// SPDX-License-Identifier: Apache-2.0

//! The clearing-server orchestrator: uploads a package's `files/`
//! subtree to Fossology, schedules its analysis agents, imports the
//! Alien SPDX as concluded decisions, and polls for a terminal report
//! (spec §4.8).
//!
//! `ClearingServer` is a typed HTTP adapter behind a trait (Design Note
//! §9: "tests substitute an in-memory fake"); `ClearingClient` is the
//! real `ureq`-backed implementation, `FakeClearingServer` its
//! in-memory test double.

use crate::config::{DEFAULT_RETRIES, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::http::authenticated_agent::AuthenticatedAgent;
use crate::util::retry::{default_retryable, with_backoff};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Command;
use std::time::Duration;

/// The fixed agent set scheduled after every upload (spec §4.8).
pub const DEFAULT_AGENTS: &[&str] = &["monk", "nomos", "ojo", "copyright", "ojo_decider"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
	Queued,
	Running,
	Completed,
	Failed,
}

impl JobStatus {
	pub fn is_terminal(self) -> bool {
		matches!(self, JobStatus::Completed | JobStatus::Failed)
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FossyReport {
	pub upload_id: u64,
	pub status: JobStatus,
	pub concluded_licenses: HashMap<String, String>,
}

/// Upload identity: `<name>@<version>`, a deterministic subset of purl
/// (spec §4.8).
pub fn upload_name(name: &str, version: &str) -> String {
	format!("{name}@{version}")
}

/// The clearing-server contract spec §4.8 names, expressed as a trait
/// so the real HTTP client and the in-memory test double share one
/// call surface.
pub trait ClearingServer {
	fn find_existing_upload(&self, name: &str, archive_sha256: &str) -> Result<Option<u64>>;
	fn upload(&mut self, name: &str, archive_bytes: &[u8], archive_sha256: &str, description: Option<&str>) -> Result<u64>;
	fn schedule_agents(&mut self, upload_id: u64, agents: &[&str]) -> Result<()>;
	fn import_spdx(&mut self, upload_id: u64, rdfxml: &str) -> Result<()>;
	fn make_ojo_decisions(&mut self, upload_id: u64) -> Result<()>;
	fn poll_report(&self, upload_id: u64) -> Result<FossyReport>;
}

/// Uploads `archive_bytes`, re-using an existing upload with a matching
/// name+hash (spec §4.8's dedup rule), then schedules the default agent
/// set and optionally imports an Alien SPDX, returning the final
/// `FossyReport` once the job reaches a terminal state.
pub fn clear_package(
	server: &mut dyn ClearingServer,
	name: &str,
	version: &str,
	archive_bytes: &[u8],
	archive_sha256: &str,
	alien_spdx_rdfxml: Option<&str>,
) -> Result<FossyReport> {
	let upload_label = upload_name(name, version);

	let upload_id = match server.find_existing_upload(&upload_label, archive_sha256)? {
		Some(id) => id,
		None => server.upload(&upload_label, archive_bytes, archive_sha256, None)?,
	};

	server.schedule_agents(upload_id, DEFAULT_AGENTS)?;

	if let Some(rdfxml) = alien_spdx_rdfxml {
		server.import_spdx(upload_id, rdfxml)?;
		server.make_ojo_decisions(upload_id)?;
	}

	poll_until_terminal(server, upload_id)
}

fn poll_until_terminal(server: &dyn ClearingServer, upload_id: u64) -> Result<FossyReport> {
	with_backoff(DEFAULT_RETRIES + 5, Duration::from_millis(500), default_retryable, || {
		let report = server.poll_report(upload_id)?;
		if report.status.is_terminal() {
			Ok(report)
		} else {
			Err(Error::ServiceUnavailable(format!(
				"upload {upload_id} not yet terminal ({:?})",
				report.status
			)))
		}
	})
}

/// Converts SPDX Tag-Value text to RDF/XML via the external tool named
/// by `SPDX_TOOLS_CMD` (spec §6's subprocess contract: `SPDX_TOOLS_CMD
/// <in> <out>`, non-zero exit is a non-retryable `SubprocessFailure`).
pub fn convert_to_rdfxml(tool_cmd: &str, tag_value_path: &std::path::Path, out_path: &std::path::Path) -> Result<()> {
	let status = Command::new(tool_cmd)
		.arg(tag_value_path)
		.arg(out_path)
		.status()
		.map_err(|e| Error::Io {
			path: tag_value_path.to_owned(),
			source: e,
		})?;

	if !status.success() {
		return Err(Error::SubprocessFailure {
			command: tool_cmd.to_owned(),
			status: status.code(),
		});
	}
	Ok(())
}

/// Real `ureq`-backed implementation of `ClearingServer`, talking to a
/// Fossology-compatible REST API.
pub struct ClearingClient {
	agent: AuthenticatedAgent,
	base_url: String,
}

impl ClearingClient {
	pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<ClearingClient> {
		Ok(ClearingClient {
			agent: AuthenticatedAgent::new(token)?,
			base_url: base_url.into(),
		})
	}

	fn url(&self, path: &str) -> String {
		format!("{}{path}", self.base_url.trim_end_matches('/'))
	}
}

#[derive(Debug, Serialize, Deserialize)]
struct UploadSummary {
	upload_id: u64,
	upload_name: String,
	sha256: String,
}

impl ClearingServer for ClearingClient {
	fn find_existing_upload(&self, name: &str, archive_sha256: &str) -> Result<Option<u64>> {
		let uploads: Vec<UploadSummary> = with_backoff(DEFAULT_RETRIES, DEFAULT_TIMEOUT, default_retryable, || {
			Ok(self
				.agent
				.get(&self.url("/api/v1/uploads"))
				.call()?
				.into_json()
				.map_err(|e| Error::other(format!("invalid uploads list response: {e}")))?)
		})?;

		Ok(uploads
			.into_iter()
			.find(|u| u.upload_name == name && u.sha256 == archive_sha256)
			.map(|u| u.upload_id))
	}

	fn upload(&mut self, name: &str, archive_bytes: &[u8], _archive_sha256: &str, description: Option<&str>) -> Result<u64> {
		let description = description.unwrap_or(name);
		let summary: UploadSummary = with_backoff(DEFAULT_RETRIES, DEFAULT_TIMEOUT, default_retryable, || {
			Ok(self
				.agent
				.post(&self.url("/api/v1/uploads"))
				.set("uploadDescription", description)
				.set("folderId", "1")
				.send_bytes(archive_bytes)?
				.into_json()
				.map_err(|e| Error::other(format!("invalid upload response: {e}")))?)
		})?;
		Ok(summary.upload_id)
	}

	fn schedule_agents(&mut self, upload_id: u64, agents: &[&str]) -> Result<()> {
		with_backoff(DEFAULT_RETRIES, DEFAULT_TIMEOUT, default_retryable, || {
			self.agent
				.post(&self.url(&format!("/api/v1/jobs?uploadId={upload_id}")))
				.send_json(serde_json::json!({ "analysis": agents }))?;
			Ok(())
		})
	}

	fn import_spdx(&mut self, upload_id: u64, rdfxml: &str) -> Result<()> {
		with_backoff(DEFAULT_RETRIES, DEFAULT_TIMEOUT, default_retryable, || {
			self.agent
				.post(&self.url(&format!("/api/v1/uploads/{upload_id}/spdx")))
				.send_string(rdfxml)?;
			Ok(())
		})
	}

	fn make_ojo_decisions(&mut self, upload_id: u64) -> Result<()> {
		with_backoff(DEFAULT_RETRIES, DEFAULT_TIMEOUT, default_retryable, || {
			self.agent
				.post(&self.url(&format!("/api/v1/uploads/{upload_id}/ojo-decisions")))
				.call()?;
			Ok(())
		})
	}

	fn poll_report(&self, upload_id: u64) -> Result<FossyReport> {
		self.agent
			.get(&self.url(&format!("/api/v1/uploads/{upload_id}/report")))
			.call()?
			.into_json()
			.map_err(|e| Error::other(format!("invalid report response: {e}")))
	}
}

#[cfg(test)]
pub mod fake {
	use super::*;

	/// An in-memory `ClearingServer` double, keyed by upload name+hash
	/// (spec §4.8's dedup rule), with a scripted terminal status.
	#[derive(Default)]
	pub struct FakeClearingServer {
		pub next_upload_id: u64,
		pub uploads: HashMap<(String, String), u64>,
		pub scheduled: HashMap<u64, Vec<String>>,
		pub imported_spdx: HashMap<u64, String>,
		pub ojo_decided: Vec<u64>,
		pub upload_calls: usize,
		pub terminal_status: JobStatus,
	}

	impl FakeClearingServer {
		pub fn new(terminal_status: JobStatus) -> FakeClearingServer {
			FakeClearingServer {
				next_upload_id: 300,
				terminal_status,
				..Default::default()
			}
		}
	}

	impl ClearingServer for FakeClearingServer {
		fn find_existing_upload(&self, name: &str, archive_sha256: &str) -> Result<Option<u64>> {
			Ok(self.uploads.get(&(name.to_owned(), archive_sha256.to_owned())).copied())
		}

		fn upload(&mut self, name: &str, _archive_bytes: &[u8], archive_sha256: &str, _description: Option<&str>) -> Result<u64> {
			self.upload_calls += 1;
			let id = self.next_upload_id;
			self.uploads.insert((name.to_owned(), archive_sha256.to_owned()), id);
			self.next_upload_id += 1;
			Ok(id)
		}

		fn schedule_agents(&mut self, upload_id: u64, agents: &[&str]) -> Result<()> {
			self.scheduled.insert(upload_id, agents.iter().map(|s| s.to_string()).collect());
			Ok(())
		}

		fn import_spdx(&mut self, upload_id: u64, rdfxml: &str) -> Result<()> {
			self.imported_spdx.insert(upload_id, rdfxml.to_owned());
			Ok(())
		}

		fn make_ojo_decisions(&mut self, upload_id: u64) -> Result<()> {
			self.ojo_decided.push(upload_id);
			Ok(())
		}

		fn poll_report(&self, upload_id: u64) -> Result<FossyReport> {
			Ok(FossyReport {
				upload_id,
				status: self.terminal_status,
				concluded_licenses: HashMap::new(),
			})
		}
	}
}
