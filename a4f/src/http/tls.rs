// SPDX-License-Identifier: Apache-2.0

//! Constructs a [`ureq::Agent`] using TLS with the system's native
//! certificates, so the Debian archive matchers and the NVD/clearing
//! clients all trust the same root store as the rest of the host.

use crate::error::{Error, Result};
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use std::time::Duration;
use ureq::{Agent, AgentBuilder};

/// Construct a new agent using system certs, with the bounded timeout
/// the concurrency model requires at every external blocking point.
pub fn new_agent(timeout: Duration) -> Result<Agent> {
	let mut roots = RootCertStore::empty();
	for cert in rustls_native_certs::load_native_certs()
		.map_err(|e| Error::other(format!("failed to load native certs: {e}")))?
	{
		roots
			.add(cert)
			.map_err(|e| Error::other(format!("failed to add native cert: {e}")))?;
	}

	let tls_config = ClientConfig::builder()
		.with_root_certificates(roots)
		.with_no_client_auth();

	let agent = AgentBuilder::new()
		.tls_config(Arc::new(tls_config))
		.timeout(timeout)
		.build();

	Ok(agent)
}
