// SPDX-License-Identifier: Apache-2.0

//! An [`Agent`] wrapper that attaches bearer-token auth to every
//! request, used for the Fossology clearing server.

use super::tls::new_agent;
use crate::config::DEFAULT_TIMEOUT;
use crate::error::Result;
use ureq::{Agent, Request};

pub struct AuthenticatedAgent {
	agent: Agent,
	token: String,
}

impl AuthenticatedAgent {
	pub fn new(token: impl Into<String>) -> Result<AuthenticatedAgent> {
		Ok(AuthenticatedAgent {
			agent: new_agent(DEFAULT_TIMEOUT)?,
			token: token.into(),
		})
	}

	pub fn get(&self, url: &str) -> Request {
		self.agent.get(url).set(AUTH_HEADER, &self.bearer())
	}

	pub fn post(&self, url: &str) -> Request {
		self.agent.post(url).set(AUTH_HEADER, &self.bearer())
	}

	fn bearer(&self) -> String {
		format!("Bearer {}", self.token)
	}
}

const AUTH_HEADER: &str = "Authorization";
