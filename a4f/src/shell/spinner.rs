// SPDX-License-Identifier: Apache-2.0

//! A thin wrapper over `indicatif::ProgressBar` for the pipeline's
//! long blocking points: Debian archive downloads and clearing-server
//! polling. Silenced entirely at `Verbosity::Quiet`/`Silent`.

use super::verbosity::Verbosity;
use super::Shell;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct SpinnerPhase {
	bar: Option<ProgressBar>,
}

impl SpinnerPhase {
	pub fn start(message: impl Into<String>) -> SpinnerPhase {
		if Shell::verbosity() != Verbosity::Normal {
			return SpinnerPhase { bar: None };
		}

		let bar = ProgressBar::new_spinner();
		bar.set_style(
			ProgressStyle::with_template("{spinner} {msg}")
				.unwrap_or_else(|_| ProgressStyle::default_spinner()),
		);
		bar.set_message(message.into());
		bar.enable_steady_tick(Duration::from_millis(100));
		SpinnerPhase { bar: Some(bar) }
	}

	pub fn update(&self, message: impl Into<String>) {
		if let Some(bar) = &self.bar {
			bar.set_message(message.into());
		}
	}

	pub fn finish(self) {
		if let Some(bar) = self.bar {
			bar.finish_and_clear();
		}
	}
}
