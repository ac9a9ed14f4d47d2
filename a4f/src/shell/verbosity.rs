// SPDX-License-Identifier: Apache-2.0

//! How verbose CLI output should be.

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum Verbosity {
	/// Output results, not progress indicators.
	Quiet,
	/// Output results and progress indicators.
	#[default]
	Normal,
	/// Output nothing; used in tests.
	#[value(hide = true)]
	Silent,
}

impl Verbosity {
	pub fn from_flags(quiet: bool, verbose: bool) -> Verbosity {
		match (quiet, verbose) {
			(true, _) => Verbosity::Quiet,
			(false, _) => Verbosity::Normal,
		}
	}
}
