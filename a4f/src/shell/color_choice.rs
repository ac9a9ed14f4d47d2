// SPDX-License-Identifier: Apache-2.0

//! Whether the CLI output should use color.

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum ColorChoice {
	Always,
	Never,
	#[default]
	Auto,
}
