// SPDX-License-Identifier: Apache-2.0

//! A small global shell singleton controlling verbosity and color,
//! trimmed from the teacher's MiniJinja-templated reporting shell down
//! to the pieces this crate actually needs: a verbosity gate for
//! progress lines, and spinners for the long I/O points (Debian
//! downloads, clearing-server polling).

pub mod color_choice;
pub mod spinner;
pub mod verbosity;

use color_choice::ColorChoice;
use console::Style;
use std::fmt::Display;
use std::sync::{OnceLock, RwLock};
use verbosity::Verbosity;

static GLOBAL_SHELL: OnceLock<Shell> = OnceLock::new();

/// The process-wide shell state: verbosity and color choice.
#[derive(Debug)]
pub struct Shell {
	verbosity: RwLock<Verbosity>,
	colors_enabled: RwLock<bool>,
}

impl Shell {
	/// Initialize the global shell. Safe to call more than once; later
	/// calls are ignored, matching `OnceLock`'s semantics.
	pub fn init(verbosity: Verbosity) {
		GLOBAL_SHELL.get_or_init(|| Shell {
			verbosity: RwLock::new(verbosity),
			colors_enabled: RwLock::new(true),
		});
	}

	fn get() -> &'static Shell {
		GLOBAL_SHELL.get_or_init(|| Shell {
			verbosity: RwLock::new(Verbosity::Normal),
			colors_enabled: RwLock::new(true),
		})
	}

	pub fn set_verbosity(verbosity: Verbosity) {
		*Shell::get().verbosity.write().unwrap() = verbosity;
	}

	pub fn verbosity() -> Verbosity {
		*Shell::get().verbosity.read().unwrap()
	}

	pub fn set_colors_enabled(enabled: bool) {
		*Shell::get().colors_enabled.write().unwrap() = enabled;
	}

	pub fn set_color_choice(choice: ColorChoice) {
		match choice {
			ColorChoice::Always => Shell::set_colors_enabled(true),
			ColorChoice::Never => Shell::set_colors_enabled(false),
			ColorChoice::Auto => {}
		}
	}

	fn style(color: impl Fn(Style) -> Style) -> Style {
		let base = Style::new();
		if *Shell::get().colors_enabled.read().unwrap() {
			color(base)
		} else {
			base
		}
	}

	/// Print a progress line, suppressed when verbosity is `Quiet` or `Silent`.
	pub fn progress(msg: impl Display) {
		if Shell::verbosity() == Verbosity::Normal {
			let prefix = Shell::style(|s| s.cyan().bold()).apply_to("==>");
			eprintln!("{prefix} {msg}");
		}
	}

	/// Print an error, always shown regardless of verbosity.
	pub fn error(msg: impl Display) {
		let prefix = Shell::style(|s| s.red().bold()).apply_to("error:");
		eprintln!("{prefix} {msg}");
	}

	/// Print a warning, shown unless verbosity is `Silent`.
	pub fn warn(msg: impl Display) {
		if Shell::verbosity() != Verbosity::Silent {
			let prefix = Shell::style(|s| s.yellow().bold()).apply_to("warning:");
			eprintln!("{prefix} {msg}");
		}
	}
}
