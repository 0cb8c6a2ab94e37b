//! Terminal output styling.
//!
//! ## stdout vs stderr principle
//!
//! - **stdout**: primary data output (nothing in this crate yet emits structured
//!   data to stdout, but the convention is kept for consistency).
//! - **stderr**: status messages (progress, success, errors, hints, warnings).
//!
//! This separation allows piping without status messages interfering.
//! Use `eprintln!` for status messages.

mod constants;
mod format;

pub use anstream::{eprint, eprintln, print, println};
pub use anstyle::Style as AnstyleStyle;

pub use constants::*;
pub use format::format_with_gutter;

use std::sync::atomic::{AtomicU8, Ordering};

/// Global verbosity level, set at startup.
/// 0 = normal, 1 = verbose (-v), 2+ = debug (-vv)
static VERBOSITY: AtomicU8 = AtomicU8::new(0);

/// Set the global verbosity level. Call once at startup after parsing CLI args.
pub fn set_verbosity(level: u8) {
    VERBOSITY.store(level, Ordering::Relaxed);
}

/// Get the current verbosity level.
pub fn verbosity() -> u8 {
    VERBOSITY.load(Ordering::Relaxed)
}
