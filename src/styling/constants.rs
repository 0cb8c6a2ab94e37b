//! Style constants and emojis for terminal output.
//!
//! Styles are `anstyle::Style` values used directly in `format!`/`write!` via
//! their `Display` impl: `{STYLE}text{STYLE:#}` applies then resets.

use anstyle::{AnsiColor, Color, Style};

// ============================================================================
// Semantic styles
// ============================================================================

pub const ERROR: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red)));
pub const ERROR_BOLD: Style = ERROR.bold();
pub const WARNING: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow)));
pub const HINT: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack)));
pub const SUCCESS: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green)));
pub const PROGRESS: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan)));

/// Gutter style for quoted content (command output, config, error detail blocks).
pub const GUTTER: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack)));

// ============================================================================
// Message emojis
// ============================================================================

pub const PROGRESS_EMOJI: &str = "\u{1F504}";
pub const SUCCESS_EMOJI: &str = "\u{2705}";
pub const ERROR_EMOJI: &str = "\u{274C}";
pub const WARNING_EMOJI: &str = "\u{1F7E1}";
pub const HINT_EMOJI: &str = "\u{1F4A1}";
pub const INFO_EMOJI: &str = "\u{26AA}";
