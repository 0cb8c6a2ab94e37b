//! Minimal block-formatting helpers shared by error `Display` impls.

use super::constants::GUTTER;

/// Indent `content` with a dim gutter bar, one line at a time.
///
/// Used to set raw command output or diagnostic detail apart from the
/// surrounding message, the way `GitError`'s multi-line variants do.
pub fn format_with_gutter(content: &str) -> String {
    content
        .lines()
        .map(|line| format!("{GUTTER}\u{2502}{GUTTER:#} {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
