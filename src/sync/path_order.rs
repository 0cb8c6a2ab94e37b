//! Hierarchical checkout ordering.
//!
//! Partitions projects into levels so that a project's ancestor directory
//! (by `relpath`) always finishes checkout in an earlier level. Ordering is
//! component-wise, not lexicographic: `foo-bar` is a sibling of `foo`, not a
//! descendant, even though it sorts immediately after it as a string.

use super::project::Project;

/// Resolve `projects` into checkout levels. Level *k* must fully complete
/// before level *k+1* begins; projects within one level may run in parallel.
pub fn resolve(projects: &[Project]) -> Vec<Vec<Project>> {
    let mut sorted: Vec<&Project> = projects.iter().collect();
    sorted.sort_by(|a, b| a.relpath_components().cmp(&b.relpath_components()));

    let mut levels: Vec<Vec<Project>> = Vec::new();
    // Stack of (path components, level) for ancestors seen so far.
    let mut stack: Vec<(Vec<&str>, usize)> = Vec::new();

    for project in sorted {
        let components = project.relpath_components();

        while let Some((top, _)) = stack.last() {
            if is_prefix(top, &components) {
                break;
            }
            stack.pop();
        }

        let level = stack.last().map_or(0, |(_, lvl)| lvl + 1);
        if levels.len() <= level {
            levels.resize_with(level + 1, Vec::new);
        }
        levels[level].push(project.clone());
        stack.push((components, level));
    }

    levels
}

fn is_prefix(prefix: &[&str], path: &[&str]) -> bool {
    prefix.len() < path.len() && prefix.iter().zip(path.iter()).all(|(a, b)| a == b)
}
