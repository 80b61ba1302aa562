//! Glob filtering of the export path set.
//!
//! Filters are comma-separated glob lists from the preset. Each glob is
//! tested against both the `res://`-prefixed and the bare project-relative
//! path, case-insensitively, so a user filter of `file.txt` matches
//! `res://file.txt`.

use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use walkdir::WalkDir;

use crate::project::Project;
use crate::util::split_comma;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compile a comma-separated glob list. Invalid patterns are dropped with a
/// log line rather than failing the build.
pub fn compile_filter(list: &str) -> Vec<Pattern> {
    split_comma(list)
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                tracing::warn!("ignoring invalid filter glob '{glob}': {err}");
                None
            }
        })
        .collect()
}

/// Whether `path` matches any pattern, testing both the prefixed and the
/// unprefixed form.
pub fn matches_any(path: &str, patterns: &[Pattern]) -> bool {
    let bare = crate::util::strip_res_prefix(path);
    patterns.iter().any(|p| {
        p.matches_with(path, MATCH_OPTIONS) || p.matches_with(bare, MATCH_OPTIONS)
    })
}

/// Walk the project tree and edit `list` with every file matching `filter`:
/// matched files are inserted, or removed when `exclude` is set.
///
/// Dot-directories and directories the project marks as skipped are not
/// descended into.
pub fn edit_filter_list(
    project: &Project,
    list: &mut BTreeSet<String>,
    filter: &str,
    exclude: bool,
) {
    let patterns = compile_filter(filter);
    if patterns.is_empty() {
        return;
    }

    let walker = WalkDir::new(project.root())
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            if entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with('.'))
            {
                return false;
            }
            !project.should_skip_directory(entry.path())
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("filter walk error: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = match entry.path().strip_prefix(project.root()) {
            Ok(rel) => rel.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        let full = format!("res://{rel}");
        if matches_any(&full, &patterns) {
            if exclude {
                list.remove(&full);
            } else {
                list.insert(full);
            }
        }
    }
}
