#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use crate::constants::ANNOTATED_SUFFIX;

/// Splits a file name into its stem and its extension (including the dot).
///
/// Leading dots belong to the stem, so `.bashrc` has no extension and
/// `archive.tar.gz` splits into `archive.tar` and `.gz`.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(idx) => name.split_at(leading + idx),
        None => (name, ""),
    }
}

/// Inserts `tag` between the stem and extension of `name`.
pub fn insert_before_extension(name: &str, tag: &str) -> String {
    let (stem, ext) = split_extension(name);
    format!("{stem}{tag}{ext}")
}

/// Returns the path where an annotated copy of `path` is expected.
pub fn annotated_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(insert_before_extension(&name, ANNOTATED_SUFFIX))
}

/// Truncates `cell` to `width` characters and pads it with spaces on the
/// right.
pub fn fit(cell: &str, width: usize) -> String {
    let truncated: String = cell.chars().take(width).collect();
    format!("{truncated:<width$}")
}

/// Replaces characters that would create extra path components.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Turns a platform-supplied name into a single plain file name.
///
/// Names that would resolve to the directory itself or its parent become `_`.
pub fn file_name_component(value: &str) -> String {
    match sanitize_component(value) {
        n if n.is_empty() || n == "." || n == ".." => "_".to_owned(),
        n => n,
    }
}

/// Expands a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

/// Counts whitespace separated words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
