#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Fixed-width overview of the gradebook.
//!
//! One row per visible student, one narrow column per assignment. Cells show
//! a glyph per attempt:
//!
//! | glyph | meaning                                   |
//! |-------|-------------------------------------------|
//! | `↥`   | needs grading, feedback written           |
//! | `!`   | needs grading, downloaded, no feedback    |
//! | `⤓`   | needs grading, not downloaded             |
//! | `✘`   | graded 0 (rehandin)                       |
//! | `✔`   | graded 1 (accepted)                       |
//! | `2.5` | any other score                           |

use itertools::Itertools;

use crate::{
    constants::widths,
    customize::Customization,
    download::{has_downloaded, has_feedback},
    gradebook::{Attempt, Student},
    store::StateStore,
    util::fit,
};

/// Glyph for an attempt that needs grading and has feedback.
pub const GLYPH_FEEDBACK: char = '\u{21A5}';
/// Glyph for an attempt that needs grading and is downloaded.
pub const GLYPH_DOWNLOADED: char = '!';
/// Glyph for an attempt that needs grading and is not downloaded.
pub const GLYPH_PENDING: char = '\u{2913}';
/// Glyph for a rejected attempt.
pub const GLYPH_REJECTED: char = '\u{2718}';
/// Glyph for an accepted attempt.
pub const GLYPH_ACCEPTED: char = '\u{2714}';

/// Formats a number like C's `%g`: six significant digits, no trailing
/// zeros, exponent notation for very small or large magnitudes.
///
/// Returns `None` for NaN and infinities.
pub fn format_score(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    if value == 0.0 {
        return Some("0".to_owned());
    }

    let scientific = format!("{value:.5e}");
    let (mantissa, exponent) = scientific.split_once('e')?;
    let exponent: i32 = exponent.parse().ok()?;

    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        Some(format!(
            "{}e{sign}{:02}",
            trim_fraction(mantissa),
            exponent.unsigned_abs()
        ))
    } else {
        let decimals = (5 - exponent) as usize;
        Some(trim_fraction(&format!("{value:.decimals$}")).to_owned())
    }
}

/// Drops trailing zeros of a decimal fraction, and the dot if nothing is
/// left after it.
fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// Glyph or score shown for one attempt; `None` when nothing is known.
pub fn attempt_glyph(store: &StateStore, attempt: &Attempt) -> Option<String> {
    if attempt.needs_grading {
        let glyph = if has_feedback(store, attempt) {
            GLYPH_FEEDBACK
        } else if has_downloaded(store, attempt) {
            GLYPH_DOWNLOADED
        } else {
            GLYPH_PENDING
        };
        return Some(glyph.to_string());
    }

    match attempt.score {
        Some(score) if score == 0.0 => Some(GLYPH_REJECTED.to_string()),
        Some(score) if score == 1.0 => Some(GLYPH_ACCEPTED.to_string()),
        Some(score) => format_score(score),
        None => None,
    }
}

/// Cell of `student` for the assignment with id `assignment_id`.
pub fn assignment_cell(store: &StateStore, student: &Student, assignment_id: &str) -> String {
    student
        .assignments
        .get(assignment_id)
        .map(|sa| {
            sa.attempts
                .iter()
                .filter_map(|a| attempt_glyph(store, a))
                .collect()
        })
        .unwrap_or_default()
}

/// Header and width of every column, left to right.
pub fn gradebook_columns(store: &StateStore, custom: &Customization) -> Vec<(String, usize)> {
    let mut columns = vec![
        ("Username".to_owned(), widths::USERNAME),
        ("Name".to_owned(), widths::NAME),
        ("Group".to_owned(), widths::GROUP),
    ];
    for assignment in store.gradebook().assignments.values() {
        columns.push(("|".to_owned(), widths::SEPARATOR));
        columns.push((custom.assignment_name(&assignment.name), widths::ASSIGNMENT));
    }
    columns.push(("|".to_owned(), widths::SEPARATOR));
    columns.push(("Pts".to_owned(), widths::POINTS));
    columns
}

/// Unpadded cells: the header row, then visible students in display order.
pub fn gradebook_rows(store: &StateStore, custom: &Customization) -> Vec<Vec<String>> {
    let gradebook = store.gradebook();
    let groups = store.groups();
    let header: Vec<String> = gradebook_columns(store, custom)
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    let students = gradebook
        .students
        .values()
        .filter(|s| custom.is_visible(s, groups))
        .sorted_by_cached_key(|s| custom.ordering_key(s, groups));

    let mut rows = vec![header];
    for student in students {
        let mut row = vec![
            student.username.clone(),
            student.name.clone(),
            custom.group_label(student, groups),
        ];
        for assignment_id in gradebook.assignments.keys() {
            row.push("|".to_owned());
            row.push(assignment_cell(store, student, assignment_id));
        }
        row.push("|".to_owned());
        row.push(format_score(student.score).unwrap_or_default());
        rows.push(row);
    }
    rows
}

/// The gradebook as text, one line per row, without trailing whitespace.
pub fn render_gradebook(store: &StateStore, custom: &Customization) -> String {
    let widths: Vec<usize> = gradebook_columns(store, custom)
        .into_iter()
        .map(|(_, width)| width)
        .collect();

    gradebook_rows(store, custom)
        .iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(cell, width)| fit(cell, *width))
                .join(" ")
                .trim_end()
                .to_owned()
        })
        .join("\n")
}
