#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// File name reserved for grader feedback inside an attempt directory.
pub const COMMENTS_FILE: &str = "comments.txt";

/// File name used for the free-text part of a hand-in.
pub const SUBMISSION_FILE: &str = "submission.txt";

/// File name used for the comments a student typed into the hand-in form.
pub const STUDENT_COMMENTS_FILE: &str = "student_comments.txt";

/// Suffix inserted before the extension of an annotated feedback attachment,
/// e.g. `report.pdf` becomes `report_ann.pdf`.
pub const ANNOTATED_SUFFIX: &str = "_ann";

/// Suffix appended to the attempt id to build the cache key of an attempt on
/// an individual (non-group) assignment.
pub const INDIVIDUAL_KEY_SUFFIX: &str = "I";

/// Buffer size used when streaming remote files to disk.
pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Default location of the persisted state document.
pub const DEFAULT_STATE_FILE: &str = "grading.json";

/// Default location of the cached platform token.
pub const DEFAULT_TOKEN_FILE: &str = ".bbfetch-token";

/// Default directory template; relative templates are resolved against the
/// working directory at startup.
pub const DEFAULT_DIRECTORY_TEMPLATE: &str = "{assignment}/{group} ({raw_id})";

/// Case-insensitive pattern marking feedback that asks for a new hand-in.
pub const DEFAULT_REHANDIN_PATTERN: &str = r"genaflevering|re-?handin";

/// Case-insensitive pattern marking feedback that approves a hand-in.
pub const DEFAULT_ACCEPT_PATTERN: &str = r"accepted|godkendt";

/// How long a fetched group membership list stays fresh, in hours.
pub const DEFAULT_GROUP_TTL_HOURS: u64 = 7 * 24;

/// Column widths used by the gradebook view.
pub mod widths {
    /// Username column.
    pub const USERNAME: usize = 8;
    /// Display name column.
    pub const NAME: usize = 27;
    /// Group label column.
    pub const GROUP: usize = 6;
    /// `|` separator columns.
    pub const SEPARATOR: usize = 1;
    /// One column per assignment.
    pub const ASSIGNMENT: usize = 3;
    /// Total score column.
    pub const POINTS: usize = 3;
}
