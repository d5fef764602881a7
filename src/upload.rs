#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Turning local feedback into grades on the platform.
//!
//! An attempt is uploaded only when its `comments.txt` clearly accepts or
//! rejects the hand-in. Everything wrong with an attempt is reported at once
//! so the grader can fix it in one go; the rest of the batch is unaffected.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::Result;
use colored::Colorize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, object::Columns},
};

use crate::{
    constants::COMMENTS_FILE,
    customize::Customization,
    download::{Selection, attempt_directory, attempt_files, select_attempts},
    feedback::FeedbackError,
    gradebook::Attempt,
    remote::{GradeSubmission, RemoteClient, RemoteError},
    render::format_score,
    store::StateStore,
    util::{annotated_path, word_count},
};

/// Reasons an attempt is not ready for upload.
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    /// `comments.txt` is missing.
    #[error("no feedback found")]
    NoFeedback,
    /// The feedback neither accepts nor rejects the hand-in.
    #[error("feedback does not indicate accept/rehandin")]
    Indeterminate,
    /// The feedback could not be classified.
    #[error(transparent)]
    Feedback(#[from] FeedbackError),
    /// The attempt has no directory on disk.
    #[error("files not downloaded")]
    NotDownloaded,
    /// The feedback file exists but could not be read.
    #[error("could not read {}: {source}", .path.display())]
    Unreadable {
        /// Feedback file.
        path:   PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// An attempt that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedUpload {
    /// The attempt to grade.
    pub attempt:     Attempt,
    /// Score inferred from the feedback.
    pub score:       f64,
    /// Feedback text as written by the grader.
    pub feedback:    String,
    /// Annotated files to attach.
    pub attachments: Vec<PathBuf>,
}

impl PreparedUpload {
    /// Number of words in the feedback.
    pub fn word_count(&self) -> usize {
        word_count(&self.feedback)
    }

    /// One-line description of what would be sent.
    pub fn summary(&self) -> String {
        format!(
            "score: {}, feedback: {} words, {} attachment(s)",
            format_score(self.score).unwrap_or_default(),
            self.word_count(),
            self.attachments.len()
        )
    }

    /// The request sent to the platform.
    fn submission(&self) -> GradeSubmission {
        GradeSubmission {
            attempt_id:  self.attempt.id.clone(),
            group:       self.attempt.is_group(),
            score:       self.score,
            feedback:    self.feedback.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// Checks that `attempt` can be uploaded and gathers what to send.
pub fn prepare(
    store: &StateStore,
    custom: &Customization,
    attempt: &Attempt,
) -> Result<PreparedUpload, Vec<UploadError>> {
    let mut errors = Vec::new();
    let directory = attempt_directory(store, attempt);

    let feedback = match &directory {
        Some(dir) => read_feedback(&dir.join(COMMENTS_FILE)).unwrap_or_else(|e| {
            errors.push(e);
            None
        }),
        None => None,
    };

    let score = match &feedback {
        None => {
            if !errors.iter().any(|e| matches!(e, UploadError::Unreadable { .. })) {
                errors.push(UploadError::NoFeedback);
            }
            None
        }
        Some(text) => match custom.feedback().classify(text) {
            Ok(Some(score)) => Some(score),
            Ok(None) => {
                errors.push(UploadError::Indeterminate);
                None
            }
            Err(e) => {
                errors.push(e.into());
                None
            }
        },
    };

    let attachments = match &directory {
        Some(dir) => feedback_attachments(store, attempt, dir),
        None => {
            errors.push(UploadError::NotDownloaded);
            Vec::new()
        }
    };

    match (score, feedback) {
        (Some(score), Some(feedback)) if errors.is_empty() => Ok(PreparedUpload {
            attempt: attempt.clone(),
            score,
            feedback,
            attachments,
        }),
        _ => Err(errors),
    }
}

/// Reads the feedback file; `None` if it does not exist.
fn read_feedback(path: &Path) -> Result<Option<String>, UploadError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(UploadError::Unreadable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Existing `_ann` counterparts of the attempt's files.
fn feedback_attachments(store: &StateStore, attempt: &Attempt, dir: &Path) -> Vec<PathBuf> {
    let Some(detail) = &store.get(attempt).detail else {
        return Vec::new();
    };
    attempt_files(detail, &attempt.id)
        .iter()
        .map(|f| annotated_path(&dir.join(&f.filename)))
        .filter(|p| p.exists())
        .collect()
}

/// Whether grades are actually sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    /// Only report what would be sent.
    DryRun,
    /// Submit grades to the platform.
    Live,
}

/// An attempt left out of the batch.
#[derive(Debug)]
pub struct Rejected {
    /// The attempt.
    pub attempt: Attempt,
    /// Everything that is wrong with it.
    pub errors:  Vec<UploadError>,
}

/// Row of the dry-run table.
#[derive(Tabled)]
struct PlannedRow {
    /// Attempt description.
    #[tabled(rename = "Attempt")]
    attempt:     String,
    /// Inferred score.
    #[tabled(rename = "Score")]
    score:       String,
    /// Words of feedback.
    #[tabled(rename = "Words")]
    words:       usize,
    /// Number of annotated files.
    #[tabled(rename = "Attachments")]
    attachments: usize,
}

/// Outcome of an upload batch.
#[derive(Debug)]
pub struct UploadReport {
    /// Mode the batch ran in.
    pub mode:      UploadMode,
    /// Attempts that passed validation.
    pub planned:   Vec<PreparedUpload>,
    /// Attempts whose grade was accepted by the platform.
    pub submitted: Vec<Attempt>,
    /// Attempts that failed validation.
    pub rejected:  Vec<Rejected>,
    /// Attempts the platform could not be told about.
    pub failed:    Vec<(Attempt, RemoteError)>,
}

impl UploadReport {
    /// Writes the validation errors and, for dry runs, the planned grades.
    pub fn write_to(&self, out: &mut dyn Write) -> io::Result<()> {
        for rejected in &self.rejected {
            writeln!(out, "{}", format!("Error for {}:", rejected.attempt).red().bold())?;
            for e in &rejected.errors {
                writeln!(out, "* {e}")?;
            }
        }

        if self.mode == UploadMode::DryRun && !self.planned.is_empty() {
            let rows = self.planned.iter().map(|p| PlannedRow {
                attempt:     p.attempt.to_string(),
                score:       format_score(p.score).unwrap_or_default(),
                words:       p.word_count(),
                attachments: p.attachments.len(),
            });
            let footer = format!("{} attempt(s) ready, nothing was sent", self.planned.len());
            writeln!(
                out,
                "{}",
                Table::new(rows)
                    .with(Panel::header("Upload check"))
                    .with(Panel::footer(footer))
                    .with(Modify::new(Columns::new(1..)).with(Alignment::right()))
                    .with(Style::modern())
            )?;
        }

        for (attempt, e) in &self.failed {
            writeln!(out, "{}", format!("Upload failed for {attempt}:").red().bold())?;
            writeln!(out, "* {e}")?;
        }
        Ok(())
    }
}

/// Validates `attempts` and, in live mode, submits their grades.
///
/// Each grade is submitted once; failures are reported, never retried.
/// Rejected credentials abort the batch.
pub fn upload_attempts(
    store: &StateStore,
    remote: &dyn RemoteClient,
    custom: &Customization,
    attempts: &[Attempt],
    mode: UploadMode,
) -> Result<UploadReport> {
    let mut report = UploadReport {
        mode,
        planned: Vec::new(),
        submitted: Vec::new(),
        rejected: Vec::new(),
        failed: Vec::new(),
    };

    for attempt in attempts {
        match prepare(store, custom, attempt) {
            Ok(prepared) => {
                tracing::debug!("{} {attempt}: {}", attempt.assignment.name, prepared.summary());
                report.planned.push(prepared);
            }
            Err(errors) => {
                tracing::warn!("Not uploading {attempt}: {} problem(s)", errors.len());
                report.rejected.push(Rejected {
                    attempt: attempt.clone(),
                    errors,
                });
            }
        }
    }

    if mode == UploadMode::DryRun {
        return Ok(report);
    }

    for prepared in &report.planned {
        let attempt = &prepared.attempt;
        match remote.submit_grade(&prepared.submission()) {
            Ok(()) => {
                tracing::info!("Uploaded {attempt}: {}", prepared.summary());
                report.submitted.push(attempt.clone());
            }
            Err(e) if e.is_bad_credentials() => return Err(e.into()),
            Err(e) => {
                tracing::error!("Could not upload {attempt}: {e}");
                report.failed.push((attempt.clone(), e));
            }
        }
    }

    Ok(report)
}

/// Uploads every visible, ungraded attempt that has local feedback.
pub fn upload_all(
    store: &StateStore,
    remote: &dyn RemoteClient,
    custom: &Customization,
    mode: UploadMode,
) -> Result<UploadReport> {
    let selection = Selection::builder().needs_upload(true).build();
    let attempts = select_attempts(store, custom, &selection);
    tracing::info!("{} attempt(s) with feedback to upload", attempts.len());
    upload_attempts(store, remote, custom, &attempts, mode)
}
