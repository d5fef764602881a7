#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Fetching attempt detail and writing hand-ins to disk.
//!
//! Every step is safe to repeat: detail is fetched once and cached in the
//! [`StateStore`], and files that already exist are never touched again, so
//! a grader's edits to `comments.txt` or annotated copies survive any number
//! of re-downloads.

use std::{
    collections::BTreeMap,
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use typed_builder::TypedBuilder;
use zip::ZipArchive;

use crate::{
    constants::{COMMENTS_FILE, DOWNLOAD_CHUNK_SIZE, STUDENT_COMMENTS_FILE, SUBMISSION_FILE},
    customize::Customization,
    gradebook::Attempt,
    remote::{AttemptDetail, FileSource, RemoteClient, RemoteError},
    store::StateStore,
    types::AttemptKey,
    util::{file_name_component, insert_before_extension},
};

/// A file as it will be named inside an attempt's directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    /// Unique name within the attempt directory.
    pub filename: String,
    /// Where the content comes from.
    pub source:   FileSource,
}

/// Returns the detail of `attempt`, fetching and caching it if needed.
///
/// Once detail is cached no further remote calls are made for it.
pub fn ensure_detail(
    store: &mut StateStore,
    remote: &dyn RemoteClient,
    attempt: &Attempt,
) -> Result<AttemptDetail> {
    if let Some(detail) = &store.get(attempt).detail {
        return Ok(detail.clone());
    }

    tracing::info!("Fetching details for attempt {attempt}");
    let detail = remote
        .fetch_attempt_detail(&attempt.id, attempt.is_group())
        .with_context(|| format!("Could not fetch details for {attempt}"))?;
    store.get_or_create(attempt).merge_detail(detail.clone());
    store.persist()?;
    Ok(detail)
}

/// Lists the files of an attempt in the order they are written.
///
/// Submission text, student comments, existing feedback, feedback
/// attachments, then submitted files. `comments.txt` is held back for the
/// feedback text; any name already taken gets the attempt id inserted before
/// its extension, followed by a counter if that name is taken as well.
pub fn attempt_files(detail: &AttemptDetail, attempt_id: &str) -> Vec<LocalFile> {
    /// Names handed out so far.
    struct Names<'a> {
        /// Taken file names.
        used:       Vec<String>,
        /// Files in output order.
        files:      Vec<LocalFile>,
        /// Inserted into colliding names.
        attempt_id: &'a str,
    }

    impl Names<'_> {
        /// Adds a file, renaming it until its name is free.
        fn add(&mut self, name: &str, source: FileSource) {
            let base = file_name_component(name);
            let mut name = base.clone();
            let mut n = 1;
            while self.used.contains(&name) {
                let tag = match n {
                    1 => self.attempt_id.to_owned(),
                    n => format!("{}_{n}", self.attempt_id),
                };
                name = insert_before_extension(&base, &tag);
                n += 1;
            }
            self.used.push(name.clone());
            self.files.push(LocalFile {
                filename: name,
                source,
            });
        }
    }

    let mut names = Names {
        used: vec![COMMENTS_FILE.to_owned()],
        files: Vec::new(),
        attempt_id,
    };

    if let Some(text) = detail.submission.as_deref().filter(|t| !t.is_empty()) {
        names.add(SUBMISSION_FILE, FileSource::Contents(text.to_owned()));
    }
    if let Some(text) = detail.comments.as_deref().filter(|t| !t.is_empty()) {
        names.add(STUDENT_COMMENTS_FILE, FileSource::Contents(text.to_owned()));
    }
    if let Some(text) = detail.feedback.as_deref().filter(|t| !t.is_empty()) {
        names.used.retain(|n| n != COMMENTS_FILE);
        names.add(COMMENTS_FILE, FileSource::Contents(text.to_owned()));
    }
    for file in detail.feedback_files.iter().chain(&detail.files) {
        names.add(&file.filename, file.source.clone());
    }

    names.files
}

/// Cached directory of `attempt`, if it still exists on disk.
pub fn attempt_directory(store: &StateStore, attempt: &Attempt) -> Option<PathBuf> {
    store
        .get(attempt)
        .directory
        .as_ref()
        .filter(|d| d.is_dir())
        .cloned()
}

/// Returns the directory of `attempt`, choosing and creating it if needed.
pub fn ensure_directory(
    store: &mut StateStore,
    custom: &Customization,
    attempt: &Attempt,
) -> Result<PathBuf> {
    if let Some(dir) = attempt_directory(store, attempt) {
        return Ok(dir);
    }

    let dir = custom.directory_for(attempt, store.groups());
    fs::create_dir_all(&dir)
        .with_context(|| format!("Could not create directory {}", dir.display()))?;
    store.get_or_create(attempt).directory = Some(dir.clone());
    store.persist()?;
    Ok(dir)
}

/// Whether every file of `attempt` is present in its directory.
///
/// Attempts without cached detail count as not downloaded.
pub fn has_downloaded(store: &StateStore, attempt: &Attempt) -> bool {
    let Some(dir) = attempt_directory(store, attempt) else {
        return false;
    };
    let Some(detail) = &store.get(attempt).detail else {
        return false;
    };
    attempt_files(detail, &attempt.id)
        .iter()
        .all(|f| dir.join(&f.filename).exists())
}

/// Whether the grader has written feedback for `attempt`.
pub fn has_feedback(store: &StateStore, attempt: &Attempt) -> bool {
    attempt_directory(store, attempt).is_some_and(|dir| dir.join(COMMENTS_FILE).exists())
}

/// What [`materialize`] did for one attempt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterializeReport {
    /// Directory the attempt lives in.
    pub directory: PathBuf,
    /// Files written by this call.
    pub written:   Vec<PathBuf>,
    /// Files left alone because they already existed.
    pub skipped:   Vec<PathBuf>,
    /// Entries unpacked from `.zip` files.
    pub extracted: usize,
}

/// Writes every file of `attempt` that is not yet on disk.
pub fn materialize(
    store: &mut StateStore,
    remote: &dyn RemoteClient,
    custom: &Customization,
    attempt: &Attempt,
) -> Result<MaterializeReport> {
    let detail = ensure_detail(store, remote, attempt)?;
    let files = attempt_files(&detail, &attempt.id);
    let directory = ensure_directory(store, custom, attempt)?;
    let mut report = MaterializeReport {
        directory: directory.clone(),
        ..Default::default()
    };

    for file in files {
        let target = directory.join(&file.filename);
        if target.exists() {
            tracing::debug!("Skip {} for {attempt} (already exists)", target.display());
            // An earlier run may have stopped between download and unpacking.
            if is_zip(&file) {
                match extract_zip(&target, &directory) {
                    Ok(n) => report.extracted += n,
                    Err(e) => tracing::warn!("Could not unpack {}: {e:#}", target.display()),
                }
            }
            report.skipped.push(target);
            continue;
        }

        match &file.source {
            FileSource::Contents(text) => {
                write_text(&target, text)?;
                tracing::info!("Storing {attempt} {} (text content)", file.filename);
            }
            FileSource::DownloadLink(link) => {
                tracing::info!("Download {attempt} {}", target.display());
                download_to(remote, link, &target)?;
                if is_zip(&file) {
                    report.extracted += extract_zip(&target, &directory)?;
                }
            }
        }
        report.written.push(target);
    }

    Ok(report)
}

/// Creates `path` with `text`, adding a final newline to non-empty text.
fn write_text(path: &Path, text: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Could not create {}", path.display()))?;
    file.write_all(text.as_bytes())?;
    if !text.is_empty() && !text.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

/// Whether `file` is a downloaded archive to unpack.
fn is_zip(file: &LocalFile) -> bool {
    matches!(file.source, FileSource::DownloadLink(_))
        && file.filename.to_ascii_lowercase().ends_with(".zip")
}

/// Streams `link` into a new file at `path`; removes the file on failure.
fn download_to(remote: &dyn RemoteClient, link: &str, path: &Path) -> Result<()> {
    let mut reader = remote.open_download(link)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Could not create {}", path.display()))?;

    match copy_chunks(&mut reader, &mut file, link) {
        Ok(bytes) => {
            tracing::debug!("Wrote {bytes} bytes to {}", path.display());
            Ok(())
        }
        Err(e) => {
            drop(file);
            let _ = fs::remove_file(path);
            Err(e).with_context(|| format!("Download of {} failed", path.display()))
        }
    }
}

/// Copies `reader` into `out` in fixed-size chunks.
///
/// Read failures are transport errors of `link`; write failures stay local
/// I/O errors.
fn copy_chunks(reader: &mut dyn Read, out: &mut dyn Write, link: &str) -> Result<u64> {
    let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
    let mut total = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(RemoteError::Transport(format!("downloading {link}: {e}")).into());
            }
        };
        out.write_all(&buf[..n]).context("Could not write downloaded data")?;
        total += n as u64;
    }
    out.flush().context("Could not write downloaded data")?;
    Ok(total)
}

/// Unpacks `archive` into `dest`, never overwriting existing files.
///
/// Entries whose path would leave `dest` are skipped. Returns the number of
/// files written.
fn extract_zip(archive: &Path, dest: &Path) -> Result<usize> {
    tracing::debug!("Unzip archive {}", archive.display());
    let file =
        File::open(archive).with_context(|| format!("Could not open {}", archive.display()))?;
    let mut zip = ZipArchive::new(file)
        .with_context(|| format!("{} is not a valid zip archive", archive.display()))?;

    let mut written = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping unsafe entry `{}` in {}", entry.name(), archive.display());
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if target.exists() {
            tracing::debug!("Not overwriting {} from archive", target.display());
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .with_context(|| format!("Could not create {}", target.display()))?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    Ok(written)
}

/// Filters composing an attempt selection. Every enabled filter must pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypedBuilder)]
pub struct Selection {
    /// Only students the grader sees.
    #[builder(default = true)]
    pub visible:        bool,
    /// Only attempts the platform lists as ungraded.
    #[builder(default)]
    pub needs_grading:  bool,
    /// Only attempts with files missing locally.
    #[builder(default)]
    pub needs_download: bool,
    /// Only ungraded attempts with local feedback.
    #[builder(default)]
    pub needs_upload:   bool,
}

impl Default for Selection {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Attempts matching `selection`, without duplicates, oldest first.
pub fn select_attempts(
    store: &StateStore,
    custom: &Customization,
    selection: &Selection,
) -> Vec<Attempt> {
    let groups = store.groups();
    let unique: BTreeMap<AttemptKey, &Attempt> = store
        .gradebook()
        .attempts()
        .filter(|(student, _)| !selection.visible || custom.is_visible(student, groups))
        .map(|(_, attempt)| (attempt.key(), attempt))
        .collect();

    unique
        .into_values()
        .filter(|a| !selection.needs_grading || a.needs_grading)
        .filter(|a| !selection.needs_download || !has_downloaded(store, a))
        .filter(|a| !selection.needs_upload || (a.needs_grading && has_feedback(store, a)))
        .sorted_by(|a, b| a.sort_key().cmp(&b.sort_key()))
        .cloned()
        .collect()
}

/// An attempt that could not be downloaded.
#[derive(Debug)]
pub struct DownloadFailure {
    /// The attempt.
    pub attempt: Attempt,
    /// What went wrong.
    pub error:   anyhow::Error,
}

/// Outcome of a bulk download.
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// Attempts processed successfully.
    pub completed: Vec<MaterializeReport>,
    /// Attempts that failed; the batch went on without them.
    pub failures:  Vec<DownloadFailure>,
}

impl DownloadReport {
    /// Number of files written across all attempts.
    pub fn files_written(&self) -> usize {
        self.completed.iter().map(|r| r.written.len()).sum()
    }
}

/// Materializes every attempt matching `selection`.
///
/// A failing attempt is recorded and skipped; rejected credentials abort the
/// batch.
pub fn download_all(
    store: &mut StateStore,
    remote: &dyn RemoteClient,
    custom: &Customization,
    selection: &Selection,
) -> Result<DownloadReport> {
    let attempts = select_attempts(store, custom, selection);
    tracing::info!("{} attempt(s) to download", attempts.len());

    let mut report = DownloadReport::default();
    for attempt in attempts {
        match materialize(store, remote, custom, &attempt) {
            Ok(done) => report.completed.push(done),
            Err(e) => {
                if e.downcast_ref::<RemoteError>()
                    .is_some_and(RemoteError::is_bad_credentials)
                {
                    return Err(e);
                }
                tracing::error!("Could not download {attempt}: {e:#}");
                report.failures.push(DownloadFailure { attempt, error: e });
            }
        }
    }

    tracing::info!(
        "Downloaded {} attempt(s), wrote {} file(s), {} failure(s)",
        report.completed.len(),
        report.files_written(),
        report.failures.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteFile;

    fn link(name: &str) -> RemoteFile {
        RemoteFile {
            filename: name.into(),
            source:   FileSource::DownloadLink(format!("http://files/{name}")),
        }
    }

    #[test]
    fn files_come_in_priority_order() {
        let detail = AttemptDetail {
            submission:     Some("hello".into()),
            comments:       Some("see attached".into()),
            files:          vec![link("main.py")],
            feedback:       Some("accepted".into()),
            feedback_files: vec![link("notes.pdf")],
        };
        let names: Vec<_> = attempt_files(&detail, "_5_1")
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(
            names,
            ["submission.txt", "student_comments.txt", "comments.txt", "notes.pdf", "main.py"]
        );
    }

    #[test]
    fn comments_name_is_reserved_without_feedback() {
        let detail = AttemptDetail {
            files: vec![link("comments.txt"), link("a.txt"), link("a.txt")],
            ..Default::default()
        };
        let names: Vec<_> = attempt_files(&detail, "_5_1")
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, ["comments_5_1.txt", "a.txt", "a_5_1.txt"]);
    }

    #[test]
    fn repeated_names_stay_unique() {
        let detail = AttemptDetail {
            files: vec![link("a.txt"), link("a.txt"), link("a.txt"), link("a_5_1_2.txt")],
            ..Default::default()
        };
        let names: Vec<_> = attempt_files(&detail, "_5_1")
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, ["a.txt", "a_5_1.txt", "a_5_1_2.txt", "a_5_1_2_5_1.txt"]);
    }

    #[test]
    fn dot_names_become_placeholders() {
        let detail = AttemptDetail {
            files: vec![link(".."), link(""), link(".")],
            ..Default::default()
        };
        let names: Vec<_> = attempt_files(&detail, "_5_1")
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, ["_", "__5_1", "__5_1_2"]);
    }

    /// Accepts nothing.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails on the first read.
    struct DroppedConnection;

    impl Read for DroppedConnection {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("connection reset"))
        }
    }

    #[test]
    fn write_failures_are_not_transport_errors() {
        let err = copy_chunks(&mut io::Cursor::new(b"data".to_vec()), &mut FullDisk, "l")
            .expect_err("disk full");
        assert!(err.downcast_ref::<RemoteError>().is_none());
        assert!(err.downcast_ref::<io::Error>().is_some());

        let err = copy_chunks(&mut DroppedConnection, &mut Vec::new(), "l").expect_err("reset");
        assert!(err.downcast_ref::<RemoteError>().is_some_and(RemoteError::is_transport));
    }

    #[test]
    fn empty_texts_produce_no_files() {
        let detail = AttemptDetail {
            submission: Some(String::new()),
            ..Default::default()
        };
        assert!(attempt_files(&detail, "_1_1").is_empty());
    }

    #[test]
    fn selection_defaults_to_visible_only() {
        let selection = Selection::default();
        assert!(selection.visible);
        assert!(!selection.needs_grading && !selection.needs_download && !selection.needs_upload);
    }
}
