#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! A grading session: one grader, one course, one state file.
//!
//! [`Grading`] owns the [`StateStore`], the platform client and the
//! deployment [`Customization`], and sequences the pipelines for one run of
//! the command line tool.

use std::{
    io::{self, Write},
    path::PathBuf,
    str::FromStr,
    time::SystemTime,
};

use anyhow::{Context, Result};
use itertools::Itertools;
use tabled::{Table, Tabled, settings::Style};
use typed_builder::TypedBuilder;

use crate::{
    config::Settings,
    customize::Customization,
    download::{Selection, download_all, materialize},
    gradebook::Attempt,
    remote::{RemoteClient, RemoteError},
    render::render_gradebook,
    store::StateStore,
    upload::{UploadMode, upload_all},
};

/// Errors raised when looking up an attempt by its display names.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No visible student has this group label.
    #[error("No students in a group named `{name}`. Must be one of: {}", .valid.join(", "))]
    NoGroupFound {
        /// Requested label.
        name:  String,
        /// Labels that exist.
        valid: Vec<String>,
    },
    /// No assignment has this display name.
    #[error("No assignments named `{name}`. Must be one of: {}", .valid.join(", "))]
    NoAssignmentFound {
        /// Requested name.
        name:  String,
        /// Names that exist.
        valid: Vec<String>,
    },
    /// The group has no attempt at this index.
    #[error("Group `{group}` has no attempt {index} for assignment `{assignment}`")]
    NoAttempt {
        /// Group label.
        group:      String,
        /// Assignment display name.
        assignment: String,
        /// Requested index.
        index:      i64,
    },
    /// The lookup string is not `GROUP/ASSIGNMENT/INDEX`.
    #[error("Expected GROUP/ASSIGNMENT/INDEX, got `{0}`")]
    Malformed(String),
}

/// Identifies one attempt by group label, assignment display name and
/// index (negative counts from the newest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSpec {
    /// Group label as shown in the gradebook.
    pub group:      String,
    /// Assignment display name.
    pub assignment: String,
    /// Attempt index, oldest first.
    pub index:      i64,
}

impl FromStr for AttemptSpec {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LookupError::Malformed(s.to_owned());
        let (group, assignment, index) = s
            .split('/')
            .collect_tuple()
            .ok_or_else(malformed)?;
        Ok(Self {
            group:      group.to_owned(),
            assignment: assignment.to_owned(),
            index:      index.trim().parse().map_err(|_| malformed())?,
        })
    }
}

/// What one run of the tool should do.
#[derive(Debug, Clone, TypedBuilder)]
pub struct RunOptions {
    /// Fetch the gradebook before doing anything else.
    #[builder(default = true)]
    pub refresh:          bool,
    /// Fetch group memberships even if the cache is fresh.
    #[builder(default)]
    pub refresh_groups:   bool,
    /// Print the diagnostic report.
    #[builder(default)]
    pub check:            bool,
    /// Download one specific attempt.
    #[builder(default)]
    pub download_attempt: Option<AttemptSpec>,
    /// Bulk download breadth: 1 needs grading, 2 all visible, 3 everyone.
    #[builder(default)]
    pub download:         usize,
    /// Report what would be uploaded.
    #[builder(default)]
    pub upload_check:     bool,
    /// Upload graded attempts.
    #[builder(default)]
    pub upload:           bool,
}

/// How a run ended, after the error policy was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Everything went through and the state was saved.
    Saved,
    /// The platform sent something unexpected; it was saved for diagnosis.
    ParseFailure(PathBuf),
    /// The platform rejected the credentials; the cached token was removed.
    BadCredentials,
    /// Any other failure; the state was not saved.
    Failed(String),
}

/// Row of the check report's student table.
#[derive(Tabled)]
struct StudentCheckRow {
    /// Display name.
    #[tabled(rename = "Name")]
    name:     String,
    /// Group label.
    #[tabled(rename = "Group")]
    group:    String,
    /// Whether the grader sees the student.
    #[tabled(rename = "Visible")]
    visible:  bool,
    /// Sort key.
    #[tabled(rename = "Order by")]
    order_by: String,
}

/// Row of the check report's attempt table.
#[derive(Tabled)]
struct AttemptCheckRow {
    /// Attempt description.
    #[tabled(rename = "Attempt")]
    attempt:   String,
    /// Directory the attempt downloads to.
    #[tabled(rename = "Directory")]
    directory: String,
}

/// One grading session.
pub struct Grading<R: RemoteClient> {
    /// Settings the session was built from.
    settings: Settings,
    /// Cached state.
    store:    StateStore,
    /// Platform client.
    remote:   R,
    /// Deployment conventions.
    custom:   Customization,
}

impl<R: RemoteClient> Grading<R> {
    /// Starts a session over an already loaded store.
    pub fn new(settings: Settings, store: StateStore, remote: R, custom: Customization) -> Self {
        Self {
            settings,
            store,
            remote,
            custom,
        }
    }

    /// Cached state.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Platform client.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Deployment conventions.
    pub fn custom(&self) -> &Customization {
        &self.custom
    }

    /// Saves the state document.
    pub fn persist(&self) -> Result<()> {
        self.store.persist()
    }

    /// Fetches the gradebook, and group memberships once they are stale.
    pub fn refresh(&mut self) -> Result<()> {
        self.store
            .gradebook_mut()
            .refresh(&self.remote)
            .context("Could not refresh the gradebook")?;
        self.store.set_username(self.settings.username());

        if self
            .store
            .groups()
            .is_stale(self.settings.group_ttl(), SystemTime::now())
        {
            self.refresh_groups()?;
        }
        self.store.persist()
    }

    /// Fetches group memberships unconditionally.
    pub fn refresh_groups(&mut self) -> Result<()> {
        let memberships = self
            .remote
            .fetch_group_memberships()
            .context("Could not fetch group memberships")?;
        tracing::info!("Fetched groups of {} students", memberships.len());
        self.store
            .groups_mut()
            .replace(memberships, SystemTime::now());
        self.store.persist()
    }

    /// Finds the attempt described by `spec` among visible students.
    pub fn find_attempt(&self, spec: &AttemptSpec) -> Result<Attempt, LookupError> {
        let gradebook = self.store.gradebook();
        let groups = self.store.groups();
        let visible = gradebook
            .students
            .values()
            .filter(|s| self.custom.is_visible(s, groups))
            .collect_vec();

        let Some(student) = visible
            .iter()
            .find(|s| self.custom.group_label(s, groups) == spec.group)
        else {
            return Err(LookupError::NoGroupFound {
                name:  spec.group.clone(),
                valid: visible
                    .iter()
                    .map(|s| self.custom.group_label(s, groups))
                    .sorted()
                    .dedup()
                    .collect(),
            });
        };

        let Some(assignment) = gradebook
            .assignments
            .values()
            .find(|a| self.custom.assignment_name(&a.name) == spec.assignment)
        else {
            return Err(LookupError::NoAssignmentFound {
                name:  spec.assignment.clone(),
                valid: gradebook
                    .assignments
                    .values()
                    .map(|a| self.custom.assignment_name(&a.name))
                    .collect(),
            });
        };

        let attempts = student
            .assignments
            .get(&assignment.id)
            .map(|sa| sa.attempts.as_slice())
            .unwrap_or_default();
        let index = if spec.index < 0 {
            attempts.len() as i64 + spec.index
        } else {
            spec.index
        };

        usize::try_from(index)
            .ok()
            .and_then(|i| attempts.get(i))
            .cloned()
            .ok_or_else(|| LookupError::NoAttempt {
                group:      spec.group.clone(),
                assignment: spec.assignment.clone(),
                index:      spec.index,
            })
    }

    /// Writes how the conventions apply to every student and attempt.
    pub fn check_report(&self, out: &mut dyn Write) -> io::Result<()> {
        let gradebook = self.store.gradebook();
        let groups = self.store.groups();

        writeln!(out, "Username: {}", self.settings.username())?;
        writeln!(out, "Course: {}", self.settings.course())?;

        let students = gradebook.students.values().map(|s| StudentCheckRow {
            name:     s.name.clone(),
            group:    self.custom.group_label(s, groups),
            visible:  self.custom.is_visible(s, groups),
            order_by: self.custom.ordering_key(s, groups).join(" / "),
        });
        writeln!(out, "{}", Table::new(students).with(Style::modern()))?;

        let attempts = gradebook.attempts().map(|(_, a)| AttemptCheckRow {
            attempt:   a.to_string(),
            directory: self.custom.directory_for(a, groups).display().to_string(),
        });
        writeln!(out, "{}", Table::new(attempts).with(Style::modern()))
    }

    /// Performs one run of the tool and prints the gradebook at the end.
    ///
    /// If the platform cannot be reached during the first refresh the run
    /// continues offline on cached state.
    pub fn run(&mut self, options: &RunOptions, out: &mut dyn Write) -> Result<()> {
        let mut online = options.refresh;
        if online && let Err(e) = self.refresh() {
            if !e
                .downcast_ref::<RemoteError>()
                .is_some_and(RemoteError::is_transport)
            {
                return Err(e);
            }
            tracing::warn!("Connection failed; continuing in offline mode: {e:#}");
            online = false;
        }

        if options.refresh_groups {
            self.refresh_groups()?;
        }
        if options.check {
            self.check_report(out)?;
        }
        if let Some(spec) = &options.download_attempt {
            let attempt = self.find_attempt(spec)?;
            materialize(&mut self.store, &self.remote, &self.custom, &attempt)?;
        }

        let selection = match options.download {
            0 => None,
            1 => Some(Selection::builder().needs_grading(true).needs_download(true).build()),
            2 => Some(Selection::builder().needs_download(true).build()),
            _ => Some(Selection::builder().visible(false).needs_download(true).build()),
        };
        if let Some(selection) = selection {
            let report = download_all(&mut self.store, &self.remote, &self.custom, &selection)?;
            for failure in &report.failures {
                writeln!(out, "Could not download {}: {:#}", failure.attempt, failure.error)?;
            }
        }

        if options.upload_check {
            upload_all(&self.store, &self.remote, &self.custom, UploadMode::DryRun)?
                .write_to(out)?;
        }
        if options.upload {
            upload_all(&self.store, &self.remote, &self.custom, UploadMode::Live)?
                .write_to(out)?;
            if online {
                self.refresh()?;
            }
        }

        writeln!(out, "{}", render_gradebook(&self.store, &self.custom))?;
        Ok(())
    }

    /// Runs and applies the error policy: save on success, keep the old
    /// state file on any failure, forget the token when it was rejected.
    pub fn execute(&mut self, options: &RunOptions, out: &mut dyn Write) -> RunOutcome {
        let failure = match self.run(options, out).and_then(|()| self.persist()) {
            Ok(()) => return RunOutcome::Saved,
            Err(e) => e,
        };

        match failure.downcast_ref::<RemoteError>() {
            Some(RemoteError::Parse { saved, .. }) => {
                tracing::error!("Parsing error: {failure:#}");
                RunOutcome::ParseFailure(saved.clone())
            }
            Some(RemoteError::BadCredentials { .. }) => {
                tracing::error!("{failure:#}. Forgetting token.");
                if let Err(e) = self.settings.forget_token() {
                    tracing::warn!("{e:#}");
                }
                RunOutcome::BadCredentials
            }
            _ => {
                tracing::error!("Uncaught error: {failure:?}");
                RunOutcome::Failed(format!("{failure:#}"))
            }
        }
    }
}
