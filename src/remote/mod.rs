#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Boundary to the course platform.
//!
//! Everything the grading core needs from the platform goes through
//! [`RemoteClient`]. [`HttpRemote`] is the blocking HTTP implementation used
//! by the command line tool.

/// Blocking HTTP implementation of the platform client.
pub mod http;

use std::{io::Read, path::PathBuf};

use serde::{Deserialize, Serialize};

pub use self::http::HttpRemote;
use crate::gradebook::{GroupMemberships, Gradebook};

/// Where the bytes of a file come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// Must be fetched from this link.
    DownloadLink(String),
    /// Inline text.
    Contents(String),
}

/// A file listed in an attempt's detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    /// Name the file was uploaded under.
    pub filename: String,
    /// How to obtain the content.
    #[serde(flatten)]
    pub source:   FileSource,
}

/// Server-side detail of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptDetail {
    /// Free text typed into the hand-in form.
    #[serde(default)]
    pub submission:     Option<String>,
    /// Comments the student left with the hand-in.
    #[serde(default)]
    pub comments:       Option<String>,
    /// Files the student submitted.
    #[serde(default)]
    pub files:          Vec<RemoteFile>,
    /// Feedback already given on the platform.
    #[serde(default)]
    pub feedback:       Option<String>,
    /// Feedback attachments already on the platform.
    #[serde(default)]
    pub feedback_files: Vec<RemoteFile>,
}

/// A grade to push to the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeSubmission {
    /// Platform id of the attempt.
    pub attempt_id:  String,
    /// Whether the attempt belongs to a group assignment.
    pub group:       bool,
    /// Score to record.
    pub score:       f64,
    /// Feedback text shown to the student.
    pub feedback:    String,
    /// Annotated files to attach.
    pub attachments: Vec<PathBuf>,
}

/// Failures reported by a [`RemoteClient`].
#[derive(thiserror::Error, Debug)]
pub enum RemoteError {
    /// Network or connection failure; cached state stays usable.
    #[error("Could not reach the course platform: {0}")]
    Transport(String),
    /// The platform rejected the credentials.
    #[error("The course platform rejected the credentials for `{username}`")]
    BadCredentials {
        /// Login the request was made for.
        username: String,
    },
    /// The platform answered with something that could not be understood.
    #[error("Unexpected response while {context}; response saved to {}", .saved.display())]
    Parse {
        /// What was being fetched.
        context: String,
        /// Where the raw response was saved for diagnosis.
        saved:   PathBuf,
    },
    /// A local attachment could not be read for upload.
    #[error("Could not read attachment {}", .path.display())]
    Attachment {
        /// Attachment path.
        path:   PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl RemoteError {
    /// Whether this is a connection-level failure.
    pub fn is_transport(&self) -> bool {
        matches!(self, RemoteError::Transport(_))
    }

    /// Whether the platform rejected the credentials.
    pub fn is_bad_credentials(&self) -> bool {
        matches!(self, RemoteError::BadCredentials { .. })
    }
}

/// Authenticated access to the course platform.
pub trait RemoteClient {
    /// Fetches the full roster with assignments and attempt lists.
    fn fetch_gradebook(&self) -> Result<Gradebook, RemoteError>;

    /// Fetches the detail (texts and file listings) of one attempt.
    fn fetch_attempt_detail(
        &self,
        attempt_id: &str,
        group: bool,
    ) -> Result<AttemptDetail, RemoteError>;

    /// Opens a download link as a byte stream.
    fn open_download(&self, link: &str) -> Result<Box<dyn Read + '_>, RemoteError>;

    /// Records a grade, feedback and attachments for one attempt.
    fn submit_grade(&self, submission: &GradeSubmission) -> Result<(), RemoteError>;

    /// Fetches every student's group memberships.
    fn fetch_group_memberships(&self) -> Result<GroupMemberships, RemoteError>;
}

impl<T: RemoteClient + ?Sized> RemoteClient for &T {
    fn fetch_gradebook(&self) -> Result<Gradebook, RemoteError> {
        (**self).fetch_gradebook()
    }

    fn fetch_attempt_detail(
        &self,
        attempt_id: &str,
        group: bool,
    ) -> Result<AttemptDetail, RemoteError> {
        (**self).fetch_attempt_detail(attempt_id, group)
    }

    fn open_download(&self, link: &str) -> Result<Box<dyn Read + '_>, RemoteError> {
        (**self).open_download(link)
    }

    fn submit_grade(&self, submission: &GradeSubmission) -> Result<(), RemoteError> {
        (**self).submit_grade(submission)
    }

    fn fetch_group_memberships(&self) -> Result<GroupMemberships, RemoteError> {
        (**self).fetch_group_memberships()
    }
}
