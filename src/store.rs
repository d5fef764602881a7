#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Durable cache of attempt detail and local directories.
//!
//! The whole state lives in one JSON document. It is loaded once at startup
//! and rewritten at checkpoints; each write goes to a temporary file in the
//! same directory which then replaces the document, so a crash leaves either
//! the previous or the new version on disk. There is no lock: only one
//! process may use a state file at a time.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    gradebook::{Attempt, GroupCache, Gradebook},
    remote::AttemptDetail,
    types::AttemptKey,
};

/// Cached projection of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttemptStateRecord {
    /// Detail fetched from the platform; absent until the first fetch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail:    Option<AttemptDetail>,
    /// Directory the attempt was materialized into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl AttemptStateRecord {
    /// Stores freshly fetched detail, keeping the known directory.
    pub fn merge_detail(&mut self, detail: AttemptDetail) {
        self.detail = Some(detail);
    }

    /// Whether detail has been fetched.
    pub fn has_detail(&self) -> bool {
        self.detail.is_some()
    }
}

/// Returned for attempts that have no record yet.
static EMPTY_RECORD: AttemptStateRecord = AttemptStateRecord {
    detail:    None,
    directory: None,
};

/// The persisted document. Missing fields load as their defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Attempt records keyed by [`AttemptKey`].
    #[serde(default)]
    pub attempt_state: BTreeMap<AttemptKey, AttemptStateRecord>,
    /// Last fetched roster.
    #[serde(default)]
    pub gradebook:     Gradebook,
    /// Login the state belongs to.
    #[serde(default)]
    pub username:      Option<String>,
    /// Cached group memberships.
    #[serde(default)]
    pub groups:        GroupCache,
}

/// Handle on the state document, passed to every pipeline step.
#[derive(Debug)]
pub struct StateStore {
    /// Location of the document.
    path:  PathBuf,
    /// In-memory copy.
    state: PersistedState,
}

impl StateStore {
    /// Loads the document at `path`; a missing file gives an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text)
                .with_context(|| format!("Could not parse state file {}", path.display()))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No state file at {}, starting empty", path.display());
                PersistedState::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Could not read state file {}", path.display()));
            }
        };

        Ok(Self { path, state })
    }

    /// Writes the whole document.
    pub fn persist(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_owned());
        let tmp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let json =
            serde_json::to_string_pretty(&self.state).context("Could not serialize state")?;
        let written = (|| -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Could not write {}", self.path.display()));
        }
        tracing::trace!("Saved state to {}", self.path.display());
        Ok(())
    }

    /// Record of `attempt`, or an empty record if none is cached.
    pub fn get(&self, attempt: &Attempt) -> &AttemptStateRecord {
        self.state
            .attempt_state
            .get(&attempt.key())
            .unwrap_or(&EMPTY_RECORD)
    }

    /// Record of `attempt`, created empty if absent.
    pub fn get_or_create(&mut self, attempt: &Attempt) -> &mut AttemptStateRecord {
        self.state
            .attempt_state
            .entry(attempt.key())
            .or_default()
    }

    /// All records by key.
    pub fn records(&self) -> &BTreeMap<AttemptKey, AttemptStateRecord> {
        &self.state.attempt_state
    }

    /// Location of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached roster.
    pub fn gradebook(&self) -> &Gradebook {
        &self.state.gradebook
    }

    /// Mutable cached roster.
    pub fn gradebook_mut(&mut self) -> &mut Gradebook {
        &mut self.state.gradebook
    }

    /// Cached group memberships.
    pub fn groups(&self) -> &GroupCache {
        &self.state.groups
    }

    /// Mutable cached group memberships.
    pub fn groups_mut(&mut self) -> &mut GroupCache {
        &mut self.state.groups
    }

    /// Login the state belongs to.
    pub fn username(&self) -> Option<&str> {
        self.state.username.as_deref()
    }

    /// Records the login the state belongs to.
    pub fn set_username(&mut self, username: impl Into<String>) {
        self.state.username = Some(username.into());
    }

    /// The in-memory document.
    pub fn state(&self) -> &PersistedState {
        &self.state
    }
}
