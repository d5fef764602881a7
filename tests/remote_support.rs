#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fs,
    io::{Cursor, Read},
    path::{Path, PathBuf},
};

use bbfetch::{
    customize::Customization,
    gradebook::{
        Assignment, AssignmentRef, Attempt, Gradebook, Group, GroupEntry, GroupMemberships,
        Student, StudentAssignment, StudentRef,
    },
    remote::{AttemptDetail, GradeSubmission, RemoteClient, RemoteError},
    store::StateStore,
};
use uuid::Uuid;

pub const ASSIGNMENT_ID: &str = "_10_1";
pub const ASSIGNMENT_NAME: &str = "Week 1";

/// Scripted platform: answers from fixed data and counts every call.
#[derive(Default)]
pub struct FakeRemote {
    pub gradebook:       Gradebook,
    pub details:         BTreeMap<String, AttemptDetail>,
    pub downloads:       BTreeMap<String, Vec<u8>>,
    pub groups:          GroupMemberships,
    pub offline:         Cell<bool>,
    pub reject_login:    Cell<bool>,
    /// When set, every call fails as an unparseable response saved here.
    pub malformed:       RefCell<Option<PathBuf>>,
    pub gradebook_calls: Cell<usize>,
    pub detail_calls:    Cell<usize>,
    pub download_calls:  Cell<usize>,
    pub group_calls:     Cell<usize>,
    pub submitted:       RefCell<Vec<GradeSubmission>>,
}

impl FakeRemote {
    fn guard(&self) -> Result<(), RemoteError> {
        if self.offline.get() {
            return Err(RemoteError::Transport("connection refused".into()));
        }
        if let Some(saved) = self.malformed.borrow().clone() {
            return Err(RemoteError::Parse {
                context: "reading the gradebook".into(),
                saved,
            });
        }
        if self.reject_login.get() {
            return Err(RemoteError::BadCredentials {
                username: "grader".into(),
            });
        }
        Ok(())
    }
}

impl RemoteClient for FakeRemote {
    fn fetch_gradebook(&self) -> Result<Gradebook, RemoteError> {
        self.guard()?;
        self.gradebook_calls.set(self.gradebook_calls.get() + 1);
        Ok(self.gradebook.clone())
    }

    fn fetch_attempt_detail(
        &self,
        attempt_id: &str,
        _group: bool,
    ) -> Result<AttemptDetail, RemoteError> {
        self.guard()?;
        self.detail_calls.set(self.detail_calls.get() + 1);
        Ok(self.details.get(attempt_id).cloned().unwrap_or_default())
    }

    fn open_download(&self, link: &str) -> Result<Box<dyn Read + '_>, RemoteError> {
        self.guard()?;
        self.download_calls.set(self.download_calls.get() + 1);
        match self.downloads.get(link) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(RemoteError::Transport(format!("404 for {link}"))),
        }
    }

    fn submit_grade(&self, submission: &GradeSubmission) -> Result<(), RemoteError> {
        self.guard()?;
        self.submitted.borrow_mut().push(submission.clone());
        Ok(())
    }

    fn fetch_group_memberships(&self) -> Result<GroupMemberships, RemoteError> {
        self.guard()?;
        self.group_calls.set(self.group_calls.get() + 1);
        Ok(self.groups.clone())
    }
}

pub fn temp_root(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("bbfetch-{tag}-{}", Uuid::new_v4()));
    fs::create_dir_all(&root).expect("create temp root");
    root
}

pub fn store_in(root: &Path) -> StateStore {
    StateStore::load(root.join("grading.json")).expect("load store")
}

/// Conventions storing every attempt in `root/<attempt id>`.
pub fn custom_in(root: &Path) -> Customization {
    let root = root.to_path_buf();
    Customization::default().with_directory_name(move |ctx| root.join(&ctx.attempt.id))
}

pub fn attempt(id: &str, username: &str, needs_grading: bool, score: Option<f64>) -> Attempt {
    Attempt {
        id: id.into(),
        assignment: AssignmentRef {
            id:               ASSIGNMENT_ID.into(),
            name:             ASSIGNMENT_NAME.into(),
            group_assignment: true,
        },
        student: StudentRef {
            id:         format!("_{username}"),
            username:   username.into(),
            name:       username.to_uppercase(),
            group_name: None,
        },
        needs_grading,
        score,
        submitted: format!("2024-01-01 {id}"),
    }
}

pub fn student(username: &str, name: &str, attempts: Vec<Attempt>) -> Student {
    let mut assignments = BTreeMap::new();
    assignments.insert(ASSIGNMENT_ID.to_owned(), StudentAssignment { attempts });
    Student {
        id: format!("_{username}"),
        username: username.into(),
        name: name.into(),
        score: 0.0,
        assignments,
    }
}

pub fn gradebook(students: Vec<Student>) -> Gradebook {
    let mut gradebook = Gradebook::default();
    gradebook.assignments.insert(
        ASSIGNMENT_ID.into(),
        Assignment {
            id:               ASSIGNMENT_ID.into(),
            name:             ASSIGNMENT_NAME.into(),
            group_assignment: true,
        },
    );
    for s in students {
        gradebook.students.insert(s.id.clone(), s);
    }
    gradebook
}

pub fn memberships(entries: &[(&str, &str)]) -> GroupMemberships {
    entries
        .iter()
        .map(|(username, group)| {
            (
                (*username).to_owned(),
                GroupEntry {
                    groups: vec![Group {
                        name: (*group).to_owned(),
                        id:   format!("_{group}"),
                    }],
                },
            )
        })
        .collect()
}

pub fn text_detail(submission: &str) -> AttemptDetail {
    AttemptDetail {
        submission: Some(submission.into()),
        ..Default::default()
    }
}
