#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::BTreeMap,
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use crate::{
    remote::{RemoteClient, RemoteError},
    types::AttemptKey,
};

/// The part of an assignment every attempt carries along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRef {
    /// Platform id of the assignment.
    pub id:               String,
    /// Full assignment name as shown on the platform.
    pub name:             String,
    /// Whether hand-ins are submitted by groups rather than individuals.
    #[serde(default)]
    pub group_assignment: bool,
}

/// The student (or group) that handed in an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRef {
    /// Platform id of the student or group.
    pub id:         String,
    /// Login name.
    pub username:   String,
    /// Display name.
    pub name:       String,
    /// Group the hand-in was made by, for group assignments.
    #[serde(default)]
    pub group_name: Option<String>,
}

/// One hand-in for a given assignment and student or group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Opaque platform id.
    pub id:            String,
    /// Owning assignment.
    pub assignment:    AssignmentRef,
    /// Owning student or group.
    pub student:       StudentRef,
    /// Whether the platform still lists the attempt as ungraded.
    #[serde(default)]
    pub needs_grading: bool,
    /// Current score, if graded.
    #[serde(default)]
    pub score:         Option<f64>,
    /// Submission timestamp as reported by the platform; orders attempts.
    #[serde(default)]
    pub submitted:     String,
}

impl Attempt {
    /// Cache key of this attempt.
    pub fn key(&self) -> AttemptKey {
        AttemptKey::new(&self.id, self.assignment.group_assignment)
    }

    /// Whether the attempt belongs to a group assignment.
    pub fn is_group(&self) -> bool {
        self.assignment.group_assignment
    }

    /// Ordering key: submission time, then id.
    pub fn sort_key(&self) -> (&str, &str) {
        (&self.submitted, &self.id)
    }
}

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.assignment.name, self.student.name, self.id)
    }
}

/// An assignment in the course gradebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Platform id.
    pub id:               String,
    /// Full name.
    pub name:             String,
    /// Whether hand-ins are submitted by groups.
    #[serde(default)]
    pub group_assignment: bool,
}

/// The attempts one student made on one assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentAssignment {
    /// Attempts, oldest first.
    #[serde(default)]
    pub attempts: Vec<Attempt>,
}

/// A student enrolled in the course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Platform id.
    pub id:          String,
    /// Login name.
    pub username:    String,
    /// Display name.
    pub name:        String,
    /// Total score in the gradebook.
    #[serde(default)]
    pub score:       f64,
    /// Per-assignment attempts keyed by assignment id.
    #[serde(default)]
    pub assignments: BTreeMap<String, StudentAssignment>,
}

impl fmt::Display for Student {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Roster snapshot: students, assignments and their attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gradebook {
    /// Students keyed by platform id.
    #[serde(default)]
    pub students:    BTreeMap<String, Student>,
    /// Assignments keyed by platform id.
    #[serde(default)]
    pub assignments: BTreeMap<String, Assignment>,
}

impl Gradebook {
    /// Replaces the snapshot with a freshly fetched roster.
    pub fn refresh(&mut self, remote: &dyn RemoteClient) -> Result<(), RemoteError> {
        let mut fresh = remote.fetch_gradebook()?;
        for student in fresh.students.values_mut() {
            for assignment in student.assignments.values_mut() {
                assignment
                    .attempts
                    .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            }
        }
        tracing::info!(
            "Gradebook has {} students and {} assignments",
            fresh.students.len(),
            fresh.assignments.len()
        );
        *self = fresh;
        Ok(())
    }

    /// Iterates over every attempt together with the student it is listed
    /// under.
    pub fn attempts(&self) -> impl Iterator<Item = (&Student, &Attempt)> {
        self.students.values().flat_map(|student| {
            student
                .assignments
                .values()
                .flat_map(move |sa| sa.attempts.iter().map(move |attempt| (student, attempt)))
        })
    }

    /// Whether the snapshot holds no students.
    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }
}

/// A group a student belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group name as shown on the platform.
    pub name: String,
    /// Platform id.
    pub id:   String,
}

/// The groups of one student.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Memberships in platform order.
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// Group memberships keyed by username.
pub type GroupMemberships = BTreeMap<String, GroupEntry>;

/// Cached group memberships with the time they were fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupCache {
    /// Memberships keyed by username.
    #[serde(default)]
    pub memberships: GroupMemberships,
    /// Unix time (seconds) of the last fetch; `None` if never fetched.
    #[serde(default)]
    pub fetched_at:  Option<u64>,
}

impl GroupCache {
    /// Groups of `username`, empty if unknown.
    pub fn groups_of(&self, username: &str) -> &[Group] {
        self.memberships
            .get(username)
            .map(|entry| entry.groups.as_slice())
            .unwrap_or(&[])
    }

    /// Whether the cache should be fetched again at time `now`.
    pub fn is_stale(&self, ttl: Duration, now: SystemTime) -> bool {
        let Some(fetched_at) = self.fetched_at else {
            return true;
        };
        if self.memberships.is_empty() {
            return true;
        }
        let now = unix_seconds(now);
        now.saturating_sub(fetched_at) > ttl.as_secs()
    }

    /// Replaces the memberships wholesale.
    pub fn replace(&mut self, memberships: GroupMemberships, now: SystemTime) {
        self.memberships = memberships;
        self.fetched_at = Some(unix_seconds(now));
    }

    /// Forces the next staleness check to report stale.
    pub fn invalidate(&mut self) {
        self.fetched_at = None;
    }
}

/// Seconds since the unix epoch, clamped to zero for earlier times.
fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
