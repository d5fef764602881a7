#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Per-deployment conventions.
//!
//! How hand-ins are named on disk, which students a grader sees and how they
//! are sorted differ between courses and teaching assistants. A
//! [`Customization`] bundles these decisions as plain closures; the pipelines
//! only ever call through it.
//!
//! Directory templates understand these placeholders:
//!
//! | placeholder    | value                                               |
//! |----------------|-----------------------------------------------------|
//! | `{assignment}` | abbreviated assignment name                         |
//! | `{group}`      | abbreviated group label of the student              |
//! | `{name}`       | student (or group) display name                     |
//! | `{username}`   | student login                                       |
//! | `{id}`         | attempt id without the platform's `_` / `_1` affixes |
//! | `{raw_id}`     | attempt id as reported                              |

use std::path::PathBuf;

use anyhow::{Context, Result};
use regex::Regex;

use crate::{
    config::{Rewrite, Settings},
    feedback::FeedbackPatterns,
    gradebook::{Attempt, Group, GroupCache, Student},
    util::{expand_home, sanitize_component},
};

/// Label used for students without any group.
pub const NO_GROUP_LABEL: &str = "-";

/// Values available when naming an attempt's directory.
#[derive(Debug, Clone)]
pub struct NamingContext<'a> {
    /// The attempt being stored.
    pub attempt:    &'a Attempt,
    /// Abbreviated assignment name.
    pub assignment: String,
    /// Group label of the owning student.
    pub group:      String,
}

/// Chooses the directory of an attempt.
type DirectoryFn = Box<dyn Fn(&NamingContext<'_>) -> PathBuf>;
/// Decides whether a student is shown, given their groups.
type VisibleFn = Box<dyn Fn(&Student, &[Group]) -> bool>;
/// Sort key of a student, given their group label.
type OrderingFn = Box<dyn Fn(&Student, &str) -> Vec<String>>;
/// Label of a student's groups; `None` when no group qualifies.
type GroupDisplayFn = Box<dyn Fn(&[Group]) -> Option<String>>;
/// Abbreviation of an assignment name.
type AssignmentDisplayFn = Box<dyn Fn(&str) -> String>;

/// Deployment conventions used by the pipelines and the gradebook view.
pub struct Customization {
    /// Directory naming strategy.
    directory_name:     DirectoryFn,
    /// Visibility predicate.
    visible:            VisibleFn,
    /// Student ordering.
    ordering_key:       OrderingFn,
    /// Group label.
    group_display:      GroupDisplayFn,
    /// Assignment abbreviation.
    assignment_display: AssignmentDisplayFn,
    /// Score inference rules.
    feedback:           FeedbackPatterns,
}

impl Default for Customization {
    /// Everyone visible, sorted by group then name, directories below the
    /// working directory.
    fn default() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            directory_name:     Box::new(move |ctx| {
                cwd.join(sanitize_component(&ctx.attempt.assignment.name))
                    .join(format!("{} ({})", sanitize_component(&ctx.group), ctx.attempt.id))
            }),
            visible:            Box::new(|_, _| true),
            ordering_key:       Box::new(|student, group| vec![group.to_owned(), student.name.clone()]),
            group_display:      Box::new(|groups| groups.first().map(|g| g.name.clone())),
            assignment_display: Box::new(str::to_owned),
            feedback:           FeedbackPatterns::default(),
        }
    }
}

impl Customization {
    /// Builds the conventions described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let feedback = FeedbackPatterns::new(settings.rehandin_pattern(), settings.accept_pattern())
            .context("Invalid feedback pattern")?;
        let group_rewrite = settings
            .group_display()
            .map(compile_rewrite)
            .transpose()
            .context("Invalid group display pattern")?;
        let assignment_rewrite = settings
            .assignment_display()
            .map(compile_rewrite)
            .transpose()
            .context("Invalid assignment display pattern")?;
        let classes = settings.classes().to_vec();
        let template = settings.directory_template().to_owned();
        let cwd = std::env::current_dir().context("Could not determine working directory")?;

        let mut custom = Self::default()
            .with_feedback_patterns(feedback)
            .with_directory_name(move |ctx| {
                let path = render_template(&template, ctx);
                if path.is_relative() { cwd.join(path) } else { path }
            });

        if !classes.is_empty() {
            custom = custom.with_visibility(move |_, groups| {
                groups.iter().any(|g| classes.iter().any(|c| *c == g.name))
            });
        }
        if let Some((re, replacement)) = group_rewrite {
            custom = custom.with_group_display(move |groups| {
                groups
                    .iter()
                    .find(|g| re.is_match(&g.name))
                    .map(|g| re.replace(&g.name, replacement.as_str()).into_owned())
            });
        }
        if let Some((re, replacement)) = assignment_rewrite {
            custom = custom.with_assignment_display(move |name| {
                re.replace(name, replacement.as_str()).into_owned()
            });
        }

        Ok(custom)
    }

    /// Sets the directory naming strategy.
    pub fn with_directory_name<F>(mut self, f: F) -> Self
    where
        F: Fn(&NamingContext<'_>) -> PathBuf + 'static,
    {
        self.directory_name = Box::new(f);
        self
    }

    /// Sets the visibility predicate.
    pub fn with_visibility<F>(mut self, f: F) -> Self
    where
        F: Fn(&Student, &[Group]) -> bool + 'static,
    {
        self.visible = Box::new(f);
        self
    }

    /// Sets the student ordering.
    pub fn with_ordering_key<F>(mut self, f: F) -> Self
    where
        F: Fn(&Student, &str) -> Vec<String> + 'static,
    {
        self.ordering_key = Box::new(f);
        self
    }

    /// Sets the group label.
    pub fn with_group_display<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Group]) -> Option<String> + 'static,
    {
        self.group_display = Box::new(f);
        self
    }

    /// Sets the assignment abbreviation.
    pub fn with_assignment_display<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> String + 'static,
    {
        self.assignment_display = Box::new(f);
        self
    }

    /// Sets the score inference rules.
    pub fn with_feedback_patterns(mut self, patterns: FeedbackPatterns) -> Self {
        self.feedback = patterns;
        self
    }

    /// Score inference rules.
    pub fn feedback(&self) -> &FeedbackPatterns {
        &self.feedback
    }

    /// Whether `student` is shown to this grader.
    pub fn is_visible(&self, student: &Student, groups: &GroupCache) -> bool {
        (self.visible)(student, groups.groups_of(&student.username))
    }

    /// Group label of `student`, [`NO_GROUP_LABEL`] when none applies.
    pub fn group_label(&self, student: &Student, groups: &GroupCache) -> String {
        self.group_label_of(&student.username, groups)
    }

    /// Group label of the student with login `username`.
    fn group_label_of(&self, username: &str, groups: &GroupCache) -> String {
        let groups = groups.groups_of(username);
        if groups.is_empty() {
            return NO_GROUP_LABEL.to_owned();
        }
        (self.group_display)(groups).unwrap_or_default()
    }

    /// Sort key of `student`.
    pub fn ordering_key(&self, student: &Student, groups: &GroupCache) -> Vec<String> {
        (self.ordering_key)(student, &self.group_label(student, groups))
    }

    /// Abbreviated name of an assignment.
    pub fn assignment_name(&self, name: &str) -> String {
        (self.assignment_display)(name)
    }

    /// Directory an attempt should be stored in.
    pub fn directory_for(&self, attempt: &Attempt, groups: &GroupCache) -> PathBuf {
        let group = match &attempt.student.group_name {
            Some(name) => name.clone(),
            None => self.group_label_of(&attempt.student.username, groups),
        };
        let ctx = NamingContext {
            attempt,
            assignment: self.assignment_name(&attempt.assignment.name),
            group,
        };
        (self.directory_name)(&ctx)
    }
}

/// Compiles a display rewrite.
fn compile_rewrite(rewrite: &Rewrite) -> Result<(Regex, String)> {
    let re = Regex::new(&rewrite.pattern)
        .with_context(|| format!("Could not compile `{}`", rewrite.pattern))?;
    Ok((re, rewrite.replacement.clone()))
}

/// Attempt id without the platform's leading `_` and trailing `_1`.
pub fn short_attempt_id(id: &str) -> &str {
    let id = id.strip_prefix('_').unwrap_or(id);
    id.strip_suffix("_1").unwrap_or(id)
}

/// Fills the placeholders of a directory template.
pub fn render_template(template: &str, ctx: &NamingContext<'_>) -> PathBuf {
    let student = &ctx.attempt.student;
    let rendered = [
        ("{assignment}", sanitize_component(&ctx.assignment)),
        ("{group}", sanitize_component(&ctx.group)),
        ("{name}", sanitize_component(&student.name)),
        ("{username}", sanitize_component(&student.username)),
        ("{id}", sanitize_component(short_attempt_id(&ctx.attempt.id))),
        ("{raw_id}", sanitize_component(&ctx.attempt.id)),
    ]
    .iter()
    .fold(template.to_owned(), |acc, (key, value)| acc.replace(key, value));

    expand_home(&rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradebook::{AssignmentRef, StudentRef};

    fn attempt() -> Attempt {
        Attempt {
            id:            "_456_1".into(),
            assignment:    AssignmentRef {
                id:               "_9_1".into(),
                name:             "Week 3 Handin".into(),
                group_assignment: true,
            },
            student:       StudentRef {
                id:         "_7_1".into(),
                username:   "au123".into(),
                name:       "Ada Lovelace".into(),
                group_name: Some("Hold 2/3".into()),
            },
            needs_grading: true,
            score:         None,
            submitted:     "2024-02-01".into(),
        }
    }

    #[test]
    fn short_ids_drop_platform_affixes() {
        assert_eq!(short_attempt_id("_456_1"), "456");
        assert_eq!(short_attempt_id("456"), "456");
    }

    #[test]
    fn template_placeholders_are_filled_and_sanitized() {
        let attempt = attempt();
        let ctx = NamingContext {
            attempt:    &attempt,
            assignment: "3".into(),
            group:      "Hold 2/3".into(),
        };
        let path = render_template("/grading/W{assignment}/{group}_{id}-{username}", &ctx);
        assert_eq!(path, PathBuf::from("/grading/W3/Hold 2_3_456-au123"));
    }
}
