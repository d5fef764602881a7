#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fs, io, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use typed_builder::TypedBuilder;

use crate::constants::{
    DEFAULT_ACCEPT_PATTERN, DEFAULT_DIRECTORY_TEMPLATE, DEFAULT_GROUP_TTL_HOURS,
    DEFAULT_REHANDIN_PATTERN, DEFAULT_STATE_FILE, DEFAULT_TOKEN_FILE,
};

/// A regex with its replacement text, used to abbreviate display names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Pattern to search for.
    pub pattern:     String,
    /// Replacement, may refer to capture groups (`$1`).
    pub replacement: String,
}

impl Rewrite {
    /// Parses `PATTERN=>REPLACEMENT`.
    pub fn parse(value: &str) -> Result<Self> {
        let (pattern, replacement) = value
            .split_once("=>")
            .with_context(|| format!("Expected `PATTERN=>REPLACEMENT`, got `{value}`"))?;
        Ok(Self {
            pattern:     pattern.trim().to_owned(),
            replacement: replacement.trim().to_owned(),
        })
    }
}

/// Deployment settings for one grader and one course.
#[derive(Debug, Clone, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Settings {
    /// API root of the course platform.
    #[builder(default = "http://localhost:8080/api".to_owned())]
    base_url:           String,
    /// Course id, e.g. `_49454_1`.
    course:             String,
    /// Login of the grader.
    username:           String,
    /// Token supplied through the environment.
    #[builder(default)]
    token:              Option<String>,
    /// Where a token is cached between runs.
    #[builder(default = PathBuf::from(DEFAULT_TOKEN_FILE))]
    token_file:         PathBuf,
    /// Location of the persisted state document.
    #[builder(default = PathBuf::from(DEFAULT_STATE_FILE))]
    state_path:         PathBuf,
    /// Groups whose members are shown; empty shows everyone.
    #[builder(default)]
    classes:            Vec<String>,
    /// Abbreviation applied to group names.
    #[builder(default)]
    group_display:      Option<Rewrite>,
    /// Abbreviation applied to assignment names.
    #[builder(default)]
    assignment_display: Option<Rewrite>,
    /// Where hand-ins are stored, see [`crate::customize`].
    #[builder(default = DEFAULT_DIRECTORY_TEMPLATE.to_owned())]
    directory_template: String,
    /// Pattern marking feedback that asks for a new hand-in.
    #[builder(default = DEFAULT_REHANDIN_PATTERN.to_owned())]
    rehandin_pattern:   String,
    /// Pattern marking accepted hand-ins.
    #[builder(default = DEFAULT_ACCEPT_PATTERN.to_owned())]
    accept_pattern:     String,
    /// How long cached group memberships stay fresh.
    #[builder(default = Duration::from_secs(DEFAULT_GROUP_TTL_HOURS * 3600))]
    group_ttl:          Duration,
}

impl Settings {
    /// Reads settings from `BBFETCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let Some(course) = env("BBFETCH_COURSE") else {
            bail!("BBFETCH_COURSE must be set to the platform course id");
        };
        let Some(username) = env("BBFETCH_USERNAME") else {
            bail!("BBFETCH_USERNAME must be set to your platform login");
        };

        let classes = env("BBFETCH_CLASSES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let group_display = env("BBFETCH_GROUP_DISPLAY")
            .map(|v| Rewrite::parse(&v))
            .transpose()
            .context("Invalid BBFETCH_GROUP_DISPLAY")?;
        let assignment_display = env("BBFETCH_ASSIGNMENT_DISPLAY")
            .map(|v| Rewrite::parse(&v))
            .transpose()
            .context("Invalid BBFETCH_ASSIGNMENT_DISPLAY")?;
        let group_ttl_hours = match env("BBFETCH_GROUP_TTL_HOURS") {
            Some(v) => v
                .parse::<u64>()
                .with_context(|| format!("BBFETCH_GROUP_TTL_HOURS is not a number: `{v}`"))?,
            None => DEFAULT_GROUP_TTL_HOURS,
        };

        Ok(Self {
            base_url: env("BBFETCH_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080/api".to_owned()),
            course,
            username,
            token: env("BBFETCH_TOKEN"),
            token_file: env("BBFETCH_TOKEN_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE)),
            state_path: env("BBFETCH_STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_FILE)),
            classes,
            group_display,
            assignment_display,
            directory_template: env("BBFETCH_DIRECTORY_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_DIRECTORY_TEMPLATE.to_owned()),
            rehandin_pattern: env("BBFETCH_REHANDIN_REGEX")
                .unwrap_or_else(|| DEFAULT_REHANDIN_PATTERN.to_owned()),
            accept_pattern: env("BBFETCH_ACCEPT_REGEX")
                .unwrap_or_else(|| DEFAULT_ACCEPT_PATTERN.to_owned()),
            group_ttl: Duration::from_secs(group_ttl_hours * 3600),
        })
    }

    /// Returns the API root.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the course id.
    pub fn course(&self) -> &str {
        &self.course
    }

    /// Returns the grader's login.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the state document path.
    pub fn state_path(&self) -> &std::path::Path {
        &self.state_path
    }

    /// Returns the token cache path.
    pub fn token_file(&self) -> &std::path::Path {
        &self.token_file
    }

    /// Returns the groups whose members are shown.
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Returns the group name abbreviation, if any.
    pub fn group_display(&self) -> Option<&Rewrite> {
        self.group_display.as_ref()
    }

    /// Returns the assignment name abbreviation, if any.
    pub fn assignment_display(&self) -> Option<&Rewrite> {
        self.assignment_display.as_ref()
    }

    /// Returns the directory template.
    pub fn directory_template(&self) -> &str {
        &self.directory_template
    }

    /// Returns the rehandin pattern.
    pub fn rehandin_pattern(&self) -> &str {
        &self.rehandin_pattern
    }

    /// Returns the accept pattern.
    pub fn accept_pattern(&self) -> &str {
        &self.accept_pattern
    }

    /// Returns the group cache lifetime.
    pub fn group_ttl(&self) -> Duration {
        self.group_ttl
    }

    /// Token from the environment, else the cached one.
    ///
    /// A token given through the environment is cached for later runs.
    pub fn load_token(&self) -> Option<String> {
        if let Some(token) = &self.token {
            if let Err(e) = fs::write(&self.token_file, token) {
                tracing::warn!("Could not cache token in {}: {e}", self.token_file.display());
            }
            return Some(token.clone());
        }

        fs::read_to_string(&self.token_file)
            .ok()
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
    }

    /// Deletes the cached token after the platform rejected it.
    pub fn forget_token(&self) -> Result<()> {
        match fs::remove_file(&self.token_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Could not delete {}", self.token_file.display())),
        }
    }
}

/// Reads a trimmed, non-empty environment variable.
fn env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_parses_pattern_and_replacement() {
        let rewrite = Rewrite::parse(r"Class DA(\d+) => $1").expect("parse");
        assert_eq!(rewrite.pattern, r"Class DA(\d+)");
        assert_eq!(rewrite.replacement, "$1");
        assert!(Rewrite::parse("no arrow").is_err());
    }

    #[test]
    fn builder_applies_defaults() {
        let settings = Settings::builder()
            .course("_1_1")
            .username("grader")
            .build();
        assert_eq!(settings.state_path(), std::path::Path::new(DEFAULT_STATE_FILE));
        assert_eq!(settings.rehandin_pattern(), DEFAULT_REHANDIN_PATTERN);
        assert!(settings.classes().is_empty());
        assert_eq!(settings.group_ttl(), Duration::from_secs(DEFAULT_GROUP_TTL_HOURS * 3600));
    }
}
