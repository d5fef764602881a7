//! # bbfetch
//!
//! Keeps a grader's local copy of a course platform's hand-ins in sync:
//! downloads what needs grading, infers grades from the grader's feedback
//! files and uploads them, and prints a compact gradebook.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Environment-driven settings
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// Per-deployment naming, visibility and ordering conventions
pub mod customize;
/// Fetching attempt detail and writing hand-ins to disk
pub mod download;
/// Inferring scores from feedback text
pub mod feedback;
/// Students, assignments, attempts and group memberships
pub mod gradebook;
/// The grading session driving one run of the tool
pub mod grading;
/// Access to the course platform
pub mod remote;
/// The text gradebook
pub mod render;
/// The persisted attempt state
pub mod store;
/// Small shared types
pub mod types;
/// Pushing grades and feedback to the platform
pub mod upload;
/// Utility functions for convenience
pub mod util;

pub use crate::{
    config::Settings,
    customize::Customization,
    grading::{Grading, RunOptions, RunOutcome},
    remote::{HttpRemote, RemoteClient, RemoteError},
    store::StateStore,
};
