use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::INDIVIDUAL_KEY_SUFFIX;

/// Cache key of one attempt.
///
/// Group and individual attempts share the platform's id namespace, so the
/// key of an individual attempt carries a suffix.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptKey(String);

impl AttemptKey {
    /// Derives the key for `attempt_id` on a group or individual assignment.
    pub fn new(attempt_id: &str, group_assignment: bool) -> Self {
        if group_assignment {
            Self(attempt_id.to_owned())
        } else {
            Self(format!("{attempt_id}{INDIVIDUAL_KEY_SUFFIX}"))
        }
    }

    /// Returns the key as it is stored in the state document.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
