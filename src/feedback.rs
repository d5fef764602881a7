#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use regex::{Regex, RegexBuilder};

use crate::constants::{DEFAULT_ACCEPT_PATTERN, DEFAULT_REHANDIN_PATTERN};

/// Score given to a hand-in whose feedback asks for a new hand-in.
pub const REHANDIN_SCORE: f64 = 0.0;

/// Score given to an accepted hand-in.
pub const ACCEPT_SCORE: f64 = 1.0;

/// Errors raised while reading a score out of feedback text.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedbackError {
    /// Both the accept and the rehandin rule matched.
    #[error("feedback indicates both accept and rehandin")]
    Conflicting,
}

/// The two rules deciding a hand-in's score from its feedback.
#[derive(Debug, Clone)]
pub struct FeedbackPatterns {
    /// Matches feedback asking for a new hand-in.
    rehandin: Regex,
    /// Matches feedback approving the hand-in.
    accept:   Regex,
}

impl FeedbackPatterns {
    /// Compiles both rules case-insensitively.
    pub fn new(rehandin: &str, accept: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            rehandin: RegexBuilder::new(rehandin).case_insensitive(true).build()?,
            accept:   RegexBuilder::new(accept).case_insensitive(true).build()?,
        })
    }

    /// Infers the score of a hand-in from its feedback.
    ///
    /// Returns `Ok(None)` when neither rule matches; such feedback is not
    /// ready to be uploaded.
    pub fn classify(&self, feedback: &str) -> Result<Option<f64>, FeedbackError> {
        match (self.rehandin.is_match(feedback), self.accept.is_match(feedback)) {
            (true, true) => Err(FeedbackError::Conflicting),
            (true, false) => Ok(Some(REHANDIN_SCORE)),
            (false, true) => Ok(Some(ACCEPT_SCORE)),
            (false, false) => Ok(None),
        }
    }
}

impl Default for FeedbackPatterns {
    fn default() -> Self {
        Self {
            rehandin: RegexBuilder::new(DEFAULT_REHANDIN_PATTERN)
                .case_insensitive(true)
                .build()
                .expect("default rehandin pattern compiles"),
            accept:   RegexBuilder::new(DEFAULT_ACCEPT_PATTERN)
                .case_insensitive(true)
                .build()
                .expect("default accept pattern compiles"),
        }
    }
}
