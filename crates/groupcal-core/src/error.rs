use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingTitle,
    MissingCategory,
    NonPositiveInterval,
    ResourceConflict,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingTitle => "title is required",
            Self::MissingCategory => "a category must be selected",
            Self::NonPositiveInterval => "end must be after start",
            Self::ResourceConflict => "the selected room is already booked",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("Invalid date/time: {0}")]
    InvalidFormat(String),

    #[error("Validation failed: {}", describe_issues(.0))]
    ValidationFailed(Vec<ValidationIssue>),

    // Availability or room lookup failed; callers degrade to a safe default
    #[error("Lookup failed: {0}")]
    LookupFailed(String),

    #[error("Submit rejected: {0}")]
    SubmitFailed(String),
}

impl ScheduleError {
    pub fn lookup(err: &anyhow::Error) -> Self {
        Self::LookupFailed(format!("{err:#}"))
    }

    pub fn submit(err: &anyhow::Error) -> Self {
        Self::SubmitFailed(format!("{err:#}"))
    }
}

fn describe_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
