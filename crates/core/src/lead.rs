//! Lead-capture submission forwarded verbatim to the outbound notification
//! channel. A value object with no lifecycle of its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(rename = "projectType", default)]
    pub project_type: Option<String>,
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadValidationFailure {
    MissingName,
    InvalidEmail,
    MissingMessage,
}

impl LeadValidationFailure {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::MissingName => "name must not be empty",
            Self::InvalidEmail => "email must look like local@domain.tld",
            Self::MissingMessage => "message must not be empty",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("lead validation failed: {}", summarize(.failures))]
pub struct LeadValidationError {
    pub failures: Vec<LeadValidationFailure>,
}

fn summarize(failures: &[LeadValidationFailure]) -> String {
    failures.iter().map(LeadValidationFailure::describe).collect::<Vec<_>>().join("; ")
}

impl LeadRecord {
    /// Validate the record, reporting every field failure at once so the form
    /// can highlight all of them in a single round trip.
    pub fn validate(&self) -> Result<(), LeadValidationError> {
        let mut failures = Vec::new();
        if self.name.trim().is_empty() {
            failures.push(LeadValidationFailure::MissingName);
        }
        if !is_valid_email(&self.email) {
            failures.push(LeadValidationFailure::InvalidEmail);
        }
        if self.message.trim().is_empty() {
            failures.push(LeadValidationFailure::MissingMessage);
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(LeadValidationError { failures })
        }
    }
}

/// Minimal syntactic email check: a non-empty local part, one `@`, and a domain
/// with an interior dot. Deliverability is the mail server's problem.
pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') || value.contains(char::is_whitespace) {
        return false;
    }
    match domain.split_once('.') {
        Some((head, tail)) => !head.is_empty() && !tail.is_empty() && !tail.ends_with('.'),
        None => false,
    }
}
