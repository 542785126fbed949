use std::{error::Error, fmt};

use serde::Serialize;

/// Lifecycle of the enforcement loop. `Terminated` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementState {
    Running,
    Terminated,
}

impl fmt::Display for EnforcementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnforcementState::Running => write!(f, "Running"),
            EnforcementState::Terminated => write!(f, "Terminated"),
        }
    }
}

/// Reason a license check cycle failed. Every variant is fatal to the
/// enforcement loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Every identity source failed or returned an empty value.
    IdentityUnavailable,

    /// The identifier matched neither the allow-list nor the allowed prefix.
    Unauthorized { identifier: String },

    /// The current calendar year is not the licensed year.
    OutsideWindow { year: i32, target_year: i32 },

    /// The check cycle itself could not be executed.
    CheckAborted(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::IdentityUnavailable => {
                write!(f, "failed to obtain device identifier (no identifier available)")
            }
            Violation::Unauthorized { identifier } => {
                write!(f, "device identifier {identifier} is not authorized")
            }
            Violation::OutsideWindow { year, target_year } => write!(
                f,
                "license is only valid in {target_year}, current year is {year} (outside validity window)"
            ),
            Violation::CheckAborted(reason) => write!(f, "license check could not run: {reason}"),
        }
    }
}

impl Error for Violation {}

/// Summary of a single check cycle for diagnostic output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CheckReport {
    pub identifier: Option<String>,
    pub authorized: bool,
    pub year: i32,
    pub target_year: i32,
    pub passed: bool,
    pub violation: Option<String>,
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Identifier: {} | Authorized: {} | Year: {} (licensed: {}) | Result: {}",
            self.identifier.as_deref().unwrap_or("<unavailable>"),
            self.authorized,
            self.year,
            self.target_year,
            if self.passed { "passed" } else { "failed" }
        )
    }
}
