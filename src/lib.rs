//! Node-locked license enforcement for embedding applications.
//!
//! Call [`check`] once during startup. It schedules a background loop that
//! re-validates the host device every hour and exits the process with status
//! 1 as soon as a check fails.

pub mod license_enforcement;

pub use license_enforcement::{EnforcementHandle, check};
