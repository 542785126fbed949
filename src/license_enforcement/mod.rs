//! Node-locked license enforcement
//!
//! This module verifies that the host device is allowed to run the enclosing
//! application and ends the process when it is not.
//!
//! ## How It Works
//!
//! Every check cycle:
//! - Resolves the device serial number, first from `getprop ro.serialno`,
//!   then from `/sys/class/dmi/id/product_serial`
//! - Matches it (case-insensitively) against the built-in allow-list and
//!   allowed prefix
//! - Verifies that the current calendar year is the licensed year
//!
//! The first cycle runs as soon as enforcement starts, then once per hour.
//! Any failed cycle prints a diagnostic and exits the process with status 1.
//! There is no retry and no grace period.
//!
//! ## Limitations
//!
//! This is a local identity comparison against a static allow-list. It is
//! not tamper resistant and performs no cryptographic verification.

pub mod enforcement;
pub mod identity;
pub(crate) mod messages;
pub mod policy;
pub mod state;
pub mod window;

pub use enforcement::{
    CHECK_INTERVAL, EnforcementHandle, EnforcementLoop, ExitProcess, LicenseChecker,
    ProcessTerminator, VIOLATION_EXIT_STATUS,
};
pub use identity::{
    DeviceIdentity, DmiSerialSource, IdentityResolver, IdentitySource, PropertyToolSource,
};
pub use messages::{LICENSE_CHECK_FAILED, LICENSE_CHECK_PASSED};
pub use policy::Policy;
pub use state::{CheckReport, EnforcementState, Violation};
pub use window::{Clock, FixedClock, SystemClock, TARGET_YEAR, ValidityWindow};

/// Starts license enforcement in the background with the built-in policy.
///
/// Returns as soon as the enforcement loop is scheduled. Check outcomes are
/// never reported to the caller: a failed check terminates the process.
pub fn check() -> anyhow::Result<EnforcementHandle> {
    EnforcementLoop::new(LicenseChecker::default()).spawn()
}
