//! Diagnostics written when a license check fails.
//!

pub const LICENSE_CHECK_FAILED: &str = "License check failed";

pub const LICENSE_CHECK_PASSED: &str = "License check passed";

pub const UNLICENSED_DEVICE_NOTICE: &str = "\
╔══════════════════════════════════════════════════════════════════════════════════╗
║ LICENSE CHECK FAILED                                                             ║
║                                                                                  ║
║ This device is not licensed to run this application, or the license period       ║
║ has ended. The application will now exit.                                        ║
╚══════════════════════════════════════════════════════════════════════════════════╝";
