use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{Context as _, anyhow, ensure};
use chrono::{DateTime, Datelike, FixedOffset};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument};

use crate::license_enforcement::{
    identity::{DeviceIdentity, IdentityResolver},
    messages::{LICENSE_CHECK_FAILED, UNLICENSED_DEVICE_NOTICE},
    policy::Policy,
    state::{CheckReport, EnforcementState, Violation},
    window::{Clock, SystemClock, ValidityWindow},
};

pub const CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Exit status used when a license check fails.
pub const VIOLATION_EXIT_STATUS: i32 = 1;

/// Runs a single license check cycle: identity, then policy, then validity
/// window.
pub struct LicenseChecker {
    resolver: IdentityResolver,
    policy: Arc<Policy>,
    window: ValidityWindow,
    clock: Box<dyn Clock>,
}

impl LicenseChecker {
    pub fn new(
        resolver: IdentityResolver,
        policy: Arc<Policy>,
        window: ValidityWindow,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            resolver,
            policy,
            window,
            clock,
        }
    }

    /// Resolves the device identity afresh and validates it. Never
    /// terminates the process.
    #[instrument(level = "debug", skip(self))]
    pub fn check_license(&self) -> Result<DeviceIdentity, Violation> {
        let identity = self.resolver.resolve();
        self.evaluate(identity, &self.clock.now())
    }

    /// Runs one check cycle and summarizes every stage of it.
    pub fn report(&self) -> CheckReport {
        let identity = self.resolver.resolve();
        let now = self.clock.now();

        let authorized = identity
            .as_ref()
            .is_some_and(|identity| self.policy.is_allowed(identity.as_str()));
        let identifier = identity.as_ref().map(ToString::to_string);
        let violation = self.evaluate(identity, &now).err();

        CheckReport {
            identifier,
            authorized,
            year: now.year(),
            target_year: self.window.target_year(),
            passed: violation.is_none(),
            violation: violation.map(|violation| violation.to_string()),
        }
    }

    fn evaluate(
        &self,
        identity: Option<DeviceIdentity>,
        now: &DateTime<FixedOffset>,
    ) -> Result<DeviceIdentity, Violation> {
        let identity = identity.ok_or(Violation::IdentityUnavailable)?;

        if !self.policy.is_allowed(identity.as_str()) {
            return Err(Violation::Unauthorized {
                identifier: identity.to_string(),
            });
        }

        if !self.window.contains(now) {
            return Err(Violation::OutsideWindow {
                year: now.year(),
                target_year: self.window.target_year(),
            });
        }

        Ok(identity)
    }
}

impl Default for LicenseChecker {
    fn default() -> Self {
        Self::new(
            IdentityResolver::default(),
            Arc::new(Policy::default()),
            ValidityWindow::default(),
            Box::new(SystemClock),
        )
    }
}

impl fmt::Debug for LicenseChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicenseChecker")
            .field("resolver", &self.resolver)
            .field("policy", &self.policy)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Final action taken when a check fails.
pub trait ProcessTerminator: Send + Sync {
    fn terminate(&self, status: i32, diagnostic: &str);
}

/// Prints the diagnostic and exits the whole process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitProcess;

impl ProcessTerminator for ExitProcess {
    fn terminate(&self, status: i32, diagnostic: &str) {
        println!("{diagnostic}");
        eprintln!("{UNLICENSED_DEVICE_NOTICE}");
        std::process::exit(status);
    }
}

/// Recurring background check. The first check runs immediately, then once
/// per interval until a check fails.
pub struct EnforcementLoop {
    checker: Arc<LicenseChecker>,
    interval: Duration,
    terminator: Arc<dyn ProcessTerminator>,
}

impl EnforcementLoop {
    pub fn new(checker: LicenseChecker) -> Self {
        Self {
            checker: Arc::new(checker),
            interval: CHECK_INTERVAL,
            terminator: Arc::new(ExitProcess),
        }
    }

    /// Overrides the period between checks. A zero interval is rejected.
    pub fn with_interval(mut self, interval: Duration) -> anyhow::Result<Self> {
        ensure!(
            !interval.is_zero(),
            "License enforcement interval must be greater than zero"
        );

        self.interval = interval;
        Ok(self)
    }

    #[must_use]
    pub fn with_terminator(mut self, terminator: Arc<dyn ProcessTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    /// Runs until a check fails. With [`ExitProcess`] this never returns.
    pub async fn run(self) -> EnforcementState {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval = ?self.interval, "License enforcement started");

        let mut state = EnforcementState::Running;
        while state == EnforcementState::Running {
            ticker.tick().await;
            state = self.run_cycle().await;
        }

        info!(%state, "License enforcement stopped");
        state
    }

    async fn run_cycle(&self) -> EnforcementState {
        let checker = Arc::clone(&self.checker);

        let result = match tokio::task::spawn_blocking(move || checker.check_license()).await {
            Ok(result) => result,
            Err(err) => Err(Violation::CheckAborted(err.to_string())),
        };

        match result {
            Ok(identity) => {
                debug!(%identity, "License check passed");
                EnforcementState::Running
            }
            Err(violation) => {
                fail(self.terminator.as_ref(), &violation);
                EnforcementState::Terminated
            }
        }
    }

    /// Starts the loop in the background and returns immediately.
    ///
    /// The loop always gets its own thread and current-thread runtime, so it
    /// outlives any runtime the caller happens to be on. If that runtime
    /// cannot be built or the loop panics, the terminator is invoked.
    pub fn spawn(self) -> anyhow::Result<EnforcementHandle> {
        let terminator = Arc::clone(&self.terminator);

        let thread = thread::Builder::new()
            .name("license-enforcement".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        fail(
                            terminator.as_ref(),
                            &Violation::CheckAborted(format!(
                                "failed to build enforcement runtime: {err}"
                            )),
                        );
                        return EnforcementState::Terminated;
                    }
                };

                match panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(self.run()))) {
                    Ok(state) => state,
                    Err(_) => {
                        fail(
                            terminator.as_ref(),
                            &Violation::CheckAborted("enforcement loop panicked".to_string()),
                        );
                        EnforcementState::Terminated
                    }
                }
            })
            .context("Failed to spawn license enforcement thread")?;

        debug!("Spawned license enforcement thread");

        Ok(EnforcementHandle { thread })
    }
}

fn fail(terminator: &dyn ProcessTerminator, violation: &Violation) {
    error!(%violation, "License check failed");
    terminator.terminate(
        VIOLATION_EXIT_STATUS,
        &format!("{LICENSE_CHECK_FAILED}: {violation}"),
    );
}

impl fmt::Debug for EnforcementLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnforcementLoop")
            .field("checker", &self.checker)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

/// Lets the host observe the background enforcement loop. Dropping the
/// handle does not stop enforcement.
#[derive(Debug)]
pub struct EnforcementHandle {
    thread: thread::JoinHandle<EnforcementState>,
}

impl EnforcementHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Blocks until the loop stops and returns its final state.
    pub fn join(self) -> anyhow::Result<EnforcementState> {
        self.thread
            .join()
            .map_err(|_| anyhow!("License enforcement thread panicked"))
    }

    /// Waits for the loop to stop without blocking the calling runtime.
    pub async fn wait(self) -> anyhow::Result<EnforcementState> {
        tokio::task::spawn_blocking(move || self.join())
            .await
            .context("Failed to join license enforcement thread")?
    }
}
