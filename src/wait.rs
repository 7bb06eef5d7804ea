//! Strategies for waiting on CI before reading the build status.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::ci::CiVerdict;
use crate::config::WaitPolicy;

/// Decides when (and how often) to run the CI status check.
pub trait WaitStrategy {
    /// Runs `check` one or more times and returns the verdict to act on.
    fn wait_for_ci(&self, check: &mut dyn FnMut() -> CiVerdict) -> CiVerdict;

    /// Human-readable description for logs and progress output.
    fn describe(&self) -> String;
}

/// Sleep once, check once.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub delay: Duration,
}

impl WaitStrategy for FixedDelay {
    fn wait_for_ci(&self, check: &mut dyn FnMut() -> CiVerdict) -> CiVerdict {
        info!(delay_secs = self.delay.as_secs(), "waiting before checking the CI result");
        thread::sleep(self.delay);
        check()
    }

    fn describe(&self) -> String {
        format!("checking CI in {}s", self.delay.as_secs())
    }
}

/// Check right away.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl WaitStrategy for Immediate {
    fn wait_for_ci(&self, check: &mut dyn FnMut() -> CiVerdict) -> CiVerdict {
        check()
    }

    fn describe(&self) -> String {
        "checking CI now".to_string()
    }
}

/// Check every `interval` until the build settles or `timeout` has elapsed.
#[derive(Debug, Clone, Copy)]
pub struct Polling {
    pub interval: Duration,
    pub timeout: Duration,
}

impl WaitStrategy for Polling {
    fn wait_for_ci(&self, check: &mut dyn FnMut() -> CiVerdict) -> CiVerdict {
        let started = Instant::now();
        let mut attempt = 1u32;
        loop {
            let verdict = check();
            if verdict.is_settled() {
                return verdict;
            }
            let elapsed = started.elapsed();
            if elapsed + self.interval > self.timeout {
                warn!(
                    attempts = attempt,
                    timeout_secs = self.timeout.as_secs(),
                    verdict = %verdict,
                    "gave up waiting for CI"
                );
                return verdict;
            }
            debug!(attempt, verdict = %verdict, "CI not settled, polling again");
            thread::sleep(self.interval);
            attempt += 1;
        }
    }

    fn describe(&self) -> String {
        format!(
            "polling CI every {}s for up to {}s",
            self.interval.as_secs(),
            self.timeout.as_secs()
        )
    }
}

/// Builds the strategy selected by the configuration.
#[must_use]
pub fn from_policy(policy: WaitPolicy) -> Box<dyn WaitStrategy> {
    match policy {
        WaitPolicy::FixedDelay(delay) => Box::new(FixedDelay { delay }),
        WaitPolicy::Polling { interval, timeout } => Box::new(Polling { interval, timeout }),
    }
}
