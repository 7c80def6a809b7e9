//! Bounded polling for guest bootstrap (cloud-init) completion.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Period between probes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Overall budget for bootstrap to finish.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Progress is reported on every Nth tick only.
pub const DEFAULT_REPORT_EVERY: u32 = 3;

const READY_TOKEN: &str = "done";
const FAILED_TOKEN: &str = "error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Ready,
    TimedOut,
    /// Trimmed probe output that reported the failure.
    Failed(String),
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Polling)
    }
}

/// Classify one probe output. Matching is case-insensitive.
pub fn classify(output: &str) -> PollState {
    let lower = output.to_lowercase();
    if lower.contains(READY_TOKEN) {
        PollState::Ready
    } else if lower.contains(FAILED_TOKEN) {
        PollState::Failed(output.trim().to_string())
    } else {
        PollState::Polling
    }
}

/// Intermediate progress handed to the caller on decimated ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// The probe itself failed; the guest is probably still booting.
    Unreachable { elapsed: Duration },
    /// The guest answered with a non-terminal status.
    Status(String),
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Progress::Unreachable { elapsed } => {
                write!(f, "Waiting for VM to be ready... ({}s)", elapsed.as_secs())
            }
            Progress::Status(status) => write!(f, "Cloud-init status: {}", status),
        }
    }
}

/// Result of a finished poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub state: PollState,
    pub attempts: u32,
    pub elapsed: Duration,
}

/// One readiness wait. Lives for a single poll loop and is consumed by `run`.
#[derive(Debug)]
pub struct ReadinessPoll {
    started: Instant,
    deadline: Instant,
    interval: Duration,
    report_every: u32,
    attempts: u32,
    state: PollState,
}

impl ReadinessPoll {
    pub fn with_interval(timeout: Duration, interval: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + timeout,
            interval,
            report_every: DEFAULT_REPORT_EVERY,
            attempts: 0,
            state: PollState::Polling,
        }
    }

    #[allow(dead_code)]
    pub fn report_every(mut self, ticks: u32) -> Self {
        self.report_every = ticks.max(1);
        self
    }

    #[allow(dead_code)]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[allow(dead_code)]
    pub fn state(&self) -> &PollState {
        &self.state
    }

    /// Feed one probe result into the state machine and return the new state.
    /// A probe error keeps the poll in `Polling`.
    pub fn observe<E: fmt::Display>(&mut self, probe: Result<&str, E>) -> &PollState {
        self.attempts += 1;
        self.state = match probe {
            Ok(output) => classify(output),
            Err(e) => {
                trace!(attempt = self.attempts, error = %e, "readiness:probe unreachable");
                PollState::Polling
            }
        };
        &self.state
    }

    /// Poll until a terminal state. The first probe runs one interval after
    /// start and is handed the time left before the deadline.
    pub fn run<E, P, R>(mut self, mut probe: P, mut report: R) -> PollOutcome
    where
        E: fmt::Display,
        P: FnMut(Duration) -> Result<String, E>,
        R: FnMut(Progress),
    {
        loop {
            let now = Instant::now();
            if now >= self.deadline {
                self.state = PollState::TimedOut;
                break;
            }
            thread::sleep(self.interval.min(self.deadline - now));
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.state = PollState::TimedOut;
                break;
            }

            let result = probe(remaining);
            let reporting = (self.attempts + 1) % self.report_every == 0;
            let progress = match &result {
                Err(_) => Some(Progress::Unreachable {
                    elapsed: self.started.elapsed(),
                }),
                Ok(output) if !output.trim().is_empty() => {
                    Some(Progress::Status(output.trim().to_string()))
                }
                Ok(_) => None,
            };

            if self.observe(result.as_deref()).is_terminal() {
                break;
            }
            if reporting && let Some(progress) = progress {
                report(progress);
            }
        }

        let outcome = PollOutcome {
            state: self.state,
            attempts: self.attempts,
            elapsed: self.started.elapsed(),
        };
        debug!(state = ?outcome.state, attempts = outcome.attempts, "readiness:finished");
        outcome
    }
}
