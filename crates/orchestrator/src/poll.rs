//! Provider polling with a wall-clock budget.

use std::time::Duration;

use photoloom_compute::{ComputeError, ComputeProvider, RemoteStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SUBMIT_WAIT: Duration = Duration::from_secs(180);
pub const DEFAULT_CHECK_WAIT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_TRANSIENT_ERRORS: u32 = 5;

/// Polling knobs shared by every drive path.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay between successive status polls.
    pub interval: Duration,
    /// Budget for the poll attached to the original request, before the
    /// caller is told the job is still pending.
    pub submit_wait: Duration,
    /// Budget for a user-initiated check or a sweeper resume.
    pub check_wait: Duration,
    /// Consecutive transient provider errors tolerated before an
    /// attempt gives up (the job itself stays live).
    pub max_transient_errors: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            submit_wait: DEFAULT_SUBMIT_WAIT,
            check_wait: DEFAULT_CHECK_WAIT,
            max_transient_errors: DEFAULT_MAX_TRANSIENT_ERRORS,
        }
    }
}

impl PollConfig {
    /// Load from environment variables, keeping defaults for anything
    /// unset or unparseable.
    ///
    /// | Variable                   | Default |
    /// |----------------------------|---------|
    /// | `POLL_INTERVAL_MS`         | `2000`  |
    /// | `POLL_SUBMIT_WAIT_SECS`    | `180`   |
    /// | `POLL_CHECK_WAIT_SECS`     | `30`    |
    /// | `POLL_MAX_TRANSIENT_ERRORS`| `5`     |
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ms) = env_parse::<u64>("POLL_INTERVAL_MS") {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("POLL_SUBMIT_WAIT_SECS") {
            config.submit_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("POLL_CHECK_WAIT_SECS") {
            config.check_wait = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<u32>("POLL_MAX_TRANSIENT_ERRORS") {
            config.max_transient_errors = n;
        }
        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.parse().ok()
}

/// How a single polling attempt ended.
#[derive(Debug)]
pub(crate) enum PollOutcome {
    Terminal(RemoteStatus),
    /// The budget elapsed (or transient errors exhausted the retry
    /// allowance) without a terminal status. The remote job may still
    /// be running; only the attempt is over.
    TimedOut,
}

/// Polls `handle` every `config.interval` until the provider reports a
/// terminal status or `budget` elapses.
///
/// Transient errors (connectivity, provider 5xx) are retried up to
/// `max_transient_errors` consecutive times and then degrade to
/// [`PollOutcome::TimedOut`]. A non-transient error is returned to the
/// caller, which treats it as a remote failure.
pub(crate) async fn poll_until_terminal(
    provider: &dyn ComputeProvider,
    handle: &str,
    config: &PollConfig,
    budget: Duration,
) -> Result<PollOutcome, ComputeError> {
    let deadline = tokio::time::Instant::now() + budget;
    let mut transient_errors = 0u32;

    loop {
        match provider.poll(handle).await {
            Ok(status) if status.is_terminal() => return Ok(PollOutcome::Terminal(status)),
            Ok(status) => {
                transient_errors = 0;
                tracing::debug!(handle, ?status, "Job still in flight");
            }
            Err(err) if err.is_transient() => {
                transient_errors += 1;
                if transient_errors > config.max_transient_errors {
                    tracing::warn!(
                        handle,
                        attempts = transient_errors,
                        "Giving up polling attempt after repeated transient errors"
                    );
                    return Ok(PollOutcome::TimedOut);
                }
                tracing::warn!(handle, error = %err, "Transient poll error, will retry");
            }
            Err(err) => return Err(err),
        }

        if tokio::time::Instant::now() + config.interval > deadline {
            return Ok(PollOutcome::TimedOut);
        }
        tokio::time::sleep(config.interval).await;
    }
}
