use crate::api_client::{ApiClient, PollOutcome, StartedFlow};
use anyhow::Result;
use colored::*;
use log::*;
use std::time::Duration;
use tokio::time::Instant;

/// Extra wait on top of the server's interval so clock skew never earns a `slow_down`.
pub const SAFETY_MARGIN: Duration = Duration::from_secs(1);

/// Added to the interval each time the server answers `slow_down`.
pub const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// The token a finished login produced.
#[derive(Debug)]
pub struct Token {
    pub access_token: String,
    pub expires_at: Option<i64>,
}

/// Tracks how long to wait between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    interval: Duration,
}

impl Schedule {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn next_delay(&self) -> Duration {
        self.interval + SAFETY_MARGIN
    }

    /// Backs off after `slow_down`, never below what the server asked for.
    pub fn slow_down(&mut self, server_interval_secs: u64) {
        let server_interval = Duration::from_secs(server_interval_secs.max(1));
        self.interval = (self.interval + SLOW_DOWN_STEP).max(server_interval);
    }
}

/// Polls until the flow is approved, denied or out of time.
pub async fn wait_for_token(api: &ApiClient, started: &StartedFlow) -> Result<Token> {
    let deadline = Instant::now() + Duration::from_secs(started.expires_in.max(1));
    let mut schedule = Schedule::new(started.interval);

    while Instant::now() < deadline {
        tokio::time::sleep(schedule.next_delay()).await;

        match api.poll(&started.device_code).await? {
            PollOutcome::AuthorizationPending { .. } => {
                debug!("Still waiting for approval");
            }
            PollOutcome::SlowDown { interval } => {
                schedule.slow_down(interval);
                println!(
                    "{} Server asked to slow down, polling every {}s",
                    "!".yellow(),
                    schedule.interval().as_secs()
                );
            }
            PollOutcome::Success {
                access_token,
                access_token_expires_at,
            } => {
                return Ok(Token {
                    access_token,
                    expires_at: access_token_expires_at,
                });
            }
            PollOutcome::ExpiredToken => anyhow::bail!("The device code expired before approval"),
            PollOutcome::InvalidGrant => anyhow::bail!("The server refused the device code"),
        }
    }

    anyhow::bail!("Timed out waiting for approval")
}
