//! Readiness poll: confirms a freshly launched server actually answers.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ReadinessSettings;
use crate::ports::BackendClient;

/// Bounded retry policy for the liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    pub max_retries: u32,
    pub interval: Duration,
}

impl ReadinessPolicy {
    pub fn from_settings(settings: &ReadinessSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            interval: Duration::from_millis(settings.poll_interval_ms),
        }
    }

    /// Longest time a poll can take, ignoring probe duration.
    pub fn window(&self) -> Duration {
        self.interval * self.max_retries
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self::from_settings(&ReadinessSettings::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A probe succeeded after `attempts` tries.
    Alive { attempts: u32 },
    /// Every probe failed.
    Exhausted,
    /// The instance was superseded or stopped while polling.
    Cancelled,
}

/// Probes `port` until it answers, the retries run out or `cancel` fires.
pub async fn poll_until_alive(
    client: &dyn BackendClient,
    port: u16,
    policy: ReadinessPolicy,
    cancel: &CancellationToken,
) -> Readiness {
    for attempt in 1..=policy.max_retries {
        let alive = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Readiness::Cancelled,
            alive = client.is_alive(port) => alive,
        };
        if alive {
            debug!(port, attempt, "nailgun server answered");
            return Readiness::Alive { attempts: attempt };
        }
        info!(
            port,
            attempt,
            "nailgun server should be running but does not answer yet, retrying"
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Readiness::Cancelled,
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
    Readiness::Exhausted
}
