//! Poll an operation until it reaches a terminal state

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub max_attempts: u32,
    /// Wait after a non-terminal answer
    pub interval: Duration,
    /// Wait after a failed probe
    pub error_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(2),
            error_interval: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Timed out after {attempts} attempts")]
    TimedOut {
        attempts: u32,
        last_error: Option<String>,
    },
}

/// Call `probe` until it yields a value accepted by `is_terminal`.
///
/// Probe errors count as attempts. No sleep follows the final attempt.
pub async fn poll_until<T, E, F, Fut, P>(
    config: &PollConfig,
    mut probe: F,
    is_terminal: P,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    P: Fn(&T) -> bool,
{
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        let wait = match probe().await {
            Ok(value) if is_terminal(&value) => {
                debug!("Poll reached terminal state after {} attempts", attempt);
                return Ok(value);
            }
            Ok(_) => config.interval,
            Err(e) => {
                warn!("Poll attempt {} failed: {}", attempt, e);
                last_error = Some(e.to_string());
                config.error_interval
            }
        };

        if attempt < config.max_attempts {
            tokio::time::sleep(wait).await;
        }
    }

    Err(PollError::TimedOut {
        attempts: config.max_attempts,
        last_error,
    })
}
