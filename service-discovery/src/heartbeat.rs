use std::error::Error;
use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::discovery::{Discovery, PRIMARY_CHECK_TTL};
use crate::error::ConfigError;

/// Accept only intervals that keep the TTL check alive.
pub fn check_interval(interval: Duration) -> Result<Duration, ConfigError> {
    if interval.is_zero() || interval >= PRIMARY_CHECK_TTL {
        return Err(ConfigError::HealthCheckInterval {
            interval,
            ttl: PRIMARY_CHECK_TTL,
        });
    }
    Ok(interval)
}

/// Report the outcome of `probe` to the registry every `interval` until
/// `shutdown` resolves.
///
/// A failed report is not retried: the next tick reports again. The first
/// report is sent immediately. `interval` goes through [`check_interval`]
/// before anything is reported.
pub async fn run<P, Fut, E, F>(
    discovery: &Discovery,
    interval: Duration,
    mut probe: P,
    shutdown: F,
) -> Result<(), ConfigError>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Error,
    F: Future<Output = ()>,
{
    let interval = check_interval(interval)?;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut consecutive_failures: u64 = 0;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("stopping health checks for {}", discovery.service_id());
                return Ok(());
            }
            _ = ticker.tick() => {
                let outcome = probe().await;
                let observed: Option<&dyn Error> = match &outcome {
                    Ok(()) => None,
                    Err(err) => Some(err),
                };

                if discovery.send_health_check(observed).await.is_ok() {
                    consecutive_failures = 0;
                } else {
                    consecutive_failures += 1;
                    let failures = u32::try_from(consecutive_failures).unwrap_or(u32::MAX);
                    if interval.saturating_mul(failures) >= PRIMARY_CHECK_TTL {
                        error!(
                            "service {} could not report health for {} checks, the registry will consider it critical",
                            discovery.service_id(),
                            consecutive_failures
                        );
                    }
                }
                metrics::gauge!("discovery_health_check_consecutive_failures")
                    .set(consecutive_failures as f64);
            }
        }
    }
}
