use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::http::HttpError;
use crate::inventory::{FetchError, InventoryClient};
use crate::publish::{target_groups, write_target_groups};
use crate::signal::{SignalRx, SignalTo};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Publish(#[from] crate::publish::PublishError),
}

/// The inventory service never became reachable during startup. The
/// process refuses to run without having published at least once, a
/// scraper pointed at the targets file would otherwise find nothing.
#[derive(Debug, Error)]
#[error("no successful update within {attempts} startup attempts, last error: {source}")]
pub struct StartupError {
    pub attempts: u32,
    #[source]
    source: CycleError,
}

/// Drives fetch -> transform -> publish cycles, strictly one at a time.
pub struct Updater {
    client: InventoryClient,
    config: Config,
}

impl Updater {
    pub fn new(config: Config) -> Result<Self, HttpError> {
        let client = InventoryClient::new(config.endpoint.clone(), config.timeout)?;

        Ok(Self { client, config })
    }

    /// One full update cycle. Nothing is retained between cycles, the
    /// document is rebuilt from scratch every time.
    async fn update(&self) -> Result<usize, CycleError> {
        let sensors = self.client.sensors().await?;
        let groups = target_groups(&sensors, &self.config);
        write_target_groups(&self.config.targets_file, &groups)?;

        Ok(sensors.len())
    }

    /// Runs until a shutdown signal arrives. Startup is strict: the
    /// first cycle must succeed within a bounded number of attempts or
    /// the whole process gives up. Once running, a failed cycle only
    /// logs, the previously published file stays in place and the next
    /// tick retries independently.
    pub async fn run(self, mut signal_rx: SignalRx) -> Result<(), StartupError> {
        let mut attempt = 1u32;
        loop {
            match self.update().await {
                Ok(count) => {
                    info!(
                        message = "initial update successful",
                        targets = count,
                        attempt,
                    );
                    break;
                }
                Err(err) => {
                    if attempt >= self.config.startup_retries {
                        error!(
                            message = "failed to complete initial update after all retries",
                            attempts = attempt,
                        );

                        return Err(StartupError {
                            attempts: attempt,
                            source: err,
                        });
                    }

                    warn!(
                        message = "startup update failed, will retry",
                        attempt,
                        delay = ?self.config.startup_delay,
                        %err,
                    );
                    attempt += 1;

                    tokio::select! {
                        biased;

                        signal = signal_rx.recv() => match signal {
                            Some(SignalTo::Reload) => {}
                            _ => {
                                info!(message = "shutdown requested during startup");
                                return Ok(());
                            }
                        },
                        _ = tokio::time::sleep(self.config.startup_delay) => {}
                    }
                }
            }
        }

        // Steady state. The first tick is due a full interval from now,
        // the startup cycle just published.
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut ticker = tokio::time::interval_at(start, self.config.interval);

        loop {
            tokio::select! {
                biased;

                signal = signal_rx.recv() => match signal {
                    Some(SignalTo::Reload) => {
                        info!(message = "running update cycle on demand");
                    }
                    Some(SignalTo::Shutdown) | Some(SignalTo::Quit) | None => break,
                },
                _ = ticker.tick() => {}
            }

            match self.update().await {
                Ok(count) => info!(message = "update cycle finished", targets = count),
                Err(err) => {
                    // Keep serving the last published document, the
                    // next tick retries on its own.
                    warn!(message = "update cycle failed", %err);
                }
            }
        }

        Ok(())
    }
}
