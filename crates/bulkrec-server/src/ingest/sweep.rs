//! Periodic removal of orphaned staged chunks
//!
//! A crash between apply and delete leaves a chunk behind with no job left to
//! clean it up. The sweeper deletes anything under the staging prefix older
//! than the configured age. It runs once at startup and then on an interval.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::PipelineConfig;
use super::stager::{ChunkStore, StageError};

pub struct StagingSweeper {
    store: Arc<dyn ChunkStore>,
    prefix: String,
    interval: Duration,
    max_age: Duration,
    shutdown: CancellationToken,
}

impl StagingSweeper {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        config: &PipelineConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            prefix: format!("{}/", config.staging_prefix),
            interval: config.sweep_interval(),
            max_age: config.sweep_max_age(),
            shutdown,
        }
    }

    /// Delete stale objects once; returns how many were removed
    pub async fn sweep_once(&self) -> Result<usize, StageError> {
        let now = Utc::now();
        let objects = self.store.list(&self.prefix).await?;
        let mut removed = 0;

        for object in objects {
            let stale = object
                .last_modified
                .and_then(|modified| (now - modified).to_std().ok())
                .is_some_and(|age| age > self.max_age);
            if !stale {
                continue;
            }

            match self.store.delete(&object.reference).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(reference = %object.reference, error = %e, "Orphaned chunk not removed"),
            }
        }

        Ok(removed)
    }

    /// Run in the background until shutdown
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                prefix = %self.prefix,
                interval_secs = self.interval.as_secs(),
                max_age_secs = self.max_age.as_secs(),
                "Staging sweeper started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.sweep_once().await {
                            Ok(0) => debug!("Sweep found nothing stale"),
                            Ok(removed) => info!(removed, "Removed orphaned staged chunks"),
                            Err(e) => warn!(error = %e, "Staging sweep failed"),
                        }
                    },
                    _ = self.shutdown.cancelled() => break,
                }
            }

            info!("Staging sweeper stopped");
        })
    }
}
