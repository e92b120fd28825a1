//! Recurring full resync
//!
//! Runs `Reconciler::reconcile_all` over the house directory on a fixed
//! interval, off the request-handling path. Passes never overlap: a pass
//! that would start while another one is running is skipped.

use std::{sync::Arc, time::Duration};

use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tracing::{error, info, warn};

use crate::store::PropertyDirectory;
use crate::sync::{Reconciler, SyncReport};

#[derive(Debug)]
pub struct SyncScheduler {
    reconciler: Reconciler,
    properties: Arc<PropertyDirectory>,
    interval: Duration,
    in_flight: Mutex<()>,
}

impl SyncScheduler {
    pub fn new(reconciler: Reconciler, properties: Arc<PropertyDirectory>, interval: Duration) -> Self {
        Self {
            reconciler,
            properties,
            interval,
            in_flight: Mutex::new(()),
        }
    }

    /// One full pass over every house.
    ///
    /// Returns `None` when another pass is still running. When the house
    /// list itself cannot be read the pass is empty.
    pub async fn run_pass(&self) -> Option<SyncReport> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("previous sync pass still running, skipping");
            return None;
        };

        let properties = match self.properties.list().await {
            Ok(p) => p,
            Err(e) => {
                error!(error = %e, "could not read house list");
                return Some(SyncReport::default());
            }
        };

        info!(houses = properties.len(), "sync pass starting");
        Some(self.reconciler.reconcile_all(&properties).await)
    }

    /// Run a pass now, then every `interval`, until the handle is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                self.run_pass().await;
            }
        })
    }
}
