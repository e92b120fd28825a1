//! Calendar -> planning reconciliation
//!
//! For every house: fetch bookings, derive gap windows, merge the resulting
//! tasks into the stored planning. Houses are independent; one failing never
//! stops the others.

use std::{collections::HashSet, sync::Arc};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::ics::{CalendarSource, FetchError};
use crate::logic;
use crate::models::Property;
use crate::store::{Plannings, StoreError, validate_key};

/// Reconciliation errors for one house
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("calendar fetch failed for {property}: {source}")]
    Fetch {
        property: String,
        #[source]
        source: FetchError,
    },

    #[error("could not save planning for {property}: {source}")]
    Persistence {
        property: String,
        #[source]
        source: StoreError,
    },

    #[error("house name {0:?} is used more than once")]
    DuplicateName(String),
}

/// Result of a successful reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Planning rewritten with this many tasks
    Synced { tasks: usize },
    /// No calendar URL configured; nothing to do
    Skipped,
}

/// Per-house results of one pass, in house order
#[derive(Debug, Default)]
pub struct SyncReport {
    pub results: Vec<(String, Result<SyncOutcome, SyncError>)>,
}

impl SyncReport {
    pub fn synced(&self) -> usize {
        self.count(|r| matches!(r, Ok(SyncOutcome::Synced { .. })))
    }

    pub fn skipped(&self) -> usize {
        self.count(|r| matches!(r, Ok(SyncOutcome::Skipped)))
    }

    pub fn failed(&self) -> usize {
        self.count(Result::is_err)
    }

    pub fn get(&self, property: &str) -> Option<&Result<SyncOutcome, SyncError>> {
        self.results
            .iter()
            .find(|(name, _)| name == property)
            .map(|(_, r)| r)
    }

    fn count(&self, f: impl Fn(&Result<SyncOutcome, SyncError>) -> bool) -> usize {
        self.results.iter().filter(|(_, r)| f(r)).count()
    }
}

pub struct Reconciler {
    source: Arc<dyn CalendarSource>,
    plannings: Arc<Plannings>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("plannings", &self.plannings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(source: Arc<dyn CalendarSource>, plannings: Arc<Plannings>) -> Self {
        Self { source, plannings }
    }

    /// Sync one house.
    ///
    /// The fetch happens before the house's planning is locked, so user
    /// edits are only blocked for the merge and write. On any error the
    /// stored planning is left as it was.
    pub async fn reconcile(&self, property: &Property) -> Result<SyncOutcome, SyncError> {
        if property.calendar_url().is_none() {
            debug!(property = %property.name, "no calendar URL, skipping");
            return Ok(SyncOutcome::Skipped);
        }

        let persistence = |source| SyncError::Persistence {
            property: property.name.clone(),
            source,
        };
        validate_key(&property.name).map_err(persistence)?;

        let bookings = self
            .source
            .fetch_bookings(property)
            .await
            .map_err(|source| SyncError::Fetch {
                property: property.name.clone(),
                source,
            })?;
        debug!(property = %property.name, bookings = bookings.len(), "calendar downloaded");

        let tasks = self
            .plannings
            .update(&property.name, |existing| {
                logic::plan_tasks(property, bookings, &existing)
            })
            .await
            .map_err(persistence)?;

        info!(property = %property.name, tasks = tasks.len(), "planning synced");
        Ok(SyncOutcome::Synced { tasks: tasks.len() })
    }

    /// Sync every house in order, collecting each result.
    ///
    /// A name already claimed earlier in the list fails with `DuplicateName`
    /// instead of overwriting that house's planning. A house skipped for
    /// lack of a calendar URL does not claim its name.
    pub async fn reconcile_all(&self, properties: &[Property]) -> SyncReport {
        let mut report = SyncReport::default();
        let mut seen = HashSet::new();

        for property in properties {
            let result = if seen.contains(property.name.as_str()) {
                Err(SyncError::DuplicateName(property.name.clone()))
            } else {
                let result = self.reconcile(property).await;
                if !matches!(result, Ok(SyncOutcome::Skipped)) {
                    seen.insert(property.name.as_str());
                }
                result
            };

            match &result {
                Err(e @ SyncError::Persistence { .. }) => error!(error = %e, "sync failed"),
                Err(e) => warn!(error = %e, "sync failed"),
                Ok(_) => {}
            }
            report.results.push((property.name.clone(), result));
        }

        info!(
            synced = report.synced(),
            skipped = report.skipped(),
            failed = report.failed(),
            "sync pass finished"
        );
        report
    }
}
