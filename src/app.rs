use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::ics::{CalendarSource, FetchError, HttpCalendarSource};
use crate::routes_maisons;
use crate::routes_planning;
use crate::scheduler::SyncScheduler;
use crate::store::{JsonTaskStore, Plannings, PropertyDirectory, StaffBook, TaskStore};
use crate::sync::Reconciler;

// Shared by every handler and the background sync loop
#[derive(Debug, Clone)]
pub struct AppState {
    pub plannings: Arc<Plannings>,
    pub properties: Arc<PropertyDirectory>,
    pub staff: Arc<StaffBook>,
    pub scheduler: Arc<SyncScheduler>,
}

impl AppState {
    /// Wire everything on top of `config.data_dir`.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let source = HttpCalendarSource::new(config.fetch_timeout, config.timezone)?;
        let store = JsonTaskStore::new(&config.data_dir);
        Ok(Self::with_parts(config, Arc::new(source), Arc::new(store)))
    }

    pub fn with_parts(config: &Config, source: Arc<dyn CalendarSource>, store: Arc<dyn TaskStore>) -> Self {
        let plannings = Arc::new(Plannings::new(store));
        let properties = Arc::new(PropertyDirectory::new(&config.data_dir));
        let reconciler = Reconciler::new(source, Arc::clone(&plannings));
        let scheduler = Arc::new(SyncScheduler::new(
            reconciler,
            Arc::clone(&properties),
            config.sync_interval,
        ));

        Self {
            plannings,
            properties,
            staff: Arc::new(StaffBook::new(&config.data_dir)),
            scheduler,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // planning
        .route(
            "/planning/:maison",
            get(routes_planning::get_planning).post(routes_planning::put_planning),
        )
        .route("/planning/:maison/:id/toggle", post(routes_planning::toggle_task))
        .route("/planning/:maison/:id/assign", put(routes_planning::assign_task))
        .route("/sync", post(routes_planning::trigger_sync))
        // houses
        .route("/maisons", get(routes_maisons::get_maisons).post(routes_maisons::put_maisons))
        .route("/maisons/:id", delete(routes_maisons::delete_maison))
        // staff
        .route("/employes", get(routes_maisons::get_employes).post(routes_maisons::put_employes))
        .route("/ordre-taches", get(routes_maisons::get_order))
        .route("/sauver-ordre-taches", post(routes_maisons::save_order));

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
