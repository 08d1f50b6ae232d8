//! HTTP surface: the access API, guarded tool pages, health and metrics.

pub mod handlers;
pub mod middleware;
pub mod router;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;

use crate::{
    db::{create_pool, repository::Repository},
    entitlements::{EntitlementService, MultiToolAggregator},
    feedback::FeedbackDispatcher,
    guard::RouteGuard,
    store::{EntitlementStore, HttpEntitlementStore, MemoryStore},
    types::Subscription,
    utils::{
        clock::{Clock, SystemClock},
        config::{AppConfig, StoreBackend},
    },
};

pub use router::build_router;

pub struct AppState {
    pub service: EntitlementService,
    pub aggregator: MultiToolAggregator,
    pub guard: Arc<RouteGuard>,
    pub dispatcher: Arc<FeedbackDispatcher>,
    /// Only set for the postgres backend; used by the health check.
    pub pool: Option<Arc<PgPool>>,
}

impl AppState {
    pub fn new(
        cfg: &AppConfig,
        store: Arc<dyn EntitlementStore>,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<FeedbackDispatcher>,
    ) -> Self {
        let service = EntitlementService::new(store, clock);
        let guard = RouteGuard::new(cfg.guard.clone(), service.clone())
            .with_dispatcher(dispatcher.clone());

        Self {
            aggregator: MultiToolAggregator::new(service.clone()),
            service,
            guard: Arc::new(guard),
            dispatcher,
            pool: None,
        }
    }

    /// Builds the configured store and wires everything against the system clock.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        let dispatcher = Arc::new(FeedbackDispatcher::tracing(cfg.feedback.clone()));
        let timeout = Duration::from_millis(cfg.store.timeout_ms);

        let (store, pool): (Arc<dyn EntitlementStore>, Option<Arc<PgPool>>) = match cfg.store.backend {
            StoreBackend::Http => {
                let api_url = cfg.store.api_url.clone().context("store.api_url missing")?;
                info!(api = %api_url, "Using HTTP entitlement store");
                let store = HttpEntitlementStore::new(api_url, cfg.store.api_key.clone(), timeout)?;
                (Arc::new(store), None)
            }
            StoreBackend::Postgres => {
                let url = cfg
                    .store
                    .database_url
                    .as_deref()
                    .context("store.database_url missing")?;
                let pool = Arc::new(create_pool(url, timeout).await?);
                let repo = Repository::new(pool.clone(), cfg.store.identity_header.clone());
                (Arc::new(repo), Some(pool))
            }
            StoreBackend::Memory => {
                let store = MemoryStore::new(cfg.store.identity_header.clone());
                if let Some(path) = &cfg.store.seed_file {
                    let raw = tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("reading seed file {}", path))?;
                    let seeds: Vec<Subscription> =
                        serde_json::from_str(&raw).context("parsing seed file")?;
                    info!(count = seeds.len(), "Seeding in-memory store");
                    seeds.into_iter().for_each(|s| store.insert(s));
                }
                (Arc::new(store), None)
            }
        };

        let mut state = Self::new(cfg, store, Arc::new(SystemClock), dispatcher);
        state.pool = pool;
        Ok(state)
    }
}
