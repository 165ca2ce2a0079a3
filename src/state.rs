// BelegSync - Application state

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::config::Config;

/// Central application state. Clone-friendly — PgPool and Arc are both Clone.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub client: Client,
    pub start_time: Instant,
    /// Per-Beleg pipeline locks: two runs for the same id are serialized,
    /// runs for distinct ids are independent.
    pipeline_locks: Arc<Mutex<HashMap<i64, Arc<Mutex<()>>>>>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
            client: Client::builder()
                .connect_timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("Failed to build HTTP client"),
            start_time: Instant::now(),
            pipeline_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Fetch (or create) the serialization lock for one Beleg id.
    pub async fn pipeline_lock(&self, beleg_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.pipeline_locks.lock().await;
        locks
            .entry(beleg_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry once no pipeline run holds it anymore.
    pub async fn release_pipeline_lock(&self, beleg_id: i64) {
        let mut locks = self.pipeline_locks.lock().await;
        if let Some(lock) = locks.get(&beleg_id) {
            // One reference in the map, one held by the caller.
            if Arc::strong_count(lock) <= 2 {
                locks.remove(&beleg_id);
            }
        }
    }
}
