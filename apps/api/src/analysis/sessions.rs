//! In-memory registry of in-flight analysis sessions.
//!
//! Sessions are transient: nothing here survives a restart, and an abandoned
//! workflow is swept after `SESSION_TTL` of inactivity. Saved meals live in
//! the database and are unaffected by sweeps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::info;
use uuid::Uuid;

use super::pipeline::AnalysisPipeline;

pub const SESSION_TTL: Duration = Duration::from_secs(2 * 60 * 60);
const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

struct SessionSlot {
    pipeline: Arc<tokio::sync::Mutex<AnalysisPipeline>>,
    last_touched: Instant,
}

/// Handle map from session id to its pipeline. The outer mutex guards only
/// the map; each pipeline has its own async lock so a slow provider call
/// never blocks unrelated sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<Uuid, SessionSlot>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self) -> (Uuid, Arc<tokio::sync::Mutex<AnalysisPipeline>>) {
        let id = Uuid::new_v4();
        let pipeline = Arc::new(tokio::sync::Mutex::new(AnalysisPipeline::new()));
        self.lock_map().insert(
            id,
            SessionSlot {
                pipeline: pipeline.clone(),
                last_touched: Instant::now(),
            },
        );
        (id, pipeline)
    }

    /// Looks up a session and refreshes its idle timer.
    pub fn get(&self, id: Uuid) -> Option<Arc<tokio::sync::Mutex<AnalysisPipeline>>> {
        let mut map = self.lock_map();
        let slot = map.get_mut(&id)?;
        slot.last_touched = Instant::now();
        Some(slot.pipeline.clone())
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.lock_map().remove(&id).is_some()
    }

    /// Drops sessions idle for `ttl` or longer; returns how many went away.
    pub fn sweep_idle(&self, ttl: Duration) -> usize {
        let mut map = self.lock_map();
        let before = map.len();
        map.retain(|_, slot| slot.last_touched.elapsed() < ttl);
        before - map.len()
    }

    /// Periodic sweeper; spawned once at startup.
    pub async fn run_sweeper(self) {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = self.sweep_idle(SESSION_TTL);
            if removed > 0 {
                info!("swept {removed} idle analysis sessions");
            }
        }
    }

    fn lock_map(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, SessionSlot>> {
        // The map stays consistent across a poisoned lock; keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_returns_the_same_pipeline() {
        let registry = SessionRegistry::new();
        let (id, pipeline) = registry.create();
        let fetched = registry.get(id).unwrap();
        assert!(Arc::ptr_eq(&pipeline, &fetched));
    }

    #[test]
    fn get_unknown_session_is_none() {
        let registry = SessionRegistry::new();
        assert!(registry.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn remove_forgets_the_session() {
        let registry = SessionRegistry::new();
        let (id, _) = registry.create();
        assert!(registry.remove(id));
        assert!(registry.get(id).is_none());
        assert!(!registry.remove(id));
    }

    #[test]
    fn sweep_drops_only_expired_sessions() {
        let registry = SessionRegistry::new();
        let (id, _) = registry.create();

        assert_eq!(registry.sweep_idle(Duration::from_secs(3600)), 0);
        assert!(registry.get(id).is_some());

        assert_eq!(registry.sweep_idle(Duration::ZERO), 1);
        assert!(registry.get(id).is_none());
    }
}
