use std::sync::Arc;

use crate::analysis::sessions::SessionRegistry;
use crate::day::DayZone;
use crate::events::EventBus;
use crate::llm_client::FoodAnalyzer;
use crate::meals::store::MealStore;
use crate::settings::store::SettingsStore;

/// Shared application state injected into all route handlers via Axum extractors.
/// Everything here is constructed exactly once at startup and handed out by
/// clone; there are no process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable analysis backend. Default: Gemini. Swap via ANALYZER_PROVIDER env.
    pub analyzer: Arc<dyn FoodAnalyzer>,
    pub meals: MealStore,
    pub settings: SettingsStore,
    pub sessions: SessionRegistry,
    pub events: EventBus,
    /// Timezone every component uses for calendar-day bucketing.
    pub day_zone: DayZone,
}
