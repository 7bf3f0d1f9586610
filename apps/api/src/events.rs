//! In-process store-change signals.
//!
//! Stores publish an event after every successful write; live queries and the
//! streak worker subscribe. Delivery is best-effort: a slow subscriber loses
//! old events (and resynchronizes by requerying) rather than blocking writers.

use serde::Serialize;
use tokio::sync::broadcast;

/// Buffered events per subscriber before lagging kicks in.
const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    MealSaved { meal_id: i64, eaten_at_ms: i64 },
    MealDeleted { meal_id: i64, eaten_at_ms: i64 },
    MealsCleared,
    SettingsUpdated,
    StreakUpdated { streak: i32 },
}

impl StoreEvent {
    /// SSE event name for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreEvent::MealSaved { .. } => "meal_saved",
            StoreEvent::MealDeleted { .. } => "meal_deleted",
            StoreEvent::MealsCleared => "meals_cleared",
            StoreEvent::SettingsUpdated => "settings_updated",
            StoreEvent::StreakUpdated { .. } => "streak_updated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StoreEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// Fire-and-forget publish. Having no subscribers is not an error.
    pub fn publish(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
