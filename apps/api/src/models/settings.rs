use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The singleton settings row (`id` is always 1).
///
/// `min_calories == max_calories == 0` means no calorie range has been
/// configured yet; adherence tracking stays dormant in that state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct UserSettingsRow {
    pub id: i32,
    pub min_calories: f64,
    pub max_calories: f64,
    /// Consecutive in-range days, ending at `last_streak_date_ms`.
    pub current_streak: i32,
    /// Local midnight (epoch ms) of the last day the streak was evaluated;
    /// 0 when no streak has ever been recorded.
    pub last_streak_date_ms: i64,
}

impl UserSettingsRow {
    pub fn range_configured(&self) -> bool {
        !(self.min_calories == 0.0 && self.max_calories == 0.0)
    }
}
