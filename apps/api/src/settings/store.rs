//! Persistence for the singleton `user_settings` row.
//!
//! The row mixes two concerns with different writers: the calorie range
//! (written by the user) and the streak columns (written by the adherence
//! tracker). Each write path touches ONLY its own columns, so saving a new
//! range can never clobber a streak and vice versa.

use futures::Stream;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::info;

use crate::errors::AppError;
use crate::events::{EventBus, StoreEvent};
use crate::models::settings::UserSettingsRow;

pub const SETTINGS_ROW_ID: i32 = 1;

/// A calorie range is valid when both bounds are non-negative and the
/// minimum is strictly below the maximum.
pub fn validate_range(min_calories: f64, max_calories: f64) -> Result<(), String> {
    if !(min_calories >= 0.0) || !(max_calories >= 0.0) {
        return Err("calorie bounds must be non-negative numbers".to_string());
    }
    if min_calories >= max_calories {
        return Err("minimum calories must be strictly below the maximum".to_string());
    }
    Ok(())
}

#[derive(Clone)]
pub struct SettingsStore {
    pool: PgPool,
    events: EventBus,
}

impl SettingsStore {
    pub fn new(pool: PgPool, events: EventBus) -> Self {
        Self { pool, events }
    }

    /// One-shot read; `None` until the row is first created.
    pub async fn get_once(&self) -> Result<Option<UserSettingsRow>, sqlx::Error> {
        sqlx::query_as::<_, UserSettingsRow>("SELECT * FROM user_settings WHERE id = $1")
            .bind(SETTINGS_ROW_ID)
            .fetch_optional(&self.pool)
            .await
    }

    /// Saves the calorie range. Rejected input leaves the store untouched.
    /// The upsert writes only the range columns, so an existing streak
    /// survives every settings save.
    pub async fn save_range(
        &self,
        min_calories: f64,
        max_calories: f64,
    ) -> Result<UserSettingsRow, AppError> {
        validate_range(min_calories, max_calories).map_err(AppError::Validation)?;

        let row = sqlx::query_as::<_, UserSettingsRow>(
            r#"
            INSERT INTO user_settings (id, min_calories, max_calories, current_streak, last_streak_date_ms)
            VALUES ($1, $2, $3, 0, 0)
            ON CONFLICT (id) DO UPDATE
                SET min_calories = EXCLUDED.min_calories,
                    max_calories = EXCLUDED.max_calories
            RETURNING *
            "#,
        )
        .bind(SETTINGS_ROW_ID)
        .bind(min_calories)
        .bind(max_calories)
        .fetch_one(&self.pool)
        .await?;

        info!("Saved calorie range {min_calories}..={max_calories}");
        self.events.publish(StoreEvent::SettingsUpdated);
        Ok(row)
    }

    /// Writes the streak columns. Creates the row with a zero (unconfigured)
    /// calorie range when it does not exist yet.
    pub async fn update_streak(
        &self,
        current_streak: i32,
        last_streak_date_ms: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_settings (id, min_calories, max_calories, current_streak, last_streak_date_ms)
            VALUES ($1, 0, 0, $2, $3)
            ON CONFLICT (id) DO UPDATE
                SET current_streak = EXCLUDED.current_streak,
                    last_streak_date_ms = EXCLUDED.last_streak_date_ms
            "#,
        )
        .bind(SETTINGS_ROW_ID)
        .bind(current_streak)
        .bind(last_streak_date_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Live view of the settings row: current value first, then a fresh read
    /// after every settings or streak write.
    pub fn watch(
        &self,
    ) -> impl Stream<Item = Result<Option<UserSettingsRow>, sqlx::Error>> + Send + 'static {
        let store = self.clone();
        let mut rx = self.events.subscribe();
        async_stream::stream! {
            yield store.get_once().await;
            loop {
                match rx.recv().await {
                    Ok(StoreEvent::SettingsUpdated | StoreEvent::StreakUpdated { .. }) => {
                        yield store.get_once().await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => yield store.get_once().await,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensible_ranges_pass() {
        assert!(validate_range(1500.0, 2000.0).is_ok());
        assert!(validate_range(0.0, 1.0).is_ok());
    }

    #[test]
    fn inverted_or_degenerate_ranges_fail() {
        assert!(validate_range(2000.0, 1500.0).is_err());
        assert!(validate_range(1500.0, 1500.0).is_err());
        assert!(validate_range(0.0, 0.0).is_err());
    }

    #[test]
    fn negative_and_nan_bounds_fail() {
        assert!(validate_range(-100.0, 2000.0).is_err());
        assert!(validate_range(100.0, -2000.0).is_err());
        assert!(validate_range(f64::NAN, 2000.0).is_err());
        assert!(validate_range(100.0, f64::NAN).is_err());
    }
}
