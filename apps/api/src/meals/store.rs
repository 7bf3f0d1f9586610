//! Persistence for saved meals.
//!
//! Every successful write publishes a `StoreEvent`, which is what turns the
//! plain queries below into live ones: `watch_*` yields a snapshot, then a
//! fresh snapshot after each event that can affect it.

use futures::Stream;
use sqlx::types::Json;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tracing::info;

use crate::events::{EventBus, StoreEvent};
use crate::models::meal::{NewMeal, SavedMealRow};

#[derive(Clone)]
pub struct MealStore {
    pool: PgPool,
    events: EventBus,
}

impl MealStore {
    pub fn new(pool: PgPool, events: EventBus) -> Self {
        Self { pool, events }
    }

    /// Inserts a meal and returns its database-assigned id.
    pub async fn insert(&self, meal: NewMeal) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO saved_meals
                (name, eaten_at_ms, total_calories, total_proteins, total_fats, total_carbs, products)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&meal.name)
        .bind(meal.eaten_at_ms)
        .bind(meal.total_calories)
        .bind(meal.total_proteins)
        .bind(meal.total_fats)
        .bind(meal.total_carbs)
        .bind(Json(&meal.products))
        .fetch_one(&self.pool)
        .await?;

        info!("Saved meal {id} '{}' ({} kcal)", meal.name, meal.total_calories);
        self.events.publish(StoreEvent::MealSaved {
            meal_id: id,
            eaten_at_ms: meal.eaten_at_ms,
        });
        Ok(id)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<SavedMealRow>, sqlx::Error> {
        sqlx::query_as::<_, SavedMealRow>("SELECT * FROM saved_meals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Full history, newest first.
    pub async fn list_all(&self) -> Result<Vec<SavedMealRow>, sqlx::Error> {
        sqlx::query_as::<_, SavedMealRow>("SELECT * FROM saved_meals ORDER BY eaten_at_ms DESC")
            .fetch_all(&self.pool)
            .await
    }

    /// Meals in the half-open window `[start_ms, end_ms)`, newest first.
    pub async fn list_between(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<SavedMealRow>, sqlx::Error> {
        sqlx::query_as::<_, SavedMealRow>(
            r#"
            SELECT * FROM saved_meals
            WHERE eaten_at_ms >= $1 AND eaten_at_ms < $2
            ORDER BY eaten_at_ms DESC
            "#,
        )
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await
    }

    /// Calorie sum over `[start_ms, end_ms)`; 0.0 when the window is empty.
    pub async fn total_calories_between(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<f64, sqlx::Error> {
        let total: Option<f64> = sqlx::query_scalar(
            "SELECT SUM(total_calories) FROM saved_meals WHERE eaten_at_ms >= $1 AND eaten_at_ms < $2",
        )
        .bind(start_ms)
        .bind(end_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(total.unwrap_or(0.0))
    }

    /// Deletes one meal. Deleting an id that does not exist is a no-op and
    /// returns `false`.
    pub async fn delete_by_id(&self, id: i64) -> Result<bool, sqlx::Error> {
        let eaten_at: Option<i64> =
            sqlx::query_scalar("DELETE FROM saved_meals WHERE id = $1 RETURNING eaten_at_ms")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match eaten_at {
            Some(eaten_at_ms) => {
                info!("Deleted meal {id}");
                self.events.publish(StoreEvent::MealDeleted {
                    meal_id: id,
                    eaten_at_ms,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record-identity delete; identity is the primary key.
    #[allow(dead_code)]
    pub async fn delete(&self, meal: &SavedMealRow) -> Result<bool, sqlx::Error> {
        self.delete_by_id(meal.id).await
    }

    /// Wipes the whole history; returns the number of rows removed.
    pub async fn delete_all(&self) -> Result<u64, sqlx::Error> {
        let deleted = sqlx::query("DELETE FROM saved_meals")
            .execute(&self.pool)
            .await?
            .rows_affected();
        if deleted > 0 {
            info!("Cleared meal history ({deleted} rows)");
            self.events.publish(StoreEvent::MealsCleared);
        }
        Ok(deleted)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// Live view of the full history: one snapshot immediately, then a fresh
    /// one after every meal change. Dropping the stream is the cancellation;
    /// nothing else is holding resources.
    pub fn watch_all(
        &self,
    ) -> impl Stream<Item = Result<Vec<SavedMealRow>, sqlx::Error>> + Send + 'static {
        let store = self.clone();
        let mut rx = self.events.subscribe();
        async_stream::stream! {
            yield store.list_all().await;
            loop {
                match rx.recv().await {
                    Ok(event) if is_meal_change(&event) => yield store.list_all().await,
                    Ok(_) => {}
                    // Lost events while lagging: the requery below resyncs.
                    Err(broadcast::error::RecvError::Lagged(_)) => yield store.list_all().await,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Live view of one window, typically a local calendar day. Events for
    /// meals outside the window do not trigger a requery.
    pub fn watch_between(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> impl Stream<Item = Result<Vec<SavedMealRow>, sqlx::Error>> + Send + 'static {
        let store = self.clone();
        let mut rx = self.events.subscribe();
        async_stream::stream! {
            yield store.list_between(start_ms, end_ms).await;
            loop {
                match rx.recv().await {
                    Ok(event) if affects_window(&event, start_ms, end_ms) => {
                        yield store.list_between(start_ms, end_ms).await;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        yield store.list_between(start_ms, end_ms).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Whether an event changes any meal query result at all.
pub(crate) fn is_meal_change(event: &StoreEvent) -> bool {
    matches!(
        event,
        StoreEvent::MealSaved { .. } | StoreEvent::MealDeleted { .. } | StoreEvent::MealsCleared
    )
}

/// Whether an event can change the contents of `[start_ms, end_ms)`.
fn affects_window(event: &StoreEvent, start_ms: i64, end_ms: i64) -> bool {
    match event {
        StoreEvent::MealSaved { eaten_at_ms, .. }
        | StoreEvent::MealDeleted { eaten_at_ms, .. } => {
            (start_ms..end_ms).contains(eaten_at_ms)
        }
        StoreEvent::MealsCleared => true,
        StoreEvent::SettingsUpdated | StoreEvent::StreakUpdated { .. } => false,
    }
}
