//! Adherence tracking: counts consecutive local calendar days whose calorie
//! total lands inside the configured range.
//!
//! The transition rules live in `compute_transition`, a pure function over
//! (settings row, today's total, today's midnight). `refresh` wires it to
//! the stores; `run_worker` re-runs it after every meal change so the streak
//! can flip mid-day in both directions.

pub mod handlers;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::day::{self, DayZone, MS_PER_DAY};
use crate::errors::AppError;
use crate::events::{EventBus, StoreEvent};
use crate::meals::store::{is_meal_change, MealStore};
use crate::models::settings::UserSettingsRow;
use crate::settings::store::SettingsStore;

/// What `compute_transition` wants persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// Nothing to write: unchanged, range not configured, or clock skew.
    Unchanged,
    Set { streak: i32, last_date_ms: i64 },
}

/// A day counts toward the streak when its total is inside the inclusive
/// range AND strictly positive; an untouched day never extends a streak
/// even if the configured minimum is zero.
fn day_qualifies(settings: &UserSettingsRow, total_calories: f64) -> bool {
    total_calories > 0.0
        && total_calories >= settings.min_calories
        && total_calories <= settings.max_calories
}

/// Decides the streak transition for "today".
///
/// `today_midnight_ms` must be the local midnight of the evaluation moment.
/// The stored date is re-normalized to its own midnight before diffing, so a
/// legacy mid-day timestamp cannot shift the day arithmetic.
pub fn compute_transition(
    settings: &UserSettingsRow,
    today_total_calories: f64,
    today_midnight_ms: i64,
    zone: DayZone,
) -> StreakTransition {
    if !settings.range_configured() {
        return StreakTransition::Unchanged;
    }
    let qualifies = day_qualifies(settings, today_total_calories);

    // Never evaluated before: a streak starts only on a qualifying day.
    if settings.last_streak_date_ms == 0 {
        return if qualifies {
            StreakTransition::Set {
                streak: 1,
                last_date_ms: today_midnight_ms,
            }
        } else {
            StreakTransition::Unchanged
        };
    }

    let last_midnight_ms = day::local_midnight_ms(zone, settings.last_streak_date_ms);
    let day_diff = (today_midnight_ms - last_midnight_ms) / MS_PER_DAY;

    match day_diff {
        // Same day: meals added or deleted since the last evaluation can
        // flip the day's status in either direction.
        0 => {
            if qualifies && settings.current_streak == 0 {
                StreakTransition::Set {
                    streak: 1,
                    last_date_ms: today_midnight_ms,
                }
            } else if !qualifies && settings.current_streak > 0 {
                StreakTransition::Set {
                    streak: 0,
                    last_date_ms: today_midnight_ms,
                }
            } else {
                StreakTransition::Unchanged
            }
        }
        // The day right after the last evaluation: extend or break.
        1 => StreakTransition::Set {
            streak: if qualifies {
                settings.current_streak + 1
            } else {
                0
            },
            last_date_ms: today_midnight_ms,
        },
        // One or more days were skipped entirely; a qualifying day starts
        // over at 1, it never resumes the old count.
        d if d > 1 => StreakTransition::Set {
            streak: if qualifies { 1 } else { 0 },
            last_date_ms: today_midnight_ms,
        },
        // last date is in the future: the clock moved backwards. Keep the
        // stored state rather than guessing.
        _ => {
            warn!(
                "streak date {last_midnight_ms} is ahead of today {today_midnight_ms}, leaving streak untouched"
            );
            StreakTransition::Unchanged
        }
    }
}

/// Snapshot returned by the streak endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct StreakStatus {
    pub current_streak: i32,
    pub today_calories: f64,
    /// Whether today currently qualifies (configured, in range, non-zero).
    pub in_range: bool,
    pub min_calories: f64,
    pub max_calories: f64,
    pub range_configured: bool,
}

fn build_status(settings: &UserSettingsRow, today_calories: f64) -> StreakStatus {
    StreakStatus {
        current_streak: settings.current_streak,
        today_calories,
        in_range: settings.range_configured() && day_qualifies(settings, today_calories),
        min_calories: settings.min_calories,
        max_calories: settings.max_calories,
        range_configured: settings.range_configured(),
    }
}

fn unconfigured_status(today_calories: f64) -> StreakStatus {
    StreakStatus {
        current_streak: 0,
        today_calories,
        in_range: false,
        min_calories: 0.0,
        max_calories: 0.0,
        range_configured: false,
    }
}

/// Read-only view: today's total plus the stored streak, no writes.
pub async fn current_status(
    meals: &MealStore,
    settings_store: &SettingsStore,
    zone: DayZone,
    now_ms: i64,
) -> Result<StreakStatus, AppError> {
    let (start, end) = day::day_bounds_ms(zone, now_ms);
    let today_calories = meals.total_calories_between(start, end).await?;
    Ok(match settings_store.get_once().await? {
        Some(settings) => build_status(&settings, today_calories),
        None => unconfigured_status(today_calories),
    })
}

/// Re-evaluates the streak for "now" and persists any transition.
/// Called on app activation and by the worker after every meal change.
pub async fn refresh(
    meals: &MealStore,
    settings_store: &SettingsStore,
    events: &EventBus,
    zone: DayZone,
    now_ms: i64,
) -> Result<StreakStatus, AppError> {
    let (start, end) = day::day_bounds_ms(zone, now_ms);
    let today_calories = meals.total_calories_between(start, end).await?;

    let Some(mut settings) = settings_store.get_once().await? else {
        return Ok(unconfigured_status(today_calories));
    };

    if let StreakTransition::Set {
        streak,
        last_date_ms,
    } = compute_transition(&settings, today_calories, start, zone)
    {
        settings_store.update_streak(streak, last_date_ms).await?;
        info!(
            "streak {} -> {streak} (today: {today_calories} kcal)",
            settings.current_streak
        );
        events.publish(StoreEvent::StreakUpdated { streak });
        settings.current_streak = streak;
        settings.last_streak_date_ms = last_date_ms;
    }

    Ok(build_status(&settings, today_calories))
}

/// Background listener: any event that can change today's calorie total
/// triggers a re-evaluation. Spawned once at startup.
pub async fn run_worker(
    meals: MealStore,
    settings: SettingsStore,
    events: EventBus,
    zone: DayZone,
) {
    let mut rx = events.subscribe();
    loop {
        let trigger = match rx.recv().await {
            Ok(event) => is_meal_change(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("streak worker lagged {skipped} events behind, resyncing");
                true
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if !trigger {
            continue;
        }
        if let Err(e) = refresh(&meals, &settings, &events, zone, day::now_ms()).await {
            error!("streak refresh after store change failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D1: i64 = 19_700 * MS_PER_DAY;
    const D2: i64 = D1 + MS_PER_DAY;
    const D3: i64 = D1 + 2 * MS_PER_DAY;
    const D5: i64 = D1 + 4 * MS_PER_DAY;

    fn utc_zone() -> DayZone {
        DayZone::Fixed(chrono::FixedOffset::east_opt(0).unwrap())
    }

    fn make_settings(streak: i32, last_date_ms: i64) -> UserSettingsRow {
        UserSettingsRow {
            id: 1,
            min_calories: 1500.0,
            max_calories: 2000.0,
            current_streak: streak,
            last_streak_date_ms: last_date_ms,
        }
    }

    fn transition(settings: &UserSettingsRow, calories: f64, today: i64) -> StreakTransition {
        compute_transition(settings, calories, today, utc_zone())
    }

    #[test]
    fn unconfigured_range_never_moves_the_streak() {
        let mut settings = make_settings(0, 0);
        settings.min_calories = 0.0;
        settings.max_calories = 0.0;
        assert_eq!(
            transition(&settings, 1800.0, D1),
            StreakTransition::Unchanged
        );
    }

    #[test]
    fn first_qualifying_day_starts_at_one() {
        let settings = make_settings(0, 0);
        assert_eq!(
            transition(&settings, 1800.0, D1),
            StreakTransition::Set {
                streak: 1,
                last_date_ms: D1
            }
        );
    }

    #[test]
    fn first_day_out_of_range_records_nothing() {
        let settings = make_settings(0, 0);
        assert_eq!(
            transition(&settings, 2500.0, D1),
            StreakTransition::Unchanged
        );
        assert_eq!(transition(&settings, 0.0, D1), StreakTransition::Unchanged);
    }

    #[test]
    fn consecutive_qualifying_day_increments() {
        let settings = make_settings(3, D1);
        assert_eq!(
            transition(&settings, 1600.0, D2),
            StreakTransition::Set {
                streak: 4,
                last_date_ms: D2
            }
        );
    }

    #[test]
    fn consecutive_day_out_of_range_resets_to_zero() {
        let settings = make_settings(3, D1);
        assert_eq!(
            transition(&settings, 2500.0, D2),
            StreakTransition::Set {
                streak: 0,
                last_date_ms: D2
            }
        );
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let settings = make_settings(1, D1);
        assert_eq!(
            transition(&settings, 1500.0, D2),
            StreakTransition::Set {
                streak: 2,
                last_date_ms: D2
            }
        );
        let settings = make_settings(2, D2);
        assert_eq!(
            transition(&settings, 2000.0, D3),
            StreakTransition::Set {
                streak: 3,
                last_date_ms: D3
            }
        );
    }

    #[test]
    fn gap_of_multiple_days_restarts_instead_of_resuming() {
        let settings = make_settings(7, D1);
        assert_eq!(
            transition(&settings, 1800.0, D5),
            StreakTransition::Set {
                streak: 1,
                last_date_ms: D5
            }
        );
        assert_eq!(
            transition(&settings, 2500.0, D5),
            StreakTransition::Set {
                streak: 0,
                last_date_ms: D5
            }
        );
    }

    #[test]
    fn same_day_promotion_from_zero() {
        // Evaluated out-of-range earlier today, then a deletion brought the
        // total back into range.
        let settings = make_settings(0, D2);
        assert_eq!(
            transition(&settings, 1700.0, D2),
            StreakTransition::Set {
                streak: 1,
                last_date_ms: D2
            }
        );
    }

    #[test]
    fn same_day_demotion_when_total_leaves_the_range() {
        let settings = make_settings(4, D2);
        assert_eq!(
            transition(&settings, 2600.0, D2),
            StreakTransition::Set {
                streak: 0,
                last_date_ms: D2
            }
        );
    }

    #[test]
    fn same_day_reevaluation_with_no_flip_writes_nothing() {
        let in_range = make_settings(4, D2);
        assert_eq!(
            transition(&in_range, 1700.0, D2),
            StreakTransition::Unchanged
        );
        let out_of_range = make_settings(0, D2);
        assert_eq!(
            transition(&out_of_range, 2600.0, D2),
            StreakTransition::Unchanged
        );
    }

    #[test]
    fn zero_calories_never_qualifies_even_with_zero_minimum() {
        let mut settings = make_settings(2, D1);
        settings.min_calories = 0.0;
        settings.max_calories = 2000.0;
        // 0 kcal is inside [0, 2000] but an untouched day breaks the streak.
        assert_eq!(
            transition(&settings, 0.0, D2),
            StreakTransition::Set {
                streak: 0,
                last_date_ms: D2
            }
        );
    }

    #[test]
    fn clock_skew_backwards_is_a_noop() {
        let settings = make_settings(5, D5);
        assert_eq!(
            transition(&settings, 1800.0, D3),
            StreakTransition::Unchanged
        );
    }

    #[test]
    fn stored_midday_timestamp_is_renormalized_before_diffing() {
        // A legacy row might carry 08:00 instead of midnight; day arithmetic
        // must still see exactly one day of distance.
        let eight_hours = 8 * 3_600_000;
        let settings = make_settings(2, D1 + eight_hours);
        assert_eq!(
            transition(&settings, 1800.0, D2),
            StreakTransition::Set {
                streak: 3,
                last_date_ms: D2
            }
        );
    }

    #[test]
    fn status_reflects_qualification_not_just_range_membership() {
        let settings = make_settings(3, D1);
        let status = build_status(&settings, 1800.0);
        assert!(status.in_range);
        assert_eq!(status.current_streak, 3);

        let status = build_status(&settings, 0.0);
        assert!(!status.in_range);

        let mut unconfigured = make_settings(0, 0);
        unconfigured.min_calories = 0.0;
        unconfigured.max_calories = 0.0;
        let status = build_status(&unconfigured, 500.0);
        assert!(!status.range_configured);
        assert!(!status.in_range);
    }
}
