pub mod health;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::meals::handlers as meals;
use crate::settings::handlers as settings;
use crate::state::AppState;
use crate::streak::handlers as streak;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Analysis workflow: one session per photo
        .route("/api/v1/analysis", post(analysis::handle_start_analysis))
        .route("/api/v1/analysis/:id", get(analysis::handle_get_session))
        .route(
            "/api/v1/analysis/:id/products",
            post(analysis::handle_add_product),
        )
        .route(
            "/api/v1/analysis/:id/products/:index",
            put(analysis::handle_edit_product).delete(analysis::handle_remove_product),
        )
        .route("/api/v1/analysis/:id/name", put(analysis::handle_rename))
        .route(
            "/api/v1/analysis/:id/finalize",
            post(analysis::handle_finalize),
        )
        .route("/api/v1/analysis/:id/save", post(analysis::handle_save))
        // Meal history
        .route(
            "/api/v1/meals",
            get(meals::handle_list_meals).delete(meals::handle_delete_all_meals),
        )
        .route("/api/v1/meals/events", get(meals::handle_meal_events))
        .route("/api/v1/meals/live", get(meals::handle_live_meals))
        .route(
            "/api/v1/meals/:id",
            get(meals::handle_get_meal).delete(meals::handle_delete_meal),
        )
        // Settings
        .route(
            "/api/v1/settings",
            get(settings::handle_get_settings).put(settings::handle_save_settings),
        )
        .route("/api/v1/settings/live", get(settings::handle_settings_live))
        // Adherence streak
        .route("/api/v1/streak", get(streak::handle_get_streak))
        .route("/api/v1/streak/refresh", post(streak::handle_refresh_streak))
        .with_state(state)
}
