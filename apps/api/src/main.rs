mod analysis;
mod config;
mod day;
mod db;
mod errors;
mod events;
mod llm_client;
mod meals;
mod models;
mod routes;
mod settings;
mod state;
mod streak;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::sessions::SessionRegistry;
use crate::config::{Config, ProviderKind};
use crate::day::DayZone;
use crate::db::create_pool;
use crate::events::EventBus;
use crate::llm_client::{FoodAnalyzer, GeminiAnalyzer, OpenAiAnalyzer};
use crate::meals::store::MealStore;
use crate::routes::build_router;
use crate::settings::store::SettingsStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MealSnap API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Initialize the vision analyzer
    let analyzer = build_analyzer(&config)?;

    // Day bucketing zone: pinned offset or host-local
    let day_zone = DayZone::from_offset_minutes(config.time_offset_minutes)?;

    // Stores share one event bus; it is what makes queries live
    let events = EventBus::new();
    let meals = MealStore::new(db.clone(), events.clone());
    let settings = SettingsStore::new(db, events.clone());
    let sessions = SessionRegistry::new();

    // Streak re-evaluation after every change to today's calorie total
    tokio::spawn(streak::run_worker(
        meals.clone(),
        settings.clone(),
        events.clone(),
        day_zone,
    ));

    // Abandoned analysis sessions are swept periodically
    tokio::spawn(sessions.clone().run_sweeper());

    // Build app state
    let state = AppState {
        analyzer,
        meals,
        settings,
        sessions,
        events,
        day_zone,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Selects the inference backend. Gemini is the default; OpenAI is the
/// drop-in alternative with the same extraction contract.
fn build_analyzer(config: &Config) -> Result<Arc<dyn FoodAnalyzer>> {
    match config.provider {
        ProviderKind::Gemini => {
            let api_key = config
                .gemini_api_key
                .clone()
                .context("GEMINI_API_KEY is required when ANALYZER_PROVIDER=gemini")?;
            info!("Analyzer initialized (model: {})", llm_client::GEMINI_MODEL);
            Ok(Arc::new(GeminiAnalyzer::new(api_key)))
        }
        ProviderKind::OpenAi => {
            let api_key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY is required when ANALYZER_PROVIDER=openai")?;
            info!(
                "Analyzer initialized (models: {}, {})",
                llm_client::OPENAI_VISION_MODEL,
                llm_client::OPENAI_TEXT_MODEL
            );
            Ok(Arc::new(OpenAiAnalyzer::new(api_key)))
        }
    }
}
