//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        tts::{speech_model, OPENAI_VOICES},
        LocalFileStore, OpenAiScriptAdapter, OpenAiTtsAdapter, PgRecordStore,
    },
    config::{Config, StoreBackend},
    error::ApiError,
    web::{
        rest::ApiDoc,
        router,
        speech_engine::openai_voice_catalogue,
        state::{AppState, SessionRegistry, SpeechSettings},
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method,
    },
    Router,
};
use speaking_coach_core::ports::RecordStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Open the Record Store ---
    let store: Arc<dyn RecordStore> = match config.store_backend {
        StoreBackend::Local => Arc::new(
            LocalFileStore::open(&config.local_store_dir, &config.local_store_key).await?,
        ),
        StoreBackend::Remote => {
            let database_url = config
                .database_url
                .as_ref()
                .ok_or_else(|| ApiError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = PgRecordStore::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            Arc::new(db_adapter)
        }
    };

    // --- 3. Initialize Service Adapters ---
    let provider = config.generation_provider();
    if provider.is_none() {
        warn!("No generation API key configured; generate requests will fail until one is set.");
    }
    let generator = Arc::new(OpenAiScriptAdapter::from_provider(
        provider,
        config.generation_model.clone(),
    ));

    let tts_client = config
        .openai_api_key
        .as_ref()
        .map(|api_key| Client::with_config(OpenAIConfig::new().with_api_key(api_key)));
    let tts_adapter = Arc::new(OpenAiTtsAdapter::new(
        tts_client,
        speech_model(&config.tts_model),
    ));

    // --- 4. Build the Shared AppState ---
    let hd_model = config.tts_model.to_lowercase().contains("hd");
    let app_state = Arc::new(AppState {
        store,
        generator,
        tts_adapter,
        speech: SpeechSettings {
            rate: config.speech_rate,
            voices: openai_voice_catalogue(&OPENAI_VOICES, &config.tts_voice, hd_model),
        },
        sessions: SessionRegistry::default(),
    });

    // --- 5. Create the Web Router ---
    let cors_origin = config.cors_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!("Invalid CORS_ORIGIN '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            ACCEPT,
            HeaderName::from_static("x-user-id"),
        ]);

    let app = Router::new()
        .merge(router(app_state))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
