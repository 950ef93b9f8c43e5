//! Main Entrypoint for the Study Tutor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the database connection pool and running migrations.
//! 3. Building the LLM client, the agent roster and the tutor.
//! 4. Constructing the Axum router and applying middleware.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tutor_api::{config::Config, db::Db, router::create_router, state::AppState};
use tutor_core::{provider::build_llm_client, roster::Roster, tutor::Tutor};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Database ---
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let db = Arc::new(Db::new(pool));
    db.run_migrations().await?;
    info!("Database connection established and migrations are up-to-date.");

    // --- 4. Initialize the Tutor ---
    let prompts_path = config.prompts_path.is_dir().then_some(config.prompts_path.as_path());
    if prompts_path.is_none() {
        info!(
            path = %config.prompts_path.display(),
            "Prompts directory not found, using built-in prompts."
        );
    }
    let roster = Arc::new(Roster::load(prompts_path).context("Failed to build the agent roster")?);
    let llm_client = build_llm_client(&config.llm);
    let tutor = Arc::new(Tutor::new(llm_client, roster, config.max_tool_rounds));

    tokio::fs::create_dir_all(&config.study_plan_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create study plan directory {}",
                config.study_plan_dir.display()
            )
        })?;

    let app_state = Arc::new(AppState {
        db,
        tutor,
        config: Arc::new(config.clone()),
    });

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state).layer(cors);

    // --- 6. Start Server ---
    info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        bind_address = %config.bind_address,
        max_tool_rounds = config.max_tool_rounds,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
