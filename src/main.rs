mod app;
mod bookings;
mod config;
mod state;

use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "tunbooking=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let (app_state, db) = state::AppState::init().await?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;

    let stored = app_state
        .bookings
        .count()
        .await
        .context("count bookings")?;
    tracing::info!(
        stored,
        strict_dates = app_state.config.bookings.strict_dates,
        upcoming_days = app_state.config.bookings.upcoming_days,
        "booking filter configured"
    );

    app::serve(app::build_app(app_state)).await
}
