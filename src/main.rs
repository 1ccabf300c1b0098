mod db;
mod envelope;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::auth::TokenService;
use services::board::PgBoardAccess;
use services::event::PgEventStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
    let port: u16 = state::env_parse("PORT", 8080);

    let pool = db::init_pool(&database_url)
        .await
        .expect("database init failed");

    let state = state::AppState::new(
        pool.clone(),
        TokenService::from_env(),
        Arc::new(PgEventStore::new(pool.clone())),
        Arc::new(PgBoardAccess::new(pool)),
    );

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "wireboard listening");
    axum::serve(listener, app).await.expect("server failed");
}
