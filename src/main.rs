use std::sync::Arc;

use mcp_sse_server::{
    build_app,
    config::Config,
    database::SqliteDatabase,
    domain::{default_capabilities, query_results::QueryResultStore},
    logging,
    mcp::registry::HandlerContext,
    AppState,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;
    let database = SqliteDatabase::open(&config.database_path)?;

    let context = HandlerContext {
        database: Arc::new(database),
        query_results: Arc::new(QueryResultStore::new()),
        max_rows: config.max_rows,
    };
    let state = AppState::new(
        default_capabilities(),
        context,
        config.session_buffer,
        config.max_inflight_per_session,
    );
    let sessions = Arc::clone(&state.sessions);
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        database = %config.database_path,
        "server starting"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
            sessions.close_all();
        })
        .await?;

    info!("server stopped");
    Ok(())
}
