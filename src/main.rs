use std::sync::Arc;

use tracing::info;

use dify_relay::agent::DifyClient;
use dify_relay::config::AppConfig;
use dify_relay::db::submission_repository::SubmissionRepository;
use dify_relay::relay::{RelaySettings, StreamingRelay};
use dify_relay::routes::{build_router, AppState};
use dify_relay::service::auth_service::AuthService;
use dify_relay::service::capability_service::CapabilityService;
use dify_relay::service::chat_service::ChatService;
use dify_relay::service::workflow_service::WorkflowService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dify_relay=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env()?;
    info!(base_url = %config.dify_base_url, "Using Dify API");

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let dify = Arc::new(DifyClient::new(
        &config.dify_base_url,
        &config.chatflow_api_key,
        &config.workflow_api_key,
    )?);

    let relay = StreamingRelay::new(
        dify.clone(),
        RelaySettings { wait_budget: config.relay_wait, channel_timeout: config.emitter_timeout },
    );
    let submissions = SubmissionRepository::open(&config.submissions_file).await;

    let state = AppState {
        chat: ChatService::new(dify.clone(), relay),
        workflow: WorkflowService::new(dify.clone(), config.workflow_stream_wait),
        auth: AuthService::new(),
        capability: CapabilityService::new(submissions, dify),
    };

    // ── Router ────────────────────────────────────────────────────────────────
    let app = build_router(state, &config.static_dir);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
