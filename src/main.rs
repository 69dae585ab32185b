use std::sync::Arc;

use driver_intake::auth::MemoryIdentityProvider;
use driver_intake::autosave::AutosaveAgent;
use driver_intake::config::IntakeConfig;
use driver_intake::docs::FsDocumentStore;
use driver_intake::http::{self, AppState};
use driver_intake::notify::{ChatRelay, LoggingPushGateway, NotificationAgent};
use driver_intake::review::ReviewService;
use driver_intake::store::{ApplicationStore, LibSqlBackend};
use driver_intake::submit::SubmissionAgent;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env();

    let port: u16 = std::env::var("DRIVER_INTAKE_PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse()
        .unwrap_or(8080);

    eprintln!("🚕 {} v{}", config.name, env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{port}/api");
    eprintln!("   Staff API: http://0.0.0.0:{port}/api/applications");

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::env::var("DRIVER_INTAKE_DB_PATH")
        .unwrap_or_else(|_| "./data/driver-intake.db".to_string());
    let store: Arc<dyn ApplicationStore> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );

    // Persist any branding overrides so notifications match
    if let Err(e) = store.set_branding(&config.branding).await {
        tracing::warn!(error = %e, "Failed to persist branding");
    }

    // ── Document storage ─────────────────────────────────────────────────
    let docs_root = std::env::var("DRIVER_INTAKE_DOCS_DIR")
        .unwrap_or_else(|_| "./data/documents".to_string());
    let docs_base_url = std::env::var("DRIVER_INTAKE_DOCS_BASE_URL")
        .unwrap_or_else(|_| format!("http://localhost:{port}/files"));
    let documents = Arc::new(FsDocumentStore::new(docs_root, docs_base_url));

    // ── Components ───────────────────────────────────────────────────────
    let identity = Arc::new(MemoryIdentityProvider::new());
    let review = Arc::new(ReviewService::new(store.clone(), documents.clone()));
    let submit = Arc::new(SubmissionAgent::new(
        store.clone(),
        identity.clone(),
        documents.clone(),
    ));
    let autosave = Arc::new(AutosaveAgent::spawn(
        store.clone(),
        config.autosave_debounce,
    ));

    // ── Notifications ────────────────────────────────────────────────────
    let chat = config
        .chat_webhook_url
        .as_deref()
        .map(|url| Arc::new(ChatRelay::new(url)));
    if chat.is_none() {
        tracing::info!("No chat webhook configured; staff-room cards disabled");
    }
    let _notifications = NotificationAgent::spawn(
        store.clone(),
        chat,
        Arc::new(LoggingPushGateway),
    );

    // ── HTTP server ──────────────────────────────────────────────────────
    let state = AppState::new(store, identity, review, submit, autosave, config);
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!(port, "Driver intake server started");
    axum::serve(listener, app).await?;

    Ok(())
}
