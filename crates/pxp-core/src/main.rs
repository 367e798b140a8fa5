use std::sync::Arc;

use anyhow::{Context, Result};
use diesel::{Connection, PgConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pxp_core::repo::pg::{PgAuthProvider, PgChatStore};
use pxp_core::repo::Repositories;
use pxp_core::server::{router, AppState};
use pxp_core::service::ChatService;
use pxp_core::tools::build_registry;
use pxp_core::{AgentDriver, Config};
use pxp_llm::{ChatCompletionsClient, ChatModel};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("projextpal=debug,pxp_core=debug,info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let mut connection = PgConnection::establish(&config.database_url)
        .context("connecting to Postgres")?;
    connection
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("running migrations: {}", e))?;
    let connection = Arc::new(Mutex::new(connection));

    let repos = Repositories::postgres(connection.clone());
    let chat_store = Arc::new(PgChatStore::new(connection.clone()));
    let auth = Arc::new(PgAuthProvider::new(connection));

    let model: Arc<dyn ChatModel> = Arc::new(ChatCompletionsClient::with_timeout(
        &config.ai_api_url,
        config.ai_api_key.as_deref().unwrap_or_default(),
        &config.ai_model,
        std::time::Duration::from_secs(config.ai_timeout_secs),
    )?);

    let registry = Arc::new(build_registry(repos.clone(), model.clone()));
    let driver = Arc::new(AgentDriver::new(registry, model));
    let chats = Arc::new(ChatService::new(
        chat_store,
        driver,
        config.default_language.clone(),
    ));
    let forms = Arc::new(pxp_core::form_submit::FormSubmissionHandler::new(repos));

    let app = router(AppState { auth, chats, forms });

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await.context("serving HTTP")?;

    Ok(())
}
