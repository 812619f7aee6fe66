// vendabot-server/src/main.rs

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use vendabot_core::tasks::spawn_sweep_task;
use vendabot_core::Database;

mod context;
mod server;

use context::{AppContext, Config};

#[derive(Parser, Debug, Clone)]
#[command(name = "vendabot")]
#[command(author, version, about = "Marketplace question resolution orchestrator")]
struct Args {
    /// Address the webhook server binds to
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind_addr: String,

    /// Postgres connection URL (DATABASE_URL overrides)
    #[arg(long, default_value = "postgres://vendabot@localhost:5432/vendabot")]
    db_url: String,

    /// Minutes a question waits for a human reply before AI escalation
    #[arg(long, default_value_t = 30)]
    timeout_minutes: i64,

    /// Seconds between background sweeps (reconciliation + escalation)
    #[arg(long, default_value_t = 300)]
    sweep_interval_secs: u64,

    /// Marketplace REST base URL
    #[arg(long, default_value = "https://api.mercadolibre.com")]
    marketplace_base_url: String,

    /// Marketplace OAuth token endpoint
    #[arg(long, default_value = "https://api.mercadolibre.com/oauth/token")]
    marketplace_token_url: String,

    /// LLM model name
    #[arg(long, default_value = "gemini-2.0-flash")]
    llm_model: String,
}

fn required_env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("missing required env var {name}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let config = Config {
        encryption_key: required_env("ENCRYPTION_KEY")?,
        marketplace_base_url: args.marketplace_base_url.clone(),
        marketplace_token_url: args.marketplace_token_url.clone(),
        marketplace_app_id: required_env("MARKETPLACE_APP_ID")?,
        marketplace_app_secret: required_env("MARKETPLACE_APP_SECRET")?,
        messaging_base_url: required_env("MESSAGING_BASE_URL")?,
        messaging_instance: required_env("MESSAGING_INSTANCE")?,
        messaging_api_key: required_env("MESSAGING_API_KEY")?,
        llm_api_key: required_env("LLM_API_KEY")?,
        llm_model: args.llm_model.clone(),
        timeout_minutes: args.timeout_minutes,
    };

    let db_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| args.db_url.clone());
    let db = Database::new(&db_url).await?;
    db.migrate().await?;

    let ctx = Arc::new(AppContext::build(&db, &config)?);

    let sweep_handle = spawn_sweep_task(
        ctx.sweeper.clone(),
        Duration::from_secs(args.sweep_interval_secs),
    );
    info!(
        interval_secs = args.sweep_interval_secs,
        timeout_minutes = args.timeout_minutes,
        "background sweep scheduled"
    );

    let app = server::router(ctx);
    let listener = tokio::net::TcpListener::bind(&args.bind_addr).await?;
    info!(addr = %args.bind_addr, "webhook server listening");
    axum::serve(listener, app).await?;

    sweep_handle.abort();
    Ok(())
}
