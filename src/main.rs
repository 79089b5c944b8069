use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use career_coach::collaborators::{
    BasicPreamble, CatalogListingMatcher, FollowupGenerator, LlmFollowupGenerator,
    ListingMatcher, PreambleBuilder,
};
use career_coach::config::CoachConfig;
use career_coach::error::{Error, Result};
use career_coach::llm::create_provider;
use career_coach::pipeline::{TurnOrchestrator, chat_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = CoachConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {}", Error::from(e));
        std::process::exit(1);
    });

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🧭 Career Coach v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Chat API: http://0.0.0.0:{}/api/chat", config.port);
    eprintln!("   Health: http://0.0.0.0:{}/health", config.port);

    let orchestrator = Arc::new(
        build_orchestrator(&config)
            .await
            .context("assembling turn orchestrator")?,
    );

    // ── HTTP server ─────────────────────────────────────────────────────
    let app = chat_routes(orchestrator);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .with_context(|| format!("binding port {}", config.port))?;
    tracing::info!(port = config.port, "Chat server started");

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}

/// LLM provider plus the collaborators loaded from the configured catalogs.
async fn build_orchestrator(config: &CoachConfig) -> Result<TurnOrchestrator> {
    let llm = create_provider(&config.llm)?;

    let knowledge = match &config.knowledge_path {
        Some(path) => BasicPreamble::load_knowledge(path).await?,
        None => Vec::new(),
    };
    eprintln!("   Knowledge entries: {}", knowledge.len());
    let preamble: Arc<dyn PreambleBuilder> =
        Arc::new(BasicPreamble::new(knowledge, config.max_history));

    let listings: Arc<dyn ListingMatcher> = match &config.listings_path {
        Some(path) => Arc::new(CatalogListingMatcher::load(path).await?),
        None => Arc::new(CatalogListingMatcher::new(Vec::new())),
    };

    let followups: Arc<dyn FollowupGenerator> =
        Arc::new(LlmFollowupGenerator::new(Arc::clone(&llm)));

    Ok(TurnOrchestrator::new(
        llm,
        preamble,
        listings,
        followups,
        config.turn.clone(),
    ))
}

/// Stderr logging, plus a daily-rolling file when a log directory is set.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "career-coach.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}
