pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;

use crate::application::use_cases::filter_builders::DbType;
use crate::application::use_cases::llm_understander::LlmUnderstander;
use crate::application::use_cases::pattern_tables::PatternTables;
use crate::application::use_cases::query_service::QueryService;
use crate::application::use_cases::sql_template_generator::{QueryLimits, SqlTemplateGenerator};
use crate::application::use_cases::understander::{FallbackUnderstander, PatternUnderstander};
use crate::domain::app_config::AppConfig;
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::{load_config, redact_url};
use crate::infrastructure::context_store::InMemoryContextStore;
use crate::infrastructure::db::SqlxExecutor;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};
use crate::interfaces::http::HttpState;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Wire the pipeline for `config`: database, pattern tables, LLM strategy
/// and context store.
pub async fn build_state(config: &AppConfig) -> Result<HttpState> {
    let executor = SqlxExecutor::connect(&config.database).await?;
    executor.bootstrap_demo_data().await?;
    let db_type: DbType = executor.db_type();
    let limits = QueryLimits::from(&config.query);

    let tables = Arc::new(PatternTables::builtin()?);
    let rules = Arc::new(PatternUnderstander::new(
        tables.clone(),
        SqlTemplateGenerator::new(db_type, limits),
    ));

    let client: Arc<dyn LLMClient> = Arc::new(RouterClient::new());
    let llm = Arc::new(LlmUnderstander::new(
        client,
        config.llm.clone(),
        db_type,
        limits,
        tables,
    ));

    let mut service = QueryService::new(rules.clone(), Arc::new(executor), config.query.clone())
        .with_context_store(Arc::new(InMemoryContextStore::new()));
    if config.llm.enable_llm_nlu || config.llm.enable_llm_sql {
        info!(
            "LLM strategy enabled ({:?} {} at {}, fallback={})",
            config.llm.provider, config.llm.model, config.llm.base_url, config.llm.enable_fallback
        );
        service = service.with_llm(Arc::new(FallbackUnderstander::new(
            llm.clone(),
            rules,
            config.llm.enable_fallback,
        )));
    } else {
        info!("LLM strategy disabled; using rules only");
    }

    Ok(HttpState {
        service: Arc::new(service),
        llm,
    })
}

async fn serve() -> Result<()> {
    let config = load_config()?;
    let state = build_state(&config).await?;

    let server = interfaces::http::start_server(state, &config.server)?;
    info!(
        "smartlib listening on http://{}:{} (db={})",
        config.server.host,
        config.server.port,
        redact_url(&config.database.url)
    );
    server.await.map_err(AppError::from)
}

pub fn run() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(serve()) {
        error!("smartlib stopped: {}", e);
        std::process::exit(1);
    }
}
