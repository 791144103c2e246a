use anyhow::Context;
use comms_service::api::{self, context::ApiContext};
use comms_service::config::Config;
use comms_service::linking::record_linker::LinkPolicy;
use comms_service::outbound::{
    HttpProviderClient, HttpRealtimePublisher, HttpRecordStore, PgCommsRepo,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env().context("expected to be able to generate config")?;

    let db = PgPoolOptions::new()
        .min_connections(config.db_min_connections)
        .max_connections(config.db_max_connections)
        .connect(&config.comms_db_url)
        .await
        .context("could not connect to db")?;

    comms_db_client::COMMS_DB_MIGRATIONS
        .run(&db)
        .await
        .context("could not run migrations")?;

    let http = reqwest::Client::new();
    let ctx = Arc::new(ApiContext {
        repo: PgCommsRepo::new(db),
        records: HttpRecordStore::new(http.clone(), config.record_store_url.clone()),
        provider: HttpProviderClient::new(
            http.clone(),
            config.provider_api_url.clone(),
            config.provider_api_key.clone(),
        ),
        publisher: HttpRealtimePublisher::new(http, config.realtime_gateway_url.clone()),
        policy: LinkPolicy::default(),
    });

    let app = api::router(ctx);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("could not bind port {}", config.port))?;
    tracing::info!(port = config.port, "comms_service listening");

    axum::serve(listener, app)
        .await
        .context("server exited with error")?;

    Ok(())
}
