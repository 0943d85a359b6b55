mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::{Config, LedgerBackend};
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;

use crate::db::{db::DBClient, ledger::LedgerStore, memory::MemoryLedger};
use service::{
    commission::CommissionSchedule,
    marketplace::MarketplaceService,
    registration::RegistrationService,
    submission_engine::SubmissionApprovalEngine,
    withdrawal_engine::WithdrawalApprovalEngine,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub store: Arc<dyn LedgerStore>,
    // Services
    pub registration: Arc<RegistrationService>,
    pub marketplace: Arc<MarketplaceService>,
    pub submission_engine: Arc<SubmissionApprovalEngine>,
    pub withdrawal_engine: Arc<WithdrawalApprovalEngine>,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, config: Config) -> Self {
        let schedule = Arc::new(CommissionSchedule::with_operational_bonuses(
            config.operational_bonuses.clone(),
        ));

        let registration = Arc::new(RegistrationService::new(
            store.clone(),
            config.jwt_secret.clone(),
            config.jwt_maxage,
            config.approval_timeout,
        ));
        let marketplace = Arc::new(MarketplaceService::new(store.clone(), config.approval_timeout));
        let submission_engine = Arc::new(SubmissionApprovalEngine::new(
            store.clone(),
            schedule,
            config.approval_timeout,
        ));
        let withdrawal_engine = Arc::new(WithdrawalApprovalEngine::new(
            store.clone(),
            config.approval_timeout,
        ));

        Self {
            env: config,
            store,
            registration,
            marketplace,
            submission_engine,
            withdrawal_engine,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::init()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let store: Arc<dyn LedgerStore> = match config.ledger_backend {
        LedgerBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set")?;

            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .acquire_timeout(config.approval_timeout)
                .connect(database_url)
                .await
                .context("Failed to connect to the database")?;
            tracing::info!(max_connections = config.db_max_connections, "Connection to the database is successful");

            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .context("Failed to run database migrations")?;

            Arc::new(DBClient::new(pool, config.lock_timeout))
        }
        LedgerBackend::Memory => {
            tracing::warn!("Using the in-memory ledger; all data is lost on shutdown");
            Arc::new(MemoryLedger::new())
        }
    };

    let app_state = Arc::new(AppState::new(store, config.clone()));

    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        let admin = app_state
            .registration
            .ensure_admin(&config.admin_name, email, password)
            .await
            .context("Failed to create the bootstrap admin")?;
        tracing::info!(admin_id = %admin.id, "Bootstrap admin ready");
    }

    for bonus in &config.operational_bonuses {
        tracing::info!(referral_code = %bonus.referral_code, amount = %bonus.amount, "Operational bonus configured");
    }

    let allowed_origin = config
        .app_url
        .parse::<HeaderValue>()
        .context("APP_URL is not a valid origin")?;

    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT]);

    let app = create_router(app_state.clone()).layer(cors);

    tracing::info!(
        port = config.port,
        ledger = app_state.store.backend_name(),
        "Server is running on http://localhost:{}",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .context("Failed to bind listener")?;

    axum::serve(listener, app).await?;

    Ok(())
}
