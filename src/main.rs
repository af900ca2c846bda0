use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linguapay::adapters::click::ClickCheckout;
use linguapay::adapters::google_play::GooglePlayVerifier;
use linguapay::adapters::http::auth::JwtAuthenticator;
use linguapay::adapters::http::payment::{payment_router, PaymentAppState};
use linguapay::adapters::payme::PaymeAdapter;
use linguapay::adapters::postgres::{PostgresTransactionStore, PostgresUserStore};
use linguapay::config::AppConfig;
use linguapay::domain::payment::{
    ClickSignatureVerifier, ProviderKind, ReconciliationService, DEFAULT_CATALOG,
};
use linguapay::ports::{CheckoutProvider, PurchaseVerifier, TransactionStore, UserStore};

#[tokio::main]
async fn main() {
    let config = AppConfig::load().expect("Failed to load configuration");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.server.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate().expect("Invalid configuration");

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");
        tracing::info!("migrations applied");
    }

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.request_timeout_secs))
        .build()
        .expect("Failed to build HTTP client");

    let transactions: Arc<dyn TransactionStore> =
        Arc::new(PostgresTransactionStore::new(pool.clone()));
    let users: Arc<dyn UserStore> = Arc::new(PostgresUserStore::new(pool.clone()));
    let catalog = Arc::new(DEFAULT_CATALOG.clone());

    let reconciliation = Arc::new(ReconciliationService::new(
        transactions.clone(),
        users.clone(),
        catalog.clone(),
    ));
    let click_verifier = Arc::new(ClickSignatureVerifier::new(
        config.payment.click.secret_key.clone(),
    ));

    let payme = config
        .payment
        .payme
        .clone()
        .map(|payme_config| Arc::new(PaymeAdapter::new(payme_config, http_client.clone())));

    let mut checkouts: HashMap<ProviderKind, Arc<dyn CheckoutProvider>> = HashMap::new();
    checkouts.insert(
        ProviderKind::Click,
        Arc::new(ClickCheckout::new(config.payment.click.clone())),
    );
    if let Some(payme_adapter) = payme.clone() {
        checkouts.insert(ProviderKind::Payme, payme_adapter.clone());
    }

    let mut verifiers: HashMap<ProviderKind, Arc<dyn PurchaseVerifier>> = HashMap::new();
    if let Some(google_config) = config.payment.google_play.clone() {
        verifiers.insert(
            ProviderKind::GooglePlay,
            Arc::new(GooglePlayVerifier::new(google_config, http_client.clone())),
        );
    }
    if let Some(payme_adapter) = payme {
        verifiers.insert(ProviderKind::Payme, payme_adapter);
    }

    let state = PaymentAppState {
        transactions,
        users,
        catalog,
        reconciliation,
        click_verifier,
        checkouts,
        verifiers,
        authenticator: Arc::new(JwtAuthenticator::new(&config.auth)),
    };

    let app = Router::new()
        .nest("/api", payment_router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .with_state(state);

    let addr = config.server.socket_addr().expect("Invalid bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(%addr, environment = ?config.server.environment, "linguapay listening");

    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
