use crate::cli::ServeArgs;
use crate::infra::{house_rewards, house_shop, AppState, InMemoryLedger, InMemoryRewardCatalog};
use crate::routes::with_loyalty_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use loyalcup::config::AppConfig;
use loyalcup::error::AppError;
use loyalcup::loyalty::{LoyaltyService, RewardCatalogStore};
use loyalcup::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let ledger = Arc::new(InMemoryLedger::default());
    let catalog = Arc::new(InMemoryRewardCatalog::default());
    let shop = house_shop();
    for reward in house_rewards() {
        if let Err(err) = catalog.insert(&shop, reward) {
            warn!(%shop, error = %err, "failed to seed house reward");
        }
    }
    let loyalty_service = Arc::new(LoyaltyService::new(ledger, catalog, config.loyalty));

    let app = with_loyalty_routes(loyalty_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        redeem_attempts = config.loyalty.redeem_attempts,
        "loyalty service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
