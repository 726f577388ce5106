use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use loyalcup::loyalty::{loyalty_router, BalanceLedger, LoyaltyService, RewardCatalogStore};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_loyalty_routes<L, C>(service: Arc<LoyaltyService<L, C>>) -> axum::Router
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    loyalty_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{house_rewards, house_shop, InMemoryLedger, InMemoryRewardCatalog};
    use axum::body::Body;
    use axum::http::Request;
    use loyalcup::config::LoyaltyConfig;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let catalog = Arc::new(InMemoryRewardCatalog::default());
        for reward in house_rewards() {
            catalog.insert(&house_shop(), reward).expect("seed reward");
        }
        let service = Arc::new(LoyaltyService::new(
            Arc::new(InMemoryLedger::default()),
            catalog,
            LoyaltyConfig::default(),
        ));
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_loyalty_routes(service).layer(Extension(state))
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json payload")
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = app(true)
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_tracks_flag() {
        let response = app(false)
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["status"], "initializing");

        let state = AppState {
            readiness: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        state.readiness.store(true, Ordering::Release);
        let response = readiness_endpoint(Extension(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_are_plain_text() {
        let response = app(true)
            .oneshot(Request::get("/metrics").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; version=0.0.4"
        );
    }

    #[tokio::test]
    async fn loyalty_routes_are_mounted() {
        let response = app(true)
            .oneshot(
                Request::get("/api/v1/shops/shop-house/rewards")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["rewards"].as_array().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn earn_then_summary_through_full_router() {
        let router = app(true);
        let response = router
            .clone()
            .oneshot(
                Request::post("/api/v1/loyalty/customers/cust-9/shops/shop-house/earn")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"points":120}"#))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = router
            .oneshot(
                Request::get("/api/v1/loyalty/customers/cust-9/shops/shop-house")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["evaluation"]["available_rewards"][0]["id"], "rwd-drip");
        assert_eq!(body["evaluation"]["next_reward"]["id"], "rwd-latte");
        assert_eq!(body["evaluation"]["progress_fraction"], 0.8);
    }
}
