use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;

use super::catalog::{
    parse_balance, rewards_from_csv, rewards_from_json, CatalogError, RewardDraft,
};
use super::domain::{CustomerId, Reward, RewardId, ShopId, ShopLoyaltySettings};
use super::evaluation::{self, EarnError, EvaluationResult, RedemptionErrorClass};
use super::ledger::{BalanceLedger, LedgerError, RewardCatalogStore};
use super::service::{LoyaltyService, LoyaltyServiceError};

/// Router builder exposing the evaluator, customer loyalty views, and reward management.
pub fn loyalty_router<L, C>(service: Arc<LoyaltyService<L, C>>) -> Router
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    Router::new()
        .route("/api/v1/loyalty/evaluate", post(evaluate_handler))
        .route(
            "/api/v1/loyalty/customers/:customer_id",
            get(overview_handler::<L, C>),
        )
        .route(
            "/api/v1/loyalty/customers/:customer_id/shops/:shop_id",
            get(summary_handler::<L, C>),
        )
        .route(
            "/api/v1/loyalty/customers/:customer_id/shops/:shop_id/redeem",
            post(redeem_handler::<L, C>),
        )
        .route(
            "/api/v1/loyalty/customers/:customer_id/shops/:shop_id/earn",
            post(earn_handler::<L, C>),
        )
        .route(
            "/api/v1/loyalty/customers/:customer_id/transactions",
            get(history_handler::<L, C>),
        )
        .route(
            "/api/v1/shops/:shop_id/rewards",
            get(list_rewards_handler::<L, C>).post(create_reward_handler::<L, C>),
        )
        .route(
            "/api/v1/shops/:shop_id/rewards/:reward_id",
            put(update_reward_handler::<L, C>).delete(delete_reward_handler::<L, C>),
        )
        .route(
            "/api/v1/shops/:shop_id/reward-imports",
            post(import_rewards_handler::<L, C>),
        )
        .route(
            "/api/v1/shops/:shop_id/loyalty-settings",
            get(settings_handler::<L, C>).put(update_settings_handler::<L, C>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct EvaluateRequest {
    pub(crate) balance: Value,
    #[serde(default)]
    pub(crate) rewards: Vec<Reward>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RedeemRequest {
    pub(crate) reward_id: RewardId,
}

/// Either a raw `points` credit or an `order_total_cents` converted at the shop's rate.
#[derive(Debug, Deserialize)]
pub(crate) struct EarnRequest {
    #[serde(default)]
    pub(crate) points: Option<i64>,
    #[serde(default)]
    pub(crate) order_total_cents: Option<i64>,
    #[serde(default)]
    pub(crate) order_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct HistoryQuery {
    pub(crate) shop_id: Option<String>,
    pub(crate) skip: Option<usize>,
    pub(crate) limit: Option<usize>,
}

pub(crate) async fn evaluate_handler(
    Json(payload): Json<EvaluateRequest>,
) -> Result<Json<EvaluationResult>, AppError> {
    let balance = parse_balance(&payload.balance)?;
    let result = evaluation::evaluate(balance, &payload.rewards)?;
    Ok(Json(result))
}

pub(crate) async fn overview_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path(customer_id): Path<String>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.customer_overview(&CustomerId(customer_id)) {
        Ok(overview) => (StatusCode::OK, Json(overview)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn summary_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path((customer_id, shop_id)): Path<(String, String)>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.shop_summary(&CustomerId(customer_id), &ShopId(shop_id)) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn redeem_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path((customer_id, shop_id)): Path<(String, String)>,
    Json(request): Json<RedeemRequest>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.redeem(
        &CustomerId(customer_id),
        &ShopId(shop_id),
        &request.reward_id,
    ) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn earn_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path((customer_id, shop_id)): Path<(String, String)>,
    Json(request): Json<EarnRequest>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    let customer = CustomerId(customer_id);
    let shop = ShopId(shop_id);
    let outcome = match (request.points, request.order_total_cents) {
        (Some(points), None) => service.earn(&customer, &shop, points, request.order_id),
        (None, Some(amount_cents)) => {
            service.earn_for_order(&customer, &shop, amount_cents, request.order_id)
        }
        _ => {
            return invalid_request(
                "invalid_accrual",
                "provide exactly one of 'points' or 'order_total_cents'",
            )
        }
    };
    match outcome {
        Ok(transaction) => (StatusCode::CREATED, Json(transaction)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn history_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path(customer_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    let shop = query.shop_id.map(ShopId);
    match service.history(
        &CustomerId(customer_id),
        shop.as_ref(),
        query.skip,
        query.limit,
    ) {
        Ok(transactions) => {
            (StatusCode::OK, Json(json!({ "transactions": transactions }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_rewards_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path(shop_id): Path<String>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.list_rewards(&ShopId(shop_id)) {
        Ok(rewards) => (StatusCode::OK, Json(json!({ "rewards": rewards }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_reward_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path(shop_id): Path<String>,
    Json(draft): Json<RewardDraft>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.create_reward(&ShopId(shop_id), draft) {
        Ok(reward) => (StatusCode::CREATED, Json(reward)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_reward_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path((shop_id, reward_id)): Path<(String, String)>,
    Json(draft): Json<RewardDraft>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.update_reward(&ShopId(shop_id), &RewardId(reward_id), draft) {
        Ok(reward) => (StatusCode::OK, Json(reward)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn delete_reward_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path((shop_id, reward_id)): Path<(String, String)>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.delete_reward(&ShopId(shop_id), &RewardId(reward_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn import_rewards_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path(shop_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    let is_csv = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/csv"));
    let parsed = if is_csv {
        rewards_from_csv(body.as_ref())
    } else {
        rewards_from_json(body.as_ref())
    };
    let rewards = match parsed {
        Ok(rewards) => rewards,
        Err(err) => return error_response(err.into()),
    };

    match service.import_rewards(&ShopId(shop_id), rewards) {
        Ok(imported) => {
            (StatusCode::CREATED, Json(json!({ "imported": imported }))).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn settings_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path(shop_id): Path<String>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.shop_settings(&ShopId(shop_id)) {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn update_settings_handler<L, C>(
    State(service): State<Arc<LoyaltyService<L, C>>>,
    Path(shop_id): Path<String>,
    Json(settings): Json<ShopLoyaltySettings>,
) -> Response
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    match service.update_shop_settings(&ShopId(shop_id), settings) {
        Ok(saved) => (StatusCode::OK, Json(saved)).into_response(),
        Err(err) => error_response(err),
    }
}

fn invalid_request(kind: &'static str, message: &str) -> Response {
    let payload = json!({
        "error": message,
        "kind": kind,
    });
    (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
}

pub(crate) fn error_response(err: LoyaltyServiceError) -> Response {
    let (status, kind) = match &err {
        LoyaltyServiceError::Redemption(rejection) => {
            let status = match rejection.class() {
                RedemptionErrorClass::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
                RedemptionErrorClass::Stale => StatusCode::CONFLICT,
                RedemptionErrorClass::DataIntegrity => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, rejection.kind())
        }
        LoyaltyServiceError::Evaluation(_) | LoyaltyServiceError::Earn(EarnError::InvalidBalance { .. }) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "invalid_balance")
        }
        LoyaltyServiceError::Earn(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_accrual"),
        LoyaltyServiceError::Catalog(CatalogError::DuplicateReward(_)) => {
            (StatusCode::CONFLICT, "duplicate_reward")
        }
        LoyaltyServiceError::Catalog(_) => (StatusCode::UNPROCESSABLE_ENTITY, "invalid_reward"),
        LoyaltyServiceError::InvalidPageLimit { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_page")
        }
        LoyaltyServiceError::Ledger(LedgerError::NotFound) => (StatusCode::NOT_FOUND, "not_found"),
        LoyaltyServiceError::Ledger(LedgerError::Conflict) => (StatusCode::CONFLICT, "conflict"),
        LoyaltyServiceError::Ledger(LedgerError::BalanceChanged { .. }) => {
            (StatusCode::CONFLICT, "balance_changed")
        }
        LoyaltyServiceError::Ledger(LedgerError::Unavailable(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "ledger_unavailable")
        }
        LoyaltyServiceError::RetriesExhausted { .. } => (StatusCode::CONFLICT, "retries_exhausted"),
    };

    let payload = json!({
        "error": err.to_string(),
        "kind": kind,
    });
    (status, Json(payload)).into_response()
}
