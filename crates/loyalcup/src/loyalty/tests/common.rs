use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::Utc;
use serde_json::Value;

use crate::config::LoyaltyConfig;
use crate::loyalty::domain::{
    BalanceSnapshot, CustomerId, LedgerTransaction, Reward, RewardId, ShopId, ShopLoyaltySettings,
    TransactionId, TransactionKind,
};
use crate::loyalty::evaluation::RedemptionRequest;
use crate::loyalty::ledger::{BalanceLedger, HistoryPage, LedgerError, RewardCatalogStore};
use crate::loyalty::{loyalty_router, LoyaltyService};

pub(super) fn customer() -> CustomerId {
    CustomerId("cust-42".to_string())
}

pub(super) fn shop() -> ShopId {
    ShopId("shop-bean-there".to_string())
}

pub(super) fn other_shop() -> ShopId {
    ShopId("shop-grindhouse".to_string())
}

/// Catalog from the reference scenario: two rewards tied at 100 points, one at 150.
pub(super) fn sample_rewards() -> Vec<Reward> {
    vec![
        Reward::new("a", "Free drip", 100),
        Reward::new("b", "Free latte", 150),
        Reward::new("c", "Free pastry", 100),
    ]
}

pub(super) fn ids(rewards: &[Reward]) -> Vec<&str> {
    rewards.iter().map(|reward| reward.id.0.as_str()).collect()
}

#[derive(Default)]
struct LedgerState {
    balances: BTreeMap<(CustomerId, ShopId), i64>,
    transactions: Vec<LedgerTransaction>,
    sequence: u64,
}

impl LedgerState {
    fn record(
        &mut self,
        customer: &CustomerId,
        shop: &ShopId,
        kind: TransactionKind,
        points_change: i64,
        balance_after: i64,
        reward_id: Option<RewardId>,
        order_id: Option<String>,
    ) -> LedgerTransaction {
        self.sequence += 1;
        let transaction = LedgerTransaction {
            id: TransactionId(format!("txn-{}", self.sequence)),
            customer_id: customer.clone(),
            shop_id: shop.clone(),
            kind,
            points_change,
            balance_after,
            reward_id,
            order_id,
            created_at: Utc::now(),
        };
        self.transactions.push(transaction.clone());
        transaction
    }
}

#[derive(Default)]
pub(super) struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub(super) fn with_balance(customer: &CustomerId, shop: &ShopId, points: i64) -> Self {
        let ledger = Self::default();
        ledger.set_balance(customer, shop, points);
        ledger
    }

    pub(super) fn set_balance(&self, customer: &CustomerId, shop: &ShopId, points: i64) {
        self.state
            .lock()
            .expect("ledger mutex poisoned")
            .balances
            .insert((customer.clone(), shop.clone()), points);
    }

    pub(super) fn current(&self, customer: &CustomerId, shop: &ShopId) -> Option<i64> {
        self.state
            .lock()
            .expect("ledger mutex poisoned")
            .balances
            .get(&(customer.clone(), shop.clone()))
            .copied()
    }
}

impl BalanceLedger for MemoryLedger {
    fn balance(&self, customer: &CustomerId, shop: &ShopId) -> Result<Option<i64>, LedgerError> {
        Ok(self.current(customer, shop))
    }

    fn balances(&self, customer: &CustomerId) -> Result<Vec<BalanceSnapshot>, LedgerError> {
        let guard = self.state.lock().expect("ledger mutex poisoned");
        Ok(guard
            .balances
            .iter()
            .filter(|((owner, _), _)| owner == customer)
            .map(|((_, shop), points)| BalanceSnapshot {
                shop_id: shop.clone(),
                points: *points,
                updated_at: Utc::now(),
            })
            .collect())
    }

    fn credit(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        points: i64,
        order_id: Option<String>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut guard = self.state.lock().expect("ledger mutex poisoned");
        let balance = guard
            .balances
            .entry((customer.clone(), shop.clone()))
            .or_insert(0);
        *balance += points;
        let balance_after = *balance;
        Ok(guard.record(
            customer,
            shop,
            TransactionKind::Earned,
            points,
            balance_after,
            None,
            order_id,
        ))
    }

    fn apply_redemption(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        request: &RedemptionRequest,
    ) -> Result<LedgerTransaction, LedgerError> {
        if !request.is_consistent() {
            return Err(LedgerError::Conflict);
        }
        let mut guard = self.state.lock().expect("ledger mutex poisoned");
        let key = (customer.clone(), shop.clone());
        let actual = guard.balances.get(&key).copied().unwrap_or(0);
        if actual != request.expected_balance {
            return Err(LedgerError::BalanceChanged {
                expected: request.expected_balance,
                actual,
            });
        }
        guard.balances.insert(key, request.new_balance);
        Ok(guard.record(
            customer,
            shop,
            TransactionKind::Redeemed,
            -request.points_deducted,
            request.new_balance,
            Some(request.reward_id.clone()),
            None,
        ))
    }

    fn history(
        &self,
        customer: &CustomerId,
        shop: Option<&ShopId>,
        page: HistoryPage,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let guard = self.state.lock().expect("ledger mutex poisoned");
        Ok(guard
            .transactions
            .iter()
            .rev()
            .filter(|txn| &txn.customer_id == customer)
            .filter(|txn| shop.map_or(true, |shop| &txn.shop_id == shop))
            .skip(page.skip)
            .take(page.limit)
            .cloned()
            .collect())
    }
}

/// Ledger whose balance is bumped by a competing writer right before the first `races` swaps.
pub(super) struct RacingLedger {
    pub(super) inner: MemoryLedger,
    races: Mutex<u32>,
}

impl RacingLedger {
    pub(super) fn new(inner: MemoryLedger, races: u32) -> Self {
        Self {
            inner,
            races: Mutex::new(races),
        }
    }
}

impl BalanceLedger for RacingLedger {
    fn balance(&self, customer: &CustomerId, shop: &ShopId) -> Result<Option<i64>, LedgerError> {
        self.inner.balance(customer, shop)
    }

    fn balances(&self, customer: &CustomerId) -> Result<Vec<BalanceSnapshot>, LedgerError> {
        self.inner.balances(customer)
    }

    fn credit(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        points: i64,
        order_id: Option<String>,
    ) -> Result<LedgerTransaction, LedgerError> {
        self.inner.credit(customer, shop, points, order_id)
    }

    fn apply_redemption(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        request: &RedemptionRequest,
    ) -> Result<LedgerTransaction, LedgerError> {
        {
            let mut races = self.races.lock().expect("race mutex poisoned");
            if *races > 0 {
                *races -= 1;
                self.inner
                    .credit(customer, shop, 5, Some("concurrent-order".to_string()))?;
            }
        }
        self.inner.apply_redemption(customer, shop, request)
    }

    fn history(
        &self,
        customer: &CustomerId,
        shop: Option<&ShopId>,
        page: HistoryPage,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        self.inner.history(customer, shop, page)
    }
}

pub(super) struct UnavailableLedger;

impl BalanceLedger for UnavailableLedger {
    fn balance(&self, _customer: &CustomerId, _shop: &ShopId) -> Result<Option<i64>, LedgerError> {
        Err(LedgerError::Unavailable("ledger offline".to_string()))
    }

    fn balances(&self, _customer: &CustomerId) -> Result<Vec<BalanceSnapshot>, LedgerError> {
        Err(LedgerError::Unavailable("ledger offline".to_string()))
    }

    fn credit(
        &self,
        _customer: &CustomerId,
        _shop: &ShopId,
        _points: i64,
        _order_id: Option<String>,
    ) -> Result<LedgerTransaction, LedgerError> {
        Err(LedgerError::Unavailable("ledger offline".to_string()))
    }

    fn apply_redemption(
        &self,
        _customer: &CustomerId,
        _shop: &ShopId,
        _request: &RedemptionRequest,
    ) -> Result<LedgerTransaction, LedgerError> {
        Err(LedgerError::Unavailable("ledger offline".to_string()))
    }

    fn history(
        &self,
        _customer: &CustomerId,
        _shop: Option<&ShopId>,
        _page: HistoryPage,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        Err(LedgerError::Unavailable("ledger offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryCatalog {
    rewards: Mutex<HashMap<ShopId, Vec<Reward>>>,
    settings: Mutex<HashMap<ShopId, ShopLoyaltySettings>>,
}

impl MemoryCatalog {
    pub(super) fn with_rewards(shop: &ShopId, rewards: Vec<Reward>) -> Self {
        let catalog = Self::default();
        catalog
            .rewards
            .lock()
            .expect("catalog mutex poisoned")
            .insert(shop.clone(), rewards);
        catalog
    }
}

impl RewardCatalogStore for MemoryCatalog {
    fn rewards(&self, shop: &ShopId) -> Result<Vec<Reward>, LedgerError> {
        let guard = self.rewards.lock().expect("catalog mutex poisoned");
        Ok(guard.get(shop).cloned().unwrap_or_default())
    }

    fn insert(&self, shop: &ShopId, reward: Reward) -> Result<Reward, LedgerError> {
        let mut guard = self.rewards.lock().expect("catalog mutex poisoned");
        let entries = guard.entry(shop.clone()).or_default();
        if entries.iter().any(|entry| entry.id == reward.id) {
            return Err(LedgerError::Conflict);
        }
        entries.push(reward.clone());
        Ok(reward)
    }

    fn insert_all(&self, shop: &ShopId, rewards: Vec<Reward>) -> Result<usize, LedgerError> {
        let mut guard = self.rewards.lock().expect("catalog mutex poisoned");
        let entries = guard.entry(shop.clone()).or_default();
        if rewards
            .iter()
            .any(|reward| entries.iter().any(|entry| entry.id == reward.id))
        {
            return Err(LedgerError::Conflict);
        }
        let count = rewards.len();
        entries.extend(rewards);
        Ok(count)
    }

    fn update(&self, shop: &ShopId, reward: Reward) -> Result<Reward, LedgerError> {
        let mut guard = self.rewards.lock().expect("catalog mutex poisoned");
        let entry = guard
            .get_mut(shop)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.id == reward.id))
            .ok_or(LedgerError::NotFound)?;
        *entry = reward.clone();
        Ok(reward)
    }

    fn remove(&self, shop: &ShopId, reward_id: &RewardId) -> Result<(), LedgerError> {
        let mut guard = self.rewards.lock().expect("catalog mutex poisoned");
        let entries = guard.get_mut(shop).ok_or(LedgerError::NotFound)?;
        let before = entries.len();
        entries.retain(|entry| &entry.id != reward_id);
        if entries.len() == before {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }

    fn settings(&self, shop: &ShopId) -> Result<Option<ShopLoyaltySettings>, LedgerError> {
        let guard = self.settings.lock().expect("settings mutex poisoned");
        Ok(guard.get(shop).copied())
    }

    fn save_settings(
        &self,
        shop: &ShopId,
        settings: ShopLoyaltySettings,
    ) -> Result<ShopLoyaltySettings, LedgerError> {
        let mut guard = self.settings.lock().expect("settings mutex poisoned");
        guard.insert(shop.clone(), settings);
        Ok(settings)
    }
}

pub(super) fn loyalty_config() -> LoyaltyConfig {
    LoyaltyConfig {
        redeem_attempts: 3,
        history_limit: 10,
        default_points_per_dollar: 10,
    }
}

pub(super) fn build_service(
    balance: i64,
) -> (
    Arc<LoyaltyService<MemoryLedger, MemoryCatalog>>,
    Arc<MemoryLedger>,
    Arc<MemoryCatalog>,
) {
    let ledger = Arc::new(MemoryLedger::with_balance(&customer(), &shop(), balance));
    let catalog = Arc::new(MemoryCatalog::with_rewards(&shop(), sample_rewards()));
    let service = Arc::new(LoyaltyService::new(
        ledger.clone(),
        catalog.clone(),
        loyalty_config(),
    ));
    (service, ledger, catalog)
}

pub(super) fn router_with_service(
    service: Arc<LoyaltyService<MemoryLedger, MemoryCatalog>>,
) -> axum::Router {
    loyalty_router(service)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
