use chrono::Utc;
use loyalcup::loyalty::{
    BalanceLedger, BalanceSnapshot, CustomerId, HistoryPage, LedgerError, LedgerTransaction,
    RedemptionRequest, Reward, RewardCatalogStore, RewardId, ShopId, ShopLoyaltySettings,
    TransactionId, TransactionKind,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct LedgerBook {
    balances: HashMap<(CustomerId, ShopId), BalanceSnapshot>,
    transactions: Vec<LedgerTransaction>,
    next_id: u64,
}

impl LedgerBook {
    fn append(&mut self, mut transaction: LedgerTransaction) -> LedgerTransaction {
        self.next_id += 1;
        transaction.id = TransactionId(format!("txn-{:08}", self.next_id));
        self.transactions.push(transaction.clone());
        transaction
    }
}

/// Process-local ledger. Each write happens under one lock so the redemption swap is atomic.
#[derive(Default, Clone)]
pub(crate) struct InMemoryLedger {
    book: Arc<Mutex<LedgerBook>>,
}

impl InMemoryLedger {
    fn lock(&self) -> Result<MutexGuard<'_, LedgerBook>, LedgerError> {
        self.book
            .lock()
            .map_err(|_| LedgerError::Unavailable("ledger mutex poisoned".to_string()))
    }
}

impl BalanceLedger for InMemoryLedger {
    fn balance(&self, customer: &CustomerId, shop: &ShopId) -> Result<Option<i64>, LedgerError> {
        let guard = self.lock()?;
        Ok(guard
            .balances
            .get(&(customer.clone(), shop.clone()))
            .map(|snapshot| snapshot.points))
    }

    fn balances(&self, customer: &CustomerId) -> Result<Vec<BalanceSnapshot>, LedgerError> {
        let guard = self.lock()?;
        let mut snapshots: Vec<BalanceSnapshot> = guard
            .balances
            .iter()
            .filter(|((owner, _), _)| owner == customer)
            .map(|(_, snapshot)| snapshot.clone())
            .collect();
        snapshots.sort_by(|a, b| a.shop_id.cmp(&b.shop_id));
        Ok(snapshots)
    }

    fn credit(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        points: i64,
        order_id: Option<String>,
    ) -> Result<LedgerTransaction, LedgerError> {
        let mut guard = self.lock()?;
        let now = Utc::now();
        let snapshot = guard
            .balances
            .entry((customer.clone(), shop.clone()))
            .or_insert_with(|| BalanceSnapshot {
                shop_id: shop.clone(),
                points: 0,
                updated_at: now,
            });
        snapshot.points = snapshot
            .points
            .checked_add(points)
            .ok_or(LedgerError::Conflict)?;
        snapshot.updated_at = now;
        let balance_after = snapshot.points;

        Ok(guard.append(LedgerTransaction {
            id: TransactionId(String::new()),
            customer_id: customer.clone(),
            shop_id: shop.clone(),
            kind: TransactionKind::Earned,
            points_change: points,
            balance_after,
            reward_id: None,
            order_id,
            created_at: now,
        }))
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
        let mut guard = self.lock()?;
        let now = Utc::now();
        let snapshot = guard
            .balances
            .get_mut(&(customer.clone(), shop.clone()))
            .ok_or(LedgerError::BalanceChanged {
                expected: request.expected_balance,
                actual: 0,
            })?;
        if snapshot.points != request.expected_balance {
            return Err(LedgerError::BalanceChanged {
                expected: request.expected_balance,
                actual: snapshot.points,
            });
        }
        snapshot.points = request.new_balance;
        snapshot.updated_at = now;

        Ok(guard.append(LedgerTransaction {
            id: TransactionId(String::new()),
            customer_id: customer.clone(),
            shop_id: shop.clone(),
            kind: TransactionKind::Redeemed,
            points_change: -request.points_deducted,
            balance_after: request.new_balance,
            reward_id: Some(request.reward_id.clone()),
            order_id: None,
            created_at: now,
        }))
    }

    fn history(
        &self,
        customer: &CustomerId,
        shop: Option<&ShopId>,
        page: HistoryPage,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let guard = self.lock()?;
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

#[derive(Default)]
struct ShopPrograms {
    rewards: HashMap<ShopId, Vec<Reward>>,
    settings: HashMap<ShopId, ShopLoyaltySettings>,
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryRewardCatalog {
    shops: Arc<Mutex<ShopPrograms>>,
}

impl InMemoryRewardCatalog {
    fn lock(&self) -> Result<MutexGuard<'_, ShopPrograms>, LedgerError> {
        self.shops
            .lock()
            .map_err(|_| LedgerError::Unavailable("catalog mutex poisoned".to_string()))
    }
}

impl RewardCatalogStore for InMemoryRewardCatalog {
    fn rewards(&self, shop: &ShopId) -> Result<Vec<Reward>, LedgerError> {
        let guard = self.lock()?;
        Ok(guard.rewards.get(shop).cloned().unwrap_or_default())
    }

    fn insert(&self, shop: &ShopId, reward: Reward) -> Result<Reward, LedgerError> {
        let mut guard = self.lock()?;
        let entries = guard.rewards.entry(shop.clone()).or_default();
        if entries.iter().any(|entry| entry.id == reward.id) {
            return Err(LedgerError::Conflict);
        }
        entries.push(reward.clone());
        Ok(reward)
    }

    fn insert_all(&self, shop: &ShopId, rewards: Vec<Reward>) -> Result<usize, LedgerError> {
        let mut guard = self.lock()?;
        let entries = guard.rewards.entry(shop.clone()).or_default();
        let clashes = rewards
            .iter()
            .any(|reward| entries.iter().any(|entry| entry.id == reward.id));
        if clashes {
            return Err(LedgerError::Conflict);
        }
        let count = rewards.len();
        entries.extend(rewards);
        Ok(count)
    }

    fn update(&self, shop: &ShopId, reward: Reward) -> Result<Reward, LedgerError> {
        let mut guard = self.lock()?;
        let entry = guard
            .rewards
            .get_mut(shop)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.id == reward.id))
            .ok_or(LedgerError::NotFound)?;
        *entry = reward.clone();
        Ok(reward)
    }

    fn remove(&self, shop: &ShopId, reward_id: &RewardId) -> Result<(), LedgerError> {
        let mut guard = self.lock()?;
        let entries = guard.rewards.get_mut(shop).ok_or(LedgerError::NotFound)?;
        let before = entries.len();
        entries.retain(|entry| &entry.id != reward_id);
        if entries.len() == before {
            return Err(LedgerError::NotFound);
        }
        Ok(())
    }

    fn settings(&self, shop: &ShopId) -> Result<Option<ShopLoyaltySettings>, LedgerError> {
        let guard = self.lock()?;
        Ok(guard.settings.get(shop).copied())
    }

    fn save_settings(
        &self,
        shop: &ShopId,
        settings: ShopLoyaltySettings,
    ) -> Result<ShopLoyaltySettings, LedgerError> {
        let mut guard = self.lock()?;
        guard.settings.insert(shop.clone(), settings);
        Ok(settings)
    }
}

/// Starter menu used by the demo command and by a freshly started server.
pub(crate) fn house_rewards() -> Vec<Reward> {
    vec![
        Reward::new("rwd-drip", "Free drip coffee", 100).with_description("Any roast, any size"),
        Reward::new("rwd-pastry", "Free pastry", 100),
        Reward::new("rwd-latte", "Free latte", 150).with_description("Oat milk included"),
        Reward::new("rwd-beans", "Bag of house beans", 400),
    ]
}

pub(crate) fn house_shop() -> ShopId {
    ShopId("shop-house".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> CustomerId {
        CustomerId("cust-1".to_string())
    }

    #[test]
    fn redemption_swap_rejects_stale_expected_balance() {
        let ledger = InMemoryLedger::default();
        ledger
            .credit(&customer(), &house_shop(), 120, None)
            .expect("credit applies");

        let stale = RedemptionRequest {
            reward_id: RewardId("rwd-drip".to_string()),
            expected_balance: 100,
            points_deducted: 100,
            new_balance: 0,
        };
        let err = ledger
            .apply_redemption(&customer(), &house_shop(), &stale)
            .expect_err("stale swap rejected");
        assert_eq!(
            err,
            LedgerError::BalanceChanged {
                expected: 100,
                actual: 120
            }
        );

        let fresh = RedemptionRequest {
            expected_balance: 120,
            new_balance: 20,
            ..stale
        };
        let txn = ledger
            .apply_redemption(&customer(), &house_shop(), &fresh)
            .expect("fresh swap applies");
        assert_eq!(txn.balance_after, 20);
        assert_eq!(txn.points_change, -100);
        assert_eq!(
            ledger.balance(&customer(), &house_shop()).expect("readable"),
            Some(20)
        );
    }

    #[test]
    fn history_is_newest_first() {
        let ledger = InMemoryLedger::default();
        for points in [10, 20, 30] {
            ledger
                .credit(&customer(), &house_shop(), points, None)
                .expect("credit applies");
        }
        let history = ledger
            .history(&customer(), None, HistoryPage { skip: 0, limit: 2 })
            .expect("history readable");
        let changes: Vec<i64> = history.iter().map(|txn| txn.points_change).collect();
        assert_eq!(changes, vec![30, 20]);

        let older = ledger
            .history(&customer(), None, HistoryPage { skip: 2, limit: 2 })
            .expect("history readable");
        assert_eq!(older.len(), 1);
        assert_eq!(older[0].points_change, 10);
    }

    #[test]
    fn inconsistent_redemption_cannot_drive_balance_negative() {
        let ledger = InMemoryLedger::default();
        ledger
            .credit(&customer(), &house_shop(), 50, None)
            .expect("credit applies");

        let tampered = RedemptionRequest {
            reward_id: RewardId("rwd-beans".to_string()),
            expected_balance: 50,
            points_deducted: 400,
            new_balance: -350,
        };
        assert_eq!(
            ledger.apply_redemption(&customer(), &house_shop(), &tampered),
            Err(LedgerError::Conflict)
        );

        let understated = RedemptionRequest {
            points_deducted: 10,
            new_balance: 45,
            ..tampered
        };
        assert_eq!(
            ledger.apply_redemption(&customer(), &house_shop(), &understated),
            Err(LedgerError::Conflict)
        );
        assert_eq!(
            ledger.balance(&customer(), &house_shop()).expect("readable"),
            Some(50)
        );
    }

    #[test]
    fn bulk_insert_is_all_or_nothing() {
        let catalog = InMemoryRewardCatalog::default();
        catalog
            .insert(&house_shop(), Reward::new("rwd-drip", "Free drip coffee", 100))
            .expect("first insert");

        let batch = vec![
            Reward::new("rwd-tea", "Free tea", 60),
            Reward::new("rwd-drip", "Free drip refill", 90),
        ];
        assert_eq!(
            catalog.insert_all(&house_shop(), batch),
            Err(LedgerError::Conflict)
        );
        assert_eq!(catalog.rewards(&house_shop()).expect("readable").len(), 1);
    }

    #[test]
    fn catalog_rejects_duplicate_insert() {
        let catalog = InMemoryRewardCatalog::default();
        let reward = Reward::new("rwd-drip", "Free drip coffee", 100);
        catalog
            .insert(&house_shop(), reward.clone())
            .expect("first insert");
        assert_eq!(
            catalog.insert(&house_shop(), reward),
            Err(LedgerError::Conflict)
        );
    }
}
