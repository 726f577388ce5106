use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::{LoyaltyConfig, MAX_HISTORY_LIMIT};

use super::catalog::{active_rewards, ensure_unique_ids, CatalogError, RewardDraft};
use super::domain::{
    CustomerId, LedgerTransaction, Reward, RewardId, ShopId, ShopLoyaltySettings,
};
use super::evaluation::{
    self, EarnError, EvaluationError, EvaluationResult, Redemption, RedemptionError,
    RedemptionErrorClass,
};
use super::ledger::{BalanceLedger, HistoryPage, LedgerError, RewardCatalogStore};

/// Service composing the ledger, the reward catalog, and the pure evaluator.
pub struct LoyaltyService<L, C> {
    ledger: Arc<L>,
    catalog: Arc<C>,
    config: LoyaltyConfig,
}

static REWARD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_reward_id() -> RewardId {
    let id = REWARD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RewardId(format!("rwd-{id:06}"))
}

/// Evaluation of one shop balance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShopLoyaltySummary {
    pub shop_id: ShopId,
    pub evaluation: EvaluationResult,
}

/// Every shop a customer holds points at, plus the combined total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerOverview {
    pub customer_id: CustomerId,
    pub total_points: i64,
    pub shops: Vec<ShopLoyaltySummary>,
}

/// Committed redemption with the ledger entry that recorded it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedemptionReceipt {
    pub redemption: Redemption,
    pub transaction: LedgerTransaction,
    pub attempts: u32,
}

impl<L, C> LoyaltyService<L, C>
where
    L: BalanceLedger + 'static,
    C: RewardCatalogStore + 'static,
{
    pub fn new(ledger: Arc<L>, catalog: Arc<C>, config: LoyaltyConfig) -> Self {
        Self {
            ledger,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &LoyaltyConfig {
        &self.config
    }

    /// Evaluate the customer's balance at one shop. No balance yet reads as zero points.
    pub fn shop_summary(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
    ) -> Result<ShopLoyaltySummary, LoyaltyServiceError> {
        let balance = self.ledger.balance(customer, shop)?.unwrap_or(0);
        self.summarize(customer, shop.clone(), balance)
    }

    pub fn customer_overview(
        &self,
        customer: &CustomerId,
    ) -> Result<CustomerOverview, LoyaltyServiceError> {
        let shops = self
            .ledger
            .balances(customer)?
            .into_iter()
            .map(|snapshot| self.summarize(customer, snapshot.shop_id, snapshot.points))
            .collect::<Result<Vec<_>, _>>()?;
        let total_points = shops
            .iter()
            .map(|summary| summary.evaluation.balance.points())
            .sum();

        Ok(CustomerOverview {
            customer_id: customer.clone(),
            total_points,
            shops,
        })
    }

    /// Redeem a reward against a freshly read balance, retrying when the ledger reports that
    /// the balance moved between the read and the conditional write.
    pub fn redeem(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        reward_id: &RewardId,
    ) -> Result<RedemptionReceipt, LoyaltyServiceError> {
        let attempts = self.config.redeem_attempts.max(1);

        for attempt in 1..=attempts {
            let balance = self.ledger.balance(customer, shop)?.unwrap_or(0);
            let catalog = self.catalog.rewards(shop)?;
            let redemption = catalog
                .iter()
                .find(|reward| &reward.id == reward_id)
                .ok_or_else(|| RedemptionError::UnknownReward {
                    reward_id: reward_id.clone(),
                })
                .and_then(|reward| evaluation::redeem(balance, reward, &catalog))
                .map_err(|err| {
                    log_rejected_redemption(customer, shop, reward_id, &err);
                    err
                })?;

            match self
                .ledger
                .apply_redemption(customer, shop, &redemption.request())
            {
                Ok(transaction) => {
                    info!(
                        customer_id = %customer,
                        shop_id = %shop,
                        reward_id = %reward_id,
                        points = redemption.points_deducted,
                        new_balance = redemption.new_balance,
                        attempt,
                        "reward redeemed"
                    );
                    return Ok(RedemptionReceipt {
                        redemption,
                        transaction,
                        attempts: attempt,
                    });
                }
                Err(LedgerError::BalanceChanged { expected, actual }) => {
                    warn!(
                        customer_id = %customer,
                        shop_id = %shop,
                        expected,
                        actual,
                        attempt,
                        "balance changed during redemption; re-reading"
                    );
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(LoyaltyServiceError::RetriesExhausted { attempts })
    }

    /// Credit points earned from an order.
    pub fn earn(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        points: i64,
        order_id: Option<String>,
    ) -> Result<LedgerTransaction, LoyaltyServiceError> {
        let balance = self.ledger.balance(customer, shop)?.unwrap_or(0);
        if let Err(err) = evaluation::earn(balance, points) {
            if matches!(err, EarnError::InvalidBalance { .. }) {
                error!(customer_id = %customer, shop_id = %shop, balance, "corrupt balance on earn");
            }
            return Err(err.into());
        }

        let transaction = self.ledger.credit(customer, shop, points, order_id)?;
        info!(
            customer_id = %customer,
            shop_id = %shop,
            points,
            balance = transaction.balance_after,
            "points credited"
        );
        Ok(transaction)
    }

    /// Credit the points an order total is worth at the shop's earning rate.
    pub fn earn_for_order(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        amount_cents: i64,
        order_id: Option<String>,
    ) -> Result<LedgerTransaction, LoyaltyServiceError> {
        let settings = self.shop_settings(shop)?;
        let points = evaluation::points_for_order(amount_cents, settings.points_per_dollar)?;
        self.earn(customer, shop, points, order_id)
    }

    /// Saved settings, or the configured default rate for shops that never saved any.
    pub fn shop_settings(
        &self,
        shop: &ShopId,
    ) -> Result<ShopLoyaltySettings, LoyaltyServiceError> {
        Ok(self
            .catalog
            .settings(shop)?
            .unwrap_or(ShopLoyaltySettings {
                points_per_dollar: self.config.default_points_per_dollar,
            }))
    }

    pub fn update_shop_settings(
        &self,
        shop: &ShopId,
        settings: ShopLoyaltySettings,
    ) -> Result<ShopLoyaltySettings, LoyaltyServiceError> {
        if settings.points_per_dollar <= 0 {
            return Err(EarnError::NonPositiveRate {
                points_per_dollar: settings.points_per_dollar,
            }
            .into());
        }
        let saved = self.catalog.save_settings(shop, settings)?;
        info!(
            shop_id = %shop,
            points_per_dollar = saved.points_per_dollar,
            "loyalty settings saved"
        );
        Ok(saved)
    }

    /// Page through history, newest first. `limit` defaults to the configured page size and
    /// must fall within `1..=MAX_HISTORY_LIMIT`.
    pub fn history(
        &self,
        customer: &CustomerId,
        shop: Option<&ShopId>,
        skip: Option<usize>,
        limit: Option<usize>,
    ) -> Result<Vec<LedgerTransaction>, LoyaltyServiceError> {
        let limit = limit.unwrap_or(self.config.history_limit);
        if !(1..=MAX_HISTORY_LIMIT).contains(&limit) {
            return Err(LoyaltyServiceError::InvalidPageLimit { limit });
        }
        let page = HistoryPage {
            skip: skip.unwrap_or(0),
            limit,
        };
        Ok(self.ledger.history(customer, shop, page)?)
    }

    /// Owner view of the catalog, inactive rewards included.
    pub fn list_rewards(&self, shop: &ShopId) -> Result<Vec<Reward>, LoyaltyServiceError> {
        Ok(self.catalog.rewards(shop)?)
    }

    pub fn create_reward(
        &self,
        shop: &ShopId,
        draft: RewardDraft,
    ) -> Result<Reward, LoyaltyServiceError> {
        let reward = draft.into_reward(next_reward_id())?;
        let stored = self.catalog.insert(shop, reward)?;
        info!(shop_id = %shop, reward_id = %stored.id, "reward created");
        Ok(stored)
    }

    pub fn update_reward(
        &self,
        shop: &ShopId,
        reward_id: &RewardId,
        draft: RewardDraft,
    ) -> Result<Reward, LoyaltyServiceError> {
        let reward = draft.into_reward(reward_id.clone())?;
        Ok(self.catalog.update(shop, reward)?)
    }

    pub fn delete_reward(
        &self,
        shop: &ShopId,
        reward_id: &RewardId,
    ) -> Result<(), LoyaltyServiceError> {
        self.catalog.remove(shop, reward_id)?;
        info!(shop_id = %shop, reward_id = %reward_id, "reward removed");
        Ok(())
    }

    /// Load a full catalog (for example a CSV export). Every record is validated and the batch is
    /// stored with one all-or-nothing insert, so an id collision leaves the catalog untouched.
    pub fn import_rewards(
        &self,
        shop: &ShopId,
        rewards: Vec<Reward>,
    ) -> Result<usize, LoyaltyServiceError> {
        ensure_unique_ids(&rewards)?;
        let validated = rewards
            .into_iter()
            .map(|reward| {
                RewardDraft {
                    name: reward.name,
                    description: reward.description,
                    points_required: reward.points_required,
                    is_active: reward.is_active,
                }
                .into_reward(reward.id)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let existing = self.catalog.rewards(shop)?;
        if let Some(clash) = validated
            .iter()
            .find(|reward| existing.iter().any(|entry| entry.id == reward.id))
        {
            return Err(CatalogError::DuplicateReward(clash.id.clone()).into());
        }

        let count = self.catalog.insert_all(shop, validated)?;
        info!(shop_id = %shop, count, "reward catalog imported");
        Ok(count)
    }

    fn summarize(
        &self,
        customer: &CustomerId,
        shop: ShopId,
        balance: i64,
    ) -> Result<ShopLoyaltySummary, LoyaltyServiceError> {
        let catalog = active_rewards(&self.catalog.rewards(&shop)?);
        let evaluation = evaluation::evaluate(balance, &catalog).map_err(|err| {
            error!(customer_id = %customer, shop_id = %shop, balance, "corrupt balance on evaluation");
            err
        })?;

        if !evaluation.rejected.is_empty() {
            warn!(
                shop_id = %shop,
                rejected = evaluation.rejected.len(),
                "catalog contains malformed rewards"
            );
        }

        Ok(ShopLoyaltySummary {
            shop_id: shop,
            evaluation,
        })
    }
}

fn log_rejected_redemption(
    customer: &CustomerId,
    shop: &ShopId,
    reward_id: &RewardId,
    err: &RedemptionError,
) {
    match err.class() {
        RedemptionErrorClass::DataIntegrity => error!(
            customer_id = %customer,
            shop_id = %shop,
            reward_id = %reward_id,
            error = %err,
            "redemption rejected: loyalty data is inconsistent"
        ),
        RedemptionErrorClass::BusinessRule | RedemptionErrorClass::Stale => info!(
            customer_id = %customer,
            shop_id = %shop,
            reward_id = %reward_id,
            kind = err.kind(),
            "redemption rejected"
        ),
    }
}

/// Error raised by the loyalty service.
#[derive(Debug, thiserror::Error)]
pub enum LoyaltyServiceError {
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Redemption(#[from] RedemptionError),
    #[error(transparent)]
    Earn(#[from] EarnError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("balance kept changing; gave up after {attempts} attempt(s)")]
    RetriesExhausted { attempts: u32 },
    #[error("history limit must be between 1 and {}, got {limit}", MAX_HISTORY_LIMIT)]
    InvalidPageLimit { limit: usize },
}
