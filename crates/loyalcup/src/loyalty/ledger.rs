use super::domain::{
    BalanceSnapshot, CustomerId, LedgerTransaction, Reward, RewardId, ShopId, ShopLoyaltySettings,
};
use super::evaluation::RedemptionRequest;

/// Window into a customer's transaction history, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryPage {
    /// Newest entries to pass over before collecting.
    pub skip: usize,
    pub limit: usize,
}

/// Authoritative store of balances and transaction history.
pub trait BalanceLedger: Send + Sync {
    /// `None` when the customer has never transacted at the shop.
    fn balance(&self, customer: &CustomerId, shop: &ShopId) -> Result<Option<i64>, LedgerError>;

    /// Every shop balance held by the customer, ordered by shop id.
    fn balances(&self, customer: &CustomerId) -> Result<Vec<BalanceSnapshot>, LedgerError>;

    /// Add earned points, creating the balance on first use.
    fn credit(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        points: i64,
        order_id: Option<String>,
    ) -> Result<LedgerTransaction, LedgerError>;

    /// Atomically replace the balance with `request.new_balance` iff it still equals
    /// `request.expected_balance`; otherwise fail with [`LedgerError::BalanceChanged`].
    /// Requests failing [`RedemptionRequest::is_consistent`] are refused with
    /// [`LedgerError::Conflict`] before the balance is compared.
    fn apply_redemption(
        &self,
        customer: &CustomerId,
        shop: &ShopId,
        request: &RedemptionRequest,
    ) -> Result<LedgerTransaction, LedgerError>;

    /// Newest first, optionally scoped to one shop.
    fn history(
        &self,
        customer: &CustomerId,
        shop: Option<&ShopId>,
        page: HistoryPage,
    ) -> Result<Vec<LedgerTransaction>, LedgerError>;
}

/// Shop-owned reward catalogs and program settings.
pub trait RewardCatalogStore: Send + Sync {
    /// All rewards for the shop, inactive ones included.
    fn rewards(&self, shop: &ShopId) -> Result<Vec<Reward>, LedgerError>;
    fn insert(&self, shop: &ShopId, reward: Reward) -> Result<Reward, LedgerError>;
    /// Store every reward or none of them. Fails with [`LedgerError::Conflict`] when any id is
    /// already listed for the shop.
    fn insert_all(&self, shop: &ShopId, rewards: Vec<Reward>) -> Result<usize, LedgerError>;
    fn update(&self, shop: &ShopId, reward: Reward) -> Result<Reward, LedgerError>;
    fn remove(&self, shop: &ShopId, reward_id: &RewardId) -> Result<(), LedgerError>;

    /// `None` until the owner saves settings for the shop.
    fn settings(&self, shop: &ShopId) -> Result<Option<ShopLoyaltySettings>, LedgerError>;
    fn save_settings(
        &self,
        shop: &ShopId,
        settings: ShopLoyaltySettings,
    ) -> Result<ShopLoyaltySettings, LedgerError>;
}

/// Error enumeration for collaborator failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("balance changed concurrently (expected {expected}, found {actual})")]
    BalanceChanged { expected: i64, actual: i64 },
    #[error("record already exists or conflicts with stored state")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}
