//! Loyalty points and rewards: the pure evaluator plus the service and HTTP layers around it.
//!
//! [`evaluation`] is referentially transparent and owns the reward rules. [`service`] reads
//! snapshots from the [`ledger`] collaborators, runs the evaluator, and submits redemptions as
//! conditional ledger writes.

pub mod catalog;
pub mod domain;
pub mod evaluation;
pub mod ledger;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use catalog::{
    active_rewards, parse_balance, rewards_from_csv, rewards_from_json, CatalogError, RewardDraft,
};
pub use domain::{
    BalanceSnapshot, CustomerId, LedgerTransaction, PointsBalance, Reward, RewardId, ShopId,
    ShopLoyaltySettings, TransactionId, TransactionKind,
};
pub use evaluation::{
    earn, evaluate, points_for_order, redeem, EarnError, EvaluationError, EvaluationResult,
    Progress, Redemption, RedemptionError, RedemptionErrorClass, RedemptionRequest,
    RejectedReward, RejectionReason,
};
pub use ledger::{BalanceLedger, HistoryPage, LedgerError, RewardCatalogStore};
pub use router::loyalty_router;
pub use service::{
    CustomerOverview, LoyaltyService, LoyaltyServiceError, RedemptionReceipt, ShopLoyaltySummary,
};
