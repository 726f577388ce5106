use super::super::domain::{Reward, RewardId};
use serde::{Deserialize, Serialize};

/// Proposed outcome of exchanging points for a reward. Not committed until the ledger applies
/// the matching [`RedemptionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub reward_id: RewardId,
    pub reward_name: String,
    pub balance_before: i64,
    pub points_deducted: i64,
    pub new_balance: i64,
}

impl Redemption {
    /// Body for the ledger's conditional decrement: apply only while the stored balance still
    /// equals `expected_balance`.
    pub fn request(&self) -> RedemptionRequest {
        RedemptionRequest {
            reward_id: self.reward_id.clone(),
            expected_balance: self.balance_before,
            points_deducted: self.points_deducted,
            new_balance: self.new_balance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub reward_id: RewardId,
    pub expected_balance: i64,
    pub points_deducted: i64,
    pub new_balance: i64,
}

impl RedemptionRequest {
    /// A positive debit whose `new_balance` is exactly `expected_balance - points_deducted`
    /// and not negative. Ledgers refuse anything else.
    pub fn is_consistent(&self) -> bool {
        self.points_deducted > 0
            && self.new_balance >= 0
            && self.expected_balance.checked_sub(self.points_deducted) == Some(self.new_balance)
    }
}

/// Coarse grouping used by callers to decide between retrying, refreshing, or alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedemptionErrorClass {
    DataIntegrity,
    BusinessRule,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedemptionError {
    #[error("need {required} points but only {balance} available")]
    InsufficientPoints { required: i64, balance: i64 },
    #[error("reward {reward_id} is no longer offered")]
    UnknownReward { reward_id: RewardId },
    #[error("balance {balance} is negative; the ledger snapshot is corrupt")]
    InvalidBalance { balance: i64 },
    #[error("reward {reward_id} has non-positive points_required {points_required}")]
    InvalidReward {
        reward_id: RewardId,
        points_required: i64,
    },
}

impl RedemptionError {
    pub fn class(&self) -> RedemptionErrorClass {
        match self {
            RedemptionError::InsufficientPoints { .. } => RedemptionErrorClass::BusinessRule,
            RedemptionError::UnknownReward { .. } => RedemptionErrorClass::Stale,
            RedemptionError::InvalidBalance { .. } | RedemptionError::InvalidReward { .. } => {
                RedemptionErrorClass::DataIntegrity
            }
        }
    }

    /// Only staleness clears by itself, after the caller refetches the catalog.
    pub fn is_retryable(&self) -> bool {
        self.class() == RedemptionErrorClass::Stale
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RedemptionError::InsufficientPoints { .. } => "insufficient_points",
            RedemptionError::UnknownReward { .. } => "unknown_reward",
            RedemptionError::InvalidBalance { .. } => "invalid_balance",
            RedemptionError::InvalidReward { .. } => "invalid_reward",
        }
    }
}

/// Compute the balance left after redeeming `reward`.
///
/// `catalog` is the shop's current catalog. The reward must still be listed and active there,
/// and the catalog's threshold is the one charged.
pub fn redeem(
    balance: i64,
    reward: &Reward,
    catalog: &[Reward],
) -> Result<Redemption, RedemptionError> {
    if balance < 0 {
        return Err(RedemptionError::InvalidBalance { balance });
    }
    ensure_positive(reward)?;

    let current = catalog
        .iter()
        .find(|entry| entry.id == reward.id && entry.is_active)
        .ok_or_else(|| RedemptionError::UnknownReward {
            reward_id: reward.id.clone(),
        })?;
    ensure_positive(current)?;

    let required = current.points_required;
    if balance < required {
        return Err(RedemptionError::InsufficientPoints { required, balance });
    }

    Ok(Redemption {
        reward_id: current.id.clone(),
        reward_name: current.name.clone(),
        balance_before: balance,
        points_deducted: required,
        new_balance: balance - required,
    })
}

fn ensure_positive(reward: &Reward) -> Result<(), RedemptionError> {
    if reward.points_required <= 0 {
        return Err(RedemptionError::InvalidReward {
            reward_id: reward.id.clone(),
            points_required: reward.points_required,
        });
    }
    Ok(())
}
