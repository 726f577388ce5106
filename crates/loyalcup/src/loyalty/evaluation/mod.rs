//! Pure reward evaluation over a balance snapshot and a catalog snapshot.
//!
//! Nothing here holds state: callers re-run [`evaluate`] whenever the balance or the catalog
//! changes and submit [`Redemption::request`] to the ledger themselves.

mod accrual;
mod redemption;
mod rules;

pub use accrual::{earn, points_for_order, EarnError};
pub use redemption::{
    redeem, Redemption, RedemptionError, RedemptionErrorClass, RedemptionRequest,
};

use super::domain::{PointsBalance, Reward, RewardId};
use serde::{Deserialize, Serialize};

/// Derived view state for one customer at one shop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationResult {
    pub balance: PointsBalance,
    pub sorted_rewards: Vec<Reward>,
    pub available_rewards: Vec<Reward>,
    pub next_reward: Option<Reward>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_fraction: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedReward>,
}

impl EvaluationResult {
    pub fn can_redeem(&self, reward_id: &RewardId) -> bool {
        self.available_rewards
            .iter()
            .any(|reward| &reward.id == reward_id)
    }
}

/// Progress toward the next reward, shaped for a progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub current: i64,
    pub required: i64,
    pub points_remaining: i64,
    /// Whole percentage, rounded half away from zero and capped at 100.
    pub percent: u8,
}

/// Catalog entry excluded from evaluation because its data cannot be trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedReward {
    pub reward_id: RewardId,
    pub reason: RejectionReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    NonPositivePoints { points_required: i64 },
    DuplicateId,
}

impl RejectionReason {
    pub fn summary(&self) -> String {
        match self {
            RejectionReason::NonPositivePoints { points_required } => {
                format!("points_required must be positive, got {points_required}")
            }
            RejectionReason::DuplicateId => "reward id appears more than once".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvaluationError {
    #[error("balance {balance} is negative; the ledger snapshot is corrupt")]
    InvalidBalance { balance: i64 },
}

/// Evaluate a balance against a shop's reward catalog.
///
/// Rewards are ordered by `points_required` then id. Entries with non-positive thresholds or
/// repeated ids are excluded and listed in [`EvaluationResult::rejected`].
pub fn evaluate(balance: i64, rewards: &[Reward]) -> Result<EvaluationResult, EvaluationError> {
    let balance = PointsBalance::new(balance).ok_or(EvaluationError::InvalidBalance { balance })?;

    let (mut sorted_rewards, rejected) = rules::screen_rewards(rewards);
    if !rejected.is_empty() {
        tracing::debug!(
            excluded = rejected.len(),
            "excluded malformed rewards from evaluation"
        );
    }
    rules::sort_rewards(&mut sorted_rewards);

    let (available_rewards, next_reward) = rules::partition(&sorted_rewards, balance);
    let progress_fraction = next_reward
        .as_ref()
        .map(|reward| rules::progress_fraction(balance, reward.points_required));
    let progress = next_reward
        .as_ref()
        .map(|reward| rules::progress_toward(balance, reward.points_required));

    Ok(EvaluationResult {
        balance,
        sorted_rewards,
        available_rewards,
        next_reward,
        progress_fraction,
        progress,
        rejected,
    })
}
