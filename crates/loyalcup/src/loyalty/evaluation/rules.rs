use std::collections::HashSet;

use super::super::domain::{PointsBalance, Reward};
use super::{Progress, RejectedReward, RejectionReason};

/// Split the catalog into usable rewards and rejects. The first occurrence of an id wins.
pub(crate) fn screen_rewards(rewards: &[Reward]) -> (Vec<Reward>, Vec<RejectedReward>) {
    let mut accepted = Vec::with_capacity(rewards.len());
    let mut rejected = Vec::new();
    let mut seen = HashSet::new();

    for reward in rewards {
        if reward.points_required <= 0 {
            rejected.push(RejectedReward {
                reward_id: reward.id.clone(),
                reason: RejectionReason::NonPositivePoints {
                    points_required: reward.points_required,
                },
            });
            continue;
        }

        if !seen.insert(&reward.id) {
            rejected.push(RejectedReward {
                reward_id: reward.id.clone(),
                reason: RejectionReason::DuplicateId,
            });
            continue;
        }

        accepted.push(reward.clone());
    }

    (accepted, rejected)
}

/// Ascending by threshold; equal thresholds fall back to id so the order never depends on input.
pub(crate) fn sort_rewards(rewards: &mut [Reward]) {
    rewards.sort_by(|a, b| {
        a.points_required
            .cmp(&b.points_required)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Expects `sorted` in [`sort_rewards`] order.
pub(crate) fn partition(sorted: &[Reward], balance: PointsBalance) -> (Vec<Reward>, Option<Reward>) {
    let split = sorted.partition_point(|reward| reward.points_required <= balance.points());
    let available = sorted[..split].to_vec();
    let next = sorted.get(split).cloned();
    (available, next)
}

pub(crate) fn progress_fraction(balance: PointsBalance, required: i64) -> f64 {
    (balance.points() as f64 / required as f64).min(1.0)
}

pub(crate) fn progress_toward(balance: PointsBalance, required: i64) -> Progress {
    let current = balance.points();
    let percent = (progress_fraction(balance, required) * 100.0).round() as u8;

    Progress {
        current,
        required,
        points_remaining: (required - current).max(0),
        percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balance(points: i64) -> PointsBalance {
        PointsBalance::new(points).expect("non-negative")
    }

    #[test]
    fn partition_places_exact_threshold_in_available() {
        let sorted = vec![Reward::new("a", "Drip", 100), Reward::new("b", "Latte", 150)];

        let (available, next) = partition(&sorted, balance(100));

        assert_eq!(available.len(), 1);
        assert_eq!(next.map(|reward| reward.id.0), Some("b".to_string()));
    }

    #[test]
    fn progress_rounds_to_whole_percent() {
        let progress = progress_toward(balance(1), 3);

        assert_eq!(progress.percent, 33);
        assert_eq!(progress.points_remaining, 2);
    }

    #[test]
    fn progress_fraction_never_exceeds_one() {
        assert_eq!(progress_fraction(balance(500), 100), 1.0);
        assert_eq!(progress_fraction(balance(0), 100), 0.0);
    }
}
