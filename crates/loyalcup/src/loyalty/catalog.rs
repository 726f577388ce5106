//! Input boundary for catalog and balance data arriving from the remote API or from files.

use std::collections::HashSet;
use std::io::Read;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::domain::{Reward, RewardId};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("malformed reward payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed reward CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("balance must be a non-negative integer, got {raw}")]
    InvalidBalance { raw: String },
    #[error("reward name must not be empty")]
    EmptyName,
    #[error("points_required must be positive, got {points_required}")]
    NonPositivePoints { points_required: i64 },
    #[error("reward {0} already exists")]
    DuplicateReward(RewardId),
}

/// Accept only JSON integers in `0..=i64::MAX`. Floats, strings, and negatives are data errors.
pub fn parse_balance(value: &Value) -> Result<i64, CatalogError> {
    value
        .as_i64()
        .filter(|points| *points >= 0)
        .ok_or_else(|| CatalogError::InvalidBalance {
            raw: value.to_string(),
        })
}

/// Parse a JSON array of reward records. Non-integer thresholds fail the whole payload.
pub fn rewards_from_json<R: Read>(reader: R) -> Result<Vec<Reward>, CatalogError> {
    let rewards: Vec<Reward> = serde_json::from_reader(reader)?;
    Ok(rewards)
}

/// Parse a shop-owner CSV export with `id,name,description,points_required[,is_active]` columns.
pub fn rewards_from_csv<R: Read>(reader: R) -> Result<Vec<Reward>, CatalogError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rewards = Vec::new();

    for row in csv_reader.deserialize::<RewardRow>() {
        let row = row?;
        rewards.push(Reward {
            id: RewardId(row.id),
            name: row.name,
            description: row.description,
            points_required: row.points_required,
            is_active: row.is_active.unwrap_or(true),
        });
    }

    Ok(rewards)
}

#[derive(Debug, Deserialize)]
struct RewardRow {
    id: String,
    name: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    description: Option<String>,
    points_required: i64,
    #[serde(default)]
    is_active: Option<bool>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

/// Rewards a customer may currently see: the backend lists active entries only.
pub fn active_rewards(rewards: &[Reward]) -> Vec<Reward> {
    rewards
        .iter()
        .filter(|reward| reward.is_active)
        .cloned()
        .collect()
}

/// Shop-owner input for creating or replacing a reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardDraft {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub points_required: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl RewardDraft {
    pub fn into_reward(self, id: RewardId) -> Result<Reward, CatalogError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.points_required <= 0 {
            return Err(CatalogError::NonPositivePoints {
                points_required: self.points_required,
            });
        }

        Ok(Reward {
            id,
            name,
            description: self
                .description
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            points_required: self.points_required,
            is_active: self.is_active,
        })
    }
}

/// Reject a catalog that repeats an id. Used when importing whole catalogs.
pub fn ensure_unique_ids(rewards: &[Reward]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for reward in rewards {
        if !seen.insert(&reward.id) {
            return Err(CatalogError::DuplicateReward(reward.id.clone()));
        }
    }
    Ok(())
}
