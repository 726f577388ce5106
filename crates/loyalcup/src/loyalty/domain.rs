use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a reward, unique within one shop's catalog.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub String);

/// Identifier of a participating shop.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShopId(pub String);

/// Identifier of a customer account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(pub String);

/// Identifier assigned by the ledger to a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

macro_rules! display_as_inner {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_as_inner!(RewardId, ShopId, CustomerId, TransactionId);

/// Catalog entry as shaped by the remote API (`{ id, name, description?, points_required }`).
///
/// `points_required` is kept as a signed integer so malformed upstream data can be carried to
/// the evaluator and reported instead of failing deserialization wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub id: RewardId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub points_required: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Reward {
    pub fn new(id: impl Into<String>, name: impl Into<String>, points_required: i64) -> Self {
        Self {
            id: RewardId(id.into()),
            name: name.into(),
            description: None,
            points_required,
            is_active: true,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Validated, non-negative point total a customer holds at one shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PointsBalance(i64);

impl PointsBalance {
    pub const ZERO: PointsBalance = PointsBalance(0);

    /// Returns `None` for negative input; a negative balance is a ledger fault, not a state.
    pub fn new(points: i64) -> Option<Self> {
        (points >= 0).then_some(Self(points))
    }

    pub fn points(self) -> i64 {
        self.0
    }
}

impl fmt::Display for PointsBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} points", self.0)
    }
}

/// Ledger transaction classification; mirrors the `loyalty_transactions.type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Earned,
    Redeemed,
    Adjusted,
    Expired,
}

impl TransactionKind {
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Earned => "earned",
            TransactionKind::Redeemed => "redeemed",
            TransactionKind::Adjusted => "adjusted",
            TransactionKind::Expired => "expired",
        }
    }
}

/// Committed ledger movement. Positive `points_change` credits, negative debits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub customer_id: CustomerId,
    pub shop_id: ShopId,
    pub kind: TransactionKind,
    pub points_change: i64,
    pub balance_after: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_id: Option<RewardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Balance row for one shop as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub shop_id: ShopId,
    pub points: i64,
    pub updated_at: DateTime<Utc>,
}

/// Per-shop program settings maintained by the shop owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopLoyaltySettings {
    /// Points credited for every whole dollar of an order total.
    pub points_per_dollar: i64,
}
