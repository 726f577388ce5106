#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EarnError {
    #[error("balance {balance} is negative; the ledger snapshot is corrupt")]
    InvalidBalance { balance: i64 },
    #[error("earned points must be positive, got {points}")]
    NonPositiveAccrual { points: i64 },
    #[error("crediting {points} points to {balance} overflows the balance")]
    Overflow { balance: i64, points: i64 },
    #[error("order total must not be negative, got {amount_cents} cents")]
    NegativeOrderTotal { amount_cents: i64 },
    #[error("points per dollar must be positive, got {points_per_dollar}")]
    NonPositiveRate { points_per_dollar: i64 },
    #[error("order total of {amount_cents} cents at {points_per_dollar} points per dollar overflows")]
    OrderOverflow {
        amount_cents: i64,
        points_per_dollar: i64,
    },
}

const CENTS_PER_DOLLAR: i64 = 100;

/// Balance after crediting `points` from an order or promotion.
pub fn earn(balance: i64, points: i64) -> Result<i64, EarnError> {
    if balance < 0 {
        return Err(EarnError::InvalidBalance { balance });
    }
    if points <= 0 {
        return Err(EarnError::NonPositiveAccrual { points });
    }
    balance
        .checked_add(points)
        .ok_or(EarnError::Overflow { balance, points })
}

/// Points an order total is worth at the shop's rate, rounded down to whole points.
///
/// Amounts are in cents so fractional dollars earn pro rata: $4.50 at 10 points per dollar is
/// 45 points, $0.09 is 0.
pub fn points_for_order(amount_cents: i64, points_per_dollar: i64) -> Result<i64, EarnError> {
    if points_per_dollar <= 0 {
        return Err(EarnError::NonPositiveRate { points_per_dollar });
    }
    if amount_cents < 0 {
        return Err(EarnError::NegativeOrderTotal { amount_cents });
    }
    amount_cents
        .checked_mul(points_per_dollar)
        .map(|scaled| scaled / CENTS_PER_DOLLAR)
        .ok_or(EarnError::OrderOverflow {
            amount_cents,
            points_per_dollar,
        })
}
