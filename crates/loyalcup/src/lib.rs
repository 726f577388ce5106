//! Loyalty points and rewards core for the LoyalCup platform.
//!
//! The [`loyalty`] module holds the pure evaluator (reward ordering, progress, redemption and
//! accrual transitions) together with the collaborator contracts and service facade that wire
//! it to a ledger and a reward catalog.

pub mod config;
pub mod error;
pub mod loyalty;
pub mod telemetry;
