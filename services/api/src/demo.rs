use crate::infra::{house_rewards, house_shop, InMemoryLedger, InMemoryRewardCatalog};
use clap::Args;
use loyalcup::config::LoyaltyConfig;
use loyalcup::error::AppError;
use loyalcup::loyalty::{
    active_rewards, evaluate, rewards_from_csv, rewards_from_json, CustomerId, EvaluationResult,
    LoyaltyService, Reward, RewardCatalogStore, RewardId, ShopId,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EvaluateArgs {
    /// Current points balance (a non-negative integer)
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) balance: i64,
    /// Reward catalog file; `.csv` is read as a shop export, anything else as a JSON array
    #[arg(long)]
    pub(crate) rewards: PathBuf,
    /// Print the full evaluation as JSON instead of a summary
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Total of each simulated order, in cents. Converted at the shop's points-per-dollar rate.
    #[arg(long, default_value_t = 400)]
    pub(crate) order_total_cents: i64,
    /// Number of simulated orders before the redemption step.
    #[arg(long, default_value_t = 3)]
    pub(crate) orders: u32,
}

pub(crate) fn run_evaluate(args: EvaluateArgs) -> Result<(), AppError> {
    let rewards = load_rewards_from_path(&args.rewards)?;
    let result = evaluate(args.balance, &active_rewards(&rewards))?;

    if args.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(err) => println!("Evaluation payload unavailable: {err}"),
        }
    } else {
        render_evaluation(&result);
    }
    Ok(())
}

pub(crate) fn load_rewards_from_path(path: &Path) -> Result<Vec<Reward>, AppError> {
    let reader = BufReader::new(File::open(path)?);
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    let rewards = if is_csv {
        rewards_from_csv(reader)?
    } else {
        rewards_from_json(reader)?
    };
    Ok(rewards)
}

pub(crate) fn render_evaluation(result: &EvaluationResult) {
    for line in evaluation_lines(result) {
        println!("{line}");
    }
}

pub(crate) fn evaluation_lines(result: &EvaluationResult) -> Vec<String> {
    let mut lines = vec![format!("Balance: {}", result.balance)];

    if result.available_rewards.is_empty() {
        lines.push("Available rewards: none yet".to_string());
    } else {
        lines.push("Available rewards:".to_string());
        for reward in &result.available_rewards {
            lines.push(format!("  - {} ({} pts)", reward.name, reward.points_required));
        }
    }

    lines.push(match (&result.next_reward, &result.progress) {
        (Some(next), Some(progress)) => format!(
            "Next reward: {} | {}/{} pts ({}%), {} to go",
            next.name,
            progress.current,
            progress.required,
            progress.percent,
            progress.points_remaining
        ),
        _ => "Next reward: every listed reward is unlocked".to_string(),
    });

    for rejected in &result.rejected {
        lines.push(format!(
            "Skipped reward {}: {}",
            rejected.reward_id,
            rejected.reason.summary()
        ));
    }
    lines
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        order_total_cents,
        orders,
    } = args;

    println!("LoyalCup demo");
    let shop = house_shop();
    let customer = CustomerId("cust-demo".to_string());
    let ledger = Arc::new(InMemoryLedger::default());
    let catalog = Arc::new(InMemoryRewardCatalog::default());
    for reward in house_rewards() {
        if let Err(err) = catalog.insert(&shop, reward) {
            println!("  Catalog seed rejected: {err}");
            return Ok(());
        }
    }
    let service = LoyaltyService::new(ledger, catalog, LoyaltyConfig::default());

    let rate = match service.shop_settings(&shop) {
        Ok(settings) => settings.points_per_dollar,
        Err(err) => {
            println!("  Shop settings unavailable: {err}");
            return Ok(());
        }
    };
    println!("\nEarning points at {shop} ({rate} pts per dollar)");
    for order in 1..=orders {
        match service.earn_for_order(
            &customer,
            &shop,
            order_total_cents,
            Some(format!("order-{order:03}")),
        ) {
            Ok(txn) => println!(
                "- order-{order:03} (${}.{:02}): +{} pts (balance {})",
                order_total_cents / 100,
                order_total_cents % 100,
                txn.points_change,
                txn.balance_after
            ),
            Err(err) => {
                println!("  Accrual rejected: {err}");
                return Ok(());
            }
        }
    }

    let summary = match service.shop_summary(&customer, &shop) {
        Ok(summary) => summary,
        Err(err) => {
            println!("  Summary unavailable: {err}");
            return Ok(());
        }
    };
    println!();
    render_evaluation(&summary.evaluation);

    let Some(target) = summary.evaluation.available_rewards.last().cloned() else {
        println!("\nNot enough points for a redemption yet");
        return Ok(());
    };
    redeem_and_report(&service, &customer, &shop, &target.id);

    match service.history(&customer, Some(&shop), None, None) {
        Ok(transactions) => match serde_json::to_string_pretty(&transactions) {
            Ok(json) => println!("\nLedger history payload:\n{json}"),
            Err(err) => println!("\nLedger history payload unavailable: {err}"),
        },
        Err(err) => println!("\nLedger history unavailable: {err}"),
    }

    Ok(())
}

fn redeem_and_report(
    service: &LoyaltyService<InMemoryLedger, InMemoryRewardCatalog>,
    customer: &CustomerId,
    shop: &ShopId,
    reward_id: &RewardId,
) {
    println!("\nRedeeming {reward_id}");
    match service.redeem(customer, shop, reward_id) {
        Ok(receipt) => println!(
            "- {} redeemed for {} pts: {} -> {} (attempts: {})",
            receipt.redemption.reward_name,
            receipt.redemption.points_deducted,
            receipt.redemption.balance_before,
            receipt.redemption.new_balance,
            receipt.attempts
        ),
        Err(err) => println!("  Redemption rejected: {err}"),
    }
}
