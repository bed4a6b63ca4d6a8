//! Insight command implementations (forecast, risk, rhythm)

use anyhow::Result;
use steer_core::db::Database;
use steer_core::{forecast, rhythm, risk};

/// History window fed into the insight computations
const HISTORY_LIMIT: u32 = 500;

pub fn cmd_forecast(db: &Database, user_id: i64, days: u32) -> Result<()> {
    let days = days.clamp(1, 90);
    let balance = db.total_balance(user_id)?;
    let transactions = db.list_recent_transactions(user_id, HISTORY_LIMIT)?;

    let forecast = forecast::project(&transactions, balance, days);

    println!();
    println!("🔮 {}-Day Forecast", days);
    println!("   ─────────────────────────────────────────────");
    println!("   Current balance: {}", balance);
    println!(
        "   Trend: {} ({}/week)",
        forecast.trend, forecast.trend_rate
    );
    println!("   Confidence: {:.0}%", forecast.confidence);
    println!(
        "   Daily net: {} (income {} − expense {})",
        forecast.rates.daily_net, forecast.rates.daily_income, forecast.rates.daily_expense
    );
    println!();

    // Weekly checkpoints keep the output readable on long horizons
    for prediction in forecast
        .predictions
        .iter()
        .filter(|p| p.day_offset % 7 == 0 || p.day_offset == days)
    {
        println!(
            "   day {:>2} │ {:>12} │ [{} .. {}]",
            prediction.day_offset, prediction.predicted, prediction.lower_bound, prediction.upper_bound
        );
    }

    Ok(())
}

pub fn cmd_risk(db: &Database, user_id: i64) -> Result<()> {
    let balance = db.total_balance(user_id)?;
    let transactions = db.list_recent_transactions(user_id, HISTORY_LIMIT)?;

    let forecast = forecast::project(&transactions, balance, 30);
    let assessment = risk::score_forecast(&forecast, balance);
    let emi = risk::check_emi_at_risk(&transactions, balance);

    // Every scoring leaves an audit trail
    db.insert_risk_snapshot(user_id, &assessment)?;

    println!();
    println!("⚖️  Risk Assessment");
    println!("   ─────────────────────────────────────────────");
    println!("   Score: {}/100 ({})", assessment.score, assessment.level);
    for driver in &assessment.drivers {
        println!("   • {}", driver);
    }

    if emi.at_risk {
        println!();
        println!(
            "   ⚠️  Payments totalling {} land this week against a projected low of {}",
            emi.total_emi, emi.min_predicted
        );
        println!("      Shortfall: {}", emi.shortfall);
        if let Some(due) = emi.next_due {
            println!("      Next due: {}", due);
        }
    }

    Ok(())
}

pub fn cmd_rhythm(db: &Database, user_id: i64) -> Result<()> {
    let transactions = db.list_recent_transactions(user_id, HISTORY_LIMIT)?;
    let profile = rhythm::analyze(&transactions);

    println!();
    println!("🎵 Financial Rhythm");
    println!("   ─────────────────────────────────────────────");

    match &profile.income_rhythm {
        Some(income) => {
            println!(
                "   Income: {} cadence, payday {} ({}% reliable)",
                income.cadence, income.payday, income.reliability_pct
            );
        }
        None => println!("   Income: not enough history to detect a cadence"),
    }

    println!(
        "   Spending: {}% on weekends, {}% late-night",
        profile.spend_rhythm.weekend_share_pct, profile.spend_rhythm.late_night_share_pct
    );
    for day in &profile.spend_rhythm.high_risk_days {
        println!(
            "   ⚠️  {} runs {}% above your weekday average",
            day.weekday, day.overspend_pct
        );
    }
    for share in &profile.spend_rhythm.top_categories {
        println!("   {} │ {}% of spend", share.category, share.share_pct);
    }
    println!("   Best nudge hour: {:02}:00 UTC", profile.optimal_hour);

    Ok(())
}
