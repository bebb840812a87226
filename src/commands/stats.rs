//! Performance summary of stored signals

use anyhow::Result;
use chrono::{Duration, Utc};

use scalp_signals::stats::{recommendations, GroupStats, PerformanceStats};

pub fn run(config_path: String, days: i64) -> Result<()> {
    let config = super::load_config(&config_path)?;
    let store = super::open_store(&config)?;

    let now = Utc::now();
    let since = now - Duration::days(days.max(1));
    let records = store.since(since)?;
    let stats = PerformanceStats::from_records(&records);
    let advice = recommendations(&records, now, &config);

    println!();
    println!("=== Signal performance, last {} day(s) ===", days.max(1));
    println!(
        "Signals: {}  wins: {}  losses: {}  expired: {}  pending: {}",
        stats.total_signals, stats.wins, stats.losses, stats.expired, stats.pending
    );
    println!("Win rate:          {:.1}%", stats.win_rate);
    println!(
        "Return avg/std:    {:+.2}% / {:.2}%",
        stats.avg_return_pct, stats.return_std_pct
    );
    println!(
        "Best/worst:        {:+.2}% / {:+.2}%",
        stats.best_return_pct, stats.worst_return_pct
    );
    println!("Net return:        {:+.2}%", stats.net_return_pct);
    println!("Profit factor:     {:.2}", stats.profit_factor);
    println!("Avg score:         {:.1}", stats.avg_score);
    println!("Avg resolution:    {:.0} min", stats.avg_minutes_to_resolution);
    println!(
        "Streak:            {:+} (max win {}, max loss {})",
        stats.current_streak, stats.max_win_streak, stats.max_loss_streak
    );

    print_groups("By score", &stats.by_score_bucket);
    print_groups("By symbol", &stats.by_symbol);
    print_groups("By UTC hour", &stats.by_hour);
    print_groups("By criteria met", &stats.by_criteria_met);
    print_groups("By outcome", &stats.by_outcome);

    println!();
    if advice.is_empty() {
        println!(
            "Recommendations: none (needs {} resolved signals in the last {}h)",
            config.advisor.min_signals, config.advisor.window_hours
        );
    } else {
        println!("Recommendations (last {}h):", config.advisor.window_hours);
        for rec in &advice {
            println!("  - {}", rec);
        }
    }
    Ok(())
}

fn print_groups(title: &str, groups: &[GroupStats]) {
    if groups.is_empty() {
        return;
    }
    println!();
    println!("{}:", title);
    for g in groups {
        println!(
            "  {:<10} {:>4} signals  {:>5.1}% win  {:+.2}% avg  {:>4.0} min",
            g.label, g.signals, g.win_rate, g.avg_return_pct, g.avg_minutes_to_resolution
        );
    }
}
