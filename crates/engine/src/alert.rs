use common::{CheckOutcome, Direction, SignalRecord, Verdict};

/// Checklist lines included in an alert.
const ALERT_CHECKLIST_LINES: usize = 6;
const RULE: &str = "--------------------";

/// Plain-text alert for a directional signal.
pub fn format_alert(r: &SignalRecord) -> String {
    let marker = match r.direction {
        Direction::Long => "🟢",
        Direction::Short => "🔴",
        Direction::Wait => "⚪",
    };
    let verdict_line = match r.verdict {
        Verdict::Go => "✅ Ready to enter",
        Verdict::No => "🔴 Not yet, wait for a cleaner setup",
        Verdict::Wait => "🟡 Waiting for more confirmation",
    };
    let l = &r.levels;

    let funding = r
        .market
        .funding_rate
        .map_or_else(|| "N/A".to_string(), |f| format!("{f:+.4}%"));
    let oi = r
        .market
        .oi_change
        .map_or_else(|| "N/A".to_string(), |o| format!("{o:+.2}%"));

    let mut lines = vec![
        format!("{marker} {} {} | {} | {}", r.symbol, r.direction, r.confidence, r.variant),
        verdict_line.to_string(),
        RULE.to_string(),
        format!("Price: {} | R:R 1:{}", r.price, l.risk_reward),
        format!("Entry: {}", l.entry),
        format!("SL: {} (-{}%)", l.stop_loss, l.stop_pct),
        format!("TP1: {} (+{}%) | TP2: {}", l.take_profit_1, l.tp1_pct, l.take_profit_2),
        RULE.to_string(),
        format!(
            "{}: {} | {}: {}",
            r.trend.timeframe, r.trend.bias, r.confirm.timeframe, r.confirm.bias
        ),
        format!("Funding: {funding} | OI: {oi} | ATR: {}x", r.market.volatility.ratio),
        RULE.to_string(),
        "Checklist:".to_string(),
    ];
    for item in r.checklist.iter().take(ALERT_CHECKLIST_LINES) {
        let icon = match item.outcome {
            CheckOutcome::Pass => "OK",
            CheckOutcome::Fail => "XX",
            CheckOutcome::Undecided => "--",
        };
        lines.push(format!("  {icon} {}", item.text));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{CheckItem, Confidence, TradeLevels, Variant};

    #[test]
    fn alert_carries_levels_and_six_checks() {
        let record = SignalRecord {
            symbol: "SOLUSDT".into(),
            variant: Variant::Swing,
            direction: Direction::Short,
            confidence: Confidence::High,
            verdict: Verdict::Go,
            price: 142.5,
            levels: TradeLevels {
                entry: 142.5,
                stop_loss: 146.0,
                take_profit_1: 135.0,
                take_profit_2: 130.0,
                stop_pct: 2.46,
                tp1_pct: 5.26,
                risk_reward: 2.14,
                optimal_entry: None,
            },
            checklist: (0..7).map(|i| CheckItem::pass(format!("check {i}"))).collect(),
            ..SignalRecord::default()
        };
        let text = format_alert(&record);

        assert!(text.starts_with("🔴 SOLUSDT SHORT | HIGH | swing"));
        assert!(text.contains("Ready to enter"));
        assert!(text.contains("SL: 146 (-2.46%)"));
        assert!(text.contains("R:R 1:2.14"));
        assert!(text.contains("Funding: N/A"));
        assert!(text.contains("OK check 5"));
        assert!(!text.contains("check 6"));
    }
}
