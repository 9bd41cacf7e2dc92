use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use common::{Bias, Candle, Confidence, Direction, Variant, Verdict};
use history::{replay, summarize, HistoryEntry, Outcome};

fn entry(direction: Direction, price: f64, stop_pct: f64, tp1_pct: f64) -> HistoryEntry {
    let sign = if direction == Direction::Short { -1.0 } else { 1.0 };
    HistoryEntry {
        time: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        symbol: "TESTUSDT".into(),
        variant: Variant::Scalp,
        direction,
        confidence: Confidence::High,
        price,
        entry: price,
        stop_loss: price * (1.0 - sign * stop_pct / 100.0),
        stop_pct,
        take_profit_1: price * (1.0 + sign * tp1_pct / 100.0),
        tp1_pct,
        take_profit_2: price * (1.0 + sign * 2.0 * tp1_pct / 100.0),
        risk_reward: tp1_pct / stop_pct,
        trend_bias: Bias::Neutral,
        confirm_bias: Bias::Neutral,
        score: 0,
        verdict: Verdict::Wait,
    }
}

proptest! {
    /// Replay on randomized prices must never panic and must stay consistent.
    #[test]
    fn replay_never_panics_on_extreme_prices(
        price in 0.0001f64..1_000_000.0f64,
        stop_pct in 0.0f64..10.0f64,
        tp1_pct in 0.0f64..20.0f64,
        short in any::<bool>(),
        moves in proptest::collection::vec((-0.2f64..0.2f64, 0.0f64..0.1f64), 0..50),
    ) {
        let direction = if short { Direction::Short } else { Direction::Long };
        let e = entry(direction, price, stop_pct, tp1_pct);
        let start = e.time;
        let mut close = price;
        let candles: Vec<Candle> = moves
            .iter()
            .enumerate()
            .map(|(i, (change, wick))| {
                let open = close;
                close = (close * (1.0 + change)).max(1e-9);
                Candle {
                    open_time: start + Duration::hours(i as i64 + 1),
                    open,
                    high: open.max(close) * (1.0 + wick),
                    low: open.min(close) * (1.0 - wick),
                    close,
                    volume: 1.0,
                }
            })
            .collect();

        let result = replay(&e, &candles);
        match result.outcome {
            Outcome::Loss => prop_assert_eq!(result.pnl_r, Some(-1.0)),
            Outcome::Win => prop_assert!(result.pnl_r.is_some_and(|r| r >= 0.0)),
            Outcome::Open => prop_assert_eq!(result.bars, Some(candles.len())),
            Outcome::Error => prop_assert!(candles.is_empty()),
        }

        let summary = summarize(std::slice::from_ref(&result));
        prop_assert_eq!(summary.total, 1);
        prop_assert!(summary.win_rate.is_finite());
    }
}
